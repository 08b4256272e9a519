use std::fmt::Display;

use chrono::{DateTime, NaiveDateTime, Utc};

/// The version of the protocol.
/// A version always consists of a major and a minor part.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Version {
    major: usize,
    minor: usize,
}

impl Version {
    /// Version 1.7 of the protocol
    pub const V1_7: Version = Version { major: 1, minor: 7 };

    /// Returns the latest supported version
    pub fn latest() -> Version {
        Version::V1_7
    }

    /// The major part of the version
    pub fn major(&self) -> usize {
        self.major
    }

    /// The minor part of the version
    pub fn minor(&self) -> usize {
        self.minor
    }
}

#[test]
fn version_ordering() {
    assert!(Version { major: 1, minor: 6 } < Version { major: 1, minor: 7 });
    assert!(Version { major: 2, minor: 0 } > Version::V1_7);
}

impl Default for Version {
    fn default() -> Self {
        Self::V1_7
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// The state of a property vector, also used as the value of a light.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum PropertyState {
    #[default]
    Idle,
    Ok,
    Busy,
    Alert,
}

impl PropertyState {
    /// Case-insensitive parse of the wire token. Anything unrecognized is `Idle`.
    pub fn parse(value: &str) -> PropertyState {
        match value.trim().to_ascii_lowercase().as_str() {
            "ok" => PropertyState::Ok,
            "busy" => PropertyState::Busy,
            "alert" => PropertyState::Alert,
            _ => PropertyState::Idle,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyState::Idle => "Idle",
            PropertyState::Ok => "Ok",
            PropertyState::Busy => "Busy",
            PropertyState::Alert => "Alert",
        }
    }
}

impl Display for PropertyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read and write permissions of a property vector.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Permission {
    pub read: bool,
    pub write: bool,
}

impl Permission {
    pub const READ_ONLY: Permission = Permission {
        read: true,
        write: false,
    };
    pub const READ_WRITE: Permission = Permission {
        read: true,
        write: true,
    };

    /// Derives the flags from the `perm` attribute (`ro`, `wo`, `rw`).
    /// A missing attribute grants neither.
    pub fn parse(perm: Option<&str>) -> Permission {
        let perm = perm.unwrap_or_default();
        Permission {
            read: perm.contains('r'),
            write: perm.contains('w'),
        }
    }
}

/// How many switches of a switch vector may be on at the same time.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum SwitchRule {
    #[default]
    OneOfMany,
    AtMostOne,
    AnyOfMany,
}

impl SwitchRule {
    pub fn parse(rule: Option<&str>) -> SwitchRule {
        match rule.map(str::trim) {
            Some("AtMostOne") => SwitchRule::AtMostOne,
            Some("AnyOfMany") => SwitchRule::AnyOfMany,
            _ => SwitchRule::OneOfMany,
        }
    }

    /// Whether `on` switches being on satisfies the rule.
    pub fn permits(&self, on: usize) -> bool {
        match self {
            SwitchRule::OneOfMany => on == 1,
            SwitchRule::AtMostOne => on <= 1,
            SwitchRule::AnyOfMany => true,
        }
    }
}

impl Display for SwitchRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SwitchRule::OneOfMany => "OneOfMany",
            SwitchRule::AtMostOne => "AtMostOne",
            SwitchRule::AnyOfMany => "AnyOfMany",
        })
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum SwitchState {
    On,
    #[default]
    Off,
}

impl SwitchState {
    pub fn parse(value: &str) -> SwitchState {
        if value.trim().eq_ignore_ascii_case("on") {
            SwitchState::On
        } else {
            SwitchState::Off
        }
    }

    pub fn is_on(&self) -> bool {
        *self == SwitchState::On
    }
}

impl Display for SwitchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SwitchState::On => "On",
            SwitchState::Off => "Off",
        })
    }
}

/// Whether the server should send BLOBs on the connection.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum BlobEnable {
    #[default]
    Never,
    Also,
    Only,
}

impl Display for BlobEnable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BlobEnable::Never => "Never",
            BlobEnable::Also => "Also",
            BlobEnable::Only => "Only",
        })
    }
}

/// The kind of a property vector and of all its members.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum PropertyKind {
    Text,
    Number,
    Switch,
    Light,
    Blob,
}

impl PropertyKind {
    /// The kind part of a tag name such as `defNumberVector` or `oneSwitch`.
    pub fn from_tag_part(part: &str) -> Option<PropertyKind> {
        match part {
            "Text" => Some(PropertyKind::Text),
            "Number" => Some(PropertyKind::Number),
            "Switch" => Some(PropertyKind::Switch),
            "Light" => Some(PropertyKind::Light),
            "BLOB" => Some(PropertyKind::Blob),
            _ => None,
        }
    }

    pub fn tag_part(&self) -> &'static str {
        match self {
            PropertyKind::Text => "Text",
            PropertyKind::Number => "Number",
            PropertyKind::Switch => "Switch",
            PropertyKind::Light => "Light",
            PropertyKind::Blob => "BLOB",
        }
    }
}

impl Display for PropertyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag_part())
    }
}

/// A BLOB as announced by the server. The payload is kept in its transfer encoding.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Blob {
    pub format: String,
    pub size: usize,
    pub payload: String,
}

/// The value of one member property.
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    Text(String),
    Number(f64),
    Switch(SwitchState),
    Light(PropertyState),
    Blob(Blob),
}

impl PropertyValue {
    pub fn kind(&self) -> PropertyKind {
        match self {
            PropertyValue::Text(_) => PropertyKind::Text,
            PropertyValue::Number(_) => PropertyKind::Number,
            PropertyValue::Switch(_) => PropertyKind::Switch,
            PropertyValue::Light(_) => PropertyKind::Light,
            PropertyValue::Blob(_) => PropertyKind::Blob,
        }
    }

    /// The empty value a freshly defined member of `kind` starts out with.
    pub fn empty(kind: PropertyKind) -> PropertyValue {
        match kind {
            PropertyKind::Text => PropertyValue::Text(String::new()),
            PropertyKind::Number => PropertyValue::Number(0.0),
            PropertyKind::Switch => PropertyValue::Switch(SwitchState::Off),
            PropertyKind::Light => PropertyValue::Light(PropertyState::Idle),
            PropertyKind::Blob => PropertyValue::Blob(Blob::default()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(number) => Some(*number),
            _ => None,
        }
    }

    pub fn as_switch(&self) -> Option<SwitchState> {
        match self {
            PropertyValue::Switch(state) => Some(*state),
            _ => None,
        }
    }
}

impl Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyValue::Text(text) => f.write_str(text),
            PropertyValue::Number(number) => write!(f, "{}", number),
            PropertyValue::Switch(state) => write!(f, "{}", state),
            PropertyValue::Light(state) => write!(f, "{}", state),
            PropertyValue::Blob(blob) => write!(f, "[{} bytes {}]", blob.size, blob.format),
        }
    }
}

/// Bounds and display format of a number member.
#[derive(Clone, Debug, PartialEq)]
pub struct NumberLimits {
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub format: String,
}

/// Parses a number as INDI sends it: plain decimal or sexagesimal
/// (`12:30:00`, `-5 30 0`, `7:15`).
pub fn parse_number(text: &str) -> Option<f64> {
    let text = text.trim();
    if let Ok(value) = text.parse::<f64>() {
        return Some(value);
    }
    let negative = text.starts_with('-');
    let mut value = 0.0;
    let mut scale = 1.0;
    let mut parts = 0;
    for part in text
        .trim_start_matches(['-', '+'])
        .split([':', ' ', ';'])
        .filter(|part| !part.is_empty())
    {
        value += part.parse::<f64>().ok()?.abs() / scale;
        scale *= 60.0;
        parts += 1;
    }
    if !(2..=3).contains(&parts) {
        return None;
    }
    Some(if negative { -value } else { value })
}

/// Parses an INDI timestamp (`yyyy-MM-ddTHH:mm:ss`, UTC, optional fraction).
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim().trim_end_matches('Z');
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .map(|naive| naive.and_utc())
}

pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%dT%H:%M:%S").to_string()
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn state_is_case_insensitive() {
        assert_eq!(PropertyState::parse("OK"), PropertyState::Ok);
        assert_eq!(PropertyState::parse("busy"), PropertyState::Busy);
        assert_eq!(PropertyState::parse("Alert"), PropertyState::Alert);
        assert_eq!(PropertyState::parse("bogus"), PropertyState::Idle);
    }

    #[test]
    fn permissions() {
        assert_eq!(Permission::parse(Some("rw")), Permission::READ_WRITE);
        assert_eq!(Permission::parse(Some("ro")), Permission::READ_ONLY);
        assert_eq!(
            Permission::parse(Some("wo")),
            Permission {
                read: false,
                write: true
            }
        );
        assert_eq!(Permission::parse(None), Permission::default());
        assert_eq!(Permission::parse(Some("xx")), Permission::default());
    }

    #[test]
    fn switch_rules() {
        assert_eq!(SwitchRule::parse(Some("AtMostOne")), SwitchRule::AtMostOne);
        assert_eq!(SwitchRule::parse(None), SwitchRule::OneOfMany);
        assert!(!SwitchRule::OneOfMany.permits(0));
        assert!(SwitchRule::OneOfMany.permits(1));
        assert!(!SwitchRule::OneOfMany.permits(2));
        assert!(SwitchRule::AtMostOne.permits(0));
        assert!(!SwitchRule::AtMostOne.permits(2));
        assert!(SwitchRule::AnyOfMany.permits(3));
    }

    #[test]
    fn numbers() {
        assert_eq!(parse_number(" 12.5 "), Some(12.5));
        assert_eq!(parse_number("12:30:00"), Some(12.5));
        assert_eq!(parse_number("-5 30 0"), Some(-5.5));
        assert_eq!(parse_number("7:15"), Some(7.25));
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number(""), None);
    }

    #[test]
    fn timestamps() {
        let ts = parse_timestamp("2024-03-10T21:15:02").unwrap();
        assert_eq!((ts.year(), ts.month(), ts.day()), (2024, 3, 10));
        assert_eq!((ts.hour(), ts.minute(), ts.second()), (21, 15, 2));
        assert!(parse_timestamp("2024-03-10T21:15:02.250").is_some());
        assert!(parse_timestamp("2024-03-10T21:15:02Z").is_some());
        assert!(parse_timestamp("yesterday").is_none());
        assert_eq!(format_timestamp(&ts), "2024-03-10T21:15:02");
    }
}
