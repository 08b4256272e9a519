//! Typed view of the elements a server sends.
use chrono::{DateTime, Utc};

use crate::{
    error::DecodeError,
    protocol::{
        Blob, NumberLimits, Permission, PropertyKind, PropertyState, PropertyValue, SwitchRule,
        SwitchState, parse_number, parse_timestamp,
    },
    xml::Element,
};

/// A decoded value together with the problems that were skipped over while decoding it.
#[derive(Clone, Debug, PartialEq)]
pub struct Decoded<T> {
    pub message: T,
    pub warnings: Vec<DecodeError>,
}

/// Attributes shared by every `def*Vector`.
#[derive(Clone, Debug, PartialEq)]
pub struct VectorAttributes {
    pub device: String,
    pub name: String,
    pub label: Option<String>,
    pub group: Option<String>,
    pub state: PropertyState,
    pub permission: Permission,
    /// Worst-case time in seconds until a change takes effect.
    pub timeout: u32,
    pub timestamp: DateTime<Utc>,
    pub message: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MemberDefinition {
    pub name: String,
    pub label: Option<String>,
    pub value: PropertyValue,
    /// Present for number members only.
    pub limits: Option<NumberLimits>,
}

/// `def<Kind>Vector`
#[derive(Clone, Debug, PartialEq)]
pub struct DefVector {
    pub kind: PropertyKind,
    pub attributes: VectorAttributes,
    /// Present for switch vectors only.
    pub rule: Option<SwitchRule>,
    pub members: Vec<MemberDefinition>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MemberUpdate {
    pub name: String,
    pub value: PropertyValue,
}

/// `set<Kind>Vector`. A missing state reads as `Idle`, a missing timeout as 0.
#[derive(Clone, Debug, PartialEq)]
pub struct SetVector {
    pub kind: PropertyKind,
    pub device: String,
    pub name: String,
    pub state: PropertyState,
    pub timeout: u32,
    pub timestamp: DateTime<Utc>,
    pub message: Option<String>,
    pub members: Vec<MemberUpdate>,
}

/// `delProperty`: without a name the whole device is meant.
#[derive(Clone, Debug, PartialEq)]
pub struct DelProperty {
    pub device: String,
    pub name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub message: Option<String>,
}

/// The free-standing `message` element.
#[derive(Clone, Debug, PartialEq)]
pub struct Notice {
    pub device: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub message: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Define(DefVector),
    Set(SetVector),
    Delete(DelProperty),
    Notice(Notice),
    /// Any other tag. Kept so callers can log it; otherwise ignored.
    Unknown(String),
}

impl Message {
    /// Classifies a top-level element and decodes it.
    ///
    /// Fails only when the whole element has to be dropped, e.g. because it does not name
    /// a device. Problems with individual members end up in [`Decoded::warnings`].
    pub fn from_element(element: &Element) -> Result<Decoded<Message>, DecodeError> {
        let tag = element.name();
        let mut warnings = Vec::new();

        let message = if let Some(kind) = vector_kind(tag, "def") {
            Message::Define(decode_definition(element, kind, &mut warnings)?)
        } else if let Some(kind) = vector_kind(tag, "set") {
            Message::Set(decode_set(element, kind, &mut warnings)?)
        } else if tag == "delProperty" {
            let device = required(element, "device")?.to_string();
            let name = element.attr("name").map(str::to_string);
            let timestamp = timestamp(element, &device, name.as_deref().unwrap_or(""), &mut warnings);
            Message::Delete(DelProperty {
                device,
                name,
                timestamp,
                message: optional(element, "message"),
            })
        } else if tag == "message" {
            let device = optional(element, "device");
            let timestamp = timestamp(element, device.as_deref().unwrap_or(""), "", &mut warnings);
            Message::Notice(Notice {
                device,
                timestamp,
                message: optional(element, "message"),
            })
        } else {
            Message::Unknown(tag.to_string())
        };

        Ok(Decoded { message, warnings })
    }
}

/// `def` + `Number` + `Vector` => `Number`
fn vector_kind(tag: &str, verb: &str) -> Option<PropertyKind> {
    tag.strip_prefix(verb)?
        .strip_suffix("Vector")
        .and_then(PropertyKind::from_tag_part)
}

fn required<'a>(element: &'a Element, attribute: &'static str) -> Result<&'a str, DecodeError> {
    element
        .attr(attribute)
        .ok_or_else(|| DecodeError::MissingAttribute {
            element: element.name().to_string(),
            attribute,
        })
}

fn optional(element: &Element, attribute: &str) -> Option<String> {
    element.attr(attribute).map(str::to_string)
}

fn parse_timeout(value: &str) -> u32 {
    value.trim().parse().unwrap_or(0)
}

fn timestamp(
    element: &Element,
    device: &str,
    vector: &str,
    warnings: &mut Vec<DecodeError>,
) -> DateTime<Utc> {
    match element.attr("timestamp") {
        None => Utc::now(),
        Some(value) => parse_timestamp(value).unwrap_or_else(|| {
            warnings.push(DecodeError::InvalidTimestamp {
                device: device.to_string(),
                vector: vector.to_string(),
                value: value.to_string(),
            });
            Utc::now()
        }),
    }
}

fn decode_definition(
    element: &Element,
    kind: PropertyKind,
    warnings: &mut Vec<DecodeError>,
) -> Result<DefVector, DecodeError> {
    let device = required(element, "device")?.to_string();
    let name = required(element, "name")?.to_string();
    let permission = match kind {
        PropertyKind::Light => Permission::READ_ONLY,
        _ => Permission::parse(element.attr("perm")),
    };
    let attributes = VectorAttributes {
        timestamp: timestamp(element, &device, &name, warnings),
        label: optional(element, "label"),
        group: optional(element, "group"),
        state: element
            .attr("state")
            .map(PropertyState::parse)
            .unwrap_or_default(),
        permission,
        timeout: element.attr("timeout").map(parse_timeout).unwrap_or(0),
        message: optional(element, "message"),
        device,
        name,
    };
    let rule = (kind == PropertyKind::Switch).then(|| SwitchRule::parse(element.attr("rule")));

    let member_tag = format!("def{}", kind.tag_part());
    let mut members = Vec::new();
    for child in element.child_elements().filter(|c| c.name() == member_tag) {
        let Some(member_name) = child.attr("name") else {
            warnings.push(DecodeError::MissingAttribute {
                element: member_tag.clone(),
                attribute: "name",
            });
            continue;
        };
        let text = child.text();
        let mut limits = None;
        let value = match kind {
            PropertyKind::Text => PropertyValue::Text(text),
            PropertyKind::Switch => PropertyValue::Switch(SwitchState::parse(&text)),
            PropertyKind::Light => PropertyValue::Light(PropertyState::parse(&text)),
            PropertyKind::Blob => PropertyValue::Blob(Blob {
                format: child.attr("format").unwrap_or_default().to_string(),
                ..Blob::default()
            }),
            PropertyKind::Number => {
                match number_limits(child) {
                    Ok(parsed) => limits = Some(parsed),
                    Err(attribute) => {
                        warnings.push(DecodeError::InvalidLimit {
                            device: attributes.device.clone(),
                            vector: attributes.name.clone(),
                            property: member_name.to_string(),
                            attribute,
                        });
                        continue;
                    }
                }
                if text.is_empty() {
                    PropertyValue::Number(0.0)
                } else if let Some(number) = parse_number(&text) {
                    PropertyValue::Number(number)
                } else {
                    warnings.push(DecodeError::InvalidNumber {
                        device: attributes.device.clone(),
                        vector: attributes.name.clone(),
                        property: member_name.to_string(),
                        value: text,
                    });
                    PropertyValue::Number(0.0)
                }
            }
        };
        members.push(MemberDefinition {
            name: member_name.to_string(),
            label: optional(child, "label"),
            value,
            limits,
        });
    }

    Ok(DefVector {
        kind,
        attributes,
        rule,
        members,
    })
}

/// Fails with the name of the first missing or malformed bound.
fn number_limits(element: &Element) -> Result<NumberLimits, &'static str> {
    let bound = |attribute: &'static str| {
        element
            .attr(attribute)
            .and_then(parse_number)
            .ok_or(attribute)
    };
    Ok(NumberLimits {
        min: bound("min")?,
        max: bound("max")?,
        step: bound("step")?,
        format: element.attr("format").unwrap_or("%g").to_string(),
    })
}

fn decode_set(
    element: &Element,
    kind: PropertyKind,
    warnings: &mut Vec<DecodeError>,
) -> Result<SetVector, DecodeError> {
    let device = required(element, "device")?.to_string();
    let name = required(element, "name")?.to_string();

    let member_tag = format!("one{}", kind.tag_part());
    let mut members = Vec::new();
    for child in element.child_elements().filter(|c| c.name() == member_tag) {
        let Some(member_name) = child.attr("name") else {
            warnings.push(DecodeError::MissingAttribute {
                element: member_tag.clone(),
                attribute: "name",
            });
            continue;
        };
        let text = child.text();
        let value = match kind {
            PropertyKind::Text => PropertyValue::Text(text),
            PropertyKind::Switch => PropertyValue::Switch(SwitchState::parse(&text)),
            PropertyKind::Light => PropertyValue::Light(PropertyState::parse(&text)),
            PropertyKind::Blob => PropertyValue::Blob(Blob {
                format: child.attr("format").unwrap_or_default().to_string(),
                size: child
                    .attr("size")
                    .and_then(|size| size.trim().parse().ok())
                    .unwrap_or(0),
                payload: text,
            }),
            PropertyKind::Number => match parse_number(&text) {
                Some(number) => PropertyValue::Number(number),
                None => {
                    warnings.push(DecodeError::InvalidNumber {
                        device: device.clone(),
                        vector: name.clone(),
                        property: member_name.to_string(),
                        value: text,
                    });
                    continue;
                }
            },
        };
        members.push(MemberUpdate {
            name: member_name.to_string(),
            value,
        });
    }

    Ok(SetVector {
        kind,
        state: element
            .attr("state")
            .map(PropertyState::parse)
            .unwrap_or_default(),
        timeout: element.attr("timeout").map(parse_timeout).unwrap_or(0),
        timestamp: timestamp(element, &device, &name, warnings),
        message: optional(element, "message"),
        device,
        name,
        members,
    })
}
