//! The in-memory picture of everything a server has defined.
//!
//! Devices, vectors and properties live in arenas keyed by string identifiers. Nothing holds
//! a reference to its parent; going up the tree is a lookup by id.
use std::fmt::Display;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use indi_protocol::{
    NumberLimits, Permission, PropertyKind, PropertyState, PropertyValue, SwitchRule,
    message::DefVector,
};

/// Group of vectors that do not name one.
pub const OTHER_GROUP: &str = "Other";

/// Name of a device; unique per server.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(name: impl Into<String>) -> DeviceId {
        DeviceId(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn vector(&self, name: impl Into<String>) -> VectorId {
        VectorId::new(self.0.clone(), name)
    }
}

impl Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// `device/vector`
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct VectorId {
    device: String,
    name: String,
}

impl VectorId {
    pub fn new(device: impl Into<String>, name: impl Into<String>) -> VectorId {
        VectorId {
            device: device.into(),
            name: name.into(),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device_id(&self) -> DeviceId {
        DeviceId::new(self.device.clone())
    }

    pub fn property(&self, name: impl Into<String>) -> PropertyId {
        PropertyId {
            device: self.device.clone(),
            vector: self.name.clone(),
            name: name.into(),
        }
    }
}

impl Display for VectorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.device, self.name)
    }
}

/// `device/vector/property`
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct PropertyId {
    device: String,
    vector: String,
    name: String,
}

impl PropertyId {
    pub fn new(
        device: impl Into<String>,
        vector: impl Into<String>,
        name: impl Into<String>,
    ) -> PropertyId {
        PropertyId {
            device: device.into(),
            vector: vector.into(),
            name: name.into(),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn vector(&self) -> &str {
        &self.vector
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vector_id(&self) -> VectorId {
        VectorId::new(self.device.clone(), self.vector.clone())
    }
}

impl Display for PropertyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.device, self.vector, self.name)
    }
}

/// Device classes a driver announces through `DRIVER_INFO.DRIVER_INTERFACE`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DeviceInterface {
    General,
    Telescope,
    Ccd,
    Guider,
    Focuser,
    Filter,
    Dome,
    Gps,
    Weather,
    AdaptiveOptics,
    Dustcap,
    LightBox,
    Detector,
    Rotator,
    Spectrograph,
    Correlator,
    Auxiliary,
}

impl DeviceInterface {
    const FLAGS: [(DeviceInterface, u32); 16] = [
        (DeviceInterface::Telescope, 1 << 0),
        (DeviceInterface::Ccd, 1 << 1),
        (DeviceInterface::Guider, 1 << 2),
        (DeviceInterface::Focuser, 1 << 3),
        (DeviceInterface::Filter, 1 << 4),
        (DeviceInterface::Dome, 1 << 5),
        (DeviceInterface::Gps, 1 << 6),
        (DeviceInterface::Weather, 1 << 7),
        (DeviceInterface::AdaptiveOptics, 1 << 8),
        (DeviceInterface::Dustcap, 1 << 9),
        (DeviceInterface::LightBox, 1 << 10),
        (DeviceInterface::Detector, 1 << 11),
        (DeviceInterface::Rotator, 1 << 12),
        (DeviceInterface::Spectrograph, 1 << 13),
        (DeviceInterface::Correlator, 1 << 14),
        (DeviceInterface::Auxiliary, 1 << 15),
    ];

    /// Decodes the interface bitmask. A mask of zero is a general device.
    pub fn from_mask(mask: u32) -> Vec<DeviceInterface> {
        if mask == 0 {
            return vec![DeviceInterface::General];
        }
        Self::FLAGS
            .iter()
            .filter(|(_, bit)| mask & bit != 0)
            .map(|(interface, _)| *interface)
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Device {
    id: DeviceId,
    defined_at: DateTime<Utc>,
}

impl Device {
    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    pub fn name(&self) -> &str {
        self.id.name()
    }

    /// Interfaces the driver announced, see [`Model::device_interfaces`].
    pub fn interfaces(&self, model: &Model) -> Vec<DeviceInterface> {
        model.device_interfaces(&self.id)
    }

    /// When the first definition of this device arrived.
    pub fn defined_at(&self) -> DateTime<Utc> {
        self.defined_at
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Property {
    id: PropertyId,
    label: Option<String>,
    value: PropertyValue,
    limits: Option<NumberLimits>,
}

impl Property {
    pub fn new(id: PropertyId, label: Option<String>, value: PropertyValue) -> Property {
        Property {
            id,
            label,
            value,
            limits: None,
        }
    }

    pub fn with_limits(mut self, limits: NumberLimits) -> Property {
        self.limits = Some(limits);
        self
    }

    pub fn id(&self) -> &PropertyId {
        &self.id
    }

    pub fn name(&self) -> &str {
        self.id.name()
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn ui_label(&self) -> &str {
        self.label().unwrap_or(self.name())
    }

    pub fn value(&self) -> &PropertyValue {
        &self.value
    }

    /// Bounds and format of number members.
    pub fn limits(&self) -> Option<&NumberLimits> {
        self.limits.as_ref()
    }

    pub fn is_on(&self) -> bool {
        self.value.as_switch().is_some_and(|state| state.is_on())
    }
}

/// A typed, named group of properties belonging to a device.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyVector {
    id: VectorId,
    kind: PropertyKind,
    label: Option<String>,
    group: Option<String>,
    permission: Permission,
    rule: Option<SwitchRule>,
    state: PropertyState,
    timeout: u32,
    timestamp: DateTime<Utc>,
    message: Option<String>,
    members: IndexMap<String, Property>,
}

impl PropertyVector {
    pub fn new(id: VectorId, kind: PropertyKind) -> PropertyVector {
        PropertyVector {
            id,
            kind,
            label: None,
            group: None,
            permission: match kind {
                PropertyKind::Light => Permission::READ_ONLY,
                _ => Permission::default(),
            },
            rule: (kind == PropertyKind::Switch).then_some(SwitchRule::default()),
            state: PropertyState::Idle,
            timeout: 0,
            timestamp: Utc::now(),
            message: None,
            members: IndexMap::new(),
        }
    }

    /// Builds a vector with its members from a `def*Vector`.
    pub fn from_definition(def: DefVector) -> PropertyVector {
        let attributes = def.attributes;
        let id = VectorId::new(attributes.device, attributes.name);
        let mut vector = PropertyVector {
            label: attributes.label,
            group: attributes.group,
            permission: attributes.permission,
            rule: def.rule,
            state: attributes.state,
            timeout: attributes.timeout,
            timestamp: attributes.timestamp,
            message: attributes.message,
            ..PropertyVector::new(id, def.kind)
        };
        for member in def.members {
            let mut property = Property::new(vector.id.property(member.name), member.label, member.value);
            property.limits = member.limits;
            vector.insert_member(property);
        }
        vector
    }

    /// Adds a member unless one with the same name exists. Returns whether it was added.
    pub fn insert_member(&mut self, property: Property) -> bool {
        if self.members.contains_key(property.name()) {
            return false;
        }
        self.members.insert(property.name().to_string(), property);
        true
    }

    pub fn id(&self) -> &VectorId {
        &self.id
    }

    pub fn device(&self) -> &str {
        self.id.device()
    }

    pub fn name(&self) -> &str {
        self.id.name()
    }

    pub fn kind(&self) -> PropertyKind {
        self.kind
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn ui_label(&self) -> &str {
        self.label().unwrap_or(self.name())
    }

    /// The group attribute, or [`OTHER_GROUP`].
    pub fn group(&self) -> &str {
        self.group.as_deref().unwrap_or(OTHER_GROUP)
    }

    pub fn permission(&self) -> Permission {
        self.permission
    }

    pub fn can_read(&self) -> bool {
        self.permission.read
    }

    pub fn can_write(&self) -> bool {
        self.permission.write
    }

    pub fn rule(&self) -> Option<SwitchRule> {
        self.rule
    }

    pub fn state(&self) -> PropertyState {
        self.state
    }

    pub fn timeout(&self) -> u32 {
        self.timeout
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn members(&self) -> impl Iterator<Item = &Property> {
        self.members.values()
    }

    pub fn member(&self, name: &str) -> Option<&Property> {
        self.members.get(name)
    }

    /// Switch members that are currently on.
    pub fn on_members(&self) -> Vec<&Property> {
        self.members().filter(|member| member.is_on()).collect()
    }

    /// Whether the number of switches that are on satisfies the switch rule.
    /// Vectors of other kinds are always valid.
    pub fn in_valid_state(&self) -> bool {
        match self.rule {
            Some(rule) => rule.permits(self.on_members().len()),
            None => true,
        }
    }
}

/// Mutable attributes carried by `set*Vector`. `None` keeps the current value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VectorUpdate {
    pub state: Option<PropertyState>,
    pub timeout: Option<u32>,
    pub timestamp: Option<DateTime<Utc>>,
    pub message: Option<Option<String>>,
}

#[derive(Debug, Default)]
pub struct Model {
    devices: IndexMap<DeviceId, Device>,
    vectors: IndexMap<VectorId, PropertyVector>,
}

impl Model {
    pub fn new() -> Model {
        Model::default()
    }

    /// Creates the device unless it exists. Returns `true` if the device was new.
    pub fn upsert_device(&mut self, name: &str) -> bool {
        let id = DeviceId::new(name);
        if self.devices.contains_key(&id) {
            return false;
        }
        self.devices.insert(
            id.clone(),
            Device {
                id,
                defined_at: Utc::now(),
            },
        );
        true
    }

    /// Inserts a vector, or merges the mutable attributes of an existing one with the same id.
    /// Returns `true` if the vector was new.
    ///
    /// Merging leaves label, group, permissions and members alone.
    pub fn upsert_vector(&mut self, vector: PropertyVector) -> bool {
        self.upsert_device(vector.device());
        match self.vectors.get_mut(vector.id()) {
            Some(existing) => {
                existing.state = vector.state;
                existing.timestamp = vector.timestamp;
                existing.message = vector.message;
                existing.timeout = vector.timeout;
                false
            }
            None => {
                self.vectors.insert(vector.id.clone(), vector);
                true
            }
        }
    }

    /// Adds a member to an existing vector. Returns `true` if it was added.
    pub fn define_member(&mut self, property: Property) -> bool {
        self.vectors
            .get_mut(&property.id.vector_id())
            .is_some_and(|vector| vector.insert_member(property))
    }

    /// Applies the mutable attributes of a vector. Returns `false` for unknown vectors.
    pub fn update_vector(&mut self, id: &VectorId, update: VectorUpdate) -> bool {
        let Some(vector) = self.vectors.get_mut(id) else {
            return false;
        };
        if let Some(state) = update.state {
            vector.state = state;
        }
        if let Some(timeout) = update.timeout {
            vector.timeout = timeout;
        }
        if let Some(timestamp) = update.timestamp {
            vector.timestamp = timestamp;
        }
        if let Some(message) = update.message {
            vector.message = message;
        }
        true
    }

    /// Replaces the value of a member and returns the previous one.
    pub fn set_value(&mut self, id: &PropertyId, value: PropertyValue) -> Option<PropertyValue> {
        let property = self
            .vectors
            .get_mut(&id.vector_id())?
            .members
            .get_mut(id.name())?;
        Some(std::mem::replace(&mut property.value, value))
    }

    /// Removes a vector with all its members.
    pub fn remove_vector(&mut self, id: &VectorId) -> Option<PropertyVector> {
        self.vectors.shift_remove(id)
    }

    /// Removes a device and returns it with the vectors it owned.
    pub fn remove_device(&mut self, id: &DeviceId) -> Option<(Device, Vec<PropertyVector>)> {
        let device = self.devices.shift_remove(id)?;
        let ids: Vec<VectorId> = self
            .vectors
            .keys()
            .filter(|vector| vector.device() == id.name())
            .cloned()
            .collect();
        let vectors = ids
            .iter()
            .filter_map(|vector| self.vectors.shift_remove(vector))
            .collect();
        Some((device, vectors))
    }

    pub fn lookup_device(&self, name: &str) -> Option<&Device> {
        self.devices.get(&DeviceId::new(name))
    }

    pub fn lookup_vector(&self, id: &VectorId) -> Option<&PropertyVector> {
        self.vectors.get(id)
    }

    pub fn lookup_property(&self, id: &PropertyId) -> Option<&Property> {
        self.vectors.get(&id.vector_id())?.member(id.name())
    }

    /// All devices in the order they were defined.
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    /// Vectors of a device in the order they were defined.
    pub fn vectors<'a>(
        &'a self,
        device: &DeviceId,
    ) -> impl Iterator<Item = &'a PropertyVector> + use<'a> {
        let device = device.name().to_string();
        self.vectors
            .values()
            .filter(move |vector| vector.device() == device)
    }

    /// Distinct groups of a device's vectors, in order of first appearance.
    pub fn groups(&self, device: &DeviceId) -> Vec<&str> {
        let mut groups: Vec<&str> = Vec::new();
        for vector in self.vectors(device) {
            if !groups.contains(&vector.group()) {
                groups.push(vector.group());
            }
        }
        groups
    }

    pub fn vectors_in_group<'a>(
        &'a self,
        device: &DeviceId,
        group: &str,
    ) -> impl Iterator<Item = &'a PropertyVector> + use<'a> {
        let group = group.to_string();
        self.vectors(device)
            .filter(move |vector| vector.group() == group)
    }

    /// Interfaces announced in `DRIVER_INFO.DRIVER_INTERFACE`. Empty until the driver defined it.
    pub fn device_interfaces(&self, device: &DeviceId) -> Vec<DeviceInterface> {
        let id = device.vector("DRIVER_INFO").property("DRIVER_INTERFACE");
        let mask = self.lookup_property(&id).and_then(|property| match property.value() {
            PropertyValue::Text(text) => text.trim().parse::<u32>().ok(),
            PropertyValue::Number(number) => Some(*number as u32),
            _ => None,
        });
        mask.map(DeviceInterface::from_mask).unwrap_or_default()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use indi_protocol::SwitchState;

    fn switch_vector(rule: SwitchRule, on: &[bool]) -> PropertyVector {
        let mut vector = PropertyVector::new(VectorId::new("Mount", "SLEW_RATE"), PropertyKind::Switch);
        vector.rule = Some(rule);
        for (index, on) in on.iter().enumerate() {
            let state = if *on { SwitchState::On } else { SwitchState::Off };
            vector.insert_member(Property::new(
                vector.id.property(format!("RATE_{index}")),
                None,
                PropertyValue::Switch(state),
            ));
        }
        vector
    }

    fn text_vector(device: &str, name: &str, group: Option<&str>) -> PropertyVector {
        let mut vector = PropertyVector::new(VectorId::new(device, name), PropertyKind::Text);
        vector.group = group.map(str::to_string);
        vector
    }

    #[test]
    fn ids_render_as_paths() {
        let id = VectorId::new("CCD Simulator", "CCD_EXPOSURE");
        assert_eq!(id.to_string(), "CCD Simulator/CCD_EXPOSURE");
        let property = id.property("CCD_EXPOSURE_VALUE");
        assert_eq!(property.to_string(), "CCD Simulator/CCD_EXPOSURE/CCD_EXPOSURE_VALUE");
        assert_eq!(property.vector_id(), id);
        assert_eq!(id.device_id(), DeviceId::new("CCD Simulator"));
    }

    #[test]
    fn upsert_is_idempotent() {
        let mut model = Model::new();
        assert!(model.upsert_device("Mount"));
        assert!(!model.upsert_device("Mount"));
        assert!(model.upsert_vector(text_vector("Mount", "INFO", None)));
        assert!(!model.upsert_vector(text_vector("Mount", "INFO", None)));
        assert_eq!(model.devices().count(), 1);
        assert_eq!(model.vectors(&DeviceId::new("Mount")).count(), 1);
    }

    #[test]
    fn upsert_merges_only_mutable_fields() {
        let mut model = Model::new();
        let mut original = text_vector("Mount", "INFO", Some("Main"));
        original.permission = Permission::READ_ONLY;
        model.upsert_vector(original);

        let mut redefined = text_vector("Mount", "INFO", Some("Elsewhere"));
        redefined.permission = Permission::READ_WRITE;
        redefined.state = PropertyState::Alert;
        redefined.timeout = 30;
        redefined.message = Some("again".into());
        assert!(!model.upsert_vector(redefined));

        let vector = model.lookup_vector(&VectorId::new("Mount", "INFO")).unwrap();
        assert_eq!(vector.group(), "Main");
        assert_eq!(vector.permission(), Permission::READ_ONLY);
        assert_eq!(vector.state(), PropertyState::Alert);
        assert_eq!(vector.timeout(), 30);
        assert_eq!(vector.message(), Some("again"));
    }

    #[test]
    fn groups_are_derived() {
        let mut model = Model::new();
        model.upsert_vector(text_vector("Mount", "A", Some("Main")));
        model.upsert_vector(text_vector("Mount", "B", None));
        model.upsert_vector(text_vector("Mount", "C", Some("Main")));
        model.upsert_vector(text_vector("Focuser", "D", Some("Motion")));
        model.upsert_vector(text_vector("Mount", "A", Some("Main")));

        let mount = DeviceId::new("Mount");
        assert_eq!(model.groups(&mount), vec!["Main", OTHER_GROUP]);
        let main: Vec<_> = model.vectors_in_group(&mount, "Main").map(|v| v.name()).collect();
        assert_eq!(main, vec!["A", "C"]);
        let other: Vec<_> = model.vectors_in_group(&mount, OTHER_GROUP).map(|v| v.name()).collect();
        assert_eq!(other, vec!["B"]);

        model.remove_vector(&VectorId::new("Mount", "B"));
        assert_eq!(model.groups(&mount), vec!["Main"]);
    }

    #[test]
    fn lookups_report_absence() {
        let model = Model::new();
        assert!(model.lookup_device("Nope").is_none());
        assert!(model.lookup_vector(&VectorId::new("Nope", "V")).is_none());
        assert!(model.lookup_property(&PropertyId::new("Nope", "V", "P")).is_none());
    }

    #[test]
    fn switch_rule_validity() {
        assert!(!switch_vector(SwitchRule::OneOfMany, &[false, false, false]).in_valid_state());
        assert!(switch_vector(SwitchRule::OneOfMany, &[false, true, false]).in_valid_state());
        assert!(!switch_vector(SwitchRule::OneOfMany, &[true, true, false]).in_valid_state());
        assert!(switch_vector(SwitchRule::AtMostOne, &[false, false, false]).in_valid_state());
        assert!(!switch_vector(SwitchRule::AtMostOne, &[true, true, false]).in_valid_state());
        assert!(switch_vector(SwitchRule::AnyOfMany, &[true, true, true]).in_valid_state());
        assert!(text_vector("D", "T", None).in_valid_state());
    }

    #[test]
    fn set_value_returns_previous() {
        let mut model = Model::new();
        model.upsert_vector(switch_vector(SwitchRule::OneOfMany, &[true, false]));
        let id = PropertyId::new("Mount", "SLEW_RATE", "RATE_1");
        assert_eq!(
            model.set_value(&id, PropertyValue::Switch(SwitchState::On)),
            Some(PropertyValue::Switch(SwitchState::Off))
        );
        assert!(model.lookup_property(&id).unwrap().is_on());
        assert_eq!(
            model.set_value(&PropertyId::new("Mount", "SLEW_RATE", "RATE_9"), PropertyValue::Switch(SwitchState::On)),
            None
        );
    }

    #[test]
    fn removing_a_device_removes_its_vectors() {
        let mut model = Model::new();
        model.upsert_vector(text_vector("Mount", "A", None));
        model.upsert_vector(text_vector("Mount", "B", None));
        model.upsert_vector(text_vector("Focuser", "C", None));

        let (device, vectors) = model.remove_device(&DeviceId::new("Mount")).unwrap();
        assert_eq!(device.name(), "Mount");
        assert_eq!(vectors.len(), 2);
        assert!(model.lookup_device("Mount").is_none());
        assert!(model.lookup_vector(&VectorId::new("Mount", "A")).is_none());
        assert!(model.lookup_vector(&VectorId::new("Focuser", "C")).is_some());
    }

    #[test]
    fn interfaces_from_driver_info() {
        let mut model = Model::new();
        let mount = DeviceId::new("Mount");
        assert!(model.device_interfaces(&mount).is_empty());

        let mut info = text_vector("Mount", "DRIVER_INFO", None);
        info.insert_member(Property::new(
            info.id.property("DRIVER_INTERFACE"),
            None,
            PropertyValue::Text("5".into()),
        ));
        model.upsert_vector(info);
        assert_eq!(
            model.device_interfaces(&mount),
            vec![DeviceInterface::Telescope, DeviceInterface::Guider]
        );
        assert_eq!(DeviceInterface::from_mask(0), vec![DeviceInterface::General]);
    }
}
