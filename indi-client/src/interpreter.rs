//! Applies decoded INDI messages to the [`Model`] and tells the observer what changed.
use indi_protocol::{
    Element, Message, PropertyValue,
    error::DecodeError,
    message::{DefVector, DelProperty, Notice, SetVector},
};

use crate::{
    event::{Event, Observer},
    model::{DeviceId, Model, PropertyId, PropertyVector, VectorId, VectorUpdate},
};

/// Interprets one complete top-level element.
///
/// Decode problems are reported to the observer as [`Event::Error`]. A problem with a single
/// member does not keep the other members of the same message from being applied.
pub fn interpret(model: &mut Model, element: &Element, observer: &mut dyn Observer) {
    let decoded = match Message::from_element(element) {
        Ok(decoded) => decoded,
        Err(err) => {
            report(err, observer);
            return;
        }
    };
    for warning in decoded.warnings {
        report(warning, observer);
    }

    let result = match decoded.message {
        Message::Define(def) => {
            define(model, def, observer);
            Ok(())
        }
        Message::Set(set) => update(model, set, observer),
        Message::Delete(del) => delete(model, del, observer),
        Message::Notice(notice) => {
            notify(notice, observer);
            Ok(())
        }
        Message::Unknown(tag) => {
            log::debug!("Ignoring <{}>", tag);
            Ok(())
        }
    };
    if let Err(err) = result {
        report(err, observer);
    }
}

fn report(err: DecodeError, observer: &mut dyn Observer) {
    log::warn!("{}", err);
    observer.on_event(&Event::error(err));
}

fn server_message(device: &str, message: Option<String>, observer: &mut dyn Observer) {
    if let Some(message) = message {
        observer.on_event(&Event::ServerMessage {
            device: Some(device.to_string()),
            message,
        });
    }
}

fn change(model: &mut Model, property: PropertyId, value: PropertyValue, observer: &mut dyn Observer) {
    observer.on_event(&Event::PropertyWillChange {
        property: property.clone(),
        value: value.clone(),
    });
    if model.set_value(&property, value.clone()).is_some() {
        observer.on_event(&Event::PropertyDidChange { property, value });
    }
}

fn define(model: &mut Model, def: DefVector, observer: &mut dyn Observer) {
    let device = def.attributes.device.clone();
    let id = VectorId::new(device.clone(), def.attributes.name.clone());
    log::debug!("Definition of {} vector {}", def.kind, id);

    if let Some(existing) = model.lookup_vector(&id)
        && existing.kind() != def.kind
    {
        report(
            DecodeError::KindMismatch {
                element: format!("def{}Vector", def.kind.tag_part()),
                device,
                vector: id.name().to_string(),
            },
            observer,
        );
        return;
    }

    if model.upsert_device(&device) {
        observer.on_event(&Event::DeviceDefined(DeviceId::new(device.clone())));
    }

    let message = def.attributes.message.clone();
    let vector = PropertyVector::from_definition(def);
    let members: Vec<_> = vector.members().cloned().collect();
    if model.upsert_vector(vector) {
        observer.on_event(&Event::VectorDefined(id));
        for member in members {
            observer.on_event(&Event::PropertyDefined(member.id().clone()));
        }
    } else {
        for member in members {
            match model.lookup_property(member.id()) {
                None => {
                    let property = member.id().clone();
                    model.define_member(member);
                    observer.on_event(&Event::PropertyDefined(property));
                }
                Some(current) if current.value() != member.value() => {
                    change(model, member.id().clone(), member.value().clone(), observer);
                }
                Some(_) => {}
            }
        }
    }
    server_message(&device, message, observer);
}

fn update(model: &mut Model, set: SetVector, observer: &mut dyn Observer) -> Result<(), DecodeError> {
    if model.lookup_device(&set.device).is_none() {
        return Err(DecodeError::UnknownDevice(set.device));
    }
    let id = VectorId::new(set.device.clone(), set.name.clone());
    let vector = model.lookup_vector(&id).ok_or_else(|| DecodeError::UnknownVector {
        device: set.device.clone(),
        vector: set.name.clone(),
    })?;
    if vector.kind() != set.kind {
        return Err(DecodeError::KindMismatch {
            element: format!("set{}Vector", set.kind.tag_part()),
            device: set.device,
            vector: set.name,
        });
    }

    model.update_vector(
        &id,
        VectorUpdate {
            state: Some(set.state),
            timeout: Some(set.timeout),
            timestamp: Some(set.timestamp),
            message: Some(set.message.clone()),
        },
    );
    for member in set.members {
        let property = id.property(member.name);
        if model.lookup_property(&property).is_none() {
            report(
                DecodeError::UnknownProperty {
                    device: set.device.clone(),
                    vector: set.name.clone(),
                    property: property.name().to_string(),
                },
                observer,
            );
            continue;
        }
        change(model, property, member.value, observer);
    }
    observer.on_event(&Event::VectorUpdated(id));
    server_message(&set.device, set.message, observer);
    Ok(())
}

fn delete(model: &mut Model, del: DelProperty, observer: &mut dyn Observer) -> Result<(), DecodeError> {
    match del.name {
        Some(name) => {
            let id = VectorId::new(del.device.clone(), name.clone());
            if model.remove_vector(&id).is_none() {
                return Err(DecodeError::UnknownVector {
                    device: del.device,
                    vector: name,
                });
            }
            log::debug!("Deleted vector {}", id);
            observer.on_event(&Event::VectorDeleted(id));
        }
        None => {
            let device = DeviceId::new(del.device.clone());
            let (_, vectors) = model
                .remove_device(&device)
                .ok_or_else(|| DecodeError::UnknownDevice(del.device.clone()))?;
            for vector in vectors {
                observer.on_event(&Event::VectorDeleted(vector.id().clone()));
            }
            log::debug!("Deleted device {}", device);
            observer.on_event(&Event::DeviceDeleted(device));
        }
    }
    server_message(&del.device, del.message, observer);
    Ok(())
}

fn notify(notice: Notice, observer: &mut dyn Observer) {
    if let Some(message) = notice.message {
        observer.on_event(&Event::ServerMessage {
            device: notice.device,
            message,
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use indi_protocol::{Permission, PropertyState, SwitchState, tokenizer::ElementTokenizer};

    fn feed(model: &mut Model, xml: &str) -> Vec<Event> {
        let mut events = Vec::new();
        interpret(model, &Element::parse(xml).unwrap(), &mut events);
        events
    }

    fn errors(events: &[Event]) -> Vec<String> {
        events
            .iter()
            .filter_map(|event| match event {
                Event::Error(err) => Some(err.to_string()),
                _ => None,
            })
            .collect()
    }

    const SLEW_RATE: &str = r#"<defSwitchVector device="Mount" name="SLEW_RATE" label="Slew rate" group="Motion" rule="OneOfMany" perm="rw" timestamp="2024-03-01T20:00:00">
        <defSwitch name="GUIDE" label="Guide">Off</defSwitch>
        <defSwitch name="CENTER" label="Center">Off</defSwitch>
        <defSwitch name="MAX" label="Max">Off</defSwitch>
    </defSwitchVector>"#;

    #[test]
    fn telescope_scenario() {
        let mut model = Model::new();
        let events = feed(
            &mut model,
            r#"<defNumberVector device="Telescope" name="EQUATORIAL_EOD_COORD" state="Ok" perm="rw" timeout="60"><defNumber name="RA" label="RA" format="%.6f" min="0" max="24" step="0">12.5</defNumber></defNumberVector>"#,
        );

        let coord = VectorId::new("Telescope", "EQUATORIAL_EOD_COORD");
        match &events[..] {
            [
                Event::DeviceDefined(device),
                Event::VectorDefined(vector),
                Event::PropertyDefined(property),
            ] => {
                assert_eq!(device.name(), "Telescope");
                assert_eq!(vector, &coord);
                assert_eq!(property, &coord.property("RA"));
            }
            other => panic!("expected definitions, got {:?}", other),
        }

        assert!(model.lookup_device("Telescope").is_some());
        let vector = model.lookup_vector(&coord).unwrap();
        assert_eq!(vector.state(), PropertyState::Ok);
        assert!(vector.can_read());
        assert!(vector.can_write());
        assert_eq!(vector.timeout(), 60);
        let ra = vector.member("RA").unwrap();
        assert_eq!(ra.value(), &PropertyValue::Number(12.5));
        let limits = ra.limits().unwrap();
        assert_eq!((limits.min, limits.max), (0.0, 24.0));
    }

    #[test]
    fn redefinition_fires_defined_once() {
        let mut model = Model::new();
        let first = feed(&mut model, SLEW_RATE);
        let second = feed(&mut model, SLEW_RATE);
        assert_eq!(first.len(), 5);
        assert!(second.is_empty(), "unexpected events {:?}", second);
        assert_eq!(model.devices().count(), 1);
        assert_eq!(model.vectors(&DeviceId::new("Mount")).count(), 1);
    }

    #[test]
    fn redefinition_merges_and_adds_members() {
        let mut model = Model::new();
        feed(&mut model, SLEW_RATE);
        let events = feed(
            &mut model,
            r#"<defSwitchVector device="Mount" name="SLEW_RATE" state="Busy" perm="ro" group="Elsewhere">
                <defSwitch name="GUIDE">On</defSwitch>
                <defSwitch name="FIND">Off</defSwitch>
            </defSwitchVector>"#,
        );
        let id = VectorId::new("Mount", "SLEW_RATE");
        let vector = model.lookup_vector(&id).unwrap();
        assert_eq!(vector.state(), PropertyState::Busy);
        assert_eq!(vector.permission(), Permission::READ_WRITE);
        assert_eq!(vector.group(), "Motion");
        assert_eq!(vector.members().count(), 4);
        assert!(matches!(
            &events[..],
            [
                Event::PropertyWillChange { .. },
                Event::PropertyDidChange { .. },
                Event::PropertyDefined(_),
            ]
        ));
    }

    #[test]
    fn change_events_bracket_the_update() {
        let mut model = Model::new();
        feed(&mut model, SLEW_RATE);

        let xml = r#"<setSwitchVector device="Mount" name="SLEW_RATE" state="Ok"><oneSwitch name="CENTER">On</oneSwitch></setSwitchVector>"#;
        let element = Element::parse(xml).unwrap();
        let center = PropertyId::new("Mount", "SLEW_RATE", "CENTER");
        let mut order = Vec::new();

        interpret(&mut model, &element, &mut |event: &Event| match event {
            Event::PropertyWillChange { property, value } => order.push(("will", property.clone(), value.clone())),
            Event::PropertyDidChange { property, value } => order.push(("did", property.clone(), value.clone())),
            Event::VectorUpdated(_) => order.push(("updated", center.clone(), PropertyValue::Text(String::new()))),
            _ => {}
        });

        let on = PropertyValue::Switch(SwitchState::On);
        assert_eq!(order[0], ("will", center.clone(), on.clone()));
        assert_eq!(order[1], ("did", center.clone(), on));
        assert_eq!(order[2].0, "updated");
        assert!(model.lookup_property(&center).unwrap().is_on());
    }

    #[test]
    fn switch_rule_tracks_set_messages() {
        let mut model = Model::new();
        feed(&mut model, SLEW_RATE);
        let id = VectorId::new("Mount", "SLEW_RATE");
        assert!(!model.lookup_vector(&id).unwrap().in_valid_state());

        feed(
            &mut model,
            r#"<setSwitchVector device="Mount" name="SLEW_RATE"><oneSwitch name="GUIDE">On</oneSwitch></setSwitchVector>"#,
        );
        assert!(model.lookup_vector(&id).unwrap().in_valid_state());

        feed(
            &mut model,
            r#"<setSwitchVector device="Mount" name="SLEW_RATE"><oneSwitch name="MAX">On</oneSwitch></setSwitchVector>"#,
        );
        let vector = model.lookup_vector(&id).unwrap();
        assert_eq!(vector.on_members().len(), 2);
        assert!(!vector.in_valid_state());
    }

    #[test]
    fn partial_failure_in_set() {
        let mut model = Model::new();
        feed(
            &mut model,
            r#"<defTextVector device="Site" name="NAMES" perm="rw"><defText name="OBSERVER">nobody</defText></defTextVector>"#,
        );
        let events = feed(
            &mut model,
            r#"<setTextVector device="Site" name="NAMES">
                <oneText name="OBSERVER">Caroline</oneText>
                <oneText name="TELESCOPE">Refractor</oneText>
            </setTextVector>"#,
        );
        assert_eq!(
            model
                .lookup_property(&PropertyId::new("Site", "NAMES", "OBSERVER"))
                .unwrap()
                .value(),
            &PropertyValue::Text("Caroline".into())
        );
        assert_eq!(errors(&events), vec!["Unknown property Site/NAMES/TELESCOPE"]);
        assert!(matches!(events.last(), Some(Event::VectorUpdated(_))));
    }

    #[test]
    fn unknown_vector_or_kind_drops_set() {
        let mut model = Model::new();
        feed(&mut model, SLEW_RATE);

        let events = feed(&mut model, r#"<setSwitchVector device="Dome" name="SLEW_RATE"/>"#);
        assert_eq!(errors(&events), vec!["Unknown device Dome"]);

        let events = feed(&mut model, r#"<setSwitchVector device="Mount" name="PARK"/>"#);
        assert_eq!(errors(&events), vec!["Unknown property vector Mount/PARK"]);

        let events = feed(
            &mut model,
            r#"<setTextVector device="Mount" name="SLEW_RATE" state="Alert"><oneText name="GUIDE">On</oneText></setTextVector>"#,
        );
        assert_eq!(errors(&events).len(), 1);
        assert_eq!(
            model.lookup_vector(&VectorId::new("Mount", "SLEW_RATE")).unwrap().state(),
            PropertyState::Idle
        );
    }

    #[test]
    fn set_resets_absent_attributes() {
        let mut model = Model::new();
        feed(
            &mut model,
            r#"<defNumberVector device="Focuser" name="POS" state="Busy" timeout="30" message="moving"><defNumber name="X" min="0" max="10" step="1">1</defNumber></defNumberVector>"#,
        );
        feed(
            &mut model,
            r#"<setNumberVector device="Focuser" name="POS"><oneNumber name="X">2</oneNumber></setNumberVector>"#,
        );
        let vector = model.lookup_vector(&VectorId::new("Focuser", "POS")).unwrap();
        assert_eq!(vector.state(), PropertyState::Idle);
        assert_eq!(vector.timeout(), 0);
        assert_eq!(vector.message(), None);
        assert_eq!(vector.member("X").unwrap().value(), &PropertyValue::Number(2.0));
    }

    #[test]
    fn delete_vector_and_device() {
        let mut model = Model::new();
        feed(&mut model, SLEW_RATE);
        feed(
            &mut model,
            r#"<defTextVector device="Mount" name="INFO"><defText name="A">a</defText></defTextVector>"#,
        );

        let events = feed(&mut model, r#"<delProperty device="Mount" name="INFO"/>"#);
        assert!(matches!(&events[..], [Event::VectorDeleted(id)] if id.name() == "INFO"));
        assert!(model.lookup_vector(&VectorId::new("Mount", "INFO")).is_none());

        let events = feed(&mut model, r#"<delProperty device="Mount" name="INFO"/>"#);
        assert_eq!(errors(&events), vec!["Unknown property vector Mount/INFO"]);

        let events = feed(&mut model, r#"<delProperty device="Mount" message="bye"/>"#);
        match &events[..] {
            [
                Event::VectorDeleted(vector),
                Event::DeviceDeleted(device),
                Event::ServerMessage { message, .. },
            ] => {
                assert_eq!(vector.name(), "SLEW_RATE");
                assert_eq!(device.name(), "Mount");
                assert_eq!(message, "bye");
            }
            other => panic!("expected deletions, got {:?}", other),
        }
        assert_eq!(model.devices().count(), 0);
    }

    #[test]
    fn messages_and_unknown_tags() {
        let mut model = Model::new();
        let events = feed(&mut model, r#"<message timestamp="2024-03-01T20:00:00" message="Server ready"/>"#);
        assert!(matches!(
            &events[..],
            [Event::ServerMessage { device: None, message }] if message == "Server ready"
        ));
        assert!(feed(&mut model, r#"<pingRequest uid="7"/>"#).is_empty());
    }

    #[test]
    fn missing_device_is_reported() {
        let mut model = Model::new();
        let events = feed(&mut model, r#"<defTextVector name="V"/>"#);
        assert_eq!(errors(&events).len(), 1);
        assert_eq!(model.devices().count(), 0);
    }

    #[test]
    fn streaming_reassembly_matches_one_shot() {
        fn build(chunks: &[&[u8]]) -> (Model, usize) {
            let mut tokenizer = ElementTokenizer::default();
            let mut model = Model::new();
            let mut events: Vec<Event> = Vec::new();
            for chunk in chunks {
                tokenizer.push(chunk);
                while let Some(xml) = tokenizer.next_element() {
                    let element = Element::parse(&xml.unwrap()).unwrap();
                    interpret(&mut model, &element, &mut events);
                }
            }
            (model, events.len())
        }

        let bytes = SLEW_RATE.as_bytes();
        let attribute = SLEW_RATE.find("Slew").unwrap() + 2;
        let child = SLEW_RATE.find("<defSwitch name=\"CENTER\"").unwrap() + 7;
        let (whole, whole_events) = build(&[bytes]);
        let (split, split_events) = build(&[&bytes[..attribute], &bytes[attribute..child], &bytes[child..]]);

        let id = VectorId::new("Mount", "SLEW_RATE");
        assert_eq!(whole_events, split_events);
        assert_eq!(whole.lookup_vector(&id), split.lookup_vector(&id));
        assert_eq!(split.lookup_vector(&id).unwrap().members().count(), 3);
    }
}
