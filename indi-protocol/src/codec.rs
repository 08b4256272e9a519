/// Serialization of the commands a client sends to the server
use std::io::{self, Write};

use chrono::{DateTime, Utc};
use quick_xml::escape::escape;

use crate::protocol::{BlobEnable, PropertyKind, PropertyValue, Version, format_timestamp};

/// A command sent from the client to the server.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Asks the server to define devices and properties. Without device and name,
    /// everything the server knows about is defined.
    GetProperties {
        version: Version,
        device: Option<String>,
        name: Option<String>,
    },
    /// Controls whether BLOBs are sent on this connection.
    EnableBlob {
        device: String,
        name: Option<String>,
        mode: BlobEnable,
    },
    /// Requests new values for members of a vector (`new<Kind>Vector`).
    NewVector {
        kind: PropertyKind,
        device: String,
        name: String,
        timestamp: Option<DateTime<Utc>>,
        values: Vec<(String, PropertyValue)>,
    },
}

impl Command {
    /// The handshake: define all devices and properties.
    pub fn get_all_properties() -> Command {
        Command::GetProperties {
            version: Version::latest(),
            device: None,
            name: None,
        }
    }

    pub fn to_xml(&self) -> io::Result<String> {
        let mut xml = String::new();
        match self {
            Command::GetProperties {
                version,
                device,
                name,
            } => {
                xml.push_str(&format!("<getProperties version=\"{}\"", version));
                push_optional_attribute(&mut xml, "device", device.as_deref());
                push_optional_attribute(&mut xml, "name", name.as_deref());
                xml.push_str("/>");
            }
            Command::EnableBlob { device, name, mode } => {
                xml.push_str("<enableBLOB");
                push_optional_attribute(&mut xml, "device", Some(device.as_str()));
                push_optional_attribute(&mut xml, "name", name.as_deref());
                xml.push_str(&format!(">{}</enableBLOB>", mode));
            }
            Command::NewVector {
                kind,
                device,
                name,
                timestamp,
                values,
            } => {
                if *kind == PropertyKind::Light {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "light vectors are read-only",
                    ));
                }
                xml.push_str(&format!("<new{}Vector", kind.tag_part()));
                push_optional_attribute(&mut xml, "device", Some(device.as_str()));
                push_optional_attribute(&mut xml, "name", Some(name.as_str()));
                if let Some(timestamp) = timestamp {
                    push_optional_attribute(&mut xml, "timestamp", Some(format_timestamp(timestamp).as_str()));
                }
                xml.push('>');
                for (member, value) in values {
                    if value.kind() != *kind {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidInput,
                            format!("{} value for member {} of a {} vector", value.kind(), member, kind),
                        ));
                    }
                    xml.push_str(&format!("<one{}", kind.tag_part()));
                    push_optional_attribute(&mut xml, "name", Some(member.as_str()));
                    match value {
                        PropertyValue::Blob(blob) => {
                            push_optional_attribute(&mut xml, "size", Some(blob.size.to_string().as_str()));
                            push_optional_attribute(&mut xml, "format", Some(blob.format.as_str()));
                            xml.push('>');
                            xml.push_str(&escape(blob.payload.as_str()));
                        }
                        other => {
                            xml.push('>');
                            xml.push_str(&escape(other.to_string().as_str()));
                        }
                    }
                    xml.push_str(&format!("</one{}>", kind.tag_part()));
                }
                xml.push_str(&format!("</new{}Vector>", kind.tag_part()));
            }
        }
        Ok(xml)
    }

    pub fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        writer.write_all(self.to_xml()?.as_bytes())
    }
}

fn push_optional_attribute(xml: &mut String, name: &str, value: Option<&str>) {
    if let Some(value) = value {
        xml.push_str(&format!(" {}=\"{}\"", name, escape(value)));
    }
}

#[cfg(feature = "tokio")]
pub use framed::ElementCodec;

#[cfg(feature = "tokio")]
mod framed {
    use std::io;

    use bytes::{BufMut, BytesMut};
    use tokio_util::codec::{Decoder, Encoder};

    use super::Command;
    use crate::{error::ParseError, tokenizer::ElementTokenizer, xml::Element};

    /// Frames a byte stream into top-level INDI elements and encodes commands.
    #[derive(Debug, Default)]
    pub struct ElementCodec {
        tokenizer: ElementTokenizer,
    }

    impl ElementCodec {
        pub fn new(max_element_size: usize) -> ElementCodec {
            ElementCodec {
                tokenizer: ElementTokenizer::new(max_element_size),
            }
        }
    }

    impl Decoder for ElementCodec {
        type Item = Element;
        type Error = ParseError;

        fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Element>, ParseError> {
            if !src.is_empty() {
                let chunk = src.split();
                self.tokenizer.push(&chunk);
            }
            match self.tokenizer.next_element() {
                None => Ok(None),
                Some(Ok(xml)) => Element::parse(&xml).map(Some),
                Some(Err(err)) => Err(err),
            }
        }
    }

    impl Encoder<Command> for ElementCodec {
        type Error = io::Error;

        fn encode(&mut self, item: Command, dst: &mut BytesMut) -> io::Result<()> {
            let mut writer = dst.writer();
            item.write_to(&mut writer)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::protocol::{Blob, SwitchState};
    use chrono::TimeZone;

    #[test]
    fn write_handshake() {
        let mut out = Vec::new();
        Command::get_all_properties().write_to(&mut out).unwrap();
        assert_eq!(out, b"<getProperties version=\"1.7\"/>".to_vec());
    }

    #[test]
    fn write_scoped_get_properties() {
        let command = Command::GetProperties {
            version: Version::V1_7,
            device: Some("CCD Simulator".into()),
            name: Some("CCD_TEMPERATURE".into()),
        };
        assert_eq!(
            command.to_xml().unwrap(),
            "<getProperties version=\"1.7\" device=\"CCD Simulator\" name=\"CCD_TEMPERATURE\"/>"
        );
    }

    #[test]
    fn write_new_switch_vector() {
        let command = Command::NewVector {
            kind: PropertyKind::Switch,
            device: "Telescope".into(),
            name: "CONNECTION".into(),
            timestamp: None,
            values: vec![
                ("CONNECT".into(), PropertyValue::Switch(SwitchState::On)),
                ("DISCONNECT".into(), PropertyValue::Switch(SwitchState::Off)),
            ],
        };
        assert_eq!(
            command.to_xml().unwrap(),
            "<newSwitchVector device=\"Telescope\" name=\"CONNECTION\">\
             <oneSwitch name=\"CONNECT\">On</oneSwitch>\
             <oneSwitch name=\"DISCONNECT\">Off</oneSwitch>\
             </newSwitchVector>"
        );
    }

    #[test]
    fn write_new_number_and_text_vectors() {
        let timestamp = Utc.with_ymd_and_hms(2024, 5, 1, 22, 0, 0).unwrap();
        let number = Command::NewVector {
            kind: PropertyKind::Number,
            device: "Focuser".into(),
            name: "ABS_FOCUS_POSITION".into(),
            timestamp: Some(timestamp),
            values: vec![("FOCUS_ABSOLUTE_POSITION".into(), PropertyValue::Number(12500.5))],
        };
        assert_eq!(
            number.to_xml().unwrap(),
            "<newNumberVector device=\"Focuser\" name=\"ABS_FOCUS_POSITION\" timestamp=\"2024-05-01T22:00:00\">\
             <oneNumber name=\"FOCUS_ABSOLUTE_POSITION\">12500.5</oneNumber>\
             </newNumberVector>"
        );

        let text = Command::NewVector {
            kind: PropertyKind::Text,
            device: "Site".into(),
            name: "NOTES".into(),
            timestamp: None,
            values: vec![("NOTE".into(), PropertyValue::Text("clouds < 20% & \"calm\"".into()))],
        };
        assert_eq!(
            text.to_xml().unwrap(),
            "<newTextVector device=\"Site\" name=\"NOTES\">\
             <oneText name=\"NOTE\">clouds &lt; 20% &amp; &quot;calm&quot;</oneText>\
             </newTextVector>"
        );
    }

    #[test]
    fn write_blob_and_enable_blob() {
        let blob = Command::NewVector {
            kind: PropertyKind::Blob,
            device: "CCD".into(),
            name: "UPLOAD".into(),
            timestamp: None,
            values: vec![(
                "FILE".into(),
                PropertyValue::Blob(Blob {
                    format: ".fits".into(),
                    size: 4,
                    payload: "AAECAw==".into(),
                }),
            )],
        };
        assert_eq!(
            blob.to_xml().unwrap(),
            "<newBLOBVector device=\"CCD\" name=\"UPLOAD\">\
             <oneBLOB name=\"FILE\" size=\"4\" format=\".fits\">AAECAw==</oneBLOB>\
             </newBLOBVector>"
        );
        let enable = Command::EnableBlob {
            device: "CCD".into(),
            name: None,
            mode: BlobEnable::Also,
        };
        assert_eq!(enable.to_xml().unwrap(), "<enableBLOB device=\"CCD\">Also</enableBLOB>");
    }

    #[test]
    fn lights_and_mismatched_values_are_rejected() {
        let light = Command::NewVector {
            kind: PropertyKind::Light,
            device: "D".into(),
            name: "L".into(),
            timestamp: None,
            values: vec![],
        };
        assert_eq!(light.to_xml().unwrap_err().kind(), io::ErrorKind::InvalidInput);

        let mismatched = Command::NewVector {
            kind: PropertyKind::Number,
            device: "D".into(),
            name: "N".into(),
            timestamp: None,
            values: vec![("X".into(), PropertyValue::Text("1".into()))],
        };
        assert!(mismatched.to_xml().is_err());
    }
}
