//! # INDI Protocol Library
//!
//! This crate provides a Rust implementation of the wire level of the
//! [INDI](https://www.indilib.org/develop/developer-manual/106-client-development.html)
//! (Instrument Neutral Distributed Interface) protocol, version 1.7.
//!
//! ## Overview
//!
//! INDI servers expose devices (mounts, cameras, focusers, ...) as named vectors of typed
//! properties. Client and server exchange a stream of XML elements over TCP without any
//! additional framing. This library allows you to:
//!
//! - Cut an unbounded byte stream into complete top-level elements ([`tokenizer`])
//! - Build a small element tree for each of them ([`xml`])
//! - Classify and decode the element into a typed [`Message`]
//! - Serialize the [`Command`]s a client sends to the server
//!
//! ## Protocol Features
//!
//! - **Protocol Versions**: INDI 1.7
//! - **Inbound**: `def*Vector`, `set*Vector`, `delProperty`, `message`
//! - **Outbound**: `getProperties`, `enableBLOB`, `new*Vector`
//! - **Property kinds**: Text, Number, Switch, Light, BLOB
//!
//! ## Basic Usage
//!
//! ### Reading Messages from a Server
//!
//! ```
//! use indi_protocol::{Element, Message, PropertyState, tokenizer::ElementTokenizer};
//!
//! let mut tokenizer = ElementTokenizer::default();
//! tokenizer.push(b"<setNumberVector device=\"Focuser\" name=\"ABS_FOCUS_POSITION\" state=\"Busy\">");
//! tokenizer.push(b"<oneNumber name=\"FOCUS_ABSOLUTE_POSITION\">1200</oneNumber></setNumberVector>");
//!
//! let xml = tokenizer.next_element().unwrap().expect("Element should be complete");
//! let element = Element::parse(&xml).expect("Element should parse");
//! match Message::from_element(&element).expect("Message should decode").message {
//!     Message::Set(set) => {
//!         assert_eq!(set.device, "Focuser");
//!         assert_eq!(set.state, PropertyState::Busy);
//!         assert_eq!(set.members[0].value.as_number(), Some(1200.0));
//!     }
//!     _ => unreachable!(),
//! }
//! ```
//!
//! ### Writing Commands to a Server
//!
//! ```
//! use indi_protocol::Command;
//!
//! let mut buffer = Vec::new();
//! Command::get_all_properties().write_to(&mut buffer).expect("Writing to vector shouldn't fail");
//! assert_eq!(buffer, b"<getProperties version=\"1.7\"/>");
//! ```
//!
//! ## Error Handling
//!
//! [`error::ParseError`] covers input that cannot be cut into elements or is not well-formed XML.
//! [`error::DecodeError`] covers well-formed XML that does not make sense as an INDI message.
//!
//! ## Async Support
//!
//! With the `tokio` feature, [`codec::ElementCodec`] implements the `tokio_util` codec traits so
//! the protocol can be used with `Framed` streams.
pub mod protocol;
pub use protocol::*;
pub mod codec;
pub use codec::Command;
pub mod error;
pub mod message;
pub use message::Message;
pub mod tokenizer;
pub mod xml;
pub use xml::Element;
