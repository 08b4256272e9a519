//! # INDI Client
//!
//! A Rust client library for [INDI](https://www.indilib.org/) servers, which expose
//! astronomical instruments (mounts, cameras, focusers, domes, ...) over TCP.
//!
//! ## Overview
//!
//! The [`Client`] keeps a [`Model`](model::Model) of every device and property the server
//! has defined and updates it as `set*Vector` and `delProperty` messages arrive. All changes
//! are reported to an [`Observer`] as [`Event`]s.
//!
//! Networking happens on two background threads per connection: one that connects and sends
//! the `getProperties` handshake, and one that reads. They never touch the model. Complete
//! elements are queued and applied on the thread that calls [`Client::process_pending`],
//! [`Client::process_next`] or [`Client::process_until`].
//!
//! For the wire format itself, see the [`indi_protocol`] crate.
//!
//! ## Basic Usage
//!
//! ### Connecting and Waiting for Definitions
//!
//! ```no_run
//! use indi_client::{Client, Event, model::VectorId};
//! use std::time::Duration;
//!
//! let mut client = Client::new(|event: &Event| println!("{:?}", event));
//! client.set_server("localhost", indi_client::config::DEFAULT_PORT)?;
//! client.connect();
//!
//! let connection = VectorId::new("Telescope Simulator", "CONNECTION");
//! if client.process_until(Duration::from_secs(5), |model| model.lookup_vector(&connection).is_some()) {
//!     client.switch_on("Telescope Simulator", "CONNECTION", "CONNECT")?;
//! }
//! # Ok::<(), indi_client::ClientError>(())
//! ```
//!
//! ### Browsing the Model
//!
//! ```no_run
//! # use indi_client::{Client, Event};
//! # let client = Client::new(Vec::<Event>::new());
//! let model = client.model();
//! for device in model.devices() {
//!     for group in model.groups(device.id()) {
//!         for vector in model.vectors_in_group(device.id(), group) {
//!             println!("{} / {} / {} [{}]", device.name(), group, vector.ui_label(), vector.state());
//!         }
//!     }
//! }
//! ```
//!
//! ## Error Handling
//!
//! Failures that happen in the background (connecting, reading, malformed or unexpected
//! elements) are delivered as [`Event::Error`]. Property writes are checked against the model
//! and fail synchronously with a [`ClientError`].
pub mod client;
pub use client::Client;
pub mod config;
pub mod error;
pub use error::ClientError;
pub mod event;
pub use event::{Event, Observer};
pub mod interpreter;
pub mod model;
pub mod session;
pub use session::{ConnectionState, Session};
