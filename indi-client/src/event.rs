//! Notifications about the connection and the model.
use std::sync::{Arc, mpsc::Sender};

use indi_protocol::PropertyValue;

use crate::{
    error::ClientError,
    model::{DeviceId, PropertyId, VectorId},
};

/// Everything an observer can be told about.
///
/// `Will*` events are delivered before the model changes and `Did*` events after it.
/// Ids stay valid for lookups until the matching `*Deleted` event.
#[derive(Clone, Debug)]
pub enum Event {
    WillConnect { host: String, port: u16 },
    DidConnect { host: String, port: u16 },
    WillDisconnect { host: String, port: u16 },
    DidDisconnect { host: String, port: u16 },
    /// A connect or disconnect request was dropped because another one is in progress.
    ConnectionRequestIgnored { message: String },
    Error(Arc<ClientError>),
    /// A complete top-level element arrived.
    RawReceived { size: usize, xml: String },
    /// A command was written to the socket.
    RawSent { size: usize, xml: String },
    DeviceDefined(DeviceId),
    VectorDefined(VectorId),
    PropertyDefined(PropertyId),
    /// The model still holds the old value; `value` is the one about to be stored.
    PropertyWillChange { property: PropertyId, value: PropertyValue },
    PropertyDidChange { property: PropertyId, value: PropertyValue },
    /// All members of a `set*Vector` have been applied.
    VectorUpdated(VectorId),
    /// The vector has already been removed from the model.
    VectorDeleted(VectorId),
    DeviceDeleted(DeviceId),
    /// A `message` element, or the message attribute of another element.
    ServerMessage { device: Option<String>, message: String },
}

impl Event {
    pub(crate) fn error(error: impl Into<ClientError>) -> Event {
        Event::Error(Arc::new(error.into()))
    }
}

/// Receives the events of a [`Client`](crate::Client).
///
/// Observers are called on the thread that drives the client, one event at a time
/// and in the order the changes happened.
pub trait Observer {
    fn on_event(&mut self, event: &Event);
}

impl<F: FnMut(&Event)> Observer for F {
    fn on_event(&mut self, event: &Event) {
        self(event)
    }
}

/// Collects events, mostly useful in tests.
impl Observer for Vec<Event> {
    fn on_event(&mut self, event: &Event) {
        self.push(event.clone())
    }
}

/// Forwards events to another thread. A dropped receiver is ignored.
impl Observer for Sender<Event> {
    fn on_event(&mut self, event: &Event) {
        let _ = self.send(event.clone());
    }
}
