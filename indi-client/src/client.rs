use std::{
    sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError},
    time::{Duration, Instant},
};

use indi_protocol::{BlobEnable, Command, PropertyKind, PropertyValue, SwitchRule, SwitchState};

use crate::{
    config::Config,
    error::{ClientError, CommandError, ConnectionError},
    event::{Event, Observer},
    interpreter::interpret,
    model::{Model, PropertyVector, VectorId},
    session::{ConnectionState, Incoming, Session},
};

/// Connects to one INDI server and keeps the [`Model`] of its devices.
///
/// The network runs on background threads, but the model is only touched by the thread
/// calling the `process_*` methods. The observer is notified on that thread as well.
pub struct Client<O: Observer> {
    server: Option<(String, u16)>,
    session: Session,
    incoming: Receiver<Incoming>,
    model: Model,
    observer: O,
    disconnecting: bool,
}

impl<O: Observer> Client<O> {
    pub fn new(observer: O) -> Client<O> {
        Client::with_config(Config::default(), observer)
    }

    pub fn with_config(config: Config, observer: O) -> Client<O> {
        log::debug!("Client configuration: {:?}", config);
        let (session, incoming) = Session::new(config);
        Client {
            server: None,
            session,
            incoming,
            model: Model::new(),
            observer,
            disconnecting: false,
        }
    }

    /// Sets the server to connect to. Fails while a connection exists or is being made.
    pub fn set_server(&mut self, host: impl Into<String>, port: u16) -> Result<(), ClientError> {
        if self.state() != ConnectionState::Disconnected {
            let (host, port) = self.server.clone().unwrap_or_default();
            return Err(ConnectionError::AlreadyConnected { host, port }.into());
        }
        self.server = Some((host.into(), port));
        Ok(())
    }

    pub fn server(&self) -> Option<(&str, u16)> {
        self.server.as_ref().map(|(host, port)| (host.as_str(), *port))
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    /// A handle that sends commands from other threads.
    pub fn session(&self) -> Session {
        self.session.clone()
    }

    fn emit(&mut self, event: Event) {
        self.observer.on_event(&event);
    }

    fn ignore(&mut self, message: String) {
        log::info!("{}", message);
        self.emit(Event::ConnectionRequestIgnored { message });
    }

    /// Starts connecting in the background. The result arrives as [`Event::DidConnect`] or
    /// [`Event::Error`] while processing.
    pub fn connect(&mut self) {
        let Some((host, port)) = self.server.clone() else {
            log::error!("{}", ConnectionError::NoServer);
            self.emit(Event::error(ConnectionError::NoServer));
            return;
        };
        match self.state() {
            ConnectionState::Connected => {
                return self.ignore(format!("Already connected to {}:{}", host, port));
            }
            ConnectionState::Connecting => {
                return self.ignore(format!("Already connecting to {}:{}", host, port));
            }
            ConnectionState::Disconnected => {}
        }
        self.emit(Event::WillConnect {
            host: host.clone(),
            port,
        });
        if !self.session.connect(host.clone(), port) {
            self.ignore(format!("Already connecting to {}:{}", host, port));
        }
    }

    /// Closes the connection. Elements that already arrived are processed first.
    pub fn disconnect(&mut self) {
        let (host, port) = self.server.clone().unwrap_or_default();
        match self.state() {
            ConnectionState::Disconnected => {
                return self.ignore("Not connected".to_string());
            }
            ConnectionState::Connecting => {
                return self.ignore(format!("Still connecting to {}:{}", host, port));
            }
            ConnectionState::Connected => {}
        }
        self.process_pending();
        self.emit(Event::WillDisconnect {
            host: host.clone(),
            port,
        });
        self.disconnecting = true;
        if !self.session.disconnect() {
            log::debug!("{}: server closed the connection first", self.session.label());
        }
        self.process_pending();
        self.disconnecting = false;
        self.emit(Event::DidDisconnect { host, port });
    }

    /// Handles everything that has arrived so far without waiting. Returns the number of
    /// items handled.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        loop {
            match self.incoming.try_recv() {
                Ok(incoming) => {
                    self.handle(incoming);
                    handled += 1;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return handled,
            }
        }
    }

    /// Waits up to `timeout` for one item and handles it. Returns `false` on timeout.
    pub fn process_next(&mut self, timeout: Duration) -> bool {
        match self.incoming.recv_timeout(timeout) {
            Ok(incoming) => {
                self.handle(incoming);
                true
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Processes until `predicate` holds for the model or `timeout` has passed.
    /// Returns whether the predicate was satisfied.
    pub fn process_until(
        &mut self,
        timeout: Duration,
        mut predicate: impl FnMut(&Model) -> bool,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.process_pending();
            if predicate(&self.model) {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            self.process_next(remaining);
        }
    }

    fn handle(&mut self, incoming: Incoming) {
        match incoming {
            Incoming::Connected { host, port } => self.emit(Event::DidConnect { host, port }),
            Incoming::ConnectFailed(err) => self.emit(Event::error(err)),
            Incoming::Element { xml, element } => {
                self.emit(Event::RawReceived {
                    size: xml.len(),
                    xml,
                });
                interpret(&mut self.model, &element, &mut self.observer);
            }
            Incoming::ParseError(err) => self.emit(Event::error(err)),
            Incoming::Sent { xml } => self.emit(Event::RawSent {
                size: xml.len(),
                xml,
            }),
            Incoming::Closed(None) => {}
            Incoming::Closed(Some(err)) if self.disconnecting => {
                log::debug!("{}: ignoring close during disconnect: {}", self.session.label(), err);
            }
            Incoming::Closed(Some(err)) => {
                let (host, port) = self.server.clone().unwrap_or_default();
                self.emit(Event::error(err));
                self.emit(Event::WillDisconnect {
                    host: host.clone(),
                    port,
                });
                log::info!("{}: connection to {}:{} lost", self.session.label(), host, port);
                self.emit(Event::DidDisconnect { host, port });
            }
        }
    }

    /// Sends a command as is, without checking it against the model.
    pub fn send(&mut self, command: &Command) -> Result<(), ClientError> {
        self.session.send(command).inspect_err(|err| {
            log::error!("{}: {}", self.session.label(), err);
        })
    }

    /// Asks the server to (re)define properties. `None` selects everything.
    pub fn get_properties(&mut self, device: Option<&str>, vector: Option<&str>) -> Result<(), ClientError> {
        let command = Command::GetProperties {
            version: self.session.config().version,
            device: device.map(str::to_string),
            name: vector.map(str::to_string),
        };
        self.send(&command)
    }

    pub fn enable_blob(&mut self, device: &str, vector: Option<&str>, mode: BlobEnable) -> Result<(), ClientError> {
        let command = Command::EnableBlob {
            device: device.to_string(),
            name: vector.map(str::to_string),
            mode,
        };
        self.send(&command)
    }

    pub fn send_text(&mut self, device: &str, vector: &str, values: &[(&str, &str)]) -> Result<(), ClientError> {
        let values = values
            .iter()
            .map(|(name, value)| (name.to_string(), PropertyValue::Text(value.to_string())))
            .collect();
        self.new_vector(PropertyKind::Text, device, vector, values)
    }

    pub fn send_number(&mut self, device: &str, vector: &str, values: &[(&str, f64)]) -> Result<(), ClientError> {
        let values = values
            .iter()
            .map(|(name, value)| (name.to_string(), PropertyValue::Number(*value)))
            .collect();
        self.new_vector(PropertyKind::Number, device, vector, values)
    }

    pub fn send_switch(
        &mut self,
        device: &str,
        vector: &str,
        values: &[(&str, SwitchState)],
    ) -> Result<(), ClientError> {
        let values = values
            .iter()
            .map(|(name, state)| (name.to_string(), PropertyValue::Switch(*state)))
            .collect();
        self.new_vector(PropertyKind::Switch, device, vector, values)
    }

    /// Turns one switch on. For `OneOfMany` and `AtMostOne` vectors every other member is
    /// switched off in the same command.
    pub fn switch_on(&mut self, device: &str, vector: &str, member: &str) -> Result<(), ClientError> {
        let switches = self.writable(PropertyKind::Switch, device, vector)?;
        if switches.member(member).is_none() {
            return Err(unknown_member(device, vector, member));
        }
        let values = match switches.rule() {
            Some(SwitchRule::AnyOfMany) => vec![(member.to_string(), PropertyValue::Switch(SwitchState::On))],
            _ => switches
                .members()
                .map(|switch| {
                    let state = if switch.name() == member {
                        SwitchState::On
                    } else {
                        SwitchState::Off
                    };
                    (switch.name().to_string(), PropertyValue::Switch(state))
                })
                .collect(),
        };
        self.new_vector(PropertyKind::Switch, device, vector, values)
    }

    fn writable(
        &self,
        kind: PropertyKind,
        device: &str,
        vector: &str,
    ) -> Result<&PropertyVector, ClientError> {
        let found = self
            .model
            .lookup_vector(&VectorId::new(device, vector))
            .ok_or_else(|| CommandError::UnknownVector {
                device: device.to_string(),
                vector: vector.to_string(),
            })?;
        if found.kind() != kind {
            return Err(CommandError::KindMismatch {
                device: device.to_string(),
                vector: vector.to_string(),
                actual: found.kind(),
                requested: kind,
            }
            .into());
        }
        if !found.can_write() {
            return Err(CommandError::ReadOnly {
                device: device.to_string(),
                vector: vector.to_string(),
            }
            .into());
        }
        Ok(found)
    }

    fn new_vector(
        &mut self,
        kind: PropertyKind,
        device: &str,
        vector: &str,
        values: Vec<(String, PropertyValue)>,
    ) -> Result<(), ClientError> {
        let target = self.writable(kind, device, vector)?;
        if let Some((member, _)) = values.iter().find(|(name, _)| target.member(name).is_none()) {
            return Err(unknown_member(device, vector, member));
        }
        let command = Command::NewVector {
            kind,
            device: device.to_string(),
            name: vector.to_string(),
            timestamp: None,
            values,
        };
        self.send(&command)
    }
}

fn unknown_member(device: &str, vector: &str, member: &str) -> ClientError {
    CommandError::UnknownMember {
        device: device.to_string(),
        vector: vector.to_string(),
        member: member.to_string(),
    }
    .into()
}

impl<O: Observer> Drop for Client<O> {
    fn drop(&mut self) {
        self.session.shutdown();
    }
}
