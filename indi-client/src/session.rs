//! TCP connection to an INDI server.
//!
//! A connect thread establishes the connection and sends the handshake, a reader thread cuts the
//! incoming bytes into elements. Neither touches the model: everything they produce is posted as
//! [`Incoming`] to the thread that owns the [`Client`](crate::Client).
use std::{
    io::{self, ErrorKind, Read, Write},
    net::{Shutdown, TcpStream, ToSocketAddrs},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
        mpsc::{Receiver, Sender, channel},
    },
    thread::{self, JoinHandle},
};

use indi_protocol::{Command, Element, error::ParseError, tokenizer::ElementTokenizer};

use crate::{
    config::Config,
    error::{ClientError, CommandError, ConnectionError},
};

const READ_CHUNK: usize = 4096;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// What the network threads hand over to the model thread.
#[derive(Debug)]
pub(crate) enum Incoming {
    Connected { host: String, port: u16 },
    ConnectFailed(ConnectionError),
    Element { xml: String, element: Element },
    ParseError(ParseError),
    Sent { xml: String },
    /// The reader stopped. `None` if the stop was requested.
    Closed(Option<ConnectionError>),
}

#[derive(Debug)]
struct Inner {
    config: Config,
    state: Mutex<ConnectionState>,
    writer: Mutex<Option<TcpStream>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    stop: AtomicBool,
    incoming: Sender<Incoming>,
}

/// Handle to the connection. Clones share the same socket, so commands can be sent from
/// any thread; writes are serialized.
#[derive(Clone, Debug)]
pub struct Session {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Session {
    pub(crate) fn new(config: Config) -> (Session, Receiver<Incoming>) {
        let (sender, receiver) = channel();
        let session = Session {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(ConnectionState::Disconnected),
                writer: Mutex::new(None),
                reader: Mutex::new(None),
                stop: AtomicBool::new(false),
                incoming: sender,
            }),
        };
        (session, receiver)
    }

    pub fn state(&self) -> ConnectionState {
        *lock(&self.inner.state)
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Name used in log output.
    pub fn label(&self) -> &str {
        self.inner.config.label.as_deref().unwrap_or("INDI")
    }

    /// Returns `false` once the client dropped the receiving end.
    fn post(&self, incoming: Incoming) -> bool {
        self.inner.incoming.send(incoming).is_ok()
    }

    fn stopped(&self) -> bool {
        self.inner.stop.load(Ordering::SeqCst)
    }

    /// Drops a connection that was made after [`Session::shutdown`].
    fn abandon(&self, stream: TcpStream, host: &str, port: u16) {
        log::debug!("{}: dropping connection to {}:{}, session was shut down", self.label(), host, port);
        let _ = stream.shutdown(Shutdown::Both);
        *lock(&self.inner.state) = ConnectionState::Disconnected;
        self.post(Incoming::Closed(None));
    }

    /// Starts connecting in the background. Returns `false` if the session is not disconnected.
    pub(crate) fn connect(&self, host: String, port: u16) -> bool {
        {
            let mut state = lock(&self.inner.state);
            if *state != ConnectionState::Disconnected {
                return false;
            }
            *state = ConnectionState::Connecting;
        }
        if let Some(previous) = lock(&self.inner.reader).take() {
            let _ = previous.join();
        }
        self.inner.stop.store(false, Ordering::SeqCst);

        let session = self.clone();
        let (thread_host, thread_port) = (host.clone(), port);
        let spawned = thread::Builder::new()
            .name("indi-connect".into())
            .spawn(move || session.establish(thread_host, thread_port));
        if let Err(source) = spawned {
            *lock(&self.inner.state) = ConnectionState::Disconnected;
            self.post(Incoming::ConnectFailed(ConnectionError::Connect { host, port, source }));
        }
        true
    }

    fn establish(&self, host: String, port: u16) {
        match self.open(&host, port) {
            Ok(stream) => self.start(stream, host, port),
            Err(err) => {
                log::error!("{}: {}", self.label(), err);
                *lock(&self.inner.state) = ConnectionState::Disconnected;
                self.post(Incoming::ConnectFailed(err));
            }
        }
    }

    fn open(&self, host: &str, port: u16) -> Result<TcpStream, ConnectionError> {
        let resolve_error = |source| ConnectionError::Resolve {
            host: host.to_string(),
            port,
            source,
        };
        let address = (host, port)
            .to_socket_addrs()
            .map_err(resolve_error)?
            .next()
            .ok_or_else(|| resolve_error(io::Error::new(ErrorKind::NotFound, "no address")))?;
        log::debug!("{}: connecting to {}", self.label(), address);

        let connect_error = |source| ConnectionError::Connect {
            host: host.to_string(),
            port,
            source,
        };
        let stream = TcpStream::connect_timeout(&address, self.inner.config.connect_timeout)
            .map_err(connect_error)?;
        stream
            .set_read_timeout(Some(self.inner.config.read_timeout))
            .map_err(connect_error)?;
        stream.set_nodelay(true).map_err(connect_error)?;
        Ok(stream)
    }

    fn start(&self, stream: TcpStream, host: String, port: u16) {
        if self.stopped() {
            return self.abandon(stream, &host, port);
        }
        let writer = match stream.try_clone() {
            Ok(writer) => writer,
            Err(source) => {
                *lock(&self.inner.state) = ConnectionState::Disconnected;
                self.post(Incoming::ConnectFailed(ConnectionError::Connect { host, port, source }));
                return;
            }
        };
        {
            // `shutdown` raises the flag before it takes the writer.
            let mut slot = lock(&self.inner.writer);
            if self.stopped() {
                drop(slot);
                return self.abandon(stream, &host, port);
            }
            *slot = Some(writer);
            *lock(&self.inner.state) = ConnectionState::Connected;
        }
        log::info!("{}: connected to {}:{}", self.label(), host, port);
        self.post(Incoming::Connected {
            host: host.clone(),
            port,
        });

        let handshake = Command::GetProperties {
            version: self.inner.config.version,
            device: None,
            name: None,
        };
        if let Err(err) = self.send(&handshake) {
            if self.stopped() {
                return self.abandon(stream, &host, port);
            }
            log::error!("{}: handshake failed: {}", self.label(), err);
            self.close();
            let reason = match err {
                ClientError::Connection(err) => err,
                _ => ConnectionError::Closed,
            };
            self.post(Incoming::Closed(Some(reason)));
            return;
        }

        if self.stopped() {
            self.close();
            return self.abandon(stream, &host, port);
        }
        let session = self.clone();
        match thread::Builder::new()
            .name("indi-reader".into())
            .spawn(move || session.read_loop(stream))
        {
            Ok(handle) => *lock(&self.inner.reader) = Some(handle),
            Err(err) => {
                self.close();
                self.post(Incoming::Closed(Some(ConnectionError::Read(err))));
            }
        }
    }

    fn read_loop(&self, mut stream: TcpStream) {
        let mut tokenizer = ElementTokenizer::new(self.inner.config.max_element_size);
        let mut buffer = [0u8; READ_CHUNK];

        let reason = loop {
            if self.stopped() {
                break None;
            }
            match stream.read(&mut buffer) {
                Ok(0) => break Some(ConnectionError::Closed),
                Ok(read) => {
                    tokenizer.push(&buffer[..read]);
                    let mut delivered = true;
                    while delivered && let Some(next) = tokenizer.next_element() {
                        delivered = self.post(self.build(next));
                    }
                    if !delivered {
                        log::debug!("{}: client is gone, closing", self.label());
                        self.inner.stop.store(true, Ordering::SeqCst);
                        self.close();
                        break None;
                    }
                }
                Err(err)
                    if matches!(
                        err.kind(),
                        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                    ) => {}
                Err(err) => break Some(ConnectionError::Read(err)),
            }
        };

        if self.stopped() {
            log::debug!("{}: reader stopped", self.label());
            self.post(Incoming::Closed(None));
        } else {
            if let Some(err) = &reason {
                log::error!("{}: {}", self.label(), err);
            }
            self.close();
            self.post(Incoming::Closed(reason));
        }
    }

    fn build(&self, next: Result<String, ParseError>) -> Incoming {
        let parsed = next.and_then(|xml| {
            let element = Element::parse(&xml)?;
            Ok((xml, element))
        });
        match parsed {
            Ok((xml, element)) => {
                log::trace!("{}: received {}", self.label(), xml);
                Incoming::Element { xml, element }
            }
            Err(err) => {
                log::warn!("{}: {}", self.label(), err);
                Incoming::ParseError(err)
            }
        }
    }

    fn close(&self) {
        if let Some(writer) = lock(&self.inner.writer).take() {
            let _ = writer.shutdown(Shutdown::Both);
        }
        *lock(&self.inner.state) = ConnectionState::Disconnected;
    }

    /// Writes one command. Concurrent callers are serialized.
    pub fn send(&self, command: &Command) -> Result<(), ClientError> {
        let xml = command.to_xml().map_err(CommandError::Encode)?;
        {
            let mut writer = lock(&self.inner.writer);
            let stream = writer.as_mut().ok_or(ConnectionError::NotConnected)?;
            stream
                .write_all(xml.as_bytes())
                .and_then(|_| stream.flush())
                .map_err(ConnectionError::Write)?;
        }
        log::trace!("{}: sent {}", self.label(), xml);
        self.post(Incoming::Sent { xml });
        Ok(())
    }

    /// Closes the socket and waits for the reader to stop. Returns `false` if the connection
    /// was already gone, e.g. closed by the server.
    pub(crate) fn disconnect(&self) -> bool {
        let connected = self.state() == ConnectionState::Connected;
        self.shutdown();
        if connected {
            log::info!("{}: disconnected", self.label());
        }
        connected
    }

    /// Stops the session in any state. A connect still in progress is dropped as soon as it
    /// completes.
    pub(crate) fn shutdown(&self) {
        self.inner.stop.store(true, Ordering::SeqCst);
        self.close();
        let reader = lock(&self.inner.reader).take();
        if let Some(reader) = reader {
            let _ = reader.join();
        }
    }
}
