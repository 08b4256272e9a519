//! A scripted INDI server for exercising the client over real sockets.
use std::{
    io::{self, ErrorKind, Read, Write},
    net::{TcpListener, TcpStream},
    time::{Duration, Instant},
};

use indi_client::{Client, Event};
use indi_protocol::{Element, tokenizer::ElementTokenizer};

/// Listens on an ephemeral port of the loopback interface.
pub struct FakeServer {
    listener: TcpListener,
}

impl FakeServer {
    pub fn bind() -> io::Result<FakeServer> {
        Ok(FakeServer {
            listener: TcpListener::bind("127.0.0.1:0")?,
        })
    }

    pub fn port(&self) -> u16 {
        self.listener
            .local_addr()
            .map(|address| address.port())
            .unwrap_or_default()
    }

    /// Waits for the client to connect.
    pub fn accept(&self) -> io::Result<ServerConnection> {
        let (stream, _) = self.listener.accept()?;
        stream.set_read_timeout(Some(Duration::from_millis(50)))?;
        Ok(ServerConnection {
            stream,
            tokenizer: ElementTokenizer::default(),
        })
    }
}

/// The server side of one client connection.
pub struct ServerConnection {
    stream: TcpStream,
    tokenizer: ElementTokenizer,
}

impl ServerConnection {
    pub fn send(&mut self, xml: &str) -> io::Result<()> {
        self.stream.write_all(xml.as_bytes())?;
        self.stream.flush()
    }

    /// Sends `xml` in pieces of `chunk` bytes, pausing in between so the client sees
    /// separate reads.
    pub fn send_chunked(&mut self, xml: &str, chunk: usize) -> io::Result<()> {
        for piece in xml.as_bytes().chunks(chunk) {
            self.stream.write_all(piece)?;
            self.stream.flush()?;
            std::thread::sleep(Duration::from_millis(5));
        }
        Ok(())
    }

    /// Reads the next element the client sent.
    pub fn receive(&mut self, timeout: Duration) -> io::Result<Element> {
        let deadline = Instant::now() + timeout;
        let mut buffer = [0u8; 1024];
        loop {
            if let Some(next) = self.tokenizer.next_element() {
                let xml = next.map_err(|err| io::Error::new(ErrorKind::InvalidData, err))?;
                return Element::parse(&xml).map_err(|err| io::Error::new(ErrorKind::InvalidData, err));
            }
            if Instant::now() > deadline {
                return Err(io::Error::new(ErrorKind::TimedOut, "no element from the client"));
            }
            match self.stream.read(&mut buffer) {
                Ok(0) => return Err(io::Error::new(ErrorKind::UnexpectedEof, "client closed")),
                Ok(read) => self.tokenizer.push(&buffer[..read]),
                Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                Err(err) => return Err(err),
            }
        }
    }

    /// Whether the client closed its end within `timeout`.
    pub fn closed_by_client(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut buffer = [0u8; 1024];
        while Instant::now() < deadline {
            match self.stream.read(&mut buffer) {
                Ok(0) => return true,
                Ok(_) => {}
                Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                Err(_) => return true,
            }
        }
        false
    }
}

/// Processes incoming data until an event matching `predicate` was recorded.
pub fn wait_for(
    client: &mut Client<Vec<Event>>,
    timeout: Duration,
    predicate: impl Fn(&Event) -> bool,
) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        client.process_pending();
        if client.observer().iter().any(&predicate) {
            return true;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return false;
        }
        client.process_next(remaining.min(Duration::from_millis(50)));
    }
}
