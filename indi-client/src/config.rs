use std::time::Duration;

use indi_protocol::{Version, tokenizer::DEFAULT_MAX_ELEMENT_SIZE};

/// The port INDI servers listen on unless told otherwise.
pub const DEFAULT_PORT: u16 = 7624;

#[derive(Debug, Clone)]
pub struct Config {
    /// Upper bound for establishing the TCP connection.
    pub connect_timeout: Duration,
    /// Granularity at which the read loop notices a disconnect request.
    pub read_timeout: Duration,
    /// Largest top-level element that is buffered before it is discarded.
    pub max_element_size: usize,
    /// Version announced in the `getProperties` handshake.
    pub version: Version,
    /// Display name of the connection.
    pub label: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(1),
            read_timeout: Duration::from_secs(1),
            max_element_size: DEFAULT_MAX_ELEMENT_SIZE,
            version: Version::latest(),
            label: None,
        }
    }
}

/// Builder to create a [Config] and modify individual options
///
/// # Example
///
/// ```
/// use indi_client::config::Builder;
/// use std::time::Duration;
///
/// let config = Builder::new()
///     .connect_timeout(Duration::from_secs(5))
///     .read_timeout(Duration::from_millis(200))
///     .label("Observatory")
///     .build();
/// assert_eq!(config.read_timeout, Duration::from_millis(200));
/// ```
#[derive(Default)]
pub struct Builder {
    config: Config,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the read timeout of the socket, which bounds how long a disconnect takes to be noticed.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Set the largest element that the client is expected to receive.
    pub fn max_element_size(mut self, size: usize) -> Self {
        self.config.max_element_size = size;
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.config.version = version;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.config.label = Some(label.into());
        self
    }

    /// Build and return the configuration
    pub fn build(self) -> Config {
        self.config
    }
}
