/// Core types shared across the worker bootstrap
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, WorkerError>;

/// Errors raised while bringing the worker up
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Diagnostics sink {path} could not be opened: {source}")]
    DiagnosticsSink {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to rebind standard streams: {0}")]
    StreamRebind(std::io::Error),

    #[error("Failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: Endpoint,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to accept a client on {endpoint}: {source}")]
    Listen {
        endpoint: Endpoint,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open pipe {path}: {source}")]
    Pipe {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Resource limit error: {0}")]
    ResourceLimit(String),

    #[error("Signal handling error: {0}")]
    Signal(String),

    #[error("Storage root {path} is unusable: {source}")]
    StorageRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Protocol engine could not be constructed: {0:#}")]
    EngineConstruction(anyhow::Error),
}

/// A `host:port` pair naming a TCP peer
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Parse an outbound endpoint. An empty host means the loopback address.
    pub fn parse_connect(spec: &str) -> Result<Self> {
        Self::parse_with_default_host(spec, "127.0.0.1", false)
    }

    /// Parse a listening endpoint. A bare port binds every interface.
    pub fn parse_listen(spec: &str) -> Result<Self> {
        Self::parse_with_default_host(spec, "0.0.0.0", true)
    }

    fn parse_with_default_host(spec: &str, default_host: &str, bare_port: bool) -> Result<Self> {
        let spec = spec.trim();
        let (host, port) = match spec.rsplit_once(':') {
            Some((host, port)) => (host, port),
            None if bare_port => ("", spec),
            None => {
                return Err(WorkerError::Config(format!(
                    "Invalid endpoint '{}'. Use: host:port",
                    spec
                )))
            }
        };

        let host = host.trim_start_matches('[').trim_end_matches(']');
        let port = port.parse::<u16>().map_err(|e| {
            WorkerError::Config(format!("Invalid port in endpoint '{}': {}", spec, e))
        })?;

        Ok(Self {
            host: if host.is_empty() {
                default_host.to_string()
            } else {
                host.to_string()
            },
            port,
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// How the worker reaches its host
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum TransportSpec {
    /// Inherited standard input/output
    Stdio,
    /// Outbound TCP connection
    Connect(Endpoint),
    /// Listen and accept exactly one client
    Listen(Endpoint),
    /// FIFO pair `<dir>/in` and `<dir>/out`, or a named pipe on Windows
    Pipe(PathBuf),
}

/// Where diagnostics output goes
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum DiagnosticsSink {
    Discard,
    StdOut,
    StdErr,
    File(PathBuf),
}

impl DiagnosticsSink {
    /// Interpret a sink argument. Absent or empty discards everything.
    pub fn from_spec(spec: Option<&str>) -> Self {
        match spec.map(str::trim) {
            None | Some("") => Self::Discard,
            Some("stdout") | Some("/dev/stdout") => Self::StdOut,
            Some("stderr") | Some("/dev/stderr") => Self::StdErr,
            Some(path) => Self::File(PathBuf::from(path)),
        }
    }
}

/// Best-effort resource shaping parameters
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResourceLimits {
    /// When false the no-op limiter is selected
    pub enabled: bool,
    /// Added to the process niceness on POSIX systems
    pub nice_increment: i32,
    /// Address space reserved (never committed) on Windows
    pub reservation_bytes: usize,
    /// Optional soft RLIMIT_AS on POSIX systems
    pub address_space_cap: Option<u64>,
}

impl ResourceLimits {
    pub const DEFAULT_NICE_INCREMENT: i32 = 5;
    pub const DEFAULT_RESERVATION_BYTES: usize = 1 << 30;
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            enabled: true,
            nice_increment: Self::DEFAULT_NICE_INCREMENT,
            reservation_bytes: Self::DEFAULT_RESERVATION_BYTES,
            address_space_cap: None,
        }
    }
}
