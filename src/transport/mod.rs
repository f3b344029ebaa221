//! Duplex byte channel between the worker and its host.
//!
//! A [`Transport`] is a raw, unframed byte stream. It never buffers in
//! userspace: reads and writes go straight to the socket or descriptor, which
//! the protocol engine's framing relies on. Framing, encryption and message
//! boundaries belong to the engine.

use crate::config::types::{Endpoint, Result, TransportSpec, WorkerError};
use crate::kernel::stdio::InheritedStdio;
use log::{debug, info, warn};
use serde::Serialize;
use std::fs::File;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Namespace prefix for Windows named pipes.
pub const NAMED_PIPE_PREFIX: &str = r"\\.\pipe\";

/// Handle given to the protocol engine. The supervisor keeps its own clone,
/// so the engine can read and write but never close the channel.
pub type SharedTransport = Arc<Transport>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TransportKind {
    Socket,
    Stdio,
    Pipe,
}

#[derive(Debug)]
pub enum Transport {
    /// One TCP connection used in both directions
    Socket { peer: SocketAddr, stream: TcpStream },
    /// Inherited stdin plus a duplicate of the inherited stdout
    Stdio { input: File, output: File },
    /// Host-provided FIFO pair, or both ends of one Windows named pipe
    Pipe { input: File, output: File },
}

impl Transport {
    /// Build the channel described by `spec`.
    ///
    /// `stdio` carries handles captured before diagnostics touched the
    /// standard streams; when absent they are captured here.
    pub fn select(spec: &TransportSpec, stdio: Option<InheritedStdio>) -> Result<Self> {
        match spec {
            TransportSpec::Stdio => {
                let stdio = match stdio {
                    Some(stdio) => stdio,
                    None => InheritedStdio::capture()?,
                };
                Ok(Self::from_stdio(stdio))
            }
            TransportSpec::Connect(endpoint) => Self::connect(endpoint),
            TransportSpec::Listen(endpoint) => Self::listen(endpoint),
            TransportSpec::Pipe(dir) => Self::open_pipe(dir),
        }
    }

    /// Open a blocking outbound connection. No retry.
    pub fn connect(endpoint: &Endpoint) -> Result<Self> {
        info!("Connecting to {}", endpoint);
        let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).map_err(
            |source| WorkerError::Connect {
                endpoint: endpoint.clone(),
                source,
            },
        )?;
        Self::from_stream(stream)
    }

    /// Bind `endpoint` and serve exactly one client.
    pub fn listen(endpoint: &Endpoint) -> Result<Self> {
        let listener = TcpListener::bind((endpoint.host.as_str(), endpoint.port)).map_err(
            |source| WorkerError::Listen {
                endpoint: endpoint.clone(),
                source,
            },
        )?;
        info!("Listening on {}", listener.local_addr()?);
        Self::accept_one(listener).map_err(|e| match e {
            WorkerError::Io(source) => WorkerError::Listen {
                endpoint: endpoint.clone(),
                source,
            },
            other => other,
        })
    }

    /// Accept a single client, then stop listening.
    pub fn accept_one(listener: TcpListener) -> Result<Self> {
        let (stream, peer) = listener.accept()?;
        drop(listener);
        info!("Client accepted from {}", peer);
        Self::from_stream(stream)
    }

    fn from_stream(stream: TcpStream) -> Result<Self> {
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to disable Nagle on transport socket: {}", e);
        }
        let peer = stream.peer_addr()?;
        Ok(Self::Socket { peer, stream })
    }

    pub fn from_stdio(stdio: InheritedStdio) -> Self {
        debug!("Using inherited standard input/output");
        Self::Stdio {
            input: stdio.input,
            output: stdio.output,
        }
    }

    /// Connect to the host's pipe: a FIFO pair under `location`, or on
    /// Windows the named pipe `location`.
    pub fn open_pipe(location: &Path) -> Result<Self> {
        #[cfg(windows)]
        {
            Self::open_named_pipe(location)
        }

        #[cfg(not(windows))]
        {
            Self::open_fifo_pair(location)
        }
    }

    /// Open an existing named pipe for reading and writing.
    #[cfg(windows)]
    fn open_named_pipe(name: &Path) -> Result<Self> {
        let path = named_pipe_path(name);
        info!("Connecting to named pipe {}", path.display());
        let pipe_error = |source| WorkerError::Pipe {
            path: path.clone(),
            source,
        };

        let input = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(pipe_error)?;
        let output = input.try_clone().map_err(pipe_error)?;
        Ok(Self::Pipe { input, output })
    }

    /// Open `<dir>/out` for writing, then `<dir>/in` for reading.
    ///
    /// The write side goes first so a host that opens its read end before
    /// its write end does not deadlock against us.
    #[cfg_attr(windows, allow(dead_code))]
    fn open_fifo_pair(dir: &Path) -> Result<Self> {
        let out_path = dir.join("out");
        let in_path = dir.join("in");
        info!("Connecting to pipe {}", dir.display());

        let output = std::fs::OpenOptions::new()
            .write(true)
            .open(&out_path)
            .map_err(|source| WorkerError::Pipe {
                path: out_path.clone(),
                source,
            })?;
        let input = File::open(&in_path).map_err(|source| WorkerError::Pipe {
            path: in_path.clone(),
            source,
        })?;

        Ok(Self::Pipe { input, output })
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Socket { .. } => TransportKind::Socket,
            Self::Stdio { .. } => TransportKind::Stdio,
            Self::Pipe { .. } => TransportKind::Pipe,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Socket { peer, .. } => format!("socket {}", peer),
            Self::Stdio { .. } => "stdio".to_string(),
            Self::Pipe { .. } => "pipe".to_string(),
        }
    }

    pub fn into_shared(self) -> SharedTransport {
        Arc::new(self)
    }

    /// Shut a socket down in both directions so a blocked reader sees EOF.
    /// Descriptor-backed channels are left for process exit to close.
    pub fn shutdown(&self) -> io::Result<()> {
        match self {
            Self::Socket { stream, .. } => match stream.shutdown(Shutdown::Both) {
                Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(e),
                _ => Ok(()),
            },
            Self::Stdio { .. } | Self::Pipe { .. } => Ok(()),
        }
    }
}

/// Full `\\.\pipe\` path for a bare pipe name; full paths pass through.
pub fn named_pipe_path(name: &Path) -> PathBuf {
    let name = name.to_string_lossy();
    if name.to_ascii_lowercase().starts_with(NAMED_PIPE_PREFIX) {
        PathBuf::from(name.into_owned())
    } else {
        PathBuf::from(format!("{}{}", NAMED_PIPE_PREFIX, name))
    }
}

impl Read for &Transport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match **self {
            Transport::Socket { ref stream, .. } => (&*stream).read(buf),
            Transport::Stdio { ref input, .. } | Transport::Pipe { ref input, .. } => {
                (&*input).read(buf)
            }
        }
    }
}

impl Write for &Transport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match **self {
            Transport::Socket { ref stream, .. } => (&*stream).write(buf),
            Transport::Stdio { ref output, .. } | Transport::Pipe { ref output, .. } => {
                (&*output).write(buf)
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match **self {
            Transport::Socket { ref stream, .. } => (&*stream).flush(),
            Transport::Stdio { ref output, .. } | Transport::Pipe { ref output, .. } => {
                (&*output).flush()
            }
        }
    }
}

impl Read for Transport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (&*self).read(buf)
    }
}

impl Write for Transport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (&*self).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        (&*self).flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[cfg(unix)]
    fn pipe_files() -> (File, File) {
        let (read_end, write_end) = nix::unistd::pipe().unwrap();
        (File::from(read_end), File::from(write_end))
    }

    #[cfg(unix)]
    #[test]
    fn stdio_transport_reads_input_and_writes_output_unbuffered() {
        let (input_read, mut input_write) = pipe_files();
        let (mut output_read, output_write) = pipe_files();

        let transport = Transport::select(
            &TransportSpec::Stdio,
            Some(InheritedStdio::from_files(input_read, output_write)),
        )
        .unwrap();
        assert_eq!(transport.kind(), TransportKind::Stdio);

        input_write.write_all(b"request").unwrap();
        let mut received = [0u8; 7];
        (&transport).read_exact(&mut received).unwrap();
        assert_eq!(&received, b"request");

        // No flush: the bytes must already be in the pipe.
        (&transport).write_all(b"frame").unwrap();
        let mut sent = [0u8; 5];
        output_read.read_exact(&mut sent).unwrap();
        assert_eq!(&sent, b"frame");
    }

    #[test]
    fn connect_to_closed_port_fails() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let endpoint = Endpoint {
            host: "127.0.0.1".to_string(),
            port,
        };

        let err = Transport::connect(&endpoint).unwrap_err();
        assert!(matches!(err, WorkerError::Connect { .. }));
        assert!(err.to_string().contains(&port.to_string()));
    }

    #[test]
    fn connected_socket_is_duplex() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let host = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            conn.write_all(b"ping").unwrap();
            let mut reply = [0u8; 4];
            conn.read_exact(&mut reply).unwrap();
            reply
        });

        let transport = Transport::connect(&Endpoint {
            host: "127.0.0.1".to_string(),
            port: addr.port(),
        })
        .unwrap();
        assert_eq!(transport.kind(), TransportKind::Socket);

        let shared = transport.into_shared();
        let mut buf = [0u8; 4];
        (&*shared).read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
        (&*shared).write_all(b"pong").unwrap();

        assert_eq!(&host.join().unwrap(), b"pong");
    }

    #[test]
    fn accept_one_serves_a_single_client() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = thread::spawn(move || {
            let mut conn = TcpStream::connect(addr).unwrap();
            conn.write_all(b"hello").unwrap();
        });

        let mut transport = Transport::accept_one(listener).unwrap();
        let mut buf = [0u8; 5];
        transport.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        client.join().unwrap();

        // The listener is gone once a client has been accepted.
        assert!(TcpStream::connect(addr).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn pipe_opens_out_then_in() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("in"), b"from host").unwrap();
        std::fs::write(dir.path().join("out"), b"").unwrap();

        let mut transport = Transport::open_pipe(dir.path()).unwrap();
        assert_eq!(transport.kind(), TransportKind::Pipe);

        let mut received = String::new();
        transport.read_to_string(&mut received).unwrap();
        assert_eq!(received, "from host");

        transport.write_all(b"to host").unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("out")).unwrap(),
            "to host"
        );
    }

    #[cfg(unix)]
    #[test]
    fn pipe_without_fifos_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Transport::open_pipe(dir.path()).unwrap_err();
        match err {
            WorkerError::Pipe { path, .. } => assert!(path.ends_with("out")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn named_pipe_names_gain_the_pipe_namespace() {
        assert_eq!(
            named_pipe_path(Path::new("codeintel-42")),
            PathBuf::from(r"\\.\pipe\codeintel-42")
        );
        assert_eq!(
            named_pipe_path(Path::new(r"\\.\PIPE\codeintel-42")),
            PathBuf::from(r"\\.\PIPE\codeintel-42")
        );
    }

    #[test]
    fn socket_shutdown_unblocks_reader() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let transport = Transport::connect(&Endpoint {
            host: "127.0.0.1".to_string(),
            port: addr.port(),
        })
        .unwrap()
        .into_shared();
        let (_host, _) = listener.accept().unwrap();

        let reader = {
            let transport = Arc::clone(&transport);
            thread::spawn(move || {
                let mut buf = [0u8; 8];
                (&*transport).read(&mut buf)
            })
        };

        thread::sleep(std::time::Duration::from_millis(50));
        transport.shutdown().unwrap();
        assert_eq!(reader.join().unwrap().unwrap(), 0);
        // A second shutdown is harmless.
        transport.shutdown().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn descriptor_channels_ignore_shutdown() {
        let (input, _) = pipe_files();
        let (_, output) = pipe_files();
        let transport = Transport::from_stdio(InheritedStdio::from_files(input, output));
        assert!(transport.shutdown().is_ok());
    }
}
