//! Protocol engine seam.
//!
//! The engine that speaks the request/response protocol lives outside this
//! crate. It is constructed once with the storage root and a shared handle to
//! the transport, then its blocking `run` occupies the rest of the process.

use crate::transport::SharedTransport;
use log::{debug, info};
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Stops an engine from outside its run thread.
pub type ShutdownHandle = Box<dyn FnOnce() + Send>;

/// A protocol engine's single blocking entry point.
pub trait Engine: Send {
    /// Serve until the peer closes the channel or asks to shut down.
    fn run(&mut self) -> anyhow::Result<()>;

    /// Taken before `run` starts and invoked once the run is over, whatever
    /// the outcome, including after an interrupt while `run` still blocks.
    fn shutdown_handle(&self) -> Option<ShutdownHandle> {
        None
    }
}

/// Builds the engine once the transport is ready.
pub trait EngineFactory {
    type Engine: Engine + 'static;

    fn construct(
        &self,
        storage_root: &Path,
        transport: SharedTransport,
    ) -> anyhow::Result<Self::Engine>;
}

impl<F, E> EngineFactory for F
where
    F: Fn(&Path, SharedTransport) -> anyhow::Result<E>,
    E: Engine + 'static,
{
    type Engine = E;

    fn construct(&self, storage_root: &Path, transport: SharedTransport) -> anyhow::Result<E> {
        self(storage_root, transport)
    }
}

/// Stand-in engine for builds without a protocol engine linked in.
///
/// Consumes and discards everything the peer sends and returns once the
/// peer closes its end.
pub struct DrainEngine {
    storage_root: PathBuf,
    transport: SharedTransport,
}

impl DrainEngine {
    pub fn construct(storage_root: &Path, transport: SharedTransport) -> anyhow::Result<Self> {
        Ok(Self {
            storage_root: storage_root.to_path_buf(),
            transport,
        })
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }
}

impl Engine for DrainEngine {
    fn run(&mut self) -> anyhow::Result<()> {
        info!(
            "Drain engine started (storage root {})",
            self.storage_root.display()
        );
        let mut buf = [0u8; 8192];
        let mut total = 0u64;
        loop {
            match (&*self.transport).read(&mut buf) {
                Ok(0) => break,
                Ok(n) => total += n as u64,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        debug!("Peer closed the channel after {} bytes", total);
        Ok(())
    }

    fn shutdown_handle(&self) -> Option<ShutdownHandle> {
        let transport = Arc::clone(&self.transport);
        Some(Box::new(move || {
            if let Err(e) = transport.shutdown() {
                debug!("Transport shutdown failed: {}", e);
            }
        }))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::kernel::stdio::InheritedStdio;
    use crate::transport::Transport;
    use std::fs::File;
    use std::io::Write;

    #[test]
    fn drain_engine_returns_when_peer_closes() {
        let (input_read, input_write) = nix::unistd::pipe().unwrap();
        let (_output_read, output_write) = nix::unistd::pipe().unwrap();
        let transport = Transport::from_stdio(InheritedStdio::from_files(
            File::from(input_read),
            File::from(output_write),
        ))
        .into_shared();

        let mut host = File::from(input_write);
        host.write_all(b"some request bytes").unwrap();
        drop(host);

        let mut engine = DrainEngine::construct(Path::new("/tmp/store"), transport).unwrap();
        assert_eq!(engine.storage_root(), Path::new("/tmp/store"));
        engine.run().unwrap();
    }

    #[test]
    fn shutdown_handle_ends_a_blocked_socket_run() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let transport = Transport::connect(&crate::config::types::Endpoint {
            host: "127.0.0.1".to_string(),
            port,
        })
        .unwrap()
        .into_shared();
        let (_host, _) = listener.accept().unwrap();

        let mut engine = DrainEngine::construct(Path::new("/tmp/store"), transport).unwrap();
        let handle = engine.shutdown_handle().unwrap();
        let runner = std::thread::spawn(move || engine.run());

        std::thread::sleep(std::time::Duration::from_millis(50));
        handle();
        assert!(runner.join().unwrap().is_ok());
    }
}
