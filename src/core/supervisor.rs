//! Process supervisor
//!
//! Drives the worker through its fixed startup order as a type-state chain:
//!
//! Init -> Configuring -> ResourceLimited -> TransportReady -> (engine run)
//!
//! Each step consumes the prior state, so diagnostics are always installed
//! before resource limits are applied and limits always precede the
//! transport. Only `Supervisor<TransportReady>` can start the engine.

use crate::config::types::{Result, TransportSpec, WorkerError};
use crate::config::StartupConfig;
use crate::core::engine::{Engine, EngineFactory};
use crate::core::types::{Outcome, Phase, ShutdownRequest, StopReason};
use crate::governor::ResourceGovernor;
use crate::kernel::signal::watch_interrupts;
use crate::kernel::stdio::InheritedStdio;
use crate::observability::DiagnosticsConfig;
use crate::transport::{SharedTransport, Transport};
use crossbeam_channel::{select, Receiver, RecvError};
use log::{debug, error, info, warn};
use std::error::Error as StdError;
use std::io;
use std::sync::Arc;

/// Type-state marker: configuration resolved, nothing applied yet
pub struct Init;

/// Type-state: diagnostics resolved, stdio captured if needed
pub struct Configuring {
    diagnostics: DiagnosticsConfig,
    stdio: Option<InheritedStdio>,
}

/// Type-state: diagnostics installed and resource limits applied
pub struct ResourceLimited {
    stdio: Option<InheritedStdio>,
}

/// Type-state: the duplex channel is open
pub struct TransportReady {
    transport: SharedTransport,
}

/// Worker lifecycle, one state per startup phase.
///
/// ```compile_fail
/// use oop_worker::config::StartupConfig;
/// use oop_worker::core::supervisor::Supervisor;
///
/// // Opening the transport before diagnostics and limits does not compile.
/// let supervisor = Supervisor::new(StartupConfig::default());
/// let _ = supervisor.open_transport();
/// ```
///
/// ```compile_fail
/// use oop_worker::config::StartupConfig;
/// use oop_worker::core::supervisor::Supervisor;
///
/// // A consumed state cannot be reused.
/// let supervisor = Supervisor::new(StartupConfig::default());
/// let _configuring = supervisor.configure();
/// let _ = supervisor.configure();
/// ```
pub struct Supervisor<S> {
    config: StartupConfig,
    state: S,
}

impl<S> Supervisor<S> {
    pub fn config(&self) -> &StartupConfig {
        &self.config
    }
}

fn enter<T>(config: StartupConfig, state: T, phase: Phase) -> Supervisor<T> {
    debug!("Supervisor phase: {:?}", phase);
    Supervisor { config, state }
}

impl Supervisor<Init> {
    pub fn new(config: StartupConfig) -> Self {
        enter(config, Init, Phase::Init)
    }

    /// Init -> Configuring.
    ///
    /// For the stdio transport the inherited streams are duplicated here,
    /// before diagnostics can rebind descriptors 1 and 2.
    pub fn configure(self) -> Result<Supervisor<Configuring>> {
        let diagnostics = self.config.diagnostics();
        let stdio = match self.config.transport {
            TransportSpec::Stdio => Some(InheritedStdio::capture()?),
            _ => None,
        };
        Ok(enter(
            self.config,
            Configuring { diagnostics, stdio },
            Phase::Configuring,
        ))
    }
}

impl Supervisor<Configuring> {
    /// Configuring -> ResourceLimited: install diagnostics, then apply limits.
    pub fn limit_resources(self) -> Result<Supervisor<ResourceLimited>> {
        self.state.diagnostics.install()?;
        info!(
            "oop-worker {} starting (pid {})",
            env!("CARGO_PKG_VERSION"),
            std::process::id()
        );
        debug!("Startup configuration: {}", self.config.to_json());

        ResourceGovernor::for_platform(&self.config.limits).apply_limits();

        let stdio = self.state.stdio;
        Ok(enter(
            self.config,
            ResourceLimited { stdio },
            Phase::ResourceLimited,
        ))
    }
}

impl Supervisor<ResourceLimited> {
    /// ResourceLimited -> TransportReady. Connection failures are fatal.
    pub fn open_transport(self) -> Result<Supervisor<TransportReady>> {
        let transport = Transport::select(&self.config.transport, self.state.stdio)?;
        info!("Transport ready: {}", transport.describe());
        let transport = transport.into_shared();
        Ok(enter(
            self.config,
            TransportReady { transport },
            Phase::TransportReady,
        ))
    }
}

impl Supervisor<TransportReady> {
    /// Construct the engine and supervise its run until it returns or a
    /// shutdown request arrives on `shutdown`.
    ///
    /// The engine runs on its own thread so the supervisor can observe the
    /// interrupt while the engine's run call blocks. An interrupt ends the
    /// run cleanly without waiting for the engine; the engine's shutdown
    /// handle, if any, is invoked once the outcome is known.
    pub fn run_engine<F: EngineFactory>(
        self,
        factory: &F,
        shutdown: Receiver<ShutdownRequest>,
    ) -> Outcome {
        let storage_root = &self.config.storage_root;
        if let Err(source) = std::fs::create_dir_all(storage_root) {
            return fail(&WorkerError::StorageRoot {
                path: storage_root.clone(),
                source,
            });
        }

        let engine = match factory.construct(storage_root, Arc::clone(&self.state.transport)) {
            Ok(engine) => engine,
            Err(e) => return fail(&WorkerError::EngineConstruction(e)),
        };

        let shutdown_handle = engine.shutdown_handle();
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let spawned = std::thread::Builder::new()
            .name("protocol-engine".to_string())
            .spawn(move || {
                let mut engine = engine;
                let _ = done_tx.send(engine.run());
            });
        if let Err(e) = spawned {
            return fail(&WorkerError::Io(e));
        }

        debug!("Supervisor phase: {:?}", Phase::EngineRunning);
        info!(
            "Protocol engine running (storage root {})",
            storage_root.display()
        );

        let outcome = select! {
            recv(done_rx) -> result => engine_outcome(result),
            recv(shutdown) -> request => match request {
                Ok(ShutdownRequest::Interrupt { signal }) => {
                    info!("Interrupted by signal {}; shutting down", signal);
                    Outcome::Stopped(StopReason::Interrupted { signal })
                }
                // Nobody can interrupt us any more; wait for the engine.
                Err(_) => engine_outcome(done_rx.recv()),
            },
        };

        if let Some(shutdown_engine) = shutdown_handle {
            debug!("Shutting down protocol engine");
            shutdown_engine();
        }

        debug!("Supervisor phase: {:?}", outcome.phase());
        outcome
    }
}

/// Run the whole chain for `config` and return the terminal outcome.
///
/// This is the outermost scope: the only place that installs the interrupt
/// watcher and the only place that turns an interrupt into a clean stop.
pub fn run<F: EngineFactory>(config: StartupConfig, factory: &F) -> Outcome {
    let configuring = match Supervisor::new(config).configure() {
        Ok(s) => s,
        Err(e) => return fail_before_diagnostics(&e),
    };

    let limited = match configuring.limit_resources() {
        Ok(s) => s,
        Err(e) => return fail_before_diagnostics(&e),
    };

    let ready = match limited.open_transport() {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };

    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
    if let Err(e) = watch_interrupts(shutdown_tx) {
        warn!("Interrupts will not be handled gracefully: {}", e);
    }

    ready.run_engine(factory, shutdown_rx)
}

/// Render an error with its full cause chain.
pub fn error_chain(err: &dyn StdError) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !rendered.contains(&cause_text) {
            rendered.push_str(": ");
            rendered.push_str(&cause_text);
        }
        source = cause.source();
    }
    rendered
}

fn fail(err: &WorkerError) -> Outcome {
    error!("Fatal: {}", error_chain(err));
    Outcome::Failed
}

/// Diagnostics may not be installed yet; report on the original stderr too.
fn fail_before_diagnostics(err: &WorkerError) -> Outcome {
    if log::max_level() == log::LevelFilter::Off {
        eprintln!("oop-worker: fatal: {}", error_chain(err));
        return Outcome::Failed;
    }
    fail(err)
}

fn engine_outcome(result: std::result::Result<anyhow::Result<()>, RecvError>) -> Outcome {
    match result {
        Ok(Ok(())) => {
            info!("Protocol engine finished");
            Outcome::Stopped(StopReason::EngineReturned)
        }
        Ok(Err(e)) if is_broken_pipe(&e) => {
            info!("Peer closed the channel: {}", e);
            Outcome::Stopped(StopReason::PeerClosed)
        }
        Ok(Err(e)) => {
            error!("Protocol engine failed: {:?}", e);
            Outcome::Failed
        }
        Err(_) => {
            error!("Protocol engine thread ended without reporting a result");
            Outcome::Failed
        }
    }
}

fn is_broken_pipe(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<io::Error>()
            .map_or(false, |e| e.kind() == io::ErrorKind::BrokenPipe)
    })
}
