//! oop-worker: bootstrap and supervisor for an out-of-process
//! language-intelligence backend.
//!
//! The host editor spawns this worker, which configures diagnostics, lowers
//! its own resource footprint, opens a duplex byte channel back to the host
//! and hands that channel to the protocol engine until the peer goes away.
//!
//! # Architecture
//!
//! ## Kernel Primitives ([`kernel`])
//! - [`kernel::stdio`]: Inherited stdio capture and stdout/stderr rebinding
//! - [`kernel::resource`]: Niceness and address-space limits
//! - [`kernel::signal`]: Interrupt delivery to the supervisor
//!
//! ## Worker Components
//! - [`observability`]: Diagnostics sink and per-logger verbosity
//! - [`governor`]: Best-effort, platform-specific resource governance
//! - [`transport`]: Socket, stdio and named-pipe channels
//! - [`core`]: Type-state supervisor, engine seam and exit outcomes
//! - [`config`]: Startup argument resolution and shared error types
//!
//! # Startup order
//!
//! 1. Diagnostics are installed before anything else logs
//! 2. Resource limits are applied before the channel opens
//! 3. The engine is constructed only once the channel is ready
//!
//! Failures in steps 1 and 3 are fatal; resource limits never are.

// Kernel Primitives
pub mod kernel;

// Configuration & Errors
pub mod config;

// Diagnostics
pub mod observability;

// Resource Governance
pub mod governor;

// Host Channel
pub mod transport;

// Lifecycle
pub mod core;

// CLI entrypoint wiring for the oop-worker binary.
pub mod cli;

pub use config::types::{Result, WorkerError};
pub use config::{StartupArgs, StartupConfig};
pub use core::engine::{Engine, EngineFactory};
pub use core::types::{Outcome, StopReason};
