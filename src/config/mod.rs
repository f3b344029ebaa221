//! Configuration
//!
//! Startup argument resolution and the shared type definitions.

pub mod startup;
pub mod types;

pub use startup::{StartupArgs, StartupConfig};
