//! Observability
//!
//! Diagnostics sink selection and per-target log verbosity.

pub mod diagnostics;
pub mod level;

pub use diagnostics::{DiagnosticsConfig, DiagnosticsLogger, LOG_ENV_VAR};
pub use level::{Level, LogLevelOverride};
