//! Worker lifecycle core.
//!
//! Core owns the startup order, the engine seam and the terminal outcome.
//! Everything that touches the OS directly lives in `kernel`.

pub mod engine;
pub mod supervisor;
pub mod types;
