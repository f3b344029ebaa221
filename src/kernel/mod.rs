//! Thin wrappers around the OS primitives the worker touches.
//!
//! All `unsafe` code is concentrated here with explicit SAFETY comments.
//! Dependency direction: stdio -> resource -> signal

pub mod resource;
pub mod signal;
pub mod stdio;

#[cfg(windows)]
pub(crate) mod win32;
