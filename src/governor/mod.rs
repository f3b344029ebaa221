//! Best-effort resource governance.
//!
//! Resource shaping is an optimization, never a correctness requirement:
//! [`ResourceGovernor::apply_limits`] cannot fail. Each limiter step that
//! errors is logged and skipped.

mod noop;
#[cfg(unix)]
mod posix;
#[cfg(windows)]
mod windows;

pub use noop::NoopLimiter;
#[cfg(unix)]
pub use posix::PosixLimiter;
#[cfg(windows)]
pub use windows::WindowsLimiter;

use crate::config::types::{ResourceLimits, Result};
use log::{debug, info, warn};

/// One platform's way of bounding CPU priority and address space.
pub trait ResourceLimiter {
    fn name(&self) -> &'static str;

    /// Cap (or reserve away) address space. Failure here is expected on
    /// fragmented address spaces and is logged at debug only.
    fn limit_address_space(&self) -> Result<()>;

    /// Lower the process's scheduling priority.
    fn lower_priority(&self) -> Result<()>;
}

/// Applies a [`ResourceLimiter`] once at startup.
pub struct ResourceGovernor {
    limiter: Box<dyn ResourceLimiter>,
}

impl ResourceGovernor {
    pub fn new(limiter: Box<dyn ResourceLimiter>) -> Self {
        Self { limiter }
    }

    /// Pick the limiter for the running platform.
    pub fn for_platform(limits: &ResourceLimits) -> Self {
        if !limits.enabled {
            return Self::new(Box::new(NoopLimiter));
        }

        #[cfg(unix)]
        {
            Self::new(Box::new(PosixLimiter::new(
                limits.nice_increment,
                limits.address_space_cap,
            )))
        }

        #[cfg(windows)]
        {
            Self::new(Box::new(WindowsLimiter::new(limits.reservation_bytes)))
        }

        #[cfg(not(any(unix, windows)))]
        {
            Self::new(Box::new(NoopLimiter))
        }
    }

    #[cfg(test)]
    fn limiter_name(&self) -> &'static str {
        self.limiter.name()
    }

    /// Apply every limiter step. Never fails.
    pub fn apply_limits(&self) {
        let name = self.limiter.name();

        match self.limiter.limit_address_space() {
            Ok(()) => {}
            Err(e) => debug!("Failed to reduce address space ({}): {}", name, e),
        }

        match self.limiter.lower_priority() {
            Ok(()) => {}
            Err(e) => warn!("Failed to lower process CPU priority ({}): {}", name, e),
        }

        info!("Resource limits applied ({})", name);
    }
}
