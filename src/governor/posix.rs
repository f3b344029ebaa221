use super::ResourceLimiter;
use crate::config::types::{Result, WorkerError};
use crate::kernel::resource;
use log::debug;

/// `nice(2)` plus an optional soft RLIMIT_AS.
pub struct PosixLimiter {
    nice_increment: i32,
    address_space_cap: Option<u64>,
}

impl PosixLimiter {
    pub fn new(nice_increment: i32, address_space_cap: Option<u64>) -> Self {
        Self {
            nice_increment,
            address_space_cap,
        }
    }
}

impl ResourceLimiter for PosixLimiter {
    fn name(&self) -> &'static str {
        "posix-niceness"
    }

    fn limit_address_space(&self) -> Result<()> {
        let Some(cap) = self.address_space_cap else {
            return Ok(());
        };

        let applied = resource::cap_address_space(cap).map_err(|e| {
            WorkerError::ResourceLimit(format!("RLIMIT_AS={} rejected: {}", cap, e))
        })?;
        debug!("Address space soft limit set to {} bytes", applied);
        Ok(())
    }

    fn lower_priority(&self) -> Result<()> {
        let niceness = resource::lower_priority(self.nice_increment)?;
        debug!("Process niceness is now {}", niceness);
        Ok(())
    }
}
