use super::ResourceLimiter;
use crate::config::types::{Result, WorkerError};
use crate::kernel::win32;
use log::debug;

/// Below-normal priority class plus a large no-access reservation.
///
/// Reserving address space costs no RAM or swap; it only shrinks what the
/// process can commit later, acting as a crude out-of-memory guard.
pub struct WindowsLimiter {
    reservation_bytes: usize,
}

impl WindowsLimiter {
    pub fn new(reservation_bytes: usize) -> Self {
        Self { reservation_bytes }
    }
}

impl ResourceLimiter for WindowsLimiter {
    fn name(&self) -> &'static str {
        "windows-priority-and-reservation"
    }

    fn limit_address_space(&self) -> Result<()> {
        let base = win32::reserve_address_space(self.reservation_bytes).map_err(|e| {
            WorkerError::ResourceLimit(format!(
                "reserving {} bytes failed: {}",
                self.reservation_bytes, e
            ))
        })?;
        debug!(
            "Reserved {} bytes of address space at {:#x}",
            self.reservation_bytes, base
        );
        Ok(())
    }

    fn lower_priority(&self) -> Result<()> {
        win32::set_below_normal_priority()?;
        Ok(())
    }
}
