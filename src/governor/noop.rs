use super::ResourceLimiter;
use crate::config::types::Result;

/// Limiter for platforms without a supported primitive, or when disabled.
pub struct NoopLimiter;

impl ResourceLimiter for NoopLimiter {
    fn name(&self) -> &'static str {
        "no-op"
    }

    fn limit_address_space(&self) -> Result<()> {
        Ok(())
    }

    fn lower_priority(&self) -> Result<()> {
        Ok(())
    }
}
