//! Tunables of the driver core.

use core::time::Duration;
use serde_derive::Deserialize;

/// Bounds and step sizes of every bounded loop in the driver.
///
/// Missing fields take their default when deserialized, so a config file
/// only needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Polls of a DMA handshake bit before giving up with `TIMEOUT`.
    pub dma_poll_limit: u32,
    /// Delay between two handshake polls.
    pub dma_poll_delay_us: u64,
    /// Sleep after a forced abort when a busy channel is closed.
    pub close_grace_ms: u64,
    /// Retries while waiting for the sleepers of a canceled wait object.
    pub cancel_drain_retries: u32,
    pub cancel_drain_step_ms: u64,
    /// Retries while waiting for a queued deferred handler during stop.
    pub dpc_drain_retries: u32,
    pub dpc_drain_step_ms: u64,
    /// Percentage a failed physical memory request shrinks by per retry.
    pub alloc_shrink_percent: u32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            dma_poll_limit: 500,
            dma_poll_delay_us: 0,
            close_grace_ms: 100,
            cancel_drain_retries: 20,
            cancel_drain_step_ms: 10,
            dpc_drain_retries: 100,
            dpc_drain_step_ms: 10,
            alloc_shrink_percent: 10,
        }
    }
}

impl DriverConfig {
    pub(crate) fn dma_poll_delay(&self) -> Option<Duration> {
        match self.dma_poll_delay_us {
            0 => None,
            us => Some(Duration::from_micros(us)),
        }
    }

    pub(crate) fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }

    pub(crate) fn cancel_drain_step(&self) -> Duration {
        Duration::from_millis(self.cancel_drain_step_ms)
    }

    pub(crate) fn dpc_drain_step(&self) -> Duration {
        Duration::from_millis(self.dpc_drain_step_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: DriverConfig = toml::from_str(
            r#"
            dma_poll_limit = 8
            close_grace_ms = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.dma_poll_limit, 8);
        assert_eq!(config.close_grace(), Duration::from_millis(0));
        assert_eq!(config.alloc_shrink_percent, 10);
        assert_eq!(config.cancel_drain_retries, 20);
        assert!(config.dma_poll_delay().is_none());
    }
}
