//! Tunables for the connection manager's background tasks.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Interval between heartbeat sweeps.
    pub heartbeat_interval: Duration,
    /// `retry:` hint (ms) attached to heartbeat frames.
    pub heartbeat_retry_ms: u64,
    /// Interval between cleanup sweeps.
    pub cleanup_interval: Duration,
    /// A connection idle longer than this is evicted with reason "timeout".
    pub idle_timeout: Duration,
    /// Per-connection ring buffer size (events retained for replay).
    pub buffer_size: usize,
    /// TTL applied to shared-store connection/buffer entries.
    pub buffer_ttl: Duration,
    /// Soft backpressure threshold, in multiples of `buffer_size`.
    pub backpressure_soft_multiplier: usize,
    /// Hard backpressure threshold, in multiples of `buffer_size`.
    pub backpressure_hard_multiplier: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_retry_ms: 30_000,
            cleanup_interval: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(300),
            buffer_size: 100,
            buffer_ttl: Duration::from_secs(3600),
            backpressure_soft_multiplier: 1,
            backpressure_hard_multiplier: 4,
        }
    }
}
