use std::time::Duration;

use crate::error::{EngineError, Result};

/// Number of target handler slots.
pub const DEFAULT_MAX_TARGETS: usize = 8;
/// Frames shared by the TX queue, the RX queue and frames being built.
pub const DEFAULT_MAX_MEM_SLAB_FRAMES: usize = 16;
/// Depth of each of the TX and RX queues.
pub const DEFAULT_QUEUE_DEPTH: usize = 8;
/// Width of the in-flight message ID bitmap.
pub const DEFAULT_MAX_INFLIGHT_MSGS: usize = 32;
/// Age after which an unanswered command is abandoned.
pub const DEFAULT_MAX_INFLIGHT_MSG_AGE: Duration = Duration::from_millis(1000);
/// Longest the dispatch loop sleeps when there is nothing to do.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Upper bound on `max_targets`: targets are addressed by one byte.
pub const TARGET_ID_SPACE: usize = 256;

/// Capacities and timings for an [`IcmpEngine`](crate::IcmpEngine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Frame pool capacity.
    pub pool_frames: usize,
    /// TX queue depth.
    pub tx_queue_depth: usize,
    /// RX queue depth.
    pub rx_queue_depth: usize,
    /// Number of registrable targets (IDs `0..max_targets`).
    pub max_targets: usize,
    /// In-flight entries older than this are garbage-collected.
    pub max_inflight_age: Duration,
    /// Idle wait of the dispatch loop.
    pub poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool_frames: DEFAULT_MAX_MEM_SLAB_FRAMES,
            tx_queue_depth: DEFAULT_QUEUE_DEPTH,
            rx_queue_depth: DEFAULT_QUEUE_DEPTH,
            max_targets: DEFAULT_MAX_TARGETS,
            max_inflight_age: DEFAULT_MAX_INFLIGHT_MSG_AGE,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl EngineConfig {
    /// Check that every capacity is usable.
    pub fn validate(&self) -> Result<()> {
        let capacities = [
            ("pool_frames", self.pool_frames),
            ("tx_queue_depth", self.tx_queue_depth),
            ("rx_queue_depth", self.rx_queue_depth),
            ("max_targets", self.max_targets),
        ];
        for (name, value) in capacities {
            if value == 0 {
                return Err(EngineError::InvalidConfig(format!("{name} must be non-zero")));
            }
        }
        if self.max_targets > TARGET_ID_SPACE {
            return Err(EngineError::InvalidConfig(format!(
                "max_targets {} exceeds the {TARGET_ID_SPACE} addressable targets",
                self.max_targets
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(EngineError::InvalidConfig(
                "poll_interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
