use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

/// Live engine counters, updated without locking from any thread.
#[derive(Debug, Default)]
pub struct EngineStats {
    frames_sent: AtomicU64,
    send_failures: AtomicU64,
    frames_received: AtomicU64,
    responses_matched: AtomicU64,
    frames_routed: AtomicU64,
    unregistered_drops: AtomicU64,
    receive_drops: AtomicU64,
    gc_reclaimed: AtomicU64,
    heartbeats_received: AtomicU64,
    handler_panics: AtomicU64,
    last_heartbeat: Mutex<Option<Instant>>,
}

/// Point-in-time copy of [`EngineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStatsSnapshot {
    /// Frames handed to the link successfully.
    pub frames_sent: u64,
    /// Frames the link refused or failed to pack.
    pub send_failures: u64,
    /// Frames taken off the RX queue.
    pub frames_received: u64,
    /// RESPONSE frames matched to a waiting command.
    pub responses_matched: u64,
    /// Frames passed to a target handler.
    pub frames_routed: u64,
    /// Frames dropped because no handler was registered.
    pub unregistered_drops: u64,
    /// Incoming frames dropped before the RX queue (pool or queue full).
    pub receive_drops: u64,
    /// In-flight commands abandoned by age.
    pub gc_reclaimed: u64,
    /// HEARTBEAT frames received.
    pub heartbeats_received: u64,
    /// Target handlers or response callbacks that panicked.
    pub handler_panics: u64,
    /// Arrival time of the most recent HEARTBEAT.
    pub last_heartbeat: Option<Instant>,
}

macro_rules! counters {
    ($($name:ident => $field:ident),* $(,)?) => {
        $(
            pub(crate) fn $name(&self) {
                self.$field.fetch_add(1, Ordering::Relaxed);
            }
        )*
    };
}

impl EngineStats {
    counters! {
        record_sent => frames_sent,
        record_send_failure => send_failures,
        record_received => frames_received,
        record_response => responses_matched,
        record_routed => frames_routed,
        record_unregistered => unregistered_drops,
        record_receive_drop => receive_drops,
        record_handler_panic => handler_panics,
    }

    pub(crate) fn record_reclaimed(&self, count: usize) {
        self.gc_reclaimed.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_heartbeat(&self, at: Instant) {
        self.heartbeats_received.fetch_add(1, Ordering::Relaxed);
        *self
            .last_heartbeat
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(at);
    }

    /// Copy the current counters.
    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            responses_matched: self.responses_matched.load(Ordering::Relaxed),
            frames_routed: self.frames_routed.load(Ordering::Relaxed),
            unregistered_drops: self.unregistered_drops.load(Ordering::Relaxed),
            receive_drops: self.receive_drops.load(Ordering::Relaxed),
            gc_reclaimed: self.gc_reclaimed.load(Ordering::Relaxed),
            heartbeats_received: self.heartbeats_received.load(Ordering::Relaxed),
            handler_panics: self.handler_panics.load(Ordering::Relaxed),
            last_heartbeat: *self
                .last_heartbeat
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let stats = EngineStats::default();
        stats.record_sent();
        stats.record_sent();
        stats.record_unregistered();
        stats.record_reclaimed(3);
        stats.record_handler_panic();
        let at = Instant::now();
        stats.record_heartbeat(at);

        let snap = stats.snapshot();
        assert_eq!(snap.frames_sent, 2);
        assert_eq!(snap.unregistered_drops, 1);
        assert_eq!(snap.gc_reclaimed, 3);
        assert_eq!(snap.heartbeats_received, 1);
        assert_eq!(snap.last_heartbeat, Some(at));
        assert_eq!(snap.handler_panics, 1);
        assert_eq!(snap.send_failures, 0);
    }
}
