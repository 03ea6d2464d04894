//! Correlation of outgoing commands with their responses.
//!
//! Message IDs are tracked in a bitmap guarded by one lock together with
//! the per-ID entries. Only four operations touch it: allocate, stamp,
//! consume and collect. Callbacks are always moved out of the table and
//! run after the lock is released.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::error::{EngineError, Result};

/// Callback run with the payload of the matching RESPONSE.
pub type ResponseCallback = Box<dyn FnOnce(&[u8]) + Send>;

/// Largest supported ID space; the bitmap is a `u32`.
pub const MAX_INFLIGHT_CAPACITY: usize = 32;

/// An in-flight command removed from the table.
pub struct InflightEntry {
    msg_id: u8,
    sent_at: Option<Instant>,
    callback: ResponseCallback,
}

impl InflightEntry {
    /// The message ID this entry was registered under.
    pub fn msg_id(&self) -> u8 {
        self.msg_id
    }

    /// When the command reached the link, if it has.
    pub fn sent_at(&self) -> Option<Instant> {
        self.sent_at
    }

    /// Run the response callback.
    pub fn complete(self, payload: &[u8]) {
        (self.callback)(payload);
    }
}

impl fmt::Debug for InflightEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InflightEntry")
            .field("msg_id", &self.msg_id)
            .field("sent_at", &self.sent_at)
            .finish_non_exhaustive()
    }
}

struct Slot {
    sent_at: Option<Instant>,
    callback: ResponseCallback,
}

struct TableState<const N: usize> {
    bitmap: u32,
    slots: [Option<Slot>; N],
}

/// Fixed-capacity table of commands awaiting a response, keyed by
/// message ID `0..N`.
pub struct InflightTable<const N: usize> {
    state: Mutex<TableState<N>>,
}

impl<const N: usize> InflightTable<N> {
    const CAPACITY_CHECK: () = assert!(
        N >= 1 && N <= MAX_INFLIGHT_CAPACITY,
        "in-flight capacity must be between 1 and 32"
    );

    const MASK: u32 = if N >= 32 { u32::MAX } else { (1u32 << N) - 1 };

    /// Create an empty table.
    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::CAPACITY_CHECK;
        Self {
            state: Mutex::new(TableState {
                bitmap: 0,
                slots: std::array::from_fn(|_| None),
            }),
        }
    }

    /// Reserve the lowest free message ID for a command.
    ///
    /// The entry starts without a timestamp and is not aged out until
    /// [`stamp_sent`](Self::stamp_sent) records when it reached the link.
    pub fn allocate(&self, callback: ResponseCallback) -> Result<u8> {
        let mut state = self.lock();
        let free = !state.bitmap & Self::MASK;
        if free == 0 {
            return Err(EngineError::InflightExhausted { capacity: N });
        }
        let id = free.trailing_zeros() as usize;
        state.bitmap |= 1 << id;
        state.slots[id] = Some(Slot {
            sent_at: None,
            callback,
        });
        trace!(msg_id = id, "in-flight ID allocated");
        Ok(id as u8)
    }

    /// Record when the command carrying `msg_id` was handed to the link.
    ///
    /// Returns false if the ID is not allocated.
    pub fn stamp_sent(&self, msg_id: u8, now: Instant) -> bool {
        let mut state = self.lock();
        match Self::slot_mut(&mut state, msg_id) {
            Some(slot) => {
                slot.sent_at = Some(now);
                true
            }
            None => false,
        }
    }

    /// Remove and return the entry for `msg_id`, if one is waiting.
    ///
    /// `None` is the normal result for unknown, already answered or
    /// collected IDs.
    pub fn try_consume_response(&self, msg_id: u8) -> Option<InflightEntry> {
        let mut state = self.lock();
        let slot = Self::take(&mut state, msg_id)?;
        Some(InflightEntry {
            msg_id,
            sent_at: slot.sent_at,
            callback: slot.callback,
        })
    }

    /// Drop an entry without running its callback, e.g. when the command
    /// could not be queued. Returns whether the ID was allocated.
    pub fn release(&self, msg_id: u8) -> bool {
        let slot = Self::take(&mut self.lock(), msg_id);
        slot.is_some()
    }

    /// Abandon every sent command older than `max_age` at `now`.
    ///
    /// Reclaimed callbacks are dropped without being called. Returns the
    /// number of IDs freed.
    pub fn garbage_collect(&self, now: Instant, max_age: Duration) -> usize {
        let mut reclaimed = Vec::new();
        {
            let mut state = self.lock();
            let mut pending = state.bitmap;
            while pending != 0 {
                let id = pending.trailing_zeros() as usize;
                pending &= pending - 1;
                let expired = state.slots[id]
                    .as_ref()
                    .and_then(|slot| slot.sent_at)
                    .is_some_and(|sent| now.saturating_duration_since(sent) > max_age);
                if expired {
                    state.bitmap &= !(1 << id);
                    if let Some(slot) = state.slots[id].take() {
                        reclaimed.push((id, slot));
                    }
                }
            }
        }
        for (id, _) in &reclaimed {
            debug!(msg_id = id, "in-flight command abandoned after max age");
        }
        reclaimed.len()
    }

    /// IDs currently awaiting a response.
    pub fn in_flight(&self) -> usize {
        self.lock().bitmap.count_ones() as usize
    }

    /// True if `msg_id` is allocated.
    pub fn is_allocated(&self, msg_id: u8) -> bool {
        (msg_id as usize) < N && self.lock().bitmap & (1 << msg_id) != 0
    }

    /// Size of the ID space.
    pub const fn capacity(&self) -> usize {
        N
    }

    fn lock(&self) -> MutexGuard<'_, TableState<N>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot_mut(state: &mut TableState<N>, msg_id: u8) -> Option<&mut Slot> {
        let id = msg_id as usize;
        if id >= N || state.bitmap & (1 << id) == 0 {
            return None;
        }
        state.slots[id].as_mut()
    }

    fn take(state: &mut TableState<N>, msg_id: u8) -> Option<Slot> {
        let id = msg_id as usize;
        if id >= N || state.bitmap & (1 << id) == 0 {
            return None;
        }
        state.bitmap &= !(1 << id);
        state.slots[id].take()
    }
}

impl<const N: usize> Default for InflightTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Debug for InflightTable<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InflightTable")
            .field("capacity", &N)
            .field("bitmap", &format_args!("{:#010x}", self.lock().bitmap))
            .finish()
    }
}
