use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use icmp_frame::Frame;
use tracing::debug;

use crate::error::{EngineError, Result};

/// Application handler for frames addressed to one target.
///
/// Handlers run on the dispatch thread and must return quickly; anything
/// slow belongs on another thread fed through a channel.
pub trait TargetHandler: Send + Sync {
    /// Handle a NOTIFY, COMMAND or unmatched RESPONSE frame.
    fn handle(&self, frame: &Frame);
}

impl<F> TargetHandler for F
where
    F: Fn(&Frame) + Send + Sync,
{
    fn handle(&self, frame: &Frame) {
        self(frame)
    }
}

/// Fixed-size map from target ID to handler.
///
/// Registration overwrites; there is no removal. Lookups clone the handler
/// out so it runs without the lock held.
pub struct TargetRegistry {
    slots: RwLock<Vec<Option<Arc<dyn TargetHandler>>>>,
    capacity: usize,
}

impl TargetRegistry {
    /// Create a registry for targets `0..capacity`.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: RwLock::new(vec![None; capacity]),
            capacity,
        }
    }

    /// Install `handler` for `target`, replacing any previous one.
    pub fn register<H>(&self, target: u8, handler: H) -> Result<()>
    where
        H: TargetHandler + 'static,
    {
        if target as usize >= self.capacity {
            return Err(EngineError::InvalidTarget {
                target,
                max: self.capacity,
            });
        }
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let replaced = slots[target as usize].replace(Arc::new(handler)).is_some();
        debug!(target_id = target, replaced, "target handler registered");
        Ok(())
    }

    /// Handler registered for `target`, if any.
    pub fn handler(&self, target: u8) -> Option<Arc<dyn TargetHandler>> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.get(target as usize).and_then(|slot| slot.clone())
    }

    /// True if `target` has a handler.
    pub fn is_registered(&self, target: u8) -> bool {
        self.handler(target).is_some()
    }

    /// Number of target slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl fmt::Debug for TargetRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        let registered: Vec<usize> = slots
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_ref().map(|_| id))
            .collect();
        f.debug_struct("TargetRegistry")
            .field("capacity", &self.capacity)
            .field("registered", &registered)
            .finish()
    }
}
