//! Fixed-capacity slab of frame buffers.
//!
//! Every frame travelling through the protocol lives in a pool slot, which
//! bounds the memory held by queued and in-flight traffic. Allocation never
//! blocks: when every slot is taken the caller gets
//! [`FrameError::PoolExhausted`] immediately, so the pool is safe to use from
//! receive paths and the transmit hot path.
//!
//! A slot is returned when its [`PooledFrame`] handle is dropped, so each
//! slot is released exactly once.

use std::fmt;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::codec::Frame;
use crate::error::{FrameError, Result};

struct PoolInner {
    free: Mutex<Vec<Frame>>,
    capacity: usize,
    in_use: AtomicUsize,
}

impl PoolInner {
    fn slots(&self) -> MutexGuard<'_, Vec<Frame>> {
        // Critical sections only push/pop, so a poisoned lock still holds a consistent list.
        self.free.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared handle to a frame pool. Clones refer to the same slots.
#[derive(Clone)]
pub struct FramePool {
    inner: Arc<PoolInner>,
}

impl FramePool {
    /// Create a pool with `capacity` pre-allocated frame slots.
    pub fn new(capacity: usize) -> Self {
        let free = (0..capacity).map(|_| Frame::default()).collect();
        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(free),
                capacity,
                in_use: AtomicUsize::new(0),
            }),
        }
    }

    /// Take a cleared frame slot, failing immediately if none is free.
    pub fn alloc(&self) -> Result<PooledFrame> {
        let mut slots = self.inner.slots();
        match slots.pop() {
            Some(frame) => {
                let in_use = self.inner.in_use.fetch_add(1, Ordering::AcqRel) + 1;
                drop(slots);
                trace!(in_use, capacity = self.inner.capacity, "frame allocated");
                Ok(PooledFrame {
                    frame,
                    pool: Arc::clone(&self.inner),
                })
            }
            None => Err(FrameError::PoolExhausted {
                capacity: self.inner.capacity,
            }),
        }
    }

    /// Return a frame to its pool. Equivalent to dropping the handle.
    pub fn free(&self, frame: PooledFrame) {
        debug_assert!(
            Arc::ptr_eq(&self.inner, &frame.pool),
            "frame freed to a different pool"
        );
        drop(frame);
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Slots currently handed out.
    pub fn in_use(&self) -> usize {
        self.inner.in_use.load(Ordering::Acquire)
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.capacity() - self.in_use()
    }
}

impl fmt::Debug for FramePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramePool")
            .field("capacity", &self.capacity())
            .field("in_use", &self.in_use())
            .finish()
    }
}

/// Exclusive ownership of one pool slot.
pub struct PooledFrame {
    frame: Frame,
    pool: Arc<PoolInner>,
}

impl Deref for PooledFrame {
    type Target = Frame;

    fn deref(&self) -> &Frame {
        &self.frame
    }
}

impl DerefMut for PooledFrame {
    fn deref_mut(&mut self) -> &mut Frame {
        &mut self.frame
    }
}

impl Drop for PooledFrame {
    fn drop(&mut self) {
        let mut frame = mem::take(&mut self.frame);
        frame.clear();
        self.pool.slots().push(frame);
        self.pool.in_use.fetch_sub(1, Ordering::AcqRel);
    }
}

impl fmt::Debug for PooledFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}
