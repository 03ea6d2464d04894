//! Bounded FIFO handing frame ownership from producers to the dispatcher.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::QueueError;

/// How long a queue operation may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Fail immediately. Use this on latency-sensitive paths.
    NoWait,
    /// Wait at most this long.
    After(Duration),
    /// Wait until the operation can complete.
    Forever,
}

impl Timeout {
    fn deadline(self) -> Option<Option<Instant>> {
        match self {
            Timeout::NoWait => None,
            Timeout::After(d) => Some(Some(Instant::now() + d)),
            Timeout::Forever => Some(None),
        }
    }
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        if d.is_zero() {
            Timeout::NoWait
        } else {
            Timeout::After(d)
        }
    }
}

/// Fixed-depth FIFO with timed enqueue and dequeue.
///
/// Dequeue order is exactly enqueue order. Each queue has its own lock,
/// held only while pushing or popping.
pub struct FrameQueue<T> {
    name: &'static str,
    depth: usize,
    items: Mutex<VecDeque<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> FrameQueue<T> {
    /// Create a queue holding at most `depth` items.
    pub fn new(name: &'static str, depth: usize) -> Self {
        Self {
            name,
            depth,
            items: Mutex::new(VecDeque::with_capacity(depth)),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Append `item`, waiting up to `timeout` for room.
    ///
    /// On failure the item is dropped; pooled frames go back to their pool.
    pub fn enqueue(&self, item: T, timeout: Timeout) -> Result<(), QueueError> {
        let mut items = self.lock();
        if items.len() >= self.depth {
            let Some(deadline) = timeout.deadline() else {
                return Err(self.full());
            };
            items = self.wait_while(&self.not_full, items, deadline, |q| q.len() >= self.depth);
            if items.len() >= self.depth {
                return Err(self.full());
            }
        }
        items.push_back(item);
        drop(items);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Remove the oldest item, waiting up to `timeout` for one to arrive.
    pub fn dequeue(&self, timeout: Timeout) -> Result<T, QueueError> {
        let mut items = self.lock();
        if items.is_empty() {
            let Some(deadline) = timeout.deadline() else {
                return Err(self.empty());
            };
            items = self.wait_while(&self.not_empty, items, deadline, VecDeque::is_empty);
        }
        let item = items.pop_front().ok_or_else(|| self.empty())?;
        drop(items);
        self.not_full.notify_one();
        Ok(item)
    }

    /// Block until the queue is non-empty or `timeout` elapses, without
    /// removing anything. Returns whether an item is available.
    pub fn wait_nonempty(&self, timeout: Duration) -> bool {
        let items = self.lock();
        if !items.is_empty() {
            return true;
        }
        let deadline = Some(Instant::now() + timeout);
        let items = self.wait_while(&self.not_empty, items, deadline, VecDeque::is_empty);
        let ready = !items.is_empty();
        drop(items);
        if ready {
            // The wakeup was consumed here; pass it on to a real consumer.
            self.not_empty.notify_one();
        }
        ready
    }

    /// Items currently queued.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Maximum number of queued items.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Queue name used in errors and logs.
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_while<'a>(
        &self,
        cond: &Condvar,
        mut items: MutexGuard<'a, VecDeque<T>>,
        deadline: Option<Instant>,
        blocked: impl Fn(&VecDeque<T>) -> bool,
    ) -> MutexGuard<'a, VecDeque<T>> {
        while blocked(&items) {
            match deadline {
                None => {
                    items = cond.wait(items).unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        break;
                    }
                    items = cond
                        .wait_timeout(items, remaining)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
        items
    }

    fn full(&self) -> QueueError {
        QueueError::Full {
            queue: self.name,
            depth: self.depth,
        }
    }

    fn empty(&self) -> QueueError {
        QueueError::Empty { queue: self.name }
    }
}

impl<T> fmt::Debug for FrameQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameQueue")
            .field("name", &self.name)
            .field("depth", &self.depth)
            .field("len", &self.len())
            .finish()
    }
}
