//! In-memory link that records every frame it is asked to send.
//!
//! Used by host tools and tests to observe traffic without hardware, to
//! inject send failures, and (through a send hook) to loop frames back into
//! a receiving engine.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::trace;

use crate::error::{LinkError, Result};
use crate::traits::Link;

type SendHook = Box<dyn FnMut(&[u8]) + Send>;

#[derive(Default)]
struct MemoryState {
    sent: Vec<Bytes>,
    total_sent: usize,
    fail_sends: bool,
    init_calls: usize,
}

#[derive(Default)]
struct Shared {
    state: Mutex<MemoryState>,
    sent_cond: Condvar,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Link half, owned by the dispatcher.
pub struct MemoryLink {
    shared: Arc<Shared>,
    hook: Option<SendHook>,
}

/// Observer half, kept by the test or tool.
#[derive(Clone)]
pub struct MemoryLinkHandle {
    shared: Arc<Shared>,
}

impl MemoryLink {
    /// Create a recording link and its observer handle.
    pub fn new() -> (Self, MemoryLinkHandle) {
        let shared = Arc::new(Shared::default());
        let link = Self {
            shared: Arc::clone(&shared),
            hook: None,
        };
        (link, MemoryLinkHandle { shared })
    }

    /// Create a recording link that also passes each sent frame to `hook`,
    /// after it has been recorded.
    pub fn with_hook<F>(hook: F) -> (Self, MemoryLinkHandle)
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        let (mut link, handle) = Self::new();
        link.hook = Some(Box::new(hook));
        (link, handle)
    }
}

impl Link for MemoryLink {
    fn init(&mut self) -> Result<()> {
        self.shared.state().init_calls += 1;
        Ok(())
    }

    fn send(&mut self, frame: &[u8]) -> Result<()> {
        {
            let mut state = self.shared.state();
            if state.fail_sends {
                return Err(LinkError::Rejected("memory link set to fail".to_string()));
            }
            state.sent.push(Bytes::copy_from_slice(frame));
            state.total_sent += 1;
        }
        self.shared.sent_cond.notify_all();
        trace!(len = frame.len(), "frame recorded");

        if let Some(hook) = self.hook.as_mut() {
            hook(frame);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

impl MemoryLinkHandle {
    /// Drain the frames recorded so far.
    pub fn take_sent(&self) -> Vec<Bytes> {
        std::mem::take(&mut self.shared.state().sent)
    }

    /// Frames sent since the link was created (including drained ones).
    pub fn total_sent(&self) -> usize {
        self.shared.state().total_sent
    }

    /// Make subsequent sends fail (or succeed again).
    pub fn set_fail_sends(&self, fail: bool) {
        self.shared.state().fail_sends = fail;
    }

    /// Number of times `init` was called.
    pub fn init_calls(&self) -> usize {
        self.shared.state().init_calls
    }

    /// Block until at least `count` frames have been sent in total, or the
    /// timeout elapses. Returns whether the count was reached.
    pub fn wait_for_sent(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state();
        while state.total_sent < count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            state = self
                .shared
                .sent_cond
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    #[test]
    fn records_sent_frames() {
        let (mut link, handle) = MemoryLink::new();
        link.init().unwrap();
        link.send(b"abc").unwrap();
        link.send(b"def").unwrap();

        assert_eq!(handle.init_calls(), 1);
        assert_eq!(handle.total_sent(), 2);
        let sent = handle.take_sent();
        assert_eq!(sent, vec![Bytes::from_static(b"abc"), Bytes::from_static(b"def")]);
        assert!(handle.take_sent().is_empty());
        assert_eq!(handle.total_sent(), 2);
    }

    #[test]
    fn injected_failure_rejects_and_records_nothing() {
        let (mut link, handle) = MemoryLink::new();
        handle.set_fail_sends(true);

        let err = link.send(b"abc").unwrap_err();
        assert!(matches!(err, LinkError::Rejected(_)));
        assert_eq!(handle.total_sent(), 0);

        handle.set_fail_sends(false);
        link.send(b"abc").unwrap();
        assert_eq!(handle.total_sent(), 1);
    }

    #[test]
    fn hook_sees_each_frame() {
        let (tx, rx) = mpsc::channel();
        let (mut link, _handle) = MemoryLink::with_hook(move |frame| {
            tx.send(frame.to_vec()).unwrap();
        });

        link.send(b"loop").unwrap();
        assert_eq!(rx.recv().unwrap(), b"loop".to_vec());
    }

    #[test]
    fn wait_for_sent_wakes_on_send() {
        let (mut link, handle) = MemoryLink::new();
        let sender = std::thread::spawn(move || {
            link.send(b"late").unwrap();
        });

        assert!(handle.wait_for_sent(1, Duration::from_secs(5)));
        sender.join().unwrap();
    }

    #[test]
    fn wait_for_sent_times_out() {
        let (_link, handle) = MemoryLink::new();
        assert!(!handle.wait_for_sent(1, Duration::from_millis(10)));
    }
}
