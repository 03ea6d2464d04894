use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use icmp_link::Link;
use tracing::{debug, warn};

use crate::engine::IcmpEngine;
use crate::error::{EngineError, Result};

/// Owner of the dispatch worker thread started by
/// [`IcmpEngine::start`].
///
/// Dropping the handle stops and joins the worker.
#[derive(Debug)]
pub struct DispatchHandle {
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl DispatchHandle {
    pub(crate) fn spawn<L, const N: usize>(engine: Arc<IcmpEngine<N>>, mut link: L) -> Result<Self>
    where
        L: Link + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let worker = thread::Builder::new()
            .name("icmp-dispatch".to_string())
            .spawn(move || engine.run(&mut link, &flag))
            .map_err(|source| EngineError::Spawn {
                name: "dispatch",
                source,
            })?;
        debug!("dispatch worker spawned");
        Ok(Self {
            stop,
            worker: Some(worker),
        })
    }

    /// True while the worker thread is alive.
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.is_finished())
    }

    /// Stop the loop and wait for the worker to exit.
    ///
    /// Frames still queued for transmit stay in the engine.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> Result<()> {
        self.stop.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| EngineError::WorkerPanicked("dispatch"))?;
        }
        Ok(())
    }
}

impl Drop for DispatchHandle {
    fn drop(&mut self) {
        if let Err(err) = self.stop_and_join() {
            warn!(error = %err, "dispatch worker ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use icmp_link::MemoryLink;

    use super::*;

    #[test]
    fn worker_drains_tx_queue() {
        let engine = Arc::new(IcmpEngine::new());
        let (link, handle) = MemoryLink::new();
        let dispatcher = engine.start(link).unwrap();

        for target in 0..4 {
            engine.notify(target, b"tick").unwrap();
        }
        assert!(handle.wait_for_sent(4, Duration::from_secs(5)));

        dispatcher.shutdown().unwrap();
        assert_eq!(engine.pool().in_use(), 0);
    }

    #[test]
    fn drop_stops_worker() {
        let engine = Arc::new(IcmpEngine::new());
        let (link, _handle) = MemoryLink::new();
        let dispatcher = engine.start(link).unwrap();
        drop(dispatcher);
        // The worker held the only other reference.
        assert_eq!(Arc::strong_count(&engine), 1);
    }

    #[test]
    fn handler_panic_does_not_stop_worker() {
        let engine = Arc::new(IcmpEngine::new());
        let (seen_tx, seen) = std::sync::mpsc::channel();
        engine
            .register_target(1, move |frame: &icmp_frame::Frame| {
                if frame.payload() == b"bad" {
                    panic!("handler rejected payload");
                }
                let _ = seen_tx.send(frame.payload().to_vec());
            })
            .unwrap();
        let (link, handle) = MemoryLink::new();
        let dispatcher = engine.start(link).unwrap();

        engine
            .deliver_frame(&icmp_frame::Frame::notify(1, b"bad").unwrap())
            .unwrap();
        engine
            .deliver_frame(&icmp_frame::Frame::notify(1, b"good").unwrap())
            .unwrap();
        engine.notify(2, b"after").unwrap();

        assert_eq!(seen.recv_timeout(Duration::from_secs(5)).unwrap(), b"good");
        assert!(handle.wait_for_sent(1, Duration::from_secs(5)));
        assert!(dispatcher.is_running());

        let stats = engine.stats();
        assert_eq!(stats.handler_panics, 1);
        assert_eq!(stats.frames_routed, 2);

        dispatcher.shutdown().unwrap();
        assert_eq!(engine.rx_pending(), 0);
        assert_eq!(engine.pool().in_use(), 0);
    }
}
