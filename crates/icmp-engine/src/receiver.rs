//! Receive pump: link bytes in, RX queue out.

use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use icmp_frame::{FrameError, FrameReader};
use tracing::{debug, warn};

use crate::engine::IcmpEngine;
use crate::error::{EngineError, Result};

/// Totals reported when a receive pump exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiveSummary {
    /// Checksum-valid frames read from the link.
    pub frames: u64,
    /// Frames the engine could not accept (pool or RX queue full).
    pub dropped: u64,
    /// Noise bytes skipped while resynchronising.
    pub discarded_bytes: u64,
}

/// Owner of a receive pump thread started by [`spawn_receiver`].
#[derive(Debug)]
pub struct ReceiverHandle {
    stop: Arc<AtomicBool>,
    worker: JoinHandle<ReceiveSummary>,
}

impl ReceiverHandle {
    /// Ask the pump to exit at its next read timeout.
    ///
    /// A pump blocked on a stream without a read timeout only exits when
    /// the stream closes.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// True once the pump has exited.
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Wait for the pump to exit.
    pub fn join(self) -> Result<ReceiveSummary> {
        self.worker
            .join()
            .map_err(|_| EngineError::WorkerPanicked("receive"))
    }
}

/// Read frames from `reader` on a new thread and deliver each one to
/// `engine` until the stream closes or fails.
pub fn spawn_receiver<R, const N: usize>(
    engine: Arc<IcmpEngine<N>>,
    mut reader: FrameReader<R>,
) -> Result<ReceiverHandle>
where
    R: Read + Send + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    let worker = thread::Builder::new()
        .name("icmp-receive".to_string())
        .spawn(move || pump(&engine, &mut reader, &flag))
        .map_err(|source| EngineError::Spawn {
            name: "receive",
            source,
        })?;
    Ok(ReceiverHandle { stop, worker })
}

fn pump<R: Read, const N: usize>(
    engine: &IcmpEngine<N>,
    reader: &mut FrameReader<R>,
    stop: &AtomicBool,
) -> ReceiveSummary {
    let mut summary = ReceiveSummary::default();
    while !stop.load(Ordering::Acquire) {
        match reader.read_frame() {
            Ok(frame) => {
                summary.frames += 1;
                if engine.deliver_frame(&frame).is_err() {
                    summary.dropped += 1;
                }
            }
            Err(FrameError::Io(err))
                if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                continue;
            }
            Err(FrameError::ConnectionClosed) => {
                debug!("link closed; receive pump exiting");
                break;
            }
            Err(err) => {
                warn!(error = %err, "link read failed; receive pump exiting");
                break;
            }
        }
    }
    summary.discarded_bytes = reader.discarded_bytes();
    debug!(
        frames = summary.frames,
        dropped = summary.dropped,
        discarded_bytes = summary.discarded_bytes,
        "receive pump finished"
    );
    summary
}
