//! The protocol context shared by API callers, the receive path and the
//! dispatch worker.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use icmp_frame::{
    pack, unpack, Frame, FrameError, FramePool, FrameType, PooledFrame, MAX_FRAME_SIZE,
    MAX_PAYLOAD_SIZE, NOTIFY_MSG_ID,
};
use icmp_link::Link;
use tracing::{debug, trace, warn};

use crate::config::{EngineConfig, DEFAULT_MAX_INFLIGHT_MSGS};
use crate::dispatch::DispatchHandle;
use crate::error::{EngineError, QueueError, Result};
use crate::inflight::InflightTable;
use crate::queue::{FrameQueue, Timeout};
use crate::registry::{TargetHandler, TargetRegistry};
use crate::stats::{EngineStats, EngineStatsSnapshot};

/// What the dispatcher did with one received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A RESPONSE completed the command waiting on `msg_id`.
    Response { msg_id: u8 },
    /// The frame went to the handler registered for `target`.
    Routed { target: u8 },
    /// No handler for `target`; the frame was dropped.
    Unregistered { target: u8 },
    /// A HEARTBEAT was recorded.
    Heartbeat,
}

/// Work done by one pass of the dispatch loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    /// A TX frame was taken and handed to the link (whether or not the
    /// link accepted it).
    pub transmitted: bool,
    /// Outcome for the RX frame handled in this pass, if any.
    pub dispatched: Option<Dispatch>,
    /// In-flight commands abandoned by age.
    pub reclaimed: usize,
}

impl PollReport {
    /// True when neither queue had anything to process.
    pub fn is_idle(&self) -> bool {
        !self.transmitted && self.dispatched.is_none()
    }
}

/// One protocol endpoint: frame pool, TX and RX queues, in-flight table
/// and target registry.
///
/// Share it behind an `Arc`. Any thread may call the send API
/// ([`notify`](Self::notify), [`command`](Self::command),
/// [`respond`](Self::respond)) and the receive API
/// ([`deliver_frame`](Self::deliver_frame)); exactly one worker runs the
/// dispatch loop, usually via [`start`](Self::start).
///
/// `N` is the number of commands that can await a response at once
/// (at most 32).
pub struct IcmpEngine<const N: usize = DEFAULT_MAX_INFLIGHT_MSGS> {
    config: EngineConfig,
    pool: FramePool,
    tx: FrameQueue<PooledFrame>,
    rx: FrameQueue<PooledFrame>,
    inflight: InflightTable<N>,
    registry: TargetRegistry,
    stats: EngineStats,
}

impl IcmpEngine {
    /// Create an engine with the default capacities.
    pub fn new() -> Self {
        Self::build(EngineConfig::default())
    }

    /// Create an engine with custom capacities.
    pub fn with_config(config: EngineConfig) -> Result<Self> {
        Self::from_config(config)
    }
}

impl Default for IcmpEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> IcmpEngine<N> {
    /// Create an engine with an explicit in-flight capacity, e.g.
    /// `IcmpEngine::<8>::from_config(config)`.
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: EngineConfig) -> Self {
        Self {
            pool: FramePool::new(config.pool_frames),
            tx: FrameQueue::new("tx", config.tx_queue_depth),
            rx: FrameQueue::new("rx", config.rx_queue_depth),
            inflight: InflightTable::new(),
            registry: TargetRegistry::new(config.max_targets),
            stats: EngineStats::default(),
            config,
        }
    }

    /// Install the handler for frames addressed to `target`.
    pub fn register_target<H>(&self, target: u8, handler: H) -> Result<()>
    where
        H: TargetHandler + 'static,
    {
        self.registry.register(target, handler)
    }

    /// Queue a fire-and-forget NOTIFY to `target`.
    pub fn notify(&self, target: u8, payload: &[u8]) -> Result<()> {
        let frame = self.build_frame(FrameType::Notify, NOTIFY_MSG_ID, target, payload)?;
        self.enqueue_tx(frame)
    }

    /// Queue a COMMAND to `target` and return its message ID.
    ///
    /// `on_response` runs on the dispatch thread with the payload of the
    /// matching RESPONSE. If none arrives within the configured maximum
    /// age the command is abandoned and `on_response` is dropped uncalled.
    /// This call never waits for the response.
    pub fn command<F>(&self, target: u8, payload: &[u8], on_response: F) -> Result<u8>
    where
        F: FnOnce(&[u8]) + Send + 'static,
    {
        check_payload(payload)?;
        let msg_id = self.inflight.allocate(Box::new(on_response))?;

        let queued = self
            .build_frame(FrameType::Command, msg_id, target, payload)
            .and_then(|frame| self.enqueue_tx(frame));
        if let Err(err) = queued {
            self.inflight.release(msg_id);
            return Err(err);
        }

        debug!(target_id = target, msg_id, len = payload.len(), "command queued");
        Ok(msg_id)
    }

    /// Queue a RESPONSE to a COMMAND received from the peer, echoing the
    /// peer's `msg_id`.
    pub fn respond(&self, target: u8, msg_id: u8, payload: &[u8]) -> Result<()> {
        let frame = self.build_frame(FrameType::Response, msg_id, target, payload)?;
        self.enqueue_tx(frame)
    }

    /// Queue a HEARTBEAT frame.
    pub fn heartbeat(&self) -> Result<()> {
        let frame = self.build_frame(FrameType::Heartbeat, NOTIFY_MSG_ID, 0, &[])?;
        self.enqueue_tx(frame)
    }

    /// Hand a decoded, checksum-valid frame from the link to the RX queue.
    ///
    /// Never blocks. When the pool or the RX queue is full the frame is
    /// dropped, logged and counted.
    pub fn deliver_frame(&self, frame: &Frame) -> Result<()> {
        if !frame.frame_type.is_valid() {
            self.stats.record_receive_drop();
            return Err(FrameError::InvalidType(frame.frame_type.as_u8()).into());
        }
        if frame.length as usize > MAX_PAYLOAD_SIZE {
            self.stats.record_receive_drop();
            return Err(FrameError::PayloadTooLarge {
                size: frame.length as usize,
                max: MAX_PAYLOAD_SIZE,
            }
            .into());
        }

        let mut slot = match self.pool.alloc() {
            Ok(slot) => slot,
            Err(err) => {
                self.stats.record_receive_drop();
                warn!(target_id = frame.target, error = %err, "no frame for received data; dropped");
                return Err(err.into());
            }
        };
        slot.clone_from(frame);

        if let Err(err) = self.rx.enqueue(slot, Timeout::NoWait) {
            self.stats.record_receive_drop();
            warn!(target_id = frame.target, error = %err, "received frame dropped");
            return Err(queue_error(err));
        }
        trace!(frame_type = %frame.frame_type, target_id = frame.target, "frame received");
        Ok(())
    }

    /// Unpack one received buffer and deliver it.
    ///
    /// Bytes after the frame are ignored, so a fixed-size receive buffer
    /// can be passed as is. Corrupted or malformed data never reaches the
    /// RX queue.
    pub fn deliver_bytes(&self, buf: &[u8]) -> Result<()> {
        match unpack(buf) {
            Ok(frame) => self.deliver_frame(&frame),
            Err(err) => {
                self.stats.record_receive_drop();
                debug!(
                    len = buf.len(),
                    corrupted = err.is_corruption(),
                    error = %err,
                    "received bytes rejected"
                );
                Err(err.into())
            }
        }
    }

    /// Run one pass of the dispatch loop: transmit at most one frame,
    /// dispatch at most one received frame, then collect aged commands.
    ///
    /// Never blocks.
    pub fn poll_once<L: Link + ?Sized>(&self, link: &mut L) -> PollReport {
        let transmitted = self.transmit_one(link);
        let dispatched = self.receive_one();
        let reclaimed = self.collect_garbage(Instant::now());
        PollReport {
            transmitted,
            dispatched,
            reclaimed,
        }
    }

    /// Run the dispatch loop on the current thread until `stop` is set.
    ///
    /// When both queues are empty the loop waits on the TX queue for at
    /// most the configured poll interval.
    pub fn run<L: Link + ?Sized>(&self, link: &mut L, stop: &AtomicBool) {
        debug!(link = link.name(), "dispatch loop started");
        while !stop.load(Ordering::Acquire) {
            if self.poll_once(link).is_idle() {
                self.tx.wait_nonempty(self.config.poll_interval);
            }
        }
        debug!(link = link.name(), "dispatch loop stopped");
    }

    /// Initialise `link` and run the dispatch loop on a new thread.
    pub fn start<L>(self: &Arc<Self>, mut link: L) -> Result<DispatchHandle>
    where
        L: Link + 'static,
    {
        link.init()?;
        DispatchHandle::spawn(Arc::clone(self), link)
    }

    /// Abandon in-flight commands older than the configured maximum age
    /// at `now`. The dispatch loop calls this every pass.
    pub fn collect_garbage(&self, now: Instant) -> usize {
        let reclaimed = self
            .inflight
            .garbage_collect(now, self.config.max_inflight_age);
        if reclaimed > 0 {
            self.stats.record_reclaimed(reclaimed);
        }
        reclaimed
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The shared frame pool.
    pub fn pool(&self) -> &FramePool {
        &self.pool
    }

    /// The in-flight response table.
    pub fn inflight(&self) -> &InflightTable<N> {
        &self.inflight
    }

    /// The target registry.
    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    /// Current counters.
    pub fn stats(&self) -> EngineStatsSnapshot {
        self.stats.snapshot()
    }

    /// Frames waiting to be transmitted.
    pub fn tx_pending(&self) -> usize {
        self.tx.len()
    }

    /// Received frames waiting to be dispatched.
    pub fn rx_pending(&self) -> usize {
        self.rx.len()
    }

    fn build_frame(
        &self,
        frame_type: FrameType,
        msg_id: u8,
        target: u8,
        payload: &[u8],
    ) -> Result<PooledFrame> {
        check_payload(payload)?;
        let mut frame = self.pool.alloc()?;
        frame.frame_type = frame_type;
        frame.msg_id = msg_id;
        frame.target = target;
        frame.set_payload(payload)?;
        Ok(frame)
    }

    fn enqueue_tx(&self, frame: PooledFrame) -> Result<()> {
        let (frame_type, msg_id, target) = (frame.frame_type, frame.msg_id, frame.target);
        self.tx
            .enqueue(frame, Timeout::NoWait)
            .map_err(queue_error)?;
        trace!(%frame_type, msg_id, target_id = target, "frame queued for transmit");
        Ok(())
    }

    fn transmit_one<L: Link + ?Sized>(&self, link: &mut L) -> bool {
        let Ok(frame) = self.tx.dequeue(Timeout::NoWait) else {
            return false;
        };

        if frame.frame_type == FrameType::Command {
            self.inflight.stamp_sent(frame.msg_id, Instant::now());
        }

        let mut wire = [0u8; MAX_FRAME_SIZE];
        let sent = pack(&frame, &mut wire)
            .map_err(EngineError::from)
            .and_then(|len| link.send(&wire[..len]).map_err(EngineError::from));
        match sent {
            Ok(()) => {
                self.stats.record_sent();
                trace!(
                    link = link.name(),
                    frame_type = %frame.frame_type,
                    msg_id = frame.msg_id,
                    target_id = frame.target,
                    "frame sent"
                );
            }
            Err(err) => {
                self.stats.record_send_failure();
                warn!(
                    link = link.name(),
                    frame_type = %frame.frame_type,
                    msg_id = frame.msg_id,
                    target_id = frame.target,
                    error = %err,
                    "send failed; frame dropped"
                );
            }
        }
        self.pool.free(frame);
        true
    }

    fn receive_one(&self) -> Option<Dispatch> {
        let frame = self.rx.dequeue(Timeout::NoWait).ok()?;
        let outcome = self.dispatch(&frame);
        self.pool.free(frame);
        Some(outcome)
    }

    fn dispatch(&self, frame: &Frame) -> Dispatch {
        self.stats.record_received();

        match frame.frame_type {
            FrameType::Heartbeat => {
                self.stats.record_heartbeat(Instant::now());
                trace!("heartbeat received");
                return Dispatch::Heartbeat;
            }
            FrameType::Response => {
                if let Some(entry) = self.inflight.try_consume_response(frame.msg_id) {
                    self.contain_panic(frame, || entry.complete(frame.payload()));
                    self.stats.record_response();
                    return Dispatch::Response {
                        msg_id: frame.msg_id,
                    };
                }
            }
            _ => {}
        }

        match self.registry.handler(frame.target) {
            Some(handler) => {
                self.contain_panic(frame, || handler.handle(frame));
                self.stats.record_routed();
                Dispatch::Routed {
                    target: frame.target,
                }
            }
            None => {
                self.stats.record_unregistered();
                warn!(
                    frame_type = %frame.frame_type,
                    msg_id = frame.msg_id,
                    target_id = frame.target,
                    "no handler for target; frame dropped"
                );
                Dispatch::Unregistered {
                    target: frame.target,
                }
            }
        }
    }

    // Panics in application code end at the frame being dispatched.
    fn contain_panic(&self, frame: &Frame, f: impl FnOnce()) {
        if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
            self.stats.record_handler_panic();
            warn!(
                frame_type = %frame.frame_type,
                msg_id = frame.msg_id,
                target_id = frame.target,
                "handler panicked; frame dropped"
            );
        }
    }
}

impl<const N: usize> fmt::Debug for IcmpEngine<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IcmpEngine")
            .field("config", &self.config)
            .field("pool", &self.pool)
            .field("tx", &self.tx)
            .field("rx", &self.rx)
            .field("inflight", &self.inflight)
            .field("registry", &self.registry)
            .finish()
    }
}

fn check_payload(payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(EngineError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }
    Ok(())
}

fn queue_error(err: QueueError) -> EngineError {
    match err {
        QueueError::Full { queue, depth } => EngineError::QueueFull { queue, depth },
        other => EngineError::Queue(other),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;

    use icmp_link::{LinkError, MemoryLink};

    use super::*;
    use crate::error::ErrorKind;

    fn small_config() -> EngineConfig {
        EngineConfig {
            pool_frames: 4,
            tx_queue_depth: 2,
            rx_queue_depth: 2,
            ..EngineConfig::default()
        }
    }

    fn sent_frames(handle: &icmp_link::MemoryLinkHandle) -> Vec<Frame> {
        handle
            .take_sent()
            .iter()
            .map(|bytes| unpack(bytes).unwrap())
            .collect()
    }

    #[test]
    fn notify_is_packed_and_sent() {
        let engine = IcmpEngine::new();
        let (mut link, handle) = MemoryLink::new();

        engine.notify(5, b"ping").unwrap();
        assert_eq!(engine.pool().in_use(), 1);

        let report = engine.poll_once(&mut link);
        assert!(report.transmitted);
        assert_eq!(report.dispatched, None);
        assert_eq!(engine.pool().in_use(), 0);

        let frames = sent_frames(&handle);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].frame_type, FrameType::Notify);
        assert_eq!(frames[0].msg_id, NOTIFY_MSG_ID);
        assert_eq!(frames[0].target, 5);
        assert_eq!(frames[0].payload(), b"ping");
    }

    #[test]
    fn oversized_payload_is_invalid_argument() {
        let engine = IcmpEngine::new();
        let payload = [0u8; MAX_PAYLOAD_SIZE + 1];

        for err in [
            engine.notify(1, &payload).unwrap_err(),
            engine.command(1, &payload, |_| {}).unwrap_err(),
            engine.respond(1, 3, &payload).unwrap_err(),
        ] {
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
        assert_eq!(engine.pool().in_use(), 0);
        assert_eq!(engine.inflight().in_flight(), 0);
    }

    #[test]
    fn full_tx_queue_is_resource_exhausted() {
        let engine = IcmpEngine::with_config(small_config()).unwrap();
        engine.notify(1, b"a").unwrap();
        engine.notify(1, b"b").unwrap();

        let err = engine.notify(1, b"c").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
        assert_eq!(engine.pool().in_use(), 2);
    }

    #[test]
    fn pool_exhaustion_is_resource_exhausted() {
        let config = EngineConfig {
            pool_frames: 1,
            ..EngineConfig::default()
        };
        let engine = IcmpEngine::with_config(config).unwrap();
        engine.notify(1, b"a").unwrap();

        let err = engine.notify(1, b"b").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
        assert!(matches!(
            err,
            EngineError::Frame(FrameError::PoolExhausted { capacity: 1 })
        ));
    }

    #[test]
    fn failed_command_releases_its_id() {
        let engine = IcmpEngine::<8>::from_config(small_config()).unwrap();
        assert_eq!(engine.command(1, b"a", |_| {}).unwrap(), 0);
        assert_eq!(engine.command(1, b"b", |_| {}).unwrap(), 1);

        let err = engine.command(1, b"c", |_| {}).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
        assert_eq!(engine.inflight().in_flight(), 2);
        assert!(!engine.inflight().is_allocated(2));
    }

    #[test]
    fn command_id_space_exhaustion() {
        let config = EngineConfig {
            pool_frames: 8,
            tx_queue_depth: 8,
            ..EngineConfig::default()
        };
        let engine = IcmpEngine::<2>::from_config(config).unwrap();
        engine.command(1, b"", |_| {}).unwrap();
        engine.command(1, b"", |_| {}).unwrap();

        let err = engine.command(1, b"", |_| {}).unwrap_err();
        assert!(matches!(err, EngineError::InflightExhausted { capacity: 2 }));
        assert_eq!(engine.tx_pending(), 2);
    }

    #[test]
    fn command_stamped_when_sent() {
        let engine = IcmpEngine::new();
        let (mut link, _handle) = MemoryLink::new();
        let msg_id = engine.command(2, b"get", |_| {}).unwrap();

        // Not yet sent: never aged out.
        let far_future = Instant::now() + Duration::from_secs(3600);
        assert_eq!(engine.collect_garbage(far_future), 0);

        engine.poll_once(&mut link);
        assert!(engine.inflight().is_allocated(msg_id));
        assert_eq!(engine.collect_garbage(far_future), 1);
        assert!(!engine.inflight().is_allocated(msg_id));
        assert_eq!(engine.stats().gc_reclaimed, 1);
    }

    #[test]
    fn response_completes_command_not_handler() {
        let engine = IcmpEngine::new();
        let (mut link, _handle) = MemoryLink::new();
        let routed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&routed);
        engine
            .register_target(2, move |_: &Frame| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        let reply = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reply);
        let msg_id = engine
            .command(2, b"get", move |payload| {
                sink.lock().unwrap().push(payload.to_vec());
            })
            .unwrap();
        engine.poll_once(&mut link);

        let response = Frame::new(FrameType::Response, msg_id, 2, b"42").unwrap();
        engine.deliver_frame(&response).unwrap();
        let report = engine.poll_once(&mut link);
        assert_eq!(report.dispatched, Some(Dispatch::Response { msg_id }));

        // Same ID again: already consumed, so it is routed.
        engine.deliver_frame(&response).unwrap();
        let report = engine.poll_once(&mut link);
        assert_eq!(report.dispatched, Some(Dispatch::Routed { target: 2 }));

        assert_eq!(*reply.lock().unwrap(), vec![b"42".to_vec()]);
        assert_eq!(routed.load(Ordering::SeqCst), 1);
        assert_eq!(engine.stats().responses_matched, 1);
    }

    #[test]
    fn panicking_response_callback_is_contained() {
        let engine = IcmpEngine::new();
        let (mut link, handle) = MemoryLink::new();

        let msg_id = engine
            .command(3, b"get", |_| panic!("callback bug"))
            .unwrap();
        engine.poll_once(&mut link);

        let response = Frame::new(FrameType::Response, msg_id, 3, b"x").unwrap();
        engine.deliver_frame(&response).unwrap();
        engine.notify(3, b"next").unwrap();
        let report = engine.poll_once(&mut link);

        assert_eq!(report.dispatched, Some(Dispatch::Response { msg_id }));
        assert!(report.transmitted);
        assert!(!engine.inflight().is_allocated(msg_id));
        assert_eq!(engine.stats().handler_panics, 1);
        assert_eq!(handle.total_sent(), 2);
        assert_eq!(engine.pool().in_use(), 0);
    }

    #[test]
    fn unregistered_target_dropped_without_leak() {
        let engine = IcmpEngine::new();
        let (mut link, _handle) = MemoryLink::new();

        engine
            .deliver_frame(&Frame::notify(7, b"lost").unwrap())
            .unwrap();
        assert_eq!(engine.pool().in_use(), 1);

        let report = engine.poll_once(&mut link);
        assert_eq!(report.dispatched, Some(Dispatch::Unregistered { target: 7 }));
        assert_eq!(engine.pool().in_use(), 0);
        assert_eq!(engine.stats().unregistered_drops, 1);
    }

    #[test]
    fn heartbeat_is_recorded_not_routed() {
        let engine = IcmpEngine::new();
        let (mut link, handle) = MemoryLink::new();
        engine
            .register_target(0, |_: &Frame| panic!("heartbeat routed"))
            .unwrap();

        engine.heartbeat().unwrap();
        engine.poll_once(&mut link);
        let sent = sent_frames(&handle);
        assert_eq!(sent[0].frame_type, FrameType::Heartbeat);
        assert_eq!(sent[0].msg_id, NOTIFY_MSG_ID);
        assert!(sent[0].payload().is_empty());

        engine.deliver_frame(&sent[0]).unwrap();
        let report = engine.poll_once(&mut link);
        assert_eq!(report.dispatched, Some(Dispatch::Heartbeat));
        assert!(engine.stats().last_heartbeat.is_some());
    }

    #[test]
    fn send_failure_frees_frame_and_continues() {
        let engine = IcmpEngine::new();
        let (mut link, handle) = MemoryLink::new();
        handle.set_fail_sends(true);

        engine.notify(1, b"x").unwrap();
        let report = engine.poll_once(&mut link);
        assert!(report.transmitted);
        assert_eq!(engine.pool().in_use(), 0);
        assert_eq!(engine.stats().send_failures, 1);

        handle.set_fail_sends(false);
        engine.notify(1, b"y").unwrap();
        engine.poll_once(&mut link);
        assert_eq!(handle.total_sent(), 1);
        assert_eq!(engine.stats().frames_sent, 1);
    }

    #[test]
    fn deliver_bytes_rejects_corruption() {
        let engine = IcmpEngine::new();
        let frame = Frame::notify(3, b"data").unwrap();
        let mut wire = [0u8; MAX_FRAME_SIZE];
        let len = pack(&frame, &mut wire).unwrap();

        let mut corrupted = wire;
        corrupted[len - 1] ^= 0x01;
        let err = engine.deliver_bytes(&corrupted).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFrame);
        assert_eq!(engine.rx_pending(), 0);

        // A full fixed-size receive buffer with trailing padding is accepted.
        engine.deliver_bytes(&wire).unwrap();
        assert_eq!(engine.rx_pending(), 1);
        assert_eq!(engine.stats().receive_drops, 1);
    }

    #[test]
    fn full_rx_queue_drops_and_frees() {
        let engine = IcmpEngine::with_config(small_config()).unwrap();
        let frame = Frame::notify(1, b"rx").unwrap();
        engine.deliver_frame(&frame).unwrap();
        engine.deliver_frame(&frame).unwrap();

        let err = engine.deliver_frame(&frame).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
        assert_eq!(engine.pool().in_use(), 2);
    }

    #[test]
    fn invalid_frame_not_delivered() {
        let engine = IcmpEngine::new();
        let frame = Frame::default();
        let err = engine.deliver_frame(&frame).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFrame);
        assert_eq!(engine.pool().in_use(), 0);
    }

    #[test]
    fn start_initialises_link() {
        let engine = Arc::new(IcmpEngine::new());
        let (link, handle) = MemoryLink::new();
        let dispatcher = engine.start(link).unwrap();
        assert_eq!(handle.init_calls(), 1);
        assert!(dispatcher.is_running());
        dispatcher.shutdown().unwrap();
    }

    struct FailingInit;

    impl Link for FailingInit {
        fn init(&mut self) -> icmp_link::Result<()> {
            Err(LinkError::Rejected("no uart".to_string()))
        }

        fn send(&mut self, _frame: &[u8]) -> icmp_link::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn start_fails_when_link_init_fails() {
        let engine = Arc::new(IcmpEngine::new());
        let err = engine.start(FailingInit).unwrap_err();
        assert!(matches!(err, EngineError::Link(LinkError::Rejected(_))));
    }
}
