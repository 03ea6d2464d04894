//! Dispatch engine for the inter-core messaging protocol.
//!
//! An [`IcmpEngine`] owns everything one endpoint needs: the frame pool,
//! the TX and RX queues, the in-flight response table and the target
//! registry. Application threads send through it, the link's receive path
//! delivers into it, and one dispatch worker moves frames between the
//! queues and the link:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use icmp_engine::IcmpEngine;
//! use icmp_frame::Frame;
//! use icmp_link::MemoryLink;
//!
//! let engine = Arc::new(IcmpEngine::new());
//! engine.register_target(5, |frame: &Frame| {
//!     println!("target 5 got {:?}", frame.payload());
//! })?;
//!
//! let (link, _observer) = MemoryLink::new();
//! let dispatcher = engine.start(link)?;
//!
//! engine.notify(5, b"ping")?;
//! engine.command(2, b"status", |reply| println!("status: {reply:?}"))?;
//!
//! dispatcher.shutdown()?;
//! # Ok::<(), icmp_engine::EngineError>(())
//! ```

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod inflight;
pub mod queue;
pub mod receiver;
pub mod registry;
pub mod stats;

pub use config::{
    EngineConfig, DEFAULT_MAX_INFLIGHT_MSGS, DEFAULT_MAX_INFLIGHT_MSG_AGE,
    DEFAULT_MAX_MEM_SLAB_FRAMES, DEFAULT_MAX_TARGETS, DEFAULT_POLL_INTERVAL, DEFAULT_QUEUE_DEPTH,
    TARGET_ID_SPACE,
};
pub use dispatch::DispatchHandle;
pub use engine::{Dispatch, IcmpEngine, PollReport};
pub use error::{EngineError, ErrorKind, QueueError, Result};
pub use inflight::{InflightEntry, InflightTable, ResponseCallback, MAX_INFLIGHT_CAPACITY};
pub use queue::{FrameQueue, Timeout};
pub use receiver::{spawn_receiver, ReceiveSummary, ReceiverHandle};
pub use registry::{TargetHandler, TargetRegistry};
pub use stats::{EngineStats, EngineStatsSnapshot};
