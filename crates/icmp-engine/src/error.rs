use std::time::Duration;

use icmp_frame::FrameError;
use icmp_link::LinkError;

/// Errors that can occur in engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Payload does not fit in one frame.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Target ID outside the registry.
    #[error("target {target} out of range (max {max})")]
    InvalidTarget { target: u8, max: usize },

    /// Rejected engine configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A queue is full.
    #[error("{queue} queue full (depth {depth})")]
    QueueFull { queue: &'static str, depth: usize },

    /// Every message ID is awaiting a response.
    #[error("no free message ID ({capacity} commands in flight)")]
    InflightExhausted { capacity: usize },

    /// A non-blocking or timed queue operation could not complete.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// Waiting for a response elapsed.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Link-level error.
    #[error("link error: {0}")]
    Link(#[from] LinkError),

    /// A worker thread could not be spawned.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// A worker thread panicked.
    #[error("{0} thread panicked")]
    WorkerPanicked(&'static str),
}

/// Errors from [`FrameQueue`](crate::FrameQueue) operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// No room before the timeout elapsed. The rejected item is dropped.
    #[error("{queue} queue full (depth {depth})")]
    Full { queue: &'static str, depth: usize },

    /// Nothing arrived before the timeout elapsed.
    #[error("{queue} queue empty")]
    Empty { queue: &'static str },
}

/// Coarse error classes callers can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad caller input.
    InvalidArgument,
    /// Malformed or corrupted wire data.
    InvalidFrame,
    /// Pool, queue or ID space full.
    ResourceExhausted,
    /// The operation could not complete in time.
    WouldBlock,
    /// Link or thread failure.
    Io,
}

impl EngineError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::PayloadTooLarge { .. }
            | EngineError::InvalidTarget { .. }
            | EngineError::InvalidConfig(_) => ErrorKind::InvalidArgument,
            EngineError::QueueFull { .. } | EngineError::InflightExhausted { .. } => {
                ErrorKind::ResourceExhausted
            }
            EngineError::Queue(_) | EngineError::Timeout(_) => ErrorKind::WouldBlock,
            EngineError::Frame(err) => match err {
                FrameError::PoolExhausted { .. } => ErrorKind::ResourceExhausted,
                FrameError::BufferTooSmall { .. } => ErrorKind::InvalidArgument,
                FrameError::Io(_) | FrameError::ConnectionClosed => ErrorKind::Io,
                _ => ErrorKind::InvalidFrame,
            },
            EngineError::Link(_) | EngineError::Spawn { .. } | EngineError::WorkerPanicked(_) => {
                ErrorKind::Io
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
