//! Inter-core messaging protocol (ICMP).
//!
//! A framed, checksummed messaging protocol for two cooperating boards
//! sharing an unreliable byte link such as a UART. Frames are addressed to
//! logical targets on the peer and come in four kinds: fire-and-forget
//! NOTIFY, COMMAND with a correlated RESPONSE, and HEARTBEAT.
//!
//! Not related to the Internet Control Message Protocol.
//!
//! # Crate Structure
//!
//! - [`frame`]: Wire format, CRC-16, frame pool and stream resynchronisation
//! - [`link`]: Link trait plus stream, Unix socket and in-memory links
//! - [`engine`]: Queues, in-flight response matching, routing and the
//!   dispatch loop

/// Re-export frame types.
pub mod frame {
    pub use icmp_frame::*;
}

/// Re-export link types.
pub mod link {
    pub use icmp_link::*;
}

/// Re-export engine types.
pub mod engine {
    pub use icmp_engine::*;
}

pub use icmp_engine::{EngineConfig, EngineError, IcmpEngine};
pub use icmp_frame::{Frame, FrameType};
pub use icmp_link::Link;
