//! Frame layer of the inter-core messaging protocol (ICMP).
//!
//! Every message between the two boards is one frame:
//! - A 4-byte header: type, message ID, target, payload length
//! - Up to [`MAX_PAYLOAD_SIZE`] payload bytes
//! - A big-endian CRC-16/ANSI over header and payload
//!
//! The CRC check in [`unpack`] is the single integrity gate for the whole
//! protocol. Frames are stored in a fixed-capacity [`FramePool`] so queued
//! traffic cannot grow without bound.

pub mod codec;
pub mod error;
pub mod pool;
pub mod reader;

pub use codec::{
    crc16_ansi, encode_frame, frame_size, pack, unpack, unpack_into, Frame, FrameType, CRC_SIZE,
    HEADER_SIZE, MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE, MIN_FRAME_SIZE, NOTIFY_MSG_ID,
};
pub use error::{FrameError, Result};
pub use pool::{FramePool, PooledFrame};
pub use reader::FrameReader;
