/// Errors that can occur during frame packing, unpacking and pooling.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The type byte is not COMMAND, RESPONSE, NOTIFY or HEARTBEAT.
    #[error("invalid frame type {0:#04x}")]
    InvalidType(u8),

    /// The payload exceeds the protocol maximum.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The destination buffer cannot hold the packed frame.
    #[error("buffer too small ({needed} bytes needed, {capacity} available)")]
    BufferTooSmall { needed: usize, capacity: usize },

    /// The input is shorter than the frame it claims to contain.
    #[error("truncated frame ({len} bytes, need {needed})")]
    Truncated { len: usize, needed: usize },

    /// The trailing CRC does not match the header and payload.
    #[error("checksum mismatch (received {received:#06x}, computed {computed:#06x})")]
    ChecksumMismatch { received: u16, computed: u16 },

    /// Every slot in the frame pool is allocated.
    #[error("frame pool exhausted ({capacity} frames in use)")]
    PoolExhausted { capacity: usize },

    /// An I/O error occurred while reading frames from a byte stream.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The byte stream ended.
    #[error("connection closed")]
    ConnectionClosed,
}

impl FrameError {
    /// True for malformed or corrupted wire data.
    pub fn is_invalid_frame(&self) -> bool {
        matches!(
            self,
            FrameError::InvalidType(_)
                | FrameError::PayloadTooLarge { .. }
                | FrameError::Truncated { .. }
                | FrameError::ChecksumMismatch { .. }
        )
    }

    /// True only when the frame was corrupted on the wire (CRC mismatch).
    pub fn is_corruption(&self) -> bool {
        matches!(self, FrameError::ChecksumMismatch { .. })
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
