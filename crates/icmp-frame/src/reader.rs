use std::io::{ErrorKind, Read};

use bytes::{Buf, BytesMut};
use tracing::debug;

use crate::codec::{unpack, Frame, MAX_FRAME_SIZE, MIN_FRAME_SIZE};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 4 * MAX_FRAME_SIZE;
const DEFAULT_READ_CHUNK_SIZE: usize = MAX_FRAME_SIZE;

/// Reads checksum-valid frames from an unreliable byte stream (e.g. a UART).
///
/// Handles partial reads internally and resynchronises after noise: when
/// the bytes at the head of the buffer cannot start a valid frame (bad type,
/// oversized length or CRC mismatch) one byte is discarded and decoding
/// retries from the next offset. A head that claims more bytes than have
/// arrived is also skipped once a complete frame is buffered behind it.
/// Callers only ever see complete frames.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    chunk_size: usize,
    discarded: u64,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader.
    pub fn new(inner: T) -> Self {
        Self::with_chunk_size(inner, DEFAULT_READ_CHUNK_SIZE)
    }

    /// Create a frame reader that pulls at most `chunk_size` bytes per read.
    pub fn with_chunk_size(inner: T, chunk_size: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            chunk_size: chunk_size.max(1),
            discarded: 0,
        }
    }

    /// Read the next valid frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    /// Read timeouts configured on the stream surface as `FrameError::Io`
    /// without losing buffered bytes.
    pub fn read_frame(&mut self) -> Result<Frame> {
        let mut chunk = vec![0u8; self.chunk_size];
        loop {
            if let Some(frame) = self.decode_buffered() {
                return Ok(frame);
            }

            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Bytes thrown away while resynchronising.
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded
    }

    /// Bytes buffered but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    fn decode_buffered(&mut self) -> Option<Frame> {
        while self.buf.len() >= MIN_FRAME_SIZE {
            match unpack(&self.buf) {
                Ok(frame) => {
                    self.buf.advance(frame.wire_len());
                    return Some(frame);
                }
                Err(FrameError::Truncated { .. }) => {
                    // A noise byte can look like a header with a long length.
                    // Skip it if a complete frame already sits behind it.
                    let skip = self.complete_frame_offset()?;
                    debug!(skip, "header never completed; resynchronising");
                    self.buf.advance(skip);
                    self.discarded += skip as u64;
                }
                Err(err) => {
                    debug!(error = %err, "discarding byte to resynchronise");
                    self.buf.advance(1);
                    self.discarded += 1;
                }
            }
        }
        None
    }

    fn complete_frame_offset(&self) -> Option<usize> {
        let last = self.buf.len().checked_sub(MIN_FRAME_SIZE)?;
        (1..=last).find(|&offset| unpack(&self.buf[offset..]).is_ok())
    }
}
