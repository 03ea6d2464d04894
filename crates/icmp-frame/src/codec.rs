use std::fmt;

use bytes::{BufMut, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: type (1) + msg_id (1) + target (1) + length (1) = 4 bytes.
pub const HEADER_SIZE: usize = 4;

/// Trailing CRC-16, big-endian.
pub const CRC_SIZE: usize = 2;

/// Largest payload a single frame can carry.
pub const MAX_PAYLOAD_SIZE: usize = 64;

/// Smallest valid frame on the wire (empty payload).
pub const MIN_FRAME_SIZE: usize = HEADER_SIZE + CRC_SIZE;

/// Largest valid frame on the wire.
pub const MAX_FRAME_SIZE: usize = frame_size(MAX_PAYLOAD_SIZE);

/// Message ID carried by NOTIFY and HEARTBEAT frames, which never get a response.
pub const NOTIFY_MSG_ID: u8 = 255;

const _: () = assert!(MAX_PAYLOAD_SIZE <= u8::MAX as usize);

/// Total wire size of a frame carrying `payload_len` bytes.
pub const fn frame_size(payload_len: usize) -> usize {
    HEADER_SIZE + payload_len + CRC_SIZE
}

/// Frame type byte.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    Command = 0x01,
    Response = 0x02,
    Notify = 0x03,
    Heartbeat = 0x04,
    /// Any other byte value. Never packed, never unpacked.
    #[default]
    Invalid = 0xFF,
}

impl FrameType {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_valid(self) -> bool {
        self != FrameType::Invalid
    }

    /// Human-readable name, used in logs and CLI output.
    pub fn name(self) -> &'static str {
        match self {
            FrameType::Command => "COMMAND",
            FrameType::Response => "RESPONSE",
            FrameType::Notify => "NOTIFY",
            FrameType::Heartbeat => "HEARTBEAT",
            FrameType::Invalid => "INVALID",
        }
    }
}

impl From<u8> for FrameType {
    fn from(value: u8) -> Self {
        match value {
            0x01 => FrameType::Command,
            0x02 => FrameType::Response,
            0x03 => FrameType::Notify,
            0x04 => FrameType::Heartbeat,
            _ => FrameType::Invalid,
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One protocol message.
///
/// The payload is stored inline with a fixed capacity so a frame fits a
/// pool slot; only the first `length` bytes are meaningful.
#[derive(Clone)]
pub struct Frame {
    pub frame_type: FrameType,
    pub msg_id: u8,
    pub target: u8,
    pub length: u8,
    pub payload: [u8; MAX_PAYLOAD_SIZE],
}

impl Frame {
    /// Build a frame, validating the payload length.
    pub fn new(frame_type: FrameType, msg_id: u8, target: u8, payload: &[u8]) -> Result<Self> {
        let mut frame = Self {
            frame_type,
            msg_id,
            target,
            ..Self::default()
        };
        frame.set_payload(payload)?;
        Ok(frame)
    }

    /// Build a NOTIFY frame.
    pub fn notify(target: u8, payload: &[u8]) -> Result<Self> {
        Self::new(FrameType::Notify, NOTIFY_MSG_ID, target, payload)
    }

    /// Copy `payload` in and update `length`.
    pub fn set_payload(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        self.payload[..payload.len()].copy_from_slice(payload);
        self.length = payload.len() as u8;
        Ok(())
    }

    /// The meaningful payload bytes.
    pub fn payload(&self) -> &[u8] {
        let len = (self.length as usize).min(MAX_PAYLOAD_SIZE);
        &self.payload[..len]
    }

    /// Reset to an empty INVALID frame so a recycled slot carries no stale data.
    pub fn clear(&mut self) {
        self.frame_type = FrameType::Invalid;
        self.msg_id = 0;
        self.target = 0;
        self.length = 0;
        self.payload.fill(0);
    }

    /// The wire size of this frame (header + payload + CRC).
    pub fn wire_len(&self) -> usize {
        frame_size(self.length as usize)
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            frame_type: FrameType::Invalid,
            msg_id: 0,
            target: 0,
            length: 0,
            payload: [0u8; MAX_PAYLOAD_SIZE],
        }
    }
}

// Bytes past `length` are scratch space and do not take part in equality.
impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.frame_type == other.frame_type
            && self.msg_id == other.msg_id
            && self.target == other.target
            && self.length == other.length
            && self.payload() == other.payload()
    }
}

impl Eq for Frame {}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("frame_type", &self.frame_type)
            .field("msg_id", &self.msg_id)
            .field("target", &self.target)
            .field("length", &self.length)
            .field("payload", &self.payload())
            .finish()
    }
}

/// CRC-16/ANSI (reflected 0x8005, seed 0xFFFF, no final XOR).
pub fn crc16_ansi(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

fn check_packable(frame: &Frame) -> Result<usize> {
    if !frame.frame_type.is_valid() {
        return Err(FrameError::InvalidType(frame.frame_type.as_u8()));
    }
    let len = frame.length as usize;
    if len > MAX_PAYLOAD_SIZE {
        return Err(FrameError::PayloadTooLarge {
            size: len,
            max: MAX_PAYLOAD_SIZE,
        });
    }
    Ok(len)
}

/// Pack a frame into `buf`, returning the number of bytes written.
///
/// Wire format:
/// ```text
/// ┌──────────┬──────────┬──────────┬──────────┬─────────────────┬──────────────┐
/// │ Type (1) │ MsgId (1)│ Target(1)│ Length(1)│ Payload (Length)│ CRC-16 (2 BE)│
/// └──────────┴──────────┴──────────┴──────────┴─────────────────┴──────────────┘
/// ```
///
/// The CRC covers the header and payload.
pub fn pack(frame: &Frame, buf: &mut [u8]) -> Result<usize> {
    let len = check_packable(frame)?;
    let total = frame_size(len);
    if buf.len() < total {
        return Err(FrameError::BufferTooSmall {
            needed: total,
            capacity: buf.len(),
        });
    }

    buf[0] = frame.frame_type.as_u8();
    buf[1] = frame.msg_id;
    buf[2] = frame.target;
    buf[3] = frame.length;
    buf[HEADER_SIZE..HEADER_SIZE + len].copy_from_slice(&frame.payload[..len]);

    let crc = crc16_ansi(&buf[..HEADER_SIZE + len]);
    buf[HEADER_SIZE + len..total].copy_from_slice(&crc.to_be_bytes());

    Ok(total)
}

/// Pack a frame onto the end of `dst`.
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) -> Result<()> {
    let len = check_packable(frame)?;
    let start = dst.len();
    dst.reserve(frame_size(len));
    dst.put_u8(frame.frame_type.as_u8());
    dst.put_u8(frame.msg_id);
    dst.put_u8(frame.target);
    dst.put_u8(frame.length);
    dst.put_slice(&frame.payload[..len]);
    let crc = crc16_ansi(&dst[start..]);
    dst.put_u16(crc);
    Ok(())
}

/// Unpack a frame from the start of `buf`.
///
/// Bytes after the encoded frame are ignored.
pub fn unpack(buf: &[u8]) -> Result<Frame> {
    let mut frame = Frame::default();
    unpack_into(buf, &mut frame)?;
    Ok(frame)
}

/// Unpack a frame from the start of `buf` into `frame`, returning the
/// number of bytes consumed.
///
/// `frame` is left untouched unless the whole frame validates.
pub fn unpack_into(buf: &[u8], frame: &mut Frame) -> Result<usize> {
    if buf.len() < MIN_FRAME_SIZE {
        return Err(FrameError::Truncated {
            len: buf.len(),
            needed: MIN_FRAME_SIZE,
        });
    }

    let frame_type = FrameType::from(buf[0]);
    if !frame_type.is_valid() {
        return Err(FrameError::InvalidType(buf[0]));
    }

    let len = buf[3] as usize;
    if len > MAX_PAYLOAD_SIZE {
        return Err(FrameError::PayloadTooLarge {
            size: len,
            max: MAX_PAYLOAD_SIZE,
        });
    }

    // The length byte is untrusted until the buffer is known to hold it.
    let total = frame_size(len);
    if buf.len() < total {
        return Err(FrameError::Truncated {
            len: buf.len(),
            needed: total,
        });
    }

    let received = u16::from_be_bytes([buf[HEADER_SIZE + len], buf[HEADER_SIZE + len + 1]]);
    let computed = crc16_ansi(&buf[..HEADER_SIZE + len]);
    if received != computed {
        return Err(FrameError::ChecksumMismatch { received, computed });
    }

    let mut temp = Frame {
        frame_type,
        msg_id: buf[1],
        target: buf[2],
        length: len as u8,
        payload: [0u8; MAX_PAYLOAD_SIZE],
    };
    temp.payload[..len].copy_from_slice(&buf[HEADER_SIZE..HEADER_SIZE + len]);
    *frame = temp;

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_frame() -> Frame {
        Frame::new(FrameType::Command, 0x01, 0x01, b"Hello").unwrap()
    }

    #[test]
    fn crc16_ansi_check_value() {
        assert_eq!(crc16_ansi(b"123456789"), 0x4B37);
        assert_eq!(crc16_ansi(&[]), 0xFFFF);
    }

    #[test]
    fn pack_unpack_roundtrip() {
        let original = valid_frame();
        let mut buf = [0u8; MAX_FRAME_SIZE];

        let written = pack(&original, &mut buf).unwrap();
        assert_eq!(written, frame_size(5));

        let unpacked = unpack(&buf[..written]).unwrap();
        assert_eq!(unpacked, original);
        assert_eq!(unpacked.payload(), b"Hello");
    }

    #[test]
    fn roundtrip_every_type_and_length() {
        for frame_type in [FrameType::Command, FrameType::Response, FrameType::Notify] {
            for len in [0usize, 1, 31, MAX_PAYLOAD_SIZE] {
                let payload: Vec<u8> = (0..len).map(|i| (i * 7 + 3) as u8).collect();
                let frame = Frame::new(frame_type, 0x42, 9, &payload).unwrap();

                let mut buf = [0u8; MAX_FRAME_SIZE];
                let written = pack(&frame, &mut buf).unwrap();
                assert_eq!(unpack(&buf[..written]).unwrap(), frame);
            }
        }
    }

    #[test]
    fn wire_layout_is_bit_exact() {
        let frame = Frame::new(FrameType::Notify, NOTIFY_MSG_ID, 5, b"ping").unwrap();
        let mut buf = [0u8; MAX_FRAME_SIZE];
        let written = pack(&frame, &mut buf).unwrap();

        assert_eq!(&buf[..8], &[0x03, 0xFF, 0x05, 0x04, b'p', b'i', b'n', b'g']);
        let crc = crc16_ansi(&buf[..8]);
        assert_eq!(buf[8], (crc >> 8) as u8);
        assert_eq!(buf[9], (crc & 0xFF) as u8);
        assert_eq!(written, 10);
    }

    #[test]
    fn encode_frame_matches_pack() {
        let frame = valid_frame();
        let mut buf = [0u8; MAX_FRAME_SIZE];
        let written = pack(&frame, &mut buf).unwrap();

        let mut dst = BytesMut::new();
        encode_frame(&frame, &mut dst).unwrap();
        assert_eq!(dst.as_ref(), &buf[..written]);
    }

    #[test]
    fn pack_rejects_invalid_type() {
        let mut frame = valid_frame();
        frame.frame_type = FrameType::Invalid;
        let mut buf = [0u8; MAX_FRAME_SIZE];

        let err = pack(&frame, &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::InvalidType(0xFF)));
        assert!(err.is_invalid_frame());
    }

    #[test]
    fn pack_rejects_oversized_length() {
        let mut frame = valid_frame();
        frame.length = MAX_PAYLOAD_SIZE as u8 + 1;
        let mut buf = [0u8; 2 * MAX_FRAME_SIZE];

        let err = pack(&frame, &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
    }

    #[test]
    fn pack_rejects_small_buffer() {
        let frame = valid_frame();
        let mut buf = [0u8; 10];

        let err = pack(&frame, &mut buf).unwrap_err();
        assert!(matches!(
            err,
            FrameError::BufferTooSmall {
                needed: 11,
                capacity: 10
            }
        ));
        assert!(!err.is_invalid_frame());
    }

    #[test]
    fn pack_into_empty_buffer_fails() {
        let err = pack(&valid_frame(), &mut []).unwrap_err();
        assert!(matches!(err, FrameError::BufferTooSmall { .. }));
    }

    #[test]
    fn unpack_rejects_short_buffer() {
        let err = unpack(&[0x01, 0x00, 0x00]).unwrap_err();
        assert!(matches!(err, FrameError::Truncated { len: 3, .. }));
        assert!(err.is_invalid_frame());
    }

    #[test]
    fn unpack_rejects_length_overrunning_buffer() {
        // Declares 20 payload bytes but only carries the minimum frame.
        let buf = [0x03, 0xFF, 0x01, 20, 0x00, 0x00];
        let err = unpack(&buf).unwrap_err();
        assert!(matches!(err, FrameError::Truncated { len: 6, needed: 26 }));
    }

    #[test]
    fn unpack_rejects_invalid_type() {
        let mut buf = [0u8; MAX_FRAME_SIZE];
        let written = pack(&valid_frame(), &mut buf).unwrap();
        for bad in [0x00, 0x05, 0xFF] {
            buf[0] = bad;
            let err = unpack(&buf[..written]).unwrap_err();
            assert!(matches!(err, FrameError::InvalidType(t) if t == bad));
        }
    }

    #[test]
    fn unpack_rejects_oversized_length_field() {
        let buf = [0x01, 0x01, 0x01, (MAX_PAYLOAD_SIZE + 1) as u8, 0, 0];
        let err = unpack(&buf).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
    }

    #[test]
    fn every_checksum_bit_flip_is_detected() {
        let mut buf = [0u8; MAX_FRAME_SIZE];
        let written = pack(&valid_frame(), &mut buf).unwrap();

        for byte in written - CRC_SIZE..written {
            for bit in 0..8 {
                let mut corrupted = buf;
                corrupted[byte] ^= 1 << bit;
                let err = unpack(&corrupted[..written]).unwrap_err();
                assert!(err.is_corruption(), "byte {byte} bit {bit}: {err}");
            }
        }
    }

    #[test]
    fn payload_corruption_is_detected() {
        let mut buf = [0u8; MAX_FRAME_SIZE];
        let written = pack(&valid_frame(), &mut buf).unwrap();
        buf[HEADER_SIZE + 2] ^= 0x10;

        let err = unpack(&buf[..written]).unwrap_err();
        assert!(matches!(err, FrameError::ChecksumMismatch { .. }));
    }

    #[test]
    fn unpack_ignores_trailing_bytes() {
        let mut buf = [0xAAu8; MAX_FRAME_SIZE];
        let written = pack(&valid_frame(), &mut buf).unwrap();

        let mut frame = Frame::default();
        let consumed = unpack_into(&buf, &mut frame).unwrap();
        assert_eq!(consumed, written);
        assert_eq!(frame, valid_frame());
    }

    #[test]
    fn failed_unpack_leaves_frame_untouched() {
        let mut buf = [0u8; MAX_FRAME_SIZE];
        let written = pack(&valid_frame(), &mut buf).unwrap();
        buf[written - 1] ^= 0x01;

        let mut frame = Frame::notify(3, b"keep").unwrap();
        assert!(unpack_into(&buf[..written], &mut frame).is_err());
        assert_eq!(frame, Frame::notify(3, b"keep").unwrap());
    }

    #[test]
    fn set_payload_rejects_oversized() {
        let mut frame = Frame::default();
        let err = frame.set_payload(&[0u8; MAX_PAYLOAD_SIZE + 1]).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 65, max: 64 }));
        assert_eq!(frame.length, 0);
    }

    #[test]
    fn equality_ignores_scratch_bytes() {
        let mut a = Frame::notify(1, b"abc").unwrap();
        let b = Frame::notify(1, b"abc").unwrap();
        a.payload[10] = 0x55;
        assert_eq!(a, b);
    }

    #[test]
    fn frame_type_from_byte() {
        assert_eq!(FrameType::from(0x01), FrameType::Command);
        assert_eq!(FrameType::from(0x04), FrameType::Heartbeat);
        assert_eq!(FrameType::from(0x00), FrameType::Invalid);
        assert_eq!(FrameType::from(0x10), FrameType::Invalid);
    }
}
