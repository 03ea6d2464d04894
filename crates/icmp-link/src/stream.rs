use std::io::{ErrorKind, Write};

use tracing::trace;

use crate::error::{LinkError, Result};
use crate::traits::Link;

/// A link over any byte sink: a serial port, a socket, a pipe.
///
/// Each frame is written in full and flushed before `send` returns.
pub struct StreamLink<T> {
    inner: T,
    name: &'static str,
}

impl<T: Write> StreamLink<T> {
    /// Wrap a byte sink.
    pub fn new(inner: T) -> Self {
        Self::with_name(inner, "stream")
    }

    /// Wrap a byte sink with a diagnostic name (e.g. "uart").
    pub fn with_name(inner: T, name: &'static str) -> Self {
        Self { inner, name }
    }

    fn write_all_retrying(&mut self, frame: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < frame.len() {
            match self.inner.write(&frame[offset..]) {
                Ok(0) => return Err(LinkError::Closed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(LinkError::Io(err)),
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(LinkError::Io(err)),
            }
        }
    }

    /// Borrow the underlying sink.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying sink.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the link and return the inner sink.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Write + Send> Link for StreamLink<T> {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        self.write_all_retrying(frame)?;
        self.flush()?;
        trace!(link = self.name, len = frame.len(), "frame written");
        Ok(())
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use icmp_frame::{pack, unpack, Frame, MAX_FRAME_SIZE};

    use super::*;

    fn packed(target: u8, payload: &[u8]) -> Vec<u8> {
        let frame = Frame::notify(target, payload).unwrap();
        let mut buf = [0u8; MAX_FRAME_SIZE];
        let n = pack(&frame, &mut buf).unwrap();
        buf[..n].to_vec()
    }

    #[test]
    fn writes_frames_back_to_back() {
        let mut link = StreamLink::new(Cursor::new(Vec::<u8>::new()));
        let first = packed(1, b"one");
        let second = packed(2, b"two");

        link.send(&first).unwrap();
        link.send(&second).unwrap();

        let wire = link.into_inner().into_inner();
        assert_eq!(&wire[..first.len()], first.as_slice());
        let decoded = unpack(&wire[first.len()..]).unwrap();
        assert_eq!(decoded.target, 2);
        assert_eq!(decoded.payload(), b"two");
    }

    #[test]
    fn zero_length_write_reports_closed() {
        let mut link = StreamLink::new(ClosedWriter);
        let err = link.send(&packed(1, b"x")).unwrap_err();
        assert!(matches!(err, LinkError::Closed));
    }

    #[test]
    fn flush_propagates() {
        let sink = FlushTrackingWriter::default();
        let flag = Arc::clone(&sink.flushed);
        let mut link = StreamLink::with_name(sink, "uart");

        link.send(&packed(3, b"flush")).unwrap();
        assert!(flag.load(Ordering::SeqCst));
        assert_eq!(link.name(), "uart");
    }

    #[test]
    fn interrupted_write_retries() {
        let mut link = StreamLink::new(InterruptOnce {
            interrupted: false,
            written: Vec::new(),
        });
        let frame = packed(4, b"retry");
        link.send(&frame).unwrap();
        assert_eq!(link.get_ref().written, frame);
    }

    #[test]
    fn io_error_is_reported() {
        let mut link = StreamLink::new(BrokenPipe);
        let err = link.send(&packed(1, b"x")).unwrap_err();
        assert!(matches!(err, LinkError::Io(e) if e.kind() == ErrorKind::BrokenPipe));
    }

    struct ClosedWriter;

    impl Write for ClosedWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FlushTrackingWriter {
        flushed: Arc<AtomicBool>,
    }

    impl Write for FlushTrackingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct InterruptOnce {
        interrupted: bool,
        written: Vec<u8>,
    }

    impl Write for InterruptOnce {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            // Accept a few bytes at a time to exercise partial writes.
            let n = buf.len().min(3);
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
