use crate::error::Result;

/// The physical side of the protocol, as seen by the dispatch loop.
///
/// A link only moves bytes: the dispatcher hands it one packed frame per
/// call. Receiving is the link's own business; whatever reads the transport
/// must unpack complete, checksum-valid frames and hand them to the engine
/// (see `icmp_frame::FrameReader`).
///
/// Implementations are owned by the dispatch worker thread, hence `Send`.
pub trait Link: Send {
    /// Prepare the transport. Called once, before the first `send`.
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    /// Transmit one packed frame.
    ///
    /// The protocol does not retry: a failed send is logged by the caller
    /// and the frame is dropped.
    fn send(&mut self, frame: &[u8]) -> Result<()>;

    /// Link name for diagnostics.
    fn name(&self) -> &'static str {
        "link"
    }
}

impl<L: Link + ?Sized> Link for Box<L> {
    fn init(&mut self) -> Result<()> {
        (**self).init()
    }

    fn send(&mut self, frame: &[u8]) -> Result<()> {
        (**self).send(frame)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
