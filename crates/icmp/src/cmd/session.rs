use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use icmp_engine::{spawn_receiver, DispatchHandle, EngineConfig, IcmpEngine, ReceiverHandle};
use icmp_link::uds;

use crate::exit::{engine_error, link_error, CliError, CliResult, TIMEOUT, TRANSPORT_ERROR};

const FLUSH_POLL: Duration = Duration::from_millis(2);

/// A connected engine with its dispatch and receive threads running.
pub struct Session {
    pub engine: Arc<IcmpEngine>,
    dispatcher: DispatchHandle,
    receiver: ReceiverHandle,
}

impl Session {
    pub fn connect(path: &Path, config: EngineConfig) -> CliResult<Self> {
        let (link, reader) = uds::connect(path).map_err(|err| link_error("connect failed", err))?;
        let engine = Arc::new(
            IcmpEngine::with_config(config).map_err(|err| engine_error("invalid config", err))?,
        );
        let dispatcher = engine
            .start(link)
            .map_err(|err| engine_error("engine start failed", err))?;
        let receiver = spawn_receiver(Arc::clone(&engine), reader)
            .map_err(|err| engine_error("receiver start failed", err))?;

        Ok(Self {
            engine,
            dispatcher,
            receiver,
        })
    }

    /// Wait until every queued frame has been handed to the link.
    pub fn flush(&self, timeout: Duration) -> CliResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let stats = self.engine.stats();
            if stats.send_failures > 0 {
                return Err(CliError::new(TRANSPORT_ERROR, "link refused the frame"));
            }
            if self.engine.tx_pending() == 0 && stats.frames_sent > 0 {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(CliError::new(
                    TIMEOUT,
                    format!("frame not sent within {timeout:?}"),
                ));
            }
            std::thread::sleep(FLUSH_POLL);
        }
    }

    pub fn close(self) -> CliResult<()> {
        self.receiver.stop();
        self.dispatcher
            .shutdown()
            .map_err(|err| engine_error("engine shutdown failed", err))
    }
}
