use std::sync::mpsc;

use icmp_engine::EngineConfig;
use icmp_frame::{Frame, FrameType};
use tracing::{debug, warn};

use crate::cmd::{parse_duration, session::Session, CommandArgs};
use crate::exit::{engine_error, frame_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_frame, OutputFormat};

pub fn run(args: CommandArgs, format: OutputFormat) -> CliResult<i32> {
    let wait = parse_duration(&args.wait_timeout)?;
    let payload = args.payload.resolve()?;

    // The in-flight slot must outlive the wait, or the response would be
    // routed to the target handler instead.
    let defaults = EngineConfig::default();
    let config = EngineConfig {
        max_inflight_age: defaults.max_inflight_age.max(wait),
        ..defaults
    };
    let session = Session::connect(&args.path, config)?;

    let (tx, rx) = mpsc::channel::<Vec<u8>>();
    let msg_id = session
        .engine
        .command(args.target, &payload, move |response| {
            let _ = tx.send(response.to_vec());
        })
        .map_err(|err| engine_error("command failed", err))?;
    debug!(target_id = args.target, msg_id, "waiting for response");

    let response = match rx.recv_timeout(wait) {
        Ok(response) => response,
        Err(_) => {
            if let Err(err) = session.close() {
                warn!(error = %err, "engine shutdown failed after timeout");
            }
            return Err(CliError::new(
                TIMEOUT,
                format!("no response to msg_id {msg_id} within {wait:?}"),
            ));
        }
    };

    let frame = Frame::new(FrameType::Response, msg_id, args.target, &response)
        .map_err(|err| frame_error("response invalid", err))?;
    print_frame(&frame, format);

    session.close()?;
    Ok(SUCCESS)
}
