use tracing::info;

use crate::cmd::{parse_duration, session::Session, NotifyArgs};
use crate::exit::{engine_error, CliResult, SUCCESS};

pub fn run(args: NotifyArgs) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let payload = args.payload.resolve()?;

    let session = Session::connect(&args.path, Default::default())?;
    session
        .engine
        .notify(args.target, &payload)
        .map_err(|err| engine_error("notify failed", err))?;
    session.flush(timeout)?;
    info!(target_id = args.target, len = payload.len(), "notify sent");

    session.close()?;
    Ok(SUCCESS)
}
