use icmp_frame::{pack, Frame, FrameType, MAX_FRAME_SIZE, NOTIFY_MSG_ID};

use crate::cmd::EncodeArgs;
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{print_wire, OutputFormat};

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let frame_type = FrameType::from(args.kind);
    let msg_id = args.msg_id.unwrap_or(match frame_type {
        FrameType::Notify | FrameType::Heartbeat => NOTIFY_MSG_ID,
        _ => 0,
    });
    let payload = args.payload.resolve()?;

    let frame = Frame::new(frame_type, msg_id, args.target, &payload)
        .map_err(|err| frame_error("encode failed", err))?;
    let mut wire = [0u8; MAX_FRAME_SIZE];
    let len = pack(&frame, &mut wire).map_err(|err| frame_error("encode failed", err))?;

    print_wire(&frame, &wire[..len], format);
    Ok(SUCCESS)
}
