use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("icmp {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: icmp");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "build_target: {}",
        option_env!("ICMP_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "build_profile: {}",
        option_env!("ICMP_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!("max_payload: {}", icmp_frame::MAX_PAYLOAD_SIZE);
    println!("max_frame: {}", icmp_frame::MAX_FRAME_SIZE);
    println!(
        "max_inflight: {}",
        icmp_engine::DEFAULT_MAX_INFLIGHT_MSGS
    );

    Ok(SUCCESS)
}
