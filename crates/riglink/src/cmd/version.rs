use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("riglink {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: riglink");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "build_target: {}",
        option_env!("RIGLINK_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "frame: sync=0x{:08X} crc=CRC-16/CCITT-FALSE max_content={}",
        riglink_frame::SYNC_HEADER,
        riglink_frame::MAX_CONTENT_SIZE
    );
    println!("transports: serial, udp");

    Ok(SUCCESS)
}
