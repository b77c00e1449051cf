use riglink_frame::build_frame;

use crate::cmd::{parse_frame_type, parse_hex, EncodeArgs};
use crate::exit::{frame_error, CliResult, SUCCESS};

pub fn run(args: EncodeArgs) -> CliResult<i32> {
    let frame_type = parse_frame_type(&args.frame_type)?;
    let content = parse_hex(&args.hex)?;
    let wire = build_frame(frame_type, &content).map_err(|err| frame_error("encode failed", err))?;
    println!("{}", hex::encode(&wire));
    Ok(SUCCESS)
}
