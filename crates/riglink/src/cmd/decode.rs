use riglink_core::{DecodedRecord, SourceAddr};
use riglink_frame::{decode_frame, StreamReassembler};
use tracing::warn;

use crate::cmd::{parse_hex, DecodeArgs};
use crate::exit::{frame_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_record, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let bytes = parse_hex(&args.hex)?;

    let mut reassembler = StreamReassembler::new();
    let frames = reassembler.push(&bytes);
    if reassembler.discarded_bytes() > 0 {
        warn!(discarded = reassembler.discarded_bytes(), "skipped bytes before sync");
    }
    if reassembler.buffered() > 0 {
        warn!(buffered = reassembler.buffered(), "trailing bytes do not form a frame");
    }
    if frames.is_empty() {
        return Err(CliError::new(DATA_INVALID, "no complete frame in input"));
    }

    for wire in frames {
        let (frame, _) = decode_frame(&wire).map_err(|err| frame_error("decode failed", err))?;
        let record =
            DecodedRecord::decode(frame.frame_type, frame.content, frame.crc_valid, SourceAddr::Local);
        print_record(&record, format);
    }
    Ok(SUCCESS)
}
