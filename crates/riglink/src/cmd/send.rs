use riglink_core::{Controller, CoreConfig};
use tracing::info;

use crate::cmd::{parse_duration, parse_frame_type, parse_hex, runtime, SendArgs};
use crate::exit::{core_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_record, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let frame_type = parse_frame_type(&args.frame_type)?;
    let content = parse_hex(&args.hex)?;
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let link = args.link.link_config()?;

    let controller = Controller::open(&link, CoreConfig::default())
        .map_err(|err| core_error("open failed", err))?;

    let ticket = controller
        .send_command(frame_type, &content, args.expect)
        .map_err(|err| core_error("send failed", err))?;
    info!(
        frame_type = format_args!("0x{frame_type:02X}"),
        len = content.len(),
        ticket,
        "frame sent"
    );

    let Some(id) = ticket else {
        controller.shutdown();
        return Ok(SUCCESS);
    };

    let response = runtime()?.block_on(controller.await_ticket(id, Some(wait_timeout)));
    controller.shutdown();

    match response {
        Some(record) => {
            print_record(&record, format);
            Ok(SUCCESS)
        }
        None => Err(CliError::new(
            TIMEOUT,
            format!("no response within {wait_timeout:?}"),
        )),
    }
}
