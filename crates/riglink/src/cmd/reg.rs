use riglink_core::{Controller, CoreConfig};

use crate::cmd::{parse_duration, parse_number, runtime, RegAction, RegArgs};
use crate::exit::{core_error, CliError, CliResult, SUCCESS};
use crate::output::{print_registers, OutputFormat};

enum Batch {
    Read(Vec<u32>),
    Write(Vec<(u32, u32)>),
}

pub fn run(args: RegArgs, format: OutputFormat) -> CliResult<i32> {
    let (link, batch, timeout) = match args.action {
        RegAction::Read(read) => {
            let addresses = read
                .addresses
                .iter()
                .map(|addr| parse_number(addr))
                .collect::<CliResult<Vec<_>>>()?;
            (read.link, Batch::Read(addresses), read.timeout)
        }
        RegAction::Write(write) => {
            let pairs = write
                .pairs
                .iter()
                .map(|pair| parse_assignment(pair))
                .collect::<CliResult<Vec<_>>>()?;
            (write.link, Batch::Write(pairs), write.timeout)
        }
    };
    let timeout = parse_duration(&timeout)?;
    let link = link.link_config()?;
    let runtime = runtime()?;

    let controller = Controller::open(&link, CoreConfig::default())
        .map_err(|err| core_error("open failed", err))?;
    let result = runtime.block_on(async {
        match &batch {
            Batch::Read(addresses) => controller.read_registers(addresses, Some(timeout)).await,
            Batch::Write(pairs) => controller.write_registers(pairs, Some(timeout)).await,
        }
    });
    controller.shutdown();

    let entries = result.map_err(|err| core_error("register command failed", err))?;
    print_registers(&entries, format);
    Ok(SUCCESS)
}

/// `ADDR=VALUE`, each decimal or 0x-prefixed hex.
fn parse_assignment(input: &str) -> CliResult<(u32, u32)> {
    let (addr, value) = input
        .split_once('=')
        .ok_or_else(|| CliError::usage(format!("expected ADDR=VALUE, got '{input}'")))?;
    Ok((parse_number(addr)?, parse_number(value)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignments_parse_both_sides() {
        assert_eq!(parse_assignment("0x10=0xFF").unwrap(), (0x10, 0xFF));
        assert_eq!(parse_assignment("16=255").unwrap(), (16, 255));
        assert!(parse_assignment("0x10").is_err());
        assert!(parse_assignment("0x10=zz").is_err());
    }
}
