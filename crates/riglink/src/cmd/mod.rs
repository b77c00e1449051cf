use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use riglink_core::{MatchKind, Mode};
use riglink_transport::{LinkConfig, DEFAULT_BAUD_RATE};

use crate::exit::{io_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod reg;
pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Open the link and print received records.
    Serve(ServeArgs),
    /// Send a single frame.
    Send(SendArgs),
    /// Read or write hardware registers.
    Reg(RegArgs),
    /// Encode a frame offline and print it as hex.
    Encode(EncodeArgs),
    /// Decode hex-encoded frames offline.
    Decode(DecodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Reg(args) => reg::run(args, format),
        Command::Encode(args) => encode::run(args),
        Command::Decode(args) => decode::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Where the hardware is. Exactly one of `--serial` or `--peer`.
#[derive(Args, Debug, Clone)]
pub struct LinkArgs {
    /// Serial device path.
    #[arg(long, env = "RIGLINK_SERIAL", value_name = "PATH", conflicts_with = "peer")]
    pub serial: Option<PathBuf>,
    /// Serial baud rate.
    #[arg(long, env = "RIGLINK_BAUD", default_value_t = DEFAULT_BAUD_RATE)]
    pub baud: u32,
    /// Local UDP bind address.
    #[arg(long, env = "RIGLINK_BIND", default_value = "0.0.0.0:0")]
    pub bind: SocketAddr,
    /// Hardware UDP address.
    #[arg(long, env = "RIGLINK_PEER", value_name = "ADDR")]
    pub peer: Option<SocketAddr>,
}

impl LinkArgs {
    pub fn link_config(&self) -> CliResult<LinkConfig> {
        match (&self.serial, self.peer) {
            (Some(path), None) => Ok(LinkConfig::Serial {
                path: path.clone(),
                baud: self.baud,
            }),
            (None, Some(peer)) => Ok(LinkConfig::Udp {
                bind: self.bind,
                peer,
            }),
            (Some(_), Some(_)) => Err(CliError::usage("--serial and --peer are exclusive")),
            (None, None) => Err(CliError::usage(
                "no link given: pass --serial PATH or --peer ADDR",
            )),
        }
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Operating mode (ground or virtual).
    #[arg(long, default_value = "ground")]
    pub mode: Mode,
    /// Exit after printing N records.
    #[arg(long)]
    pub count: Option<usize>,
    /// Queue drain interval (e.g. 100ms, 1s).
    #[arg(long, default_value = "100ms")]
    pub poll: String,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Frame type byte (decimal or 0x-prefixed hex).
    #[arg(long = "type", short = 't', value_name = "TYPE")]
    pub frame_type: String,
    /// Frame content as hex.
    #[arg(long, default_value = "")]
    pub hex: String,
    /// Wait for a correlated response of this kind
    /// (register-read, register-write, telemetry).
    #[arg(long, value_name = "KIND")]
    pub expect: Option<MatchKind>,
    /// Maximum time to wait when --expect is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "10s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct RegArgs {
    #[command(subcommand)]
    pub action: RegAction,
}

#[derive(Subcommand, Debug)]
pub enum RegAction {
    /// Read registers: ADDR...
    Read(RegReadArgs),
    /// Write registers: ADDR=VALUE...
    Write(RegWriteArgs),
}

#[derive(Args, Debug)]
pub struct RegReadArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Register addresses (decimal or 0x-prefixed hex).
    #[arg(required = true, num_args = 1..)]
    pub addresses: Vec<String>,
    /// Response timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "10s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct RegWriteArgs {
    #[command(flatten)]
    pub link: LinkArgs,
    /// Assignments such as 0x10=0xFF.
    #[arg(required = true, num_args = 1..)]
    pub pairs: Vec<String>,
    /// Response timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "10s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Frame type byte (decimal or 0x-prefixed hex).
    #[arg(long = "type", short = 't', value_name = "TYPE")]
    pub frame_type: String,
    /// Frame content as hex.
    #[arg(long, default_value = "")]
    pub hex: String,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Hex bytes holding one or more frames, possibly with garbage between.
    pub hex: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `2s`, `150ms` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

/// Parse a decimal or `0x`-prefixed hex number.
pub fn parse_number(input: &str) -> CliResult<u32> {
    let input = input.trim();
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(digits) => u32::from_str_radix(digits, 16),
        None => input.parse(),
    };
    parsed.map_err(|_| CliError::usage(format!("invalid number: {input}")))
}

pub fn parse_frame_type(input: &str) -> CliResult<u8> {
    let value = parse_number(input)?;
    u8::try_from(value).map_err(|_| CliError::usage(format!("frame type out of range: {input}")))
}

/// Runtime for awaiting correlated responses. Receivers run on their own
/// threads, so one worker is enough.
pub fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|err| io_error("runtime setup failed", err))
}

/// Decode hex, ignoring whitespace.
pub fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(&compact).map_err(|err| CliError::usage(format!("invalid hex: {err}")))
}
