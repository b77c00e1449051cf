use std::fmt;
use std::io;

use riglink_core::CoreError;
use riglink_frame::FrameError;
use riglink_transport::TransportError;

// Process exit codes, shared by every subcommand.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(USAGE, message)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound | io::ErrorKind::AddrInUse => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. } | TransportError::Io(source) => {
            io_error(context, source)
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::ContentTooLarge { .. }
        | FrameError::TooShort { .. }
        | FrameError::BadSync { .. }
        | FrameError::Incomplete { .. }
        | FrameError::MalformedContent { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn core_error(context: &str, err: CoreError) -> CliError {
    match err {
        CoreError::Transport(err) => transport_error(context, err),
        CoreError::Frame(err) => frame_error(context, err),
        CoreError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        CoreError::InvalidArgument(_) => CliError::new(USAGE, format!("{context}: {err}")),
        CoreError::Spawn { .. } => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn codes_follow_error_class() {
        assert_eq!(
            core_error("x", CoreError::Timeout(Duration::from_secs(1))).code,
            TIMEOUT
        );
        assert_eq!(
            frame_error("x", FrameError::TooShort { len: 3 }).code,
            DATA_INVALID
        );
        assert_eq!(transport_error("x", TransportError::Closed).code, TRANSPORT_ERROR);
        assert_eq!(
            core_error("x", CoreError::InvalidArgument("bad".into())).code,
            USAGE
        );
    }
}
