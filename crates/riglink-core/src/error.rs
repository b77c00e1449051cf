use std::time::Duration;

/// Errors that can occur in link core operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] riglink_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] riglink_frame::FrameError),

    /// The hardware did not answer in time.
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// A background thread could not be started.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Invalid argument supplied by the caller.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
