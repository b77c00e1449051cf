use std::net::SocketAddr;
use std::path::PathBuf;

/// Errors that can occur in link transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the serial device.
    #[error("failed to open serial port {path}: {source}")]
    Open {
        path: PathBuf,
        source: serialport::Error,
    },

    /// Failed to bind the local UDP address.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Failed to apply a setting (timeout, clone) to an open link.
    #[error("failed to configure link: {0}")]
    Configure(String),

    /// An I/O error occurred on the link.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The link wrote fewer bytes than requested.
    #[error("short write ({written} of {expected} bytes)")]
    ShortWrite { written: usize, expected: usize },

    /// The link has been closed.
    #[error("link closed")]
    Closed,
}

impl From<serialport::Error> for TransportError {
    fn from(err: serialport::Error) -> Self {
        match err.kind() {
            serialport::ErrorKind::Io(kind) => {
                TransportError::Io(std::io::Error::new(kind, err.description))
            }
            _ => TransportError::Configure(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
