/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Content does not fit the one-byte length field.
    #[error("content too large ({size} bytes, max {max})")]
    ContentTooLarge { size: usize, max: usize },

    /// Fewer bytes than the smallest possible frame.
    #[error("buffer too short for a frame ({len} bytes, need at least 8)")]
    TooShort { len: usize },

    /// The buffer does not start with the sync header.
    #[error("bad sync header {found:02X?} (expected 1A CF FC 1D)")]
    BadSync { found: [u8; 4] },

    /// The header announces more bytes than are buffered. Not permanent on streams.
    #[error("incomplete frame ({available} of {needed} bytes)")]
    Incomplete { needed: usize, available: usize },

    /// Content shorter than the type-specific layout requires.
    #[error("malformed content for frame type 0x{frame_type:02X} ({actual} bytes, need {needed})")]
    MalformedContent {
        frame_type: u8,
        needed: usize,
        actual: usize,
    },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The byte source reached EOF.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
