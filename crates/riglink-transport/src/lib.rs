//! Link transports for the riglink control link.
//!
//! Two physical paths reach the hardware peer:
//! - a serial line (byte stream, frames must be reassembled)
//! - UDP (one frame per datagram)
//!
//! This is the lowest layer of riglink. It moves bytes and knows nothing
//! about frames; everything else builds on [`SerialLink`], [`UdpLink`] and
//! the [`FrameSink`] write seam provided here.

pub mod error;
pub mod serial;
pub mod traits;
pub mod udp;

pub use error::{Result, TransportError};
pub use serial::{SerialConfig, SerialLink, SerialSink, DEFAULT_BAUD_RATE};
pub use traits::{FrameSink, LinkConfig};
pub use udp::{UdpLink, MAX_DATAGRAM_SIZE};
