//! Control link to an FPGA radio front end.
//!
//! riglink exchanges sync-framed binary commands and telemetry with one
//! hardware peer over a serial line or UDP, correlates responses with the
//! commands that caused them, and watches status registers for edges.
//!
//! # Crate Structure
//!
//! - [`transport`]: Serial and UDP links, the `FrameSink` write seam
//! - [`frame`]: Frame codec, CRC-16, content layouts, stream reassembly
//! - [`control`]: Dispatcher, queue, correlator, monitor, controller

/// Re-export transport types.
pub mod transport {
    pub use riglink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use riglink_frame::*;
}

/// Re-export core types.
pub mod control {
    pub use riglink_core::*;
}

pub use riglink_core::{Controller, CoreConfig, CoreError, DecodedRecord, Mode};
