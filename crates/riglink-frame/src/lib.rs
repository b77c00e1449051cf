//! Sync-header framing for the hardware peer link.
//!
//! Every frame on the wire is:
//! - A 4-byte big-endian sync header `0x1ACFFC1D`
//! - A 1-byte frame type and a 1-byte content length
//! - Up to 255 bytes of content
//! - A big-endian CRC-16/CCITT-FALSE over type, length and content
//!
//! Byte streams (serial) go through [`StreamReassembler`], which hunts for
//! the sync header and survives arbitrary chunking and line noise.

pub mod codec;
pub mod content;
pub mod error;
pub mod frame_type;
pub mod reader;
pub mod reassembler;

pub use codec::{
    build_frame, crc16_ccitt_false, decode_frame, encode_frame, Frame, HEADER_SIZE,
    MAX_CONTENT_SIZE, MAX_FRAME_SIZE, MIN_FRAME_SIZE, SYNC_BYTES, SYNC_HEADER,
};
pub use content::{
    CodingRate, ContentLayout, LinkNotice, LinkParams, NodeConfig, NodeMode, NodeRole,
    RegisterBatch, RegisterEntry, RegisterOp, SignalReceive, SignalSend, Telemetry,
    TelemetrySend,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use reassembler::StreamReassembler;
