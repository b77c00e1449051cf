//! Frame type bytes defined by the peer firmware.
//!
//! The set is small and fixed. Unknown bytes are still framed and
//! delivered; they just carry no typed layout.

/// Virtual-node signal send. Forwarded to the peer unchanged.
pub const SIGNAL_SEND: u8 = 0x00;

/// Virtual-node signal receive. Forwarded to the peer unchanged.
pub const SIGNAL_RECEIVE: u8 = 0x01;

/// Send-complete timestamp echo.
pub const TIMESTAMP_ECHO: u8 = 0x02;

/// Link status.
pub const LINK_STATUS: u8 = 0x03;

/// Batched register read/write.
pub const REGISTER: u8 = 0x05;

/// Outbound telemetry/ranging transmit request.
pub const TELEMETRY_SEND: u8 = 0x06;

/// Inbound telemetry/ranging measurement.
pub const TELEMETRY: u8 = 0x07;

/// Node radio configuration.
pub const NODE_CONFIG: u8 = 0x08;

/// Returns a human-readable name for a frame type.
pub fn frame_type_name(frame_type: u8) -> &'static str {
    match frame_type {
        SIGNAL_SEND => "SIGNAL_SEND",
        SIGNAL_RECEIVE => "SIGNAL_RECEIVE",
        TIMESTAMP_ECHO => "TIMESTAMP_ECHO",
        LINK_STATUS => "LINK_STATUS",
        REGISTER => "REGISTER",
        TELEMETRY_SEND => "TELEMETRY_SEND",
        TELEMETRY => "TELEMETRY",
        NODE_CONFIG => "NODE_CONFIG",
        _ => "UNKNOWN",
    }
}

/// Returns true for types forwarded to the peer as received.
pub fn is_pass_through(frame_type: u8) -> bool {
    matches!(frame_type, SIGNAL_SEND | SIGNAL_RECEIVE)
}

/// Returns true for types that can answer an outstanding command.
pub fn is_correlatable(frame_type: u8) -> bool {
    matches!(frame_type, REGISTER | TELEMETRY)
}

/// Returns true if the type byte is part of the firmware contract.
pub fn is_known(frame_type: u8) -> bool {
    frame_type_name(frame_type) != "UNKNOWN"
}
