//! Type-specific content layouts.
//!
//! Every layout is big-endian and decodes from the frame content alone.
//! Decoders are pure: bytes in, fields out, or `MalformedContent` when the
//! content is shorter than the layout's fixed part.

use std::fmt;
use std::str::FromStr;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::frame_type::{
    LINK_STATUS, NODE_CONFIG, REGISTER, SIGNAL_RECEIVE, SIGNAL_SEND, TELEMETRY, TELEMETRY_SEND,
    TIMESTAMP_ECHO,
};

/// A content layout bound to one frame type.
pub trait ContentLayout: Sized {
    /// Frame type carrying this layout.
    const FRAME_TYPE: u8;
    /// Length of the fixed part.
    const MIN_LEN: usize;

    /// Decode from frame content.
    fn decode(content: &[u8]) -> Result<Self>;

    /// Append the encoded content to `dst`.
    fn encode_into(&self, dst: &mut BytesMut);

    /// Encode into a fresh buffer.
    fn to_content(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(Self::MIN_LEN);
        self.encode_into(&mut dst);
        dst.freeze()
    }
}

fn require(frame_type: u8, content: &[u8], needed: usize) -> Result<()> {
    if content.len() < needed {
        return Err(FrameError::MalformedContent {
            frame_type,
            needed,
            actual: content.len(),
        });
    }
    Ok(())
}

/// Signal send (0x00): `send_time(4) ‖ propagation(4) ‖ payload`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalSend {
    pub send_time: u32,
    pub propagation: u32,
    pub payload: Bytes,
}

impl ContentLayout for SignalSend {
    const FRAME_TYPE: u8 = SIGNAL_SEND;
    const MIN_LEN: usize = 8;

    fn decode(content: &[u8]) -> Result<Self> {
        require(Self::FRAME_TYPE, content, Self::MIN_LEN)?;
        let mut buf = content;
        Ok(Self {
            send_time: buf.get_u32(),
            propagation: buf.get_u32(),
            payload: Bytes::copy_from_slice(buf),
        })
    }

    fn encode_into(&self, dst: &mut BytesMut) {
        dst.put_u32(self.send_time);
        dst.put_u32(self.propagation);
        dst.put_slice(&self.payload);
    }
}

/// Signal receive (0x01): `receive_time(4) ‖ receive_timestamp(4) ‖ payload`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalReceive {
    pub receive_time: u32,
    pub receive_timestamp: u32,
    pub payload: Bytes,
}

impl ContentLayout for SignalReceive {
    const FRAME_TYPE: u8 = SIGNAL_RECEIVE;
    const MIN_LEN: usize = 8;

    fn decode(content: &[u8]) -> Result<Self> {
        require(Self::FRAME_TYPE, content, Self::MIN_LEN)?;
        let mut buf = content;
        Ok(Self {
            receive_time: buf.get_u32(),
            receive_timestamp: buf.get_u32(),
            payload: Bytes::copy_from_slice(buf),
        })
    }

    fn encode_into(&self, dst: &mut BytesMut) {
        dst.put_u32(self.receive_time);
        dst.put_u32(self.receive_timestamp);
        dst.put_slice(&self.payload);
    }
}

/// Notice layout shared by the timestamp echo (0x02) and link status (0x03):
/// `wall_time(4) ‖ link_timestamp(4) ‖ trailer`.
///
/// The monitor emits these with an 8-byte all-zero trailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkNotice {
    /// Wall-clock seconds when the event was observed.
    pub wall_time: u32,
    /// Raw link-timestamp register value.
    pub link_timestamp: u32,
    /// Trailing bytes (data packet for 0x02, reserved for 0x03).
    pub trailer: Bytes,
}

/// Trailer the monitor appends to derived notices.
pub const NOTICE_TRAILER: [u8; 8] = [0; 8];

impl LinkNotice {
    /// Notice with the standard zero trailer.
    pub fn new(wall_time: u32, link_timestamp: u32) -> Self {
        Self {
            wall_time,
            link_timestamp,
            trailer: Bytes::from_static(&NOTICE_TRAILER),
        }
    }

    /// Decode for the given notice type (0x02 or 0x03).
    pub fn decode_as(frame_type: u8, content: &[u8]) -> Result<Self> {
        require(frame_type, content, 8)?;
        let mut buf = content;
        Ok(Self {
            wall_time: buf.get_u32(),
            link_timestamp: buf.get_u32(),
            trailer: Bytes::copy_from_slice(buf),
        })
    }

    /// Encode the content.
    pub fn to_content(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(8 + self.trailer.len());
        dst.put_u32(self.wall_time);
        dst.put_u32(self.link_timestamp);
        dst.put_slice(&self.trailer);
        dst.freeze()
    }
}

/// Notice types accepted by [`LinkNotice::decode_as`].
pub const NOTICE_TYPES: [u8; 2] = [TIMESTAMP_ECHO, LINK_STATUS];

/// Register operation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterOp {
    Read,
    Write,
    Other(u8),
}

impl RegisterOp {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => RegisterOp::Read,
            1 => RegisterOp::Write,
            other => RegisterOp::Other(other),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            RegisterOp::Read => 0,
            RegisterOp::Write => 1,
            RegisterOp::Other(byte) => byte,
        }
    }
}

impl fmt::Display for RegisterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterOp::Read => f.write_str("read"),
            RegisterOp::Write => f.write_str("write"),
            RegisterOp::Other(byte) => write!(f, "op-{byte}"),
        }
    }
}

/// One `(address, value)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterEntry {
    pub address: u32,
    pub value: u32,
}

/// Batched register operation (0x05): `op(1) ‖ count(1) ‖ [addr(4) ‖ value(4)] × count`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterBatch {
    pub op: RegisterOp,
    /// Count declared on the wire.
    pub declared_count: u8,
    /// Pairs actually present.
    pub entries: Vec<RegisterEntry>,
}

/// Pairs per batch are bounded by the content length: (255 - 2) / 8.
pub const MAX_REGISTER_ENTRIES: usize = (crate::codec::MAX_CONTENT_SIZE - 2) / 8;

impl RegisterBatch {
    /// Read request for `addresses` (values sent as zero).
    pub fn read(addresses: &[u32]) -> Self {
        Self::from_entries(
            RegisterOp::Read,
            addresses
                .iter()
                .map(|&address| RegisterEntry { address, value: 0 })
                .collect(),
        )
    }

    /// Write request for `(address, value)` pairs.
    pub fn write(pairs: &[(u32, u32)]) -> Self {
        Self::from_entries(
            RegisterOp::Write,
            pairs
                .iter()
                .map(|&(address, value)| RegisterEntry { address, value })
                .collect(),
        )
    }

    /// More than [`MAX_REGISTER_ENTRIES`] pairs do not fit one frame; the
    /// excess is dropped with a warning.
    fn from_entries(op: RegisterOp, mut entries: Vec<RegisterEntry>) -> Self {
        if entries.len() > MAX_REGISTER_ENTRIES {
            tracing::warn!(
                %op,
                requested = entries.len(),
                kept = MAX_REGISTER_ENTRIES,
                "register batch exceeds one frame, dropping the excess"
            );
            entries.truncate(MAX_REGISTER_ENTRIES);
        }
        Self {
            op,
            declared_count: entries.len() as u8,
            entries,
        }
    }

    /// True when the declared count exceeded the pairs present.
    pub fn is_truncated(&self) -> bool {
        usize::from(self.declared_count) > self.entries.len()
    }

    /// Value reported for `address`, if present.
    pub fn value_of(&self, address: u32) -> Option<u32> {
        self.entries
            .iter()
            .find(|entry| entry.address == address)
            .map(|entry| entry.value)
    }
}

impl ContentLayout for RegisterBatch {
    const FRAME_TYPE: u8 = REGISTER;
    const MIN_LEN: usize = 2;

    fn decode(content: &[u8]) -> Result<Self> {
        require(Self::FRAME_TYPE, content, Self::MIN_LEN)?;
        let mut buf = content;
        let op = RegisterOp::from_byte(buf.get_u8());
        let declared_count = buf.get_u8();

        let mut entries = Vec::with_capacity(usize::from(declared_count));
        while entries.len() < usize::from(declared_count) && buf.remaining() >= 8 {
            entries.push(RegisterEntry {
                address: buf.get_u32(),
                value: buf.get_u32(),
            });
        }
        if entries.len() < usize::from(declared_count) {
            tracing::warn!(
                declared = declared_count,
                present = entries.len(),
                "register batch shorter than declared count"
            );
        }

        Ok(Self {
            op,
            declared_count,
            entries,
        })
    }

    fn encode_into(&self, dst: &mut BytesMut) {
        dst.put_u8(self.op.as_byte());
        dst.put_u8(self.declared_count);
        for entry in &self.entries {
            dst.put_u32(entry.address);
            dst.put_u32(entry.value);
        }
    }
}

/// Telemetry transmit request (0x06):
/// `timing_enable(1) ‖ timing_time(4) ‖ frame_count(1) ‖ data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetrySend {
    pub timing_enabled: bool,
    pub timing_time: u32,
    pub frame_count: u8,
    pub data: Bytes,
}

impl ContentLayout for TelemetrySend {
    const FRAME_TYPE: u8 = TELEMETRY_SEND;
    const MIN_LEN: usize = 6;

    fn decode(content: &[u8]) -> Result<Self> {
        require(Self::FRAME_TYPE, content, Self::MIN_LEN)?;
        let mut buf = content;
        Ok(Self {
            timing_enabled: buf.get_u8() == 1,
            timing_time: buf.get_u32(),
            frame_count: buf.get_u8(),
            data: Bytes::copy_from_slice(buf),
        })
    }

    fn encode_into(&self, dst: &mut BytesMut) {
        dst.put_u8(u8::from(self.timing_enabled));
        dst.put_u32(self.timing_time);
        dst.put_u8(self.frame_count);
        dst.put_slice(&self.data);
    }
}

/// Telemetry/ranging measurement (0x07):
/// `receive_ts(4) ‖ complete_ts(4) ‖ frame_count(1) ‖ payload`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Telemetry {
    pub receive_timestamp: u32,
    pub complete_timestamp: u32,
    pub frame_count: u8,
    pub payload: Bytes,
}

impl Telemetry {
    /// Ticks between reception start and completion.
    pub fn duration(&self) -> u32 {
        self.complete_timestamp
            .wrapping_sub(self.receive_timestamp)
    }
}

impl ContentLayout for Telemetry {
    const FRAME_TYPE: u8 = TELEMETRY;
    const MIN_LEN: usize = 9;

    fn decode(content: &[u8]) -> Result<Self> {
        require(Self::FRAME_TYPE, content, Self::MIN_LEN)?;
        let mut buf = content;
        Ok(Self {
            receive_timestamp: buf.get_u32(),
            complete_timestamp: buf.get_u32(),
            frame_count: buf.get_u8(),
            payload: Bytes::copy_from_slice(buf),
        })
    }

    fn encode_into(&self, dst: &mut BytesMut) {
        dst.put_u32(self.receive_timestamp);
        dst.put_u32(self.complete_timestamp);
        dst.put_u8(self.frame_count);
        dst.put_slice(&self.payload);
    }
}

/// LoRa coding rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodingRate {
    #[default]
    Cr45,
    Cr46,
    Cr47,
    Cr48,
}

impl CodingRate {
    pub fn as_byte(self) -> u8 {
        match self {
            CodingRate::Cr45 => 1,
            CodingRate::Cr46 => 2,
            CodingRate::Cr47 => 3,
            CodingRate::Cr48 => 4,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(CodingRate::Cr45),
            2 => Some(CodingRate::Cr46),
            3 => Some(CodingRate::Cr47),
            4 => Some(CodingRate::Cr48),
            _ => None,
        }
    }
}

impl FromStr for CodingRate {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "4/5" => Ok(CodingRate::Cr45),
            "4/6" => Ok(CodingRate::Cr46),
            "4/7" => Ok(CodingRate::Cr47),
            "4/8" => Ok(CodingRate::Cr48),
            other => Err(format!("unknown coding rate: {other}")),
        }
    }
}

impl fmt::Display for CodingRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CodingRate::Cr45 => "4/5",
            CodingRate::Cr46 => "4/6",
            CodingRate::Cr47 => "4/7",
            CodingRate::Cr48 => "4/8",
        };
        f.write_str(text)
    }
}

/// Node networking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeMode {
    Standalone,
    Network,
    #[default]
    Virtual,
}

impl NodeMode {
    pub fn as_byte(self) -> u8 {
        match self {
            NodeMode::Standalone => 0,
            NodeMode::Network => 1,
            NodeMode::Virtual => 2,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(NodeMode::Standalone),
            1 => Some(NodeMode::Network),
            2 => Some(NodeMode::Virtual),
            _ => None,
        }
    }
}

/// Node role in a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeRole {
    #[default]
    Normal,
    Mother,
}

impl NodeRole {
    pub fn as_byte(self) -> u8 {
        match self {
            NodeRole::Normal => 0,
            NodeRole::Mother => 1,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(NodeRole::Normal),
            1 => Some(NodeRole::Mother),
            _ => None,
        }
    }
}

/// Radio parameters of one link direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkParams {
    pub bandwidth_khz: u32,
    pub spreading_factor: u8,
    pub coding: CodingRate,
}

impl Default for LinkParams {
    fn default() -> Self {
        Self {
            bandwidth_khz: 125,
            spreading_factor: 7,
            coding: CodingRate::Cr45,
        }
    }
}

/// Node configuration (0x08), 21 bytes:
/// `node_id ‖ mode ‖ total_nodes ‖ role ‖ frequency_khz(4) ‖ attenuation_db ‖
/// fwd_bw(4) ‖ fwd_sf ‖ fwd_cr ‖ bwd_bw(4) ‖ bwd_sf ‖ bwd_cr ‖ bwd_sf2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub node_id: u8,
    pub mode: NodeMode,
    pub total_nodes: u8,
    pub role: NodeRole,
    pub frequency_khz: u32,
    pub attenuation_db: u8,
    pub forward: LinkParams,
    pub backward: LinkParams,
    pub backward_spreading_factor2: u8,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: 1,
            mode: NodeMode::Virtual,
            total_nodes: 1,
            role: NodeRole::Normal,
            frequency_khz: 900_000,
            attenuation_db: 10,
            forward: LinkParams::default(),
            backward: LinkParams::default(),
            backward_spreading_factor2: 7,
        }
    }
}

impl ContentLayout for NodeConfig {
    const FRAME_TYPE: u8 = NODE_CONFIG;
    const MIN_LEN: usize = 21;

    fn decode(content: &[u8]) -> Result<Self> {
        require(Self::FRAME_TYPE, content, Self::MIN_LEN)?;
        let mut buf = content;
        let node_id = buf.get_u8();
        let mode = NodeMode::from_byte(buf.get_u8()).unwrap_or_default();
        let total_nodes = buf.get_u8();
        let role = NodeRole::from_byte(buf.get_u8()).unwrap_or_default();
        let frequency_khz = buf.get_u32();
        let attenuation_db = buf.get_u8();
        let forward = LinkParams {
            bandwidth_khz: buf.get_u32(),
            spreading_factor: buf.get_u8(),
            coding: CodingRate::from_byte(buf.get_u8()).unwrap_or_default(),
        };
        let backward = LinkParams {
            bandwidth_khz: buf.get_u32(),
            spreading_factor: buf.get_u8(),
            coding: CodingRate::from_byte(buf.get_u8()).unwrap_or_default(),
        };
        let backward_spreading_factor2 = buf.get_u8();

        Ok(Self {
            node_id,
            mode,
            total_nodes,
            role,
            frequency_khz,
            attenuation_db,
            forward,
            backward,
            backward_spreading_factor2,
        })
    }

    fn encode_into(&self, dst: &mut BytesMut) {
        dst.put_u8(self.node_id);
        dst.put_u8(self.mode.as_byte());
        dst.put_u8(self.total_nodes);
        dst.put_u8(self.role.as_byte());
        dst.put_u32(self.frequency_khz);
        dst.put_u8(self.attenuation_db);
        dst.put_u32(self.forward.bandwidth_khz);
        dst.put_u8(self.forward.spreading_factor);
        dst.put_u8(self.forward.coding.as_byte());
        dst.put_u32(self.backward.bandwidth_khz);
        dst.put_u8(self.backward.spreading_factor);
        dst.put_u8(self.backward.coding.as_byte());
        dst.put_u8(self.backward_spreading_factor2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_batch_layout() {
        let batch = RegisterBatch::read(&[0x25, 0x26]);
        let content = batch.to_content();
        assert_eq!(
            content.as_ref(),
            &[0, 2, 0, 0, 0, 0x25, 0, 0, 0, 0, 0, 0, 0, 0x26, 0, 0, 0, 0]
        );
        assert_eq!(RegisterBatch::decode(&content).unwrap(), batch);
    }

    #[test]
    fn register_batch_too_short() {
        let err = RegisterBatch::decode(&[0]).unwrap_err();
        assert!(matches!(
            err,
            FrameError::MalformedContent {
                frame_type: REGISTER,
                needed: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn register_batch_with_missing_pairs_is_best_effort() {
        let mut content = vec![0u8, 3];
        content.extend_from_slice(&0x46u32.to_be_bytes());
        content.extend_from_slice(&0x0003_0000u32.to_be_bytes());
        content.extend_from_slice(&[0xAA, 0xBB]);

        let batch = RegisterBatch::decode(&content).unwrap();
        assert_eq!(batch.op, RegisterOp::Read);
        assert_eq!(batch.entries.len(), 1);
        assert!(batch.is_truncated());
        assert_eq!(batch.value_of(0x46), Some(0x0003_0000));
        assert_eq!(batch.value_of(0x45), None);
    }

    #[test]
    fn register_batch_caps_entries() {
        let addrs: Vec<u32> = (0..100).collect();
        let batch = RegisterBatch::read(&addrs);
        assert_eq!(batch.entries.len(), MAX_REGISTER_ENTRIES);
        assert_eq!(usize::from(batch.declared_count), MAX_REGISTER_ENTRIES);
        assert!(!batch.is_truncated());
        assert_eq!(batch.entries.last().map(|e| e.address), Some(30));
        assert!(batch.to_content().len() <= crate::codec::MAX_CONTENT_SIZE);

        let pairs: Vec<(u32, u32)> = (0..40).map(|a| (a, a + 1)).collect();
        let batch = RegisterBatch::write(&pairs);
        assert_eq!(batch.entries.len(), MAX_REGISTER_ENTRIES);
        assert_eq!(batch.value_of(30), Some(31));
        assert_eq!(batch.value_of(31), None);
    }

    #[test]
    fn write_batch_carries_values() {
        let batch = RegisterBatch::write(&[(0x10, 0xDEAD_BEEF)]);
        let decoded = RegisterBatch::decode(&batch.to_content()).unwrap();
        assert_eq!(decoded.op, RegisterOp::Write);
        assert_eq!(decoded.value_of(0x10), Some(0xDEAD_BEEF));
    }

    #[test]
    fn telemetry_fields() {
        let mut content = Vec::new();
        content.extend_from_slice(&100u32.to_be_bytes());
        content.extend_from_slice(&160u32.to_be_bytes());
        content.push(7);
        content.extend_from_slice(b"\x01\x02");

        let t = Telemetry::decode(&content).unwrap();
        assert_eq!(t.frame_count, 7);
        assert_eq!(t.duration(), 60);
        assert_eq!(t.payload.as_ref(), b"\x01\x02");

        assert!(Telemetry::decode(&content[..8]).is_err());
    }

    #[test]
    fn signal_layouts_need_eight_bytes() {
        assert!(SignalSend::decode(&[0; 7]).is_err());
        let s = SignalReceive::decode(&[0, 0, 0, 1, 0, 0, 0, 2, 9]).unwrap();
        assert_eq!((s.receive_time, s.receive_timestamp), (1, 2));
        assert_eq!(s.payload.as_ref(), &[9]);
    }

    #[test]
    fn notice_has_zero_trailer() {
        let notice = LinkNotice::new(1_700_000_000, 0x1234);
        let content = notice.to_content();
        assert_eq!(content.len(), 16);
        assert_eq!(&content[8..], &NOTICE_TRAILER);
        assert_eq!(LinkNotice::decode_as(LINK_STATUS, &content).unwrap(), notice);
    }

    #[test]
    fn node_config_is_21_bytes() {
        let cfg = NodeConfig {
            node_id: 3,
            forward: LinkParams {
                bandwidth_khz: 250,
                spreading_factor: 9,
                coding: CodingRate::Cr47,
            },
            ..NodeConfig::default()
        };
        let content = cfg.to_content();
        assert_eq!(content.len(), NodeConfig::MIN_LEN);
        assert_eq!(content[0], 3);
        assert_eq!(content[1], NodeMode::Virtual.as_byte());
        assert_eq!(NodeConfig::decode(&content).unwrap(), cfg);
    }

    #[test]
    fn coding_rate_parse() {
        assert_eq!("4/6".parse::<CodingRate>().unwrap(), CodingRate::Cr46);
        assert_eq!(CodingRate::Cr48.to_string(), "4/8");
        assert!("5/4".parse::<CodingRate>().is_err());
    }

    #[test]
    fn telemetry_send_layout() {
        let cmd = TelemetrySend {
            timing_enabled: true,
            timing_time: 500,
            frame_count: 2,
            data: Bytes::from_static(b"\xCA\xFE"),
        };
        let content = cmd.to_content();
        assert_eq!(content.as_ref(), &[1, 0, 0, 1, 0xF4, 2, 0xCA, 0xFE]);
        assert_eq!(TelemetrySend::decode(&content).unwrap(), cmd);
    }
}
