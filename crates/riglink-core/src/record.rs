use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use riglink_frame::content::{
    CodingRate, ContentLayout, LinkNotice, LinkParams, NodeConfig, RegisterBatch, RegisterOp,
    SignalReceive, SignalSend, Telemetry, TelemetrySend,
};
use riglink_frame::frame_type::{
    self, LINK_STATUS, NODE_CONFIG, REGISTER, SIGNAL_RECEIVE, SIGNAL_SEND, TELEMETRY,
    TELEMETRY_SEND, TIMESTAMP_ECHO,
};
use serde::{Serialize, Serializer};
use serde_json::Value;

/// Where a frame came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceAddr {
    Serial(PathBuf),
    Datagram(SocketAddr),
    /// Built in-process (tests, offline decode).
    Local,
}

impl fmt::Display for SourceAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceAddr::Serial(path) => write!(f, "serial:{}", path.display()),
            SourceAddr::Datagram(addr) => write!(f, "udp:{addr}"),
            SourceAddr::Local => f.write_str("local"),
        }
    }
}

/// Typed body of a decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordBody {
    SignalSend(SignalSend),
    SignalReceive(SignalReceive),
    TimestampEcho(LinkNotice),
    LinkStatus(LinkNotice),
    Register(RegisterBatch),
    TelemetrySend(TelemetrySend),
    Telemetry(Telemetry),
    NodeConfig(NodeConfig),
    /// Type byte outside the firmware contract; content kept raw.
    Unknown,
    /// Content too short for its layout.
    Malformed { error: String },
}

impl RecordBody {
    /// Decode `content` according to `frame_type`. Never fails.
    pub fn decode(frame_type: u8, content: &[u8]) -> Self {
        let decoded = match frame_type {
            SIGNAL_SEND => SignalSend::decode(content).map(RecordBody::SignalSend),
            SIGNAL_RECEIVE => SignalReceive::decode(content).map(RecordBody::SignalReceive),
            TIMESTAMP_ECHO => {
                LinkNotice::decode_as(frame_type, content).map(RecordBody::TimestampEcho)
            }
            LINK_STATUS => LinkNotice::decode_as(frame_type, content).map(RecordBody::LinkStatus),
            REGISTER => RegisterBatch::decode(content).map(RecordBody::Register),
            TELEMETRY_SEND => TelemetrySend::decode(content).map(RecordBody::TelemetrySend),
            TELEMETRY => Telemetry::decode(content).map(RecordBody::Telemetry),
            NODE_CONFIG => NodeConfig::decode(content).map(RecordBody::NodeConfig),
            _ => Ok(RecordBody::Unknown),
        };
        decoded.unwrap_or_else(|err| RecordBody::Malformed {
            error: err.to_string(),
        })
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, RecordBody::Malformed { .. })
    }
}

/// One frame after dispatch. Immutable once built; cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRecord {
    pub frame_type: u8,
    pub source: SourceAddr,
    pub received_at: SystemTime,
    pub body: RecordBody,
    /// Original frame content.
    pub raw: Bytes,
    pub crc_valid: bool,
}

impl DecodedRecord {
    /// Decode a frame's content into a record stamped now.
    pub fn decode(frame_type: u8, content: Bytes, crc_valid: bool, source: SourceAddr) -> Self {
        Self {
            frame_type,
            source,
            received_at: SystemTime::now(),
            body: RecordBody::decode(frame_type, &content),
            raw: content,
            crc_valid,
        }
    }

    /// The register batch, if this record carries one with operation `op`.
    pub fn register_batch(&self, op: RegisterOp) -> Option<&RegisterBatch> {
        match &self.body {
            RecordBody::Register(batch) if batch.op == op => Some(batch),
            _ => None,
        }
    }

    /// Register-read responses belong to the monitor, which consumes them
    /// from the queue itself.
    pub fn is_monitor_reply(&self) -> bool {
        self.register_batch(RegisterOp::Read).is_some()
    }

    pub fn type_name(&self) -> &'static str {
        frame_type::frame_type_name(self.frame_type)
    }

    /// Milliseconds since the unix epoch at which the frame was received.
    pub fn received_unix_ms(&self) -> u64 {
        self.received_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    /// JSON view for the API layer and CLI output.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl Serialize for DecodedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        RecordView {
            frame_type: self.frame_type,
            type_name: self.type_name(),
            source: &self.source,
            received_at_ms: self.received_unix_ms(),
            crc_valid: self.crc_valid,
            raw: &self.raw,
            body: BodyView::from(&self.body),
        }
        .serialize(serializer)
    }
}

fn hex_bytes<T: AsRef<[u8]>, S: Serializer>(bytes: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(bytes))
}

fn display<T: fmt::Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

#[derive(Serialize)]
struct RecordView<'a> {
    #[serde(rename = "type")]
    frame_type: u8,
    type_name: &'static str,
    #[serde(serialize_with = "display")]
    source: &'a SourceAddr,
    received_at_ms: u64,
    crc_valid: bool,
    #[serde(serialize_with = "hex_bytes")]
    raw: &'a Bytes,
    body: BodyView<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum BodyView<'a> {
    SignalSend {
        send_time: u32,
        propagation: u32,
        #[serde(serialize_with = "hex_bytes")]
        payload: &'a Bytes,
    },
    SignalReceive {
        receive_time: u32,
        receive_timestamp: u32,
        #[serde(serialize_with = "hex_bytes")]
        payload: &'a Bytes,
    },
    Notice {
        wall_time: u32,
        link_timestamp: u32,
        #[serde(serialize_with = "hex_bytes")]
        trailer: &'a Bytes,
    },
    Register {
        #[serde(serialize_with = "display")]
        op: RegisterOp,
        count: u8,
        truncated: bool,
        registers: Vec<RegisterView>,
    },
    TelemetrySend {
        timing_enabled: bool,
        timing_time: u32,
        frame_count: u8,
        #[serde(serialize_with = "hex_bytes")]
        data: &'a Bytes,
    },
    Telemetry {
        receive_timestamp: u32,
        complete_timestamp: u32,
        duration: u32,
        frame_count: u8,
        #[serde(serialize_with = "hex_bytes")]
        payload: &'a Bytes,
    },
    NodeConfig {
        node_id: u8,
        mode: u8,
        total_nodes: u8,
        role: u8,
        frequency_khz: u32,
        attenuation_db: u8,
        forward: LinkView,
        backward: LinkView,
    },
    Unknown,
    Malformed {
        error: &'a str,
    },
}

#[derive(Serialize)]
struct RegisterView {
    address: u32,
    value: u32,
}

#[derive(Serialize)]
struct LinkView {
    bandwidth_khz: u32,
    spreading_factor: u8,
    #[serde(serialize_with = "display")]
    coding: CodingRate,
    #[serde(skip_serializing_if = "Option::is_none")]
    spreading_factor2: Option<u8>,
}

impl LinkView {
    fn new(params: &LinkParams, spreading_factor2: Option<u8>) -> Self {
        Self {
            bandwidth_khz: params.bandwidth_khz,
            spreading_factor: params.spreading_factor,
            coding: params.coding,
            spreading_factor2,
        }
    }
}

impl<'a> From<&'a RecordBody> for BodyView<'a> {
    fn from(body: &'a RecordBody) -> Self {
        match body {
            RecordBody::SignalSend(s) => BodyView::SignalSend {
                send_time: s.send_time,
                propagation: s.propagation,
                payload: &s.payload,
            },
            RecordBody::SignalReceive(s) => BodyView::SignalReceive {
                receive_time: s.receive_time,
                receive_timestamp: s.receive_timestamp,
                payload: &s.payload,
            },
            RecordBody::TimestampEcho(n) | RecordBody::LinkStatus(n) => BodyView::Notice {
                wall_time: n.wall_time,
                link_timestamp: n.link_timestamp,
                trailer: &n.trailer,
            },
            RecordBody::Register(batch) => BodyView::Register {
                op: batch.op,
                count: batch.declared_count,
                truncated: batch.is_truncated(),
                registers: batch
                    .entries
                    .iter()
                    .map(|e| RegisterView {
                        address: e.address,
                        value: e.value,
                    })
                    .collect(),
            },
            RecordBody::TelemetrySend(t) => BodyView::TelemetrySend {
                timing_enabled: t.timing_enabled,
                timing_time: t.timing_time,
                frame_count: t.frame_count,
                data: &t.data,
            },
            RecordBody::Telemetry(t) => BodyView::Telemetry {
                receive_timestamp: t.receive_timestamp,
                complete_timestamp: t.complete_timestamp,
                duration: t.duration(),
                frame_count: t.frame_count,
                payload: &t.payload,
            },
            RecordBody::NodeConfig(c) => BodyView::NodeConfig {
                node_id: c.node_id,
                mode: c.mode.as_byte(),
                total_nodes: c.total_nodes,
                role: c.role.as_byte(),
                frequency_khz: c.frequency_khz,
                attenuation_db: c.attenuation_db,
                forward: LinkView::new(&c.forward, None),
                backward: LinkView::new(&c.backward, Some(c.backward_spreading_factor2)),
            },
            RecordBody::Unknown => BodyView::Unknown,
            RecordBody::Malformed { error } => BodyView::Malformed { error },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_telemetry_is_malformed_not_fatal() {
        let record = DecodedRecord::decode(
            TELEMETRY,
            Bytes::from_static(&[0, 1, 2]),
            true,
            SourceAddr::Local,
        );
        assert!(record.body.is_malformed());
        assert_eq!(record.raw.as_ref(), &[0, 1, 2]);
        let json = record.to_json();
        assert!(json["body"]["error"].as_str().unwrap().contains("0x07"));
    }

    #[test]
    fn unknown_type_keeps_raw() {
        let record = DecodedRecord::decode(0x42, Bytes::from_static(b"zz"), false, SourceAddr::Local);
        assert_eq!(record.body, RecordBody::Unknown);
        assert_eq!(record.type_name(), "UNKNOWN");
        assert!(!record.crc_valid);
    }

    #[test]
    fn register_batch_accessor_checks_op() {
        let content = RegisterBatch::read(&[0x25]).to_content();
        let record = DecodedRecord::decode(REGISTER, content, true, SourceAddr::Local);
        assert!(record.register_batch(RegisterOp::Read).is_some());
        assert!(record.register_batch(RegisterOp::Write).is_none());
    }

    #[test]
    fn json_view() {
        let addr: SocketAddr = "10.0.0.2:8003".parse().unwrap();
        let record = DecodedRecord::decode(
            SIGNAL_SEND,
            Bytes::from_static(&[0, 0, 0, 5, 0, 0, 0, 6, 0xAB]),
            true,
            SourceAddr::Datagram(addr),
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], 0);
        assert_eq!(json["type_name"], "SIGNAL_SEND");
        assert_eq!(json["source"], "udp:10.0.0.2:8003");
        assert_eq!(json["raw"], "0000000500000006ab");
        assert_eq!(json["body"]["send_time"], 5);
        assert_eq!(json["body"]["payload"], "ab");
    }

    #[test]
    fn json_register_and_unknown_bodies() {
        let mut batch = RegisterBatch::read(&[0x25, 0x46]);
        batch.entries[1].value = 0x0003_0000;
        let record = DecodedRecord::decode(REGISTER, batch.to_content(), true, SourceAddr::Local);
        let json = record.to_json();
        assert_eq!(json["source"], "local");
        assert_eq!(json["body"]["op"], "read");
        assert_eq!(json["body"]["count"], 2);
        assert_eq!(json["body"]["truncated"], false);
        assert_eq!(json["body"]["registers"][1]["address"], 0x46);
        assert_eq!(json["body"]["registers"][1]["value"], 0x0003_0000);

        let unknown = DecodedRecord::decode(0x42, Bytes::from_static(b"zz"), true, SourceAddr::Local);
        let json = unknown.to_json();
        assert!(json["body"].is_null());
        assert_eq!(json["raw"], "7a7a");
    }

    #[test]
    fn json_node_config_carries_second_spreading_factor_on_backward_only() {
        let config = NodeConfig::default();
        let record =
            DecodedRecord::decode(NODE_CONFIG, config.to_content(), true, SourceAddr::Local);
        let json = record.to_json();
        assert_eq!(json["type_name"], "NODE_CONFIG");
        assert!(json["body"]["forward"].get("spreading_factor2").is_none());
        assert_eq!(
            json["body"]["backward"]["spreading_factor2"],
            config.backward_spreading_factor2
        );
        assert_eq!(json["body"]["forward"]["coding"], config.forward.coding.to_string());
    }
}
