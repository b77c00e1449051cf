use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use riglink_core::{DecodedRecord, RecordBody};
use riglink_frame::RegisterEntry;
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

pub fn print_record(record: &DecodedRecord, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!("{}", record.to_json());
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TYPE", "SOURCE", "CRC", "SIZE", "SUMMARY"])
                .add_row(vec![
                    format!("0x{:02X} {}", record.frame_type, record.type_name()),
                    record.source.to_string(),
                    crc_label(record.crc_valid).to_string(),
                    record.raw.len().to_string(),
                    summary(&record.body),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "type=0x{:02X} ({}) source={} crc={} size={} {}",
                record.frame_type,
                record.type_name(),
                record.source,
                crc_label(record.crc_valid),
                record.raw.len(),
                summary(&record.body)
            );
        }
        OutputFormat::Raw => {
            print_raw(record.raw.as_ref());
        }
    }
}

#[derive(Serialize)]
struct RegisterOutput {
    address: u32,
    value: u32,
}

#[derive(Serialize)]
struct RegistersOutput {
    registers: Vec<RegisterOutput>,
}

impl RegistersOutput {
    fn new(entries: &[RegisterEntry]) -> Self {
        Self {
            registers: entries
                .iter()
                .map(|e| RegisterOutput {
                    address: e.address,
                    value: e.value,
                })
                .collect(),
        }
    }
}

pub fn print_registers(entries: &[RegisterEntry], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = RegistersOutput::new(entries);
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ADDRESS", "VALUE", "DECIMAL"]);
            for entry in entries {
                table.add_row(vec![
                    format!("0x{:04X}", entry.address),
                    format!("0x{:08X}", entry.value),
                    entry.value.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for entry in entries {
                println!("0x{:04X}=0x{:08X}", entry.address, entry.value);
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn crc_label(valid: bool) -> &'static str {
    if valid {
        "ok"
    } else {
        "BAD"
    }
}

/// One-line description of a record body.
pub fn summary(body: &RecordBody) -> String {
    match body {
        RecordBody::SignalSend(s) => format!(
            "send_time={} propagation={} payload={}B",
            s.send_time,
            s.propagation,
            s.payload.len()
        ),
        RecordBody::SignalReceive(s) => format!(
            "receive_time={} timestamp={} payload={}B",
            s.receive_time,
            s.receive_timestamp,
            s.payload.len()
        ),
        RecordBody::TimestampEcho(n) | RecordBody::LinkStatus(n) => format!(
            "wall_time={} link_timestamp=0x{:08X}",
            n.wall_time, n.link_timestamp
        ),
        RecordBody::Register(batch) => {
            let pairs: Vec<String> = batch
                .entries
                .iter()
                .map(|e| format!("0x{:X}=0x{:X}", e.address, e.value))
                .collect();
            let truncated = if batch.is_truncated() { " (truncated)" } else { "" };
            format!("{} [{}]{truncated}", batch.op, pairs.join(" "))
        }
        RecordBody::TelemetrySend(t) => format!(
            "frames={} timing={} data={}B",
            t.frame_count,
            t.timing_enabled,
            t.data.len()
        ),
        RecordBody::Telemetry(t) => format!(
            "frames={} duration={} payload={}B",
            t.frame_count,
            t.duration(),
            t.payload.len()
        ),
        RecordBody::NodeConfig(c) => format!(
            "node={} of {} freq={}kHz atten={}dB",
            c.node_id, c.total_nodes, c.frequency_khz, c.attenuation_db
        ),
        RecordBody::Unknown => "unknown type".to_string(),
        RecordBody::Malformed { error } => format!("malformed: {error}"),
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use riglink_core::SourceAddr;
    use riglink_frame::frame_type::REGISTER;
    use riglink_frame::{ContentLayout, RegisterBatch};

    use super::*;

    #[test]
    fn register_summary_lists_pairs() {
        let content = RegisterBatch::write(&[(0x10, 0xFF)]).to_content();
        let record = DecodedRecord::decode(REGISTER, content, true, SourceAddr::Local);
        assert_eq!(summary(&record.body), "write [0x10=0xFF]");
    }

    #[test]
    fn register_output_json_shape() {
        let entries = [
            RegisterEntry {
                address: 0x25,
                value: 0x4A,
            },
            RegisterEntry {
                address: 0x46,
                value: 0,
            },
        ];
        let json = serde_json::to_value(RegistersOutput::new(&entries)).unwrap();
        assert_eq!(json["registers"][0]["address"], 0x25);
        assert_eq!(json["registers"][0]["value"], 0x4A);
        assert_eq!(json["registers"][1]["address"], 0x46);
        assert_eq!(json["registers"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn malformed_summary_carries_error() {
        let record = DecodedRecord::decode(0x07, Bytes::from_static(&[1]), true, SourceAddr::Local);
        assert!(summary(&record.body).starts_with("malformed: "));
    }
}
