//! Stand-in hardware peer over UDP: answers register commands, echoes
//! telemetry requests as measurements, and raises TX_COMPLETE every few
//! seconds so a virtual-mode controller has an edge to report.
//!
//! Run with:
//!   cargo run -p riglink --example virtual-peer -- 127.0.0.1:7001
//!
//! In another terminal:
//!   cargo run -p riglink --features cli -- serve --peer 127.0.0.1:7001 --mode virtual

use std::collections::HashMap;
use std::net::UdpSocket;
use std::time::{Duration, Instant};

use riglink::frame::frame_type::{REGISTER, TELEMETRY, TELEMETRY_SEND};
use riglink::frame::{
    build_frame, decode_frame, ContentLayout, RegisterBatch, RegisterOp, Telemetry, TelemetrySend,
};

const TX_COMPLETE_REG: u32 = 0x26;
const TX_TIMESTAMP_REG: u32 = 0x25;
const TOGGLE_EVERY: Duration = Duration::from_secs(3);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let bind = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:7001".to_string());
    let socket = UdpSocket::bind(&bind)?;
    socket.set_read_timeout(Some(Duration::from_millis(100)))?;
    eprintln!("Virtual peer on {}", socket.local_addr()?);

    let started = Instant::now();
    let mut registers: HashMap<u32, u32> = HashMap::new();
    let mut buf = [0u8; 1024];

    loop {
        // TX_COMPLETE bit 8 high for one period, low for the next.
        let ticks = started.elapsed().as_millis() as u32;
        let phase = started.elapsed().as_secs() / TOGGLE_EVERY.as_secs();
        registers.insert(TX_COMPLETE_REG, if phase % 2 == 1 { 1 << 8 } else { 0 });
        registers.insert(TX_TIMESTAMP_REG, ticks);

        let (n, from) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => {
                continue
            }
            Err(e) => return Err(e.into()),
        };

        let frame = match decode_frame(&buf[..n]) {
            Ok((frame, _)) => frame,
            Err(e) => {
                eprintln!("Ignoring {n} bytes from {from}: {e}");
                continue;
            }
        };

        match frame.frame_type {
            REGISTER => {
                let mut batch = RegisterBatch::decode(&frame.content)?;
                match batch.op {
                    RegisterOp::Read => {
                        for entry in &mut batch.entries {
                            entry.value = registers.get(&entry.address).copied().unwrap_or(0);
                        }
                    }
                    RegisterOp::Write => {
                        for entry in &batch.entries {
                            registers.insert(entry.address, entry.value);
                        }
                    }
                    RegisterOp::Other(op) => {
                        eprintln!("Unknown register op {op}");
                        continue;
                    }
                }
                socket.send_to(&build_frame(REGISTER, &batch.to_content())?, from)?;
            }
            TELEMETRY_SEND => {
                let request = TelemetrySend::decode(&frame.content)?;
                let reply = Telemetry {
                    receive_timestamp: ticks,
                    complete_timestamp: ticks.wrapping_add(250),
                    frame_count: request.frame_count,
                    payload: request.data,
                };
                socket.send_to(&build_frame(TELEMETRY, &reply.to_content())?, from)?;
            }
            other => {
                eprintln!("Received type 0x{other:02X} ({} bytes) from {from}", frame.content.len());
            }
        }
    }
}
