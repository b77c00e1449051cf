use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::Result;

/// Write side of a link to the hardware peer.
///
/// Implementations send one already-encoded frame per call and must be safe
/// to share between the receiver threads (pass-through forwarding), the
/// register monitor and API callers.
pub trait FrameSink: Send + Sync {
    /// Send a complete encoded frame to the peer.
    fn send_bytes(&self, bytes: &[u8]) -> Result<()>;

    /// Human-readable peer description for logs.
    fn describe(&self) -> String;
}

/// Static peer address of the single hardware peer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LinkConfig {
    /// Serial device path and baud rate.
    Serial { path: PathBuf, baud: u32 },
    /// Local bind address and peer address.
    Udp { bind: SocketAddr, peer: SocketAddr },
}

impl LinkConfig {
    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match self {
            LinkConfig::Serial { .. } => "serial",
            LinkConfig::Udp { .. } => "udp",
        }
    }
}

impl std::fmt::Display for LinkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkConfig::Serial { path, baud } => write!(f, "serial:{}@{baud}", path.display()),
            LinkConfig::Udp { bind, peer } => write!(f, "udp:{bind}->{peer}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_both_transports() {
        let serial = LinkConfig::Serial {
            path: PathBuf::from("/dev/ttyUSB0"),
            baud: 115_200,
        };
        assert_eq!(serial.to_string(), "serial:/dev/ttyUSB0@115200");
        assert_eq!(serial.transport_name(), "serial");

        let udp = LinkConfig::Udp {
            bind: "127.0.0.1:8002".parse().unwrap(),
            peer: "127.0.0.1:8003".parse().unwrap(),
        };
        assert_eq!(udp.to_string(), "udp:127.0.0.1:8002->127.0.0.1:8003");
        assert_eq!(udp.transport_name(), "udp");
    }
}
