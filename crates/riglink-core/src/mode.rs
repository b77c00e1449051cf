use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use riglink_frame::frame_type::{REGISTER, SIGNAL_RECEIVE, SIGNAL_SEND, TELEMETRY};
use serde::{Deserialize, Serialize};

/// Operating mode of the rig.
///
/// The mode gates which frame types the shared queue retains and whether
/// the register monitor runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Ranging against real hardware. Only telemetry is retained.
    #[default]
    Ground,
    /// Virtual-node operation. Signals and register batches are retained and
    /// the register monitor runs.
    Virtual,
}

impl Mode {
    /// Whether records of `frame_type` are queued in this mode.
    pub fn retains(self, frame_type: u8) -> bool {
        match self {
            Mode::Ground => frame_type == TELEMETRY,
            Mode::Virtual => matches!(frame_type, SIGNAL_SEND | SIGNAL_RECEIVE | REGISTER),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Ground => "ground",
            Mode::Virtual => "virtual",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ground" => Ok(Mode::Ground),
            "virtual" => Ok(Mode::Virtual),
            other => Err(format!("unknown mode '{other}' (expected ground or virtual)")),
        }
    }
}

/// Current mode and when it was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeSnapshot {
    pub mode: Mode,
    pub since: SystemTime,
}
