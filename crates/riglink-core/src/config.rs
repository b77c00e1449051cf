use std::time::Duration;

use serde::Deserialize;

use crate::mode::Mode;

/// Default capacity of the shared message queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;

/// Default wait for a correlated response.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Registers polled by the monitor.
pub const MONITORED_REGISTERS: [u32; 4] = [0x25, 0x26, 0x45, 0x46];

/// Configuration for the link core.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Shared queue capacity; the oldest record is dropped beyond it.
    pub queue_capacity: usize,
    /// Default correlation timeout.
    #[serde(with = "millis")]
    pub response_timeout: Duration,
    /// Mode entered at startup.
    pub initial_mode: Mode,
    pub monitor: MonitorConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            initial_mode: Mode::Ground,
            monitor: MonitorConfig::default(),
        }
    }
}

/// Register monitor timing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Delay between iterations.
    #[serde(with = "millis")]
    pub poll_interval: Duration,
    /// Fixed wait between the read command and consuming its response.
    #[serde(with = "millis")]
    pub settle: Duration,
    pub registers: Vec<u32>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            settle: Duration::from_millis(500),
            registers: MONITORED_REGISTERS.to_vec(),
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = CoreConfig::default();
        assert_eq!(cfg.queue_capacity, 4096);
        assert_eq!(cfg.response_timeout, Duration::from_secs(10));
        assert_eq!(cfg.initial_mode, Mode::Ground);
        assert_eq!(cfg.monitor.poll_interval, Duration::from_secs(1));
        assert_eq!(cfg.monitor.settle, Duration::from_millis(500));
        assert_eq!(cfg.monitor.registers, vec![0x25, 0x26, 0x45, 0x46]);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: CoreConfig = serde_json::from_str(
            r#"{"queue_capacity": 16, "initial_mode": "virtual", "monitor": {"settle": 50}}"#,
        )
        .unwrap();
        assert_eq!(cfg.queue_capacity, 16);
        assert_eq!(cfg.initial_mode, Mode::Virtual);
        assert_eq!(cfg.monitor.settle, Duration::from_millis(50));
        assert_eq!(cfg.monitor.poll_interval, Duration::from_secs(1));
        assert_eq!(cfg.response_timeout, DEFAULT_RESPONSE_TIMEOUT);
    }
}
