use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use serialport::SerialPort;
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::FrameSink;

/// Default line rate of the rig's serial link.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Serial line settings. The line is always 8N1 without flow control.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Device path (`/dev/ttyUSB0`, `COM3`).
    pub path: PathBuf,
    /// Baud rate.
    pub baud: u32,
    /// Read timeout. Bounds how long a receiver blocks before it can observe a stop request.
    pub read_timeout: Duration,
}

impl SerialConfig {
    /// Settings for `path` at the default baud rate and a 1 s read timeout.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            baud: DEFAULT_BAUD_RATE,
            read_timeout: Duration::from_secs(1),
        }
    }

    /// Override the baud rate.
    pub fn with_baud(mut self, baud: u32) -> Self {
        self.baud = baud;
        self
    }

    /// Override the read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

/// An open serial line to the hardware peer.
///
/// Reads are bounded by the configured timeout and surface as
/// `ErrorKind::TimedOut` when no byte arrived.
pub struct SerialLink {
    port: Box<dyn SerialPort>,
    path: PathBuf,
}

impl SerialLink {
    /// Open the serial device.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let port = serialport::new(config.path.to_string_lossy(), config.baud)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(config.read_timeout)
            .open()
            .map_err(|source| TransportError::Open {
                path: config.path.clone(),
                source,
            })?;

        info!(path = ?config.path, baud = config.baud, "serial port opened");

        Ok(Self {
            port,
            path: config.path.clone(),
        })
    }

    /// Clone the underlying handle (separate read and write sides).
    pub fn try_clone(&self) -> Result<Self> {
        let port = self.port.try_clone()?;
        Ok(Self {
            port,
            path: self.path.clone(),
        })
    }

    /// Turn this link into a shareable write sink.
    pub fn into_sink(self) -> SerialSink {
        SerialSink {
            port: Mutex::new(self.port),
            path: self.path,
        }
    }
}

impl Read for SerialLink {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.port.read(buf)
    }
}

impl std::fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink").field("path", &self.path).finish()
    }
}

/// Serial write handle shared by every sender. One frame is written at a time.
pub struct SerialSink {
    port: Mutex<Box<dyn SerialPort>>,
    path: PathBuf,
}

impl FrameSink for SerialSink {
    fn send_bytes(&self, bytes: &[u8]) -> Result<()> {
        let mut port = self
            .port
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        port.write_all(bytes)?;
        port.flush()?;
        debug!(path = ?self.path, len = bytes.len(), "serial frame written");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("serial:{}", self.path.display())
    }
}

impl std::fmt::Debug for SerialSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialSink").field("path", &self.path).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let cfg = SerialConfig::new("/dev/ttyUSB0");
        assert_eq!(cfg.baud, DEFAULT_BAUD_RATE);
        assert_eq!(cfg.read_timeout, Duration::from_secs(1));

        let cfg = cfg
            .with_baud(9600)
            .with_read_timeout(Duration::from_millis(100));
        assert_eq!(cfg.baud, 9600);
        assert_eq!(cfg.read_timeout, Duration::from_millis(100));
    }

    #[test]
    #[cfg(unix)]
    fn open_missing_device_fails() {
        let cfg = SerialConfig::new("/dev/riglink-does-not-exist");
        let err = SerialLink::open(&cfg).unwrap_err();
        assert!(matches!(err, TransportError::Open { .. }));
    }
}
