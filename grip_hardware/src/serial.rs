//! Sensor array link over a serial port.
use std::io::Read;
use std::time::Duration;

use grip_config::SerialCfg;
use grip_traits::{BoxError, Transport};
use serialport::SerialPort;

use crate::error::{HwError, Result};

pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
    name: String,
    timeout: Duration,
}

impl SerialTransport {
    pub fn open(cfg: &SerialCfg) -> Result<Self> {
        let timeout = Duration::from_millis(cfg.read_timeout_ms);
        let port = serialport::new(&cfg.port, cfg.baud_rate)
            .timeout(timeout)
            .open()
            .map_err(|e| HwError::Serial(format!("open {}: {e}", cfg.port)))?;
        // Stale bytes from before we opened would only cost a resync.
        if let Err(e) = port.clear(serialport::ClearBuffer::Input) {
            tracing::warn!(error = %e, "could not flush serial input");
        }
        tracing::info!(port = %cfg.port, baud = cfg.baud_rate, "serial port opened");
        Ok(Self {
            port: Some(port),
            name: cfg.port.clone(),
            timeout,
        })
    }
}

impl Transport for SerialTransport {
    fn read(&mut self, max_bytes: usize, timeout: Duration) -> std::result::Result<Vec<u8>, BoxError> {
        let port = self.port.as_mut().ok_or(HwError::Closed)?;
        if timeout != self.timeout {
            port.set_timeout(timeout)
                .map_err(|e| HwError::Serial(e.to_string()))?;
            self.timeout = timeout;
        }
        let mut buf = vec![0u8; max_bytes.max(1)];
        match port.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(Box::new(HwError::Io(e))),
        }
    }

    fn close(&mut self) -> std::result::Result<(), BoxError> {
        if self.port.take().is_some() {
            tracing::info!(port = %self.name, "serial port closed");
        }
        Ok(())
    }
}
