//! Device log monitor over the USB serial/JTAG console.

use std::io::Read;
use std::time::{Duration, Instant};

use anyhow::Result;
use serialport::SerialPort;

/// Find the first USB serial/JTAG console.
pub fn find_log_port() -> Result<String> {
    let ports = serialport::available_ports()?;
    ports
        .into_iter()
        .map(|p| p.port_name)
        .find(|name| name.contains("ttyACM") || name.contains("usbmodem"))
        .ok_or_else(|| anyhow::anyhow!("No log port found - ensure device is connected"))
}

/// Resolve a port argument: "auto" detects, "none" disables the monitor.
pub fn resolve_port(port_arg: &str) -> Result<Option<String>> {
    match port_arg {
        "none" => Ok(None),
        "auto" => find_log_port().map(Some),
        port => Ok(Some(port.to_string())),
    }
}

/// Line reader for the firmware log.
pub struct LogMonitor {
    port: Box<dyn SerialPort>,
    pending: Vec<u8>,
}

impl LogMonitor {
    pub fn new(port_name: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(100))
            .open()?;

        Ok(Self {
            port,
            pending: Vec::new(),
        })
    }

    /// Discard everything logged so far.
    pub fn drain(&mut self) -> Result<()> {
        self.port.clear(serialport::ClearBuffer::All)?;
        self.pending.clear();
        Ok(())
    }

    /// Wait for a log line containing `needle` and return it.
    pub fn wait_for_line(&mut self, needle: &str, timeout: Duration) -> Result<String> {
        let start = Instant::now();
        let mut buf = [0u8; 256];

        while start.elapsed() < timeout {
            while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.pending.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line).trim_end().to_string();
                if line.contains(needle) {
                    return Ok(line);
                }
            }

            match self.port.read(&mut buf) {
                Ok(n) => self.pending.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => return Err(e.into()),
            }
        }

        anyhow::bail!("Timeout waiting for log line containing '{}'", needle)
    }
}
