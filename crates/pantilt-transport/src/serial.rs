use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use serialport::{ClearBuffer, DataBits, SerialPort};
use tracing::{debug, info, warn};

use crate::config::{SerialConfig, WritePacing};
use crate::error::{Result, TransportError};
use crate::traits::SerialTransport;

const READ_CHUNK_SIZE: usize = 256;

/// Serial port transport backed by the `serialport` crate.
///
/// Opens the device with eight data bits and the configured parity, stop
/// bits and flow control, then drives DTR/RTS to the configured levels.
pub struct SerialPortTransport {
    port: Option<Box<dyn SerialPort>>,
    path: String,
    config: SerialConfig,
}

impl SerialPortTransport {
    /// Open and configure the device at `path`.
    pub fn open(path: impl Into<String>, config: &SerialConfig) -> Result<Self> {
        let path = path.into();
        let mut port = serialport::new(path.as_str(), config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(config.parity.into())
            .stop_bits(config.stop_bits.into())
            .flow_control(config.flow_control.into())
            .timeout(config.read_timeout)
            .open()
            .map_err(|source| TransportError::Open {
                path: path.clone(),
                source,
            })?;

        // Not every driver exposes modem control lines (ptys, some USB bridges).
        if let Err(err) = port.write_data_terminal_ready(config.dtr) {
            warn!(%path, error = %err, "could not drive DTR");
        }
        if let Err(err) = port.write_request_to_send(config.rts) {
            warn!(%path, error = %err, "could not drive RTS");
        }

        info!(
            %path,
            baud = config.baud_rate,
            parity = ?config.parity,
            stop_bits = ?config.stop_bits,
            flow_control = ?config.flow_control,
            "opened serial line"
        );

        Ok(Self {
            port: Some(port),
            path,
            config: config.clone(),
        })
    }

    /// The device path this transport was opened on.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Line configuration applied at open.
    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    /// Whether `close()` has been called.
    pub fn is_closed(&self) -> bool {
        self.port.is_none()
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        self.port.as_mut().ok_or(TransportError::Closed)
    }

    /// Write one byte at a time with the configured gaps.
    ///
    /// An error after the first byte reports the bytes already sent instead,
    /// so the caller resumes the frame rather than resending it.
    fn write_paced(&mut self, bytes: &[u8], pacing: WritePacing) -> Result<usize> {
        let port = self.port_mut()?;
        for (written, &byte) in bytes.iter().enumerate() {
            if let Err(err) = port.write_all(&[byte]).and_then(|()| port.flush()) {
                if written == 0 {
                    return Err(TransportError::Io(err));
                }
                debug!(written, error = %err, "paced write interrupted");
                return Ok(written);
            }
            std::thread::sleep(pacing.delay_after(byte));
        }
        std::thread::sleep(pacing.settle);
        Ok(bytes.len())
    }
}

impl SerialTransport for SerialPortTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        if let Some(pacing) = self.config.pacing {
            return self.write_paced(bytes, pacing);
        }
        let port = self.port_mut()?;
        let written = port.write(bytes)?;
        port.flush()?;
        Ok(written)
    }

    fn read(&mut self, max_wait: Duration) -> Result<Vec<u8>> {
        let port = self.port_mut()?;
        let deadline = Instant::now() + max_wait;
        let mut out = Vec::new();
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        loop {
            let Some(remaining) = read_timeout(deadline, Instant::now()) else {
                break;
            };
            port.set_timeout(remaining)?;

            match port.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    out.extend_from_slice(&chunk[..n]);
                    // Drain whatever is already buffered, then hand it back.
                    if port.bytes_to_read()? == 0 {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::TimedOut => break,
                Err(err) if err.kind() == ErrorKind::Interrupted => {
                    if Instant::now() >= deadline {
                        break;
                    }
                }
                Err(err) => return Err(TransportError::Io(err)),
            }
        }

        Ok(out)
    }

    fn clear_input(&mut self) -> Result<usize> {
        let port = self.port_mut()?;
        let pending = port.bytes_to_read()? as usize;
        port.clear(ClearBuffer::Input)?;
        if pending > 0 {
            debug!(pending, "discarded stale input");
        }
        Ok(pending)
    }

    fn close(&mut self) -> Result<()> {
        if self.port.take().is_some() {
            info!(path = %self.path, "closed serial line");
        }
        Ok(())
    }
}

/// Port timeout for the next read, or `None` once `deadline` has passed.
fn read_timeout(deadline: Instant, now: Instant) -> Option<Duration> {
    let remaining = deadline.saturating_duration_since(now);
    (!remaining.is_zero()).then_some(remaining)
}

impl std::fmt::Debug for SerialPortTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialPortTransport")
            .field("path", &self.path)
            .field("baud_rate", &self.config.baud_rate)
            .field("open", &self.port.is_some())
            .finish()
    }
}
