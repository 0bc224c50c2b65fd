use bytes::{Bytes, BytesMut};
use pantilt_transport::{SerialTransport, TransportError};
use tracing::debug;

use crate::codec::encode_frame;
use crate::error::{FrameError, Result};
use crate::hex::HexDump;

const INITIAL_BUFFER_CAPACITY: usize = 64;
const MID_FRAME_RETRIES: usize = 3;

/// Writes complete frames to a serial line.
///
/// Reuses one encode buffer across sends.
#[derive(Debug)]
pub struct FrameWriter {
    buf: BytesMut,
}

impl FrameWriter {
    /// Create a new frame writer.
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Encode `payload` and write the whole frame.
    ///
    /// Returns the bytes that went on the wire.
    pub fn send<T: SerialTransport + ?Sized>(
        &mut self,
        transport: &mut T,
        payload: &[u8],
    ) -> Result<Bytes> {
        self.buf.clear();
        encode_frame(payload, &mut self.buf)?;
        let wire = self.buf.split().freeze();
        write_all(transport, &wire)?;
        debug!(len = wire.len(), frame = %HexDump(&wire), "tx frame");
        Ok(wire)
    }

    /// Write bytes that are already framed (or deliberately unframed).
    pub fn send_raw<T: SerialTransport + ?Sized>(
        &mut self,
        transport: &mut T,
        bytes: &[u8],
    ) -> Result<()> {
        write_all(transport, bytes)?;
        debug!(len = bytes.len(), data = %HexDump(bytes), "tx raw");
        Ok(())
    }
}

impl Default for FrameWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn write_all<T: SerialTransport + ?Sized>(transport: &mut T, bytes: &[u8]) -> Result<()> {
    let mut offset = 0usize;
    let mut stalls = 0usize;
    while offset < bytes.len() {
        match transport.write(&bytes[offset..]) {
            Ok(0) => return Err(FrameError::ConnectionClosed),
            Ok(n) => {
                offset += n;
                stalls = 0;
            }
            Err(TransportError::Io(err)) if err.kind() == std::io::ErrorKind::Interrupted => {
                continue
            }
            // Part of the frame is on the wire: finish it, never restart it.
            Err(err) if offset > 0 && err.is_transient() => {
                stalls += 1;
                if stalls > MID_FRAME_RETRIES {
                    return Err(FrameError::Incomplete {
                        written: offset,
                        len: bytes.len(),
                    });
                }
                debug!(
                    written = offset,
                    len = bytes.len(),
                    error = %err,
                    "write stalled mid-frame"
                );
            }
            Err(err) => return Err(FrameError::Transport(err)),
        }
    }
    Ok(())
}
