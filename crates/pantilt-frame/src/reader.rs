use std::time::Duration;

use bytes::{Buf, BytesMut};
use pantilt_transport::SerialTransport;
use tracing::trace;

use crate::codec::{Frame, END_MARKER, START_MARKER};
use crate::error::{DecodeError, Result};
use crate::hex::HexDump;

const INITIAL_BUFFER_CAPACITY: usize = 256;

/// Longest candidate frame kept while waiting for an end marker.
pub const DEFAULT_MAX_FRAME_LEN: usize = 64;

/// Reassembles frames from the raw byte stream of a serial line.
///
/// Bytes arrive in arbitrary chunks. A frame starts at the first start marker
/// and ends at the first end marker after it; anything in between start
/// markers that cannot be a frame is reported once and dropped.
pub struct FrameReader {
    buf: BytesMut,
    max_frame_len: usize,
}

impl FrameReader {
    /// Create a reader with the default candidate length limit.
    pub fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }

    /// Create a reader with an explicit candidate length limit.
    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            max_frame_len,
        }
    }

    /// Append raw bytes received from the line.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Read once from `transport` (bounded by `max_wait`) and buffer the result.
    ///
    /// Returns the number of bytes received; zero means the wait timed out.
    pub fn fill<T: SerialTransport + ?Sized>(
        &mut self,
        transport: &mut T,
        max_wait: Duration,
    ) -> Result<usize> {
        let bytes = transport.read(max_wait)?;
        if !bytes.is_empty() {
            trace!(len = bytes.len(), data = %HexDump(&bytes), "rx chunk");
            self.push(&bytes);
        }
        Ok(bytes.len())
    }

    /// Extract the next complete frame or framing error from the buffer.
    ///
    /// Returns `None` when more bytes are needed.
    pub fn next_frame(&mut self) -> Option<std::result::Result<Frame, DecodeError>> {
        if self.buf.is_empty() {
            return None;
        }

        let Some(start) = self.buf.iter().position(|&b| b == START_MARKER) else {
            self.buf.clear();
            return Some(Err(DecodeError::BadFraming));
        };
        if start > 0 {
            self.buf.advance(start);
            return Some(Err(DecodeError::BadFraming));
        }

        match self.buf[1..].iter().position(|&b| b == END_MARKER) {
            Some(end) => {
                let raw = self.buf.split_to(end + 2).freeze();
                Some(Frame::parse(raw))
            }
            None if self.buf.len() > self.max_frame_len => {
                // Start marker without an end marker in range: drop it and resync.
                self.buf.advance(1);
                Some(Err(DecodeError::BadFraming))
            }
            None => None,
        }
    }

    /// Drop everything buffered, returning how many bytes were discarded.
    pub fn clear(&mut self) -> usize {
        let len = self.buf.len();
        self.buf.clear();
        len
    }

    /// Bytes currently buffered (a partial frame or unprocessed input).
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FrameReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameReader")
            .field("buffered", &self.buf.len())
            .field("max_frame_len", &self.max_frame_len)
            .finish()
    }
}
