use pantilt_transport::TransportError;

/// Errors produced while decoding inbound bytes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Start or end marker missing or misplaced.
    #[error("bad framing (expected 0x3C ... 0x7C)")]
    BadFraming,

    /// The frame is shorter than the smallest template.
    #[error("truncated frame ({len} bytes, min {min})")]
    Truncated { len: usize, min: usize },
}

/// Errors that can occur during frame encoding or transmission.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// An inbound frame could not be decoded.
    #[error("frame decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The payload cannot fill the fixed header and trailer positions.
    #[error("payload too short ({len} bytes, min {min})")]
    PayloadTooShort { len: usize, min: usize },

    /// The line failed while reading or writing frames.
    #[error("frame transport error: {0}")]
    Transport(#[from] TransportError),

    /// The line accepted zero bytes of a frame.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,

    /// The line kept stalling after part of a frame was already written.
    #[error("line stalled after {written} of {len} frame bytes")]
    Incomplete { written: usize, len: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;
