use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{DecodeError, FrameError, Result};

/// First byte of every frame.
pub const START_MARKER: u8 = 0x3C;

/// Last byte of every frame.
pub const END_MARKER: u8 = 0x7C;

/// Structural byte placed at fixed offsets inside a frame.
pub const ESCAPE: u8 = 0x5C;

/// Header fields at the front of the payload, each followed by `ESCAPE`.
pub const HEADER_FIELDS: usize = 4;

/// Smallest payload: the header fields plus the trailer byte.
pub const MIN_PAYLOAD_LEN: usize = HEADER_FIELDS + 1;

/// Smallest frame: start + escaped header + escaped trailer + end = 12 bytes.
pub const MIN_FRAME_LEN: usize = 1 + HEADER_FIELDS * 2 + 2 + 1;

/// Bytes added by framing on top of the payload.
const FRAME_OVERHEAD: usize = MIN_FRAME_LEN - MIN_PAYLOAD_LEN;

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The bytes exactly as they arrived, markers included.
    pub raw: Bytes,
    /// The payload with markers and structural bytes removed.
    pub payload: Bytes,
}

impl Frame {
    /// Decode a complete frame.
    pub fn parse(raw: impl Into<Bytes>) -> std::result::Result<Self, DecodeError> {
        let raw = raw.into();
        let payload = decode_frame(&raw)?;
        Ok(Self { raw, payload })
    }

    /// The total wire size of this frame.
    pub fn wire_size(&self) -> usize {
        self.raw.len()
    }

    /// The trailer byte (last payload byte).
    pub fn trailer(&self) -> Option<u8> {
        self.payload.last().copied()
    }
}

/// Encode a payload into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────┬────────────────────────────┬─────────────┬─────────┬──────┐
/// │ 0x3C │ h0 5C h1 5C h2 5C h3 5C    │ params ...  │ 5C tr   │ 0x7C │
/// │start │ header fields + structural │ (verbatim)  │ trailer │ end  │
/// └──────┴────────────────────────────┴─────────────┴─────────┴──────┘
/// ```
///
/// The payload is `h0 h1 h2 h3 params... tr`.
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() < MIN_PAYLOAD_LEN {
        return Err(FrameError::PayloadTooShort {
            len: payload.len(),
            min: MIN_PAYLOAD_LEN,
        });
    }

    let (header, rest) = payload.split_at(HEADER_FIELDS);
    let (params, trailer) = rest.split_at(rest.len() - 1);

    dst.reserve(payload.len() + FRAME_OVERHEAD);
    dst.put_u8(START_MARKER);
    for &field in header {
        dst.put_u8(field);
        dst.put_u8(ESCAPE);
    }
    dst.put_slice(params);
    dst.put_u8(ESCAPE);
    dst.put_slice(trailer);
    dst.put_u8(END_MARKER);
    Ok(())
}

/// Encode a payload into a fresh buffer.
pub fn encode(payload: &[u8]) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(payload.len() + FRAME_OVERHEAD);
    encode_frame(payload, &mut buf)?;
    Ok(buf.freeze())
}

/// Decode one complete frame into its payload.
///
/// Structural positions are stripped without checking their contents, so
/// replies that only loosely follow the outbound template still decode.
pub fn decode_frame(frame: &[u8]) -> std::result::Result<Bytes, DecodeError> {
    let (Some(&first), Some(&last)) = (frame.first(), frame.last()) else {
        return Err(DecodeError::BadFraming);
    };
    if first != START_MARKER || last != END_MARKER {
        return Err(DecodeError::BadFraming);
    }
    if frame.len() < MIN_FRAME_LEN {
        return Err(DecodeError::Truncated {
            len: frame.len(),
            min: MIN_FRAME_LEN,
        });
    }

    let body = &frame[1..frame.len() - 1];
    let header_span = HEADER_FIELDS * 2;
    let trailer = body[body.len() - 1];
    let params = &body[header_span..body.len() - 2];

    let mut payload = BytesMut::with_capacity(frame.len() - FRAME_OVERHEAD);
    for pair in body[..header_span].chunks_exact(2) {
        payload.put_u8(pair[0]);
    }
    payload.put_slice(params);
    payload.put_u8(trailer);
    Ok(payload.freeze())
}
