//! Marker-delimited framing for the pan-tilt serial protocol.
//!
//! Every frame on the wire looks like:
//! - a start marker `0x3C`
//! - four header fields, each followed by a structural `0x5C`
//! - a parameter block of command-specific length
//! - `0x5C`, one trailer byte, and the end marker `0x7C`
//!
//! The `0x5C` bytes sit at fixed offsets. They are not a content escape:
//! data bytes that collide with a marker are sent as-is.

pub mod codec;
pub mod error;
pub mod hex;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_frame, encode, encode_frame, Frame, END_MARKER, ESCAPE, HEADER_FIELDS, MIN_FRAME_LEN,
    MIN_PAYLOAD_LEN, START_MARKER,
};
pub use error::{DecodeError, FrameError, Result};
pub use hex::{hex_dump, parse_hex, HexDump};
pub use reader::{FrameReader, DEFAULT_MAX_FRAME_LEN};
pub use writer::FrameWriter;
