//! Semantic commands for the pan-tilt unit and their byte templates.
//!
//! A [`Command`] carries only its semantic parameters. The bytes come from a
//! declarative [`Template`] per command kind, where each position is either a
//! fixed value or a field substituted from the command (angle, axis bytes).
//!
//! The templates reproduce captured traffic verbatim. Several positions are
//! not understood (the duplicated angle byte, the axis trailers); they are
//! kept as observed rather than normalized.

pub mod command;
pub mod error;
pub mod reply;
pub mod template;

pub use command::{Axis, Command, CommandKind, MAX_ANGLE};
pub use error::{CommandError, Result};
pub use reply::{
    compare_reply, expected_reply, ReplyComparison, ReplyMismatch, HEARTBEAT_REPLY,
    INITIALIZE_REPLY,
};
pub use template::{build, Field, Template, SUB_HEADER_OFFSET};
