use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{CommandError, Result};
use crate::template;

/// Largest angle the single-byte magnitude field can carry.
pub const MAX_ANGLE: u8 = u8::MAX;

/// Movement axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Pan,
    Tilt,
}

impl Axis {
    /// One-byte axis selector at the start of the axis parameter block.
    pub fn selector(self) -> u8 {
        match self {
            Axis::Pan => 0x0C,
            Axis::Tilt => 0x8C,
        }
    }

    /// Axis-specific bytes following the selector.
    ///
    /// Meaning unknown; reproduced from captures as an opaque trailer.
    pub fn parameter_bytes(self) -> [u8; 4] {
        match self {
            Axis::Pan => [0x8C, 0x0C, 0x5C, 0x4C],
            Axis::Tilt => [0x1C, 0x0C, 0x5C, 0x5C],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Axis::Pan => "pan",
            Axis::Tilt => "tilt",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Template family a command belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Initialize,
    Heartbeat,
    Move,
}

impl CommandKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::Initialize => "initialize",
            CommandKind::Heartbeat => "heartbeat",
            CommandKind::Move => "move",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A semantic request to the unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Session start.
    Initialize,
    /// Keepalive, no movement.
    Heartbeat,
    /// Move one axis to an absolute angle.
    Move { axis: Axis, angle_degrees: i32 },
}

impl Command {
    /// Convenience constructor for a move.
    pub fn move_to(axis: Axis, angle_degrees: i32) -> Self {
        Command::Move {
            axis,
            angle_degrees,
        }
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Initialize => CommandKind::Initialize,
            Command::Heartbeat => CommandKind::Heartbeat,
            Command::Move { .. } => CommandKind::Move,
        }
    }

    /// Check parameters without producing bytes.
    pub fn validate(&self) -> Result<()> {
        if let Command::Move { angle_degrees, .. } = self {
            angle_byte(*angle_degrees)?;
        }
        Ok(())
    }

    /// Unframed payload bytes for this command.
    pub fn payload(&self) -> Result<Bytes> {
        template::build(self)
    }

    /// Complete wire frame for this command.
    pub fn frame(&self) -> Result<Bytes> {
        let payload = self.payload()?;
        Ok(pantilt_frame::encode(&payload)?)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Move {
                axis,
                angle_degrees,
            } => write!(f, "move({axis}, {angle_degrees})"),
            other => f.write_str(other.kind().as_str()),
        }
    }
}

/// Encode an angle as the single magnitude byte, rejecting anything that
/// would need wrapping.
pub(crate) fn angle_byte(angle_degrees: i32) -> Result<u8> {
    u8::try_from(angle_degrees).map_err(|_| CommandError::InvalidAngle {
        angle: angle_degrees,
        max: MAX_ANGLE,
    })
}
