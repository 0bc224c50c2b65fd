use bytes::{BufMut, Bytes, BytesMut};
use pantilt_frame::HEADER_FIELDS;

use crate::command::{angle_byte, Axis, Command, CommandKind};
use crate::error::Result;

/// Payload offset of the sub-header byte that selects the command family.
pub const SUB_HEADER_OFFSET: usize = 2;

/// One payload position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// Constant byte.
    Fixed(u8),
    /// Angle magnitude byte.
    Angle,
    /// Axis selector (`Axis::selector`).
    AxisSelector,
    /// Byte `i` of the axis parameter bytes (`Axis::parameter_bytes`).
    AxisParam(usize),
}

use Field::{Angle, AxisParam, AxisSelector, Fixed};

/// Payload layout for one command family.
///
/// Offsets are positions in the unframed payload: four header fields, the
/// parameter block, then the trailer byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Template {
    pub kind: CommandKind,
    pub fields: &'static [Field],
}

pub const INITIALIZE: Template = Template {
    kind: CommandKind::Initialize,
    fields: &[
        Fixed(0x80),
        Fixed(0xC0),
        Fixed(0x70),
        Fixed(0x60),
        Fixed(0x82),
        Fixed(0xCA),
        Fixed(0xF8),
        Fixed(0xF8),
        Fixed(0x0C),
        Fixed(0x0C),
        Fixed(0x9C),
        Fixed(0xCC),
        Fixed(0xAC),
        Fixed(0x9C),
        Fixed(0x8C),
        Fixed(0x8C),
        Fixed(0x5C),
        Fixed(0x78),
        Fixed(0xE2),
    ],
};

pub const HEARTBEAT: Template = Template {
    kind: CommandKind::Heartbeat,
    fields: &[
        Fixed(0x80),
        Fixed(0xC0),
        Fixed(0xB0),
        Fixed(0x60),
        Fixed(0xCA),
        Fixed(0x2A),
        Fixed(0x18),
        Fixed(0x00),
        Fixed(0x00),
        Fixed(0x0C),
        Fixed(0x0C),
        Fixed(0x9C),
        Fixed(0xCC),
        Fixed(0xAC),
        Fixed(0x9C),
        Fixed(0x5C),
        Fixed(0x08),
        Fixed(0xE2),
    ],
};

// The angle is sent twice back to back; both copies are kept.
pub const MOVE: Template = Template {
    kind: CommandKind::Move,
    fields: &[
        Fixed(0x80),
        Fixed(0xC0),
        Fixed(0xE0),
        Fixed(0x60),
        Angle,
        Angle,
        AxisSelector,
        AxisParam(0),
        AxisParam(1),
        AxisParam(2),
        AxisParam(3),
        Fixed(0xE2),
    ],
};

impl Template {
    pub fn for_kind(kind: CommandKind) -> &'static Template {
        match kind {
            CommandKind::Initialize => &INITIALIZE,
            CommandKind::Heartbeat => &HEARTBEAT,
            CommandKind::Move => &MOVE,
        }
    }

    /// Payload length produced by this template.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Payload offsets of the parameter block (between header and trailer).
    pub fn parameter_range(&self) -> std::ops::Range<usize> {
        HEADER_FIELDS..self.fields.len().saturating_sub(1)
    }

    fn render(&self, angle: Option<u8>, axis: Option<Axis>) -> Bytes {
        let mut out = BytesMut::with_capacity(self.fields.len());
        for field in self.fields {
            let byte = match *field {
                Fixed(value) => value,
                Angle => angle.unwrap_or_default(),
                AxisSelector => axis.map(Axis::selector).unwrap_or_default(),
                AxisParam(i) => axis
                    .and_then(|axis| axis.parameter_bytes().get(i).copied())
                    .unwrap_or_default(),
            };
            out.put_u8(byte);
        }
        out.freeze()
    }
}

/// Build the unframed payload for a command.
///
/// Angles are validated before any byte is produced.
pub fn build(command: &Command) -> Result<Bytes> {
    let template = Template::for_kind(command.kind());
    let payload = match *command {
        Command::Initialize | Command::Heartbeat => template.render(None, None),
        Command::Move {
            axis,
            angle_degrees,
        } => template.render(Some(angle_byte(angle_degrees)?), Some(axis)),
    };
    Ok(payload)
}
