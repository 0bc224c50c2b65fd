//! Reply patterns expected from the unit, for diagnostics only.
//!
//! These were derived from protocol analysis, not from a confirmed exchange.
//! A session never rejects a reply for failing to match them.

use crate::command::CommandKind;

/// Reply expected after `Initialize`.
pub const INITIALIZE_REPLY: [u8; 15] = [
    0x3C, 0xC0, 0x5C, 0x80, 0x5C, 0xC0, 0x5C, 0x82, 0xCA, 0x5C, 0x5C, 0xC8, 0x5C, 0xE2, 0x7C,
];

/// Reply expected after `Heartbeat`.
pub const HEARTBEAT_REPLY: [u8; 15] = [
    0x3C, 0xC0, 0x5C, 0x80, 0x5C, 0xC0, 0x5C, 0xCA, 0x2A, 0x5C, 0x5C, 0x60, 0x5C, 0xE2, 0x7C,
];

/// Expected raw reply frame for a command family, if one was inferred.
pub fn expected_reply(kind: CommandKind) -> Option<&'static [u8]> {
    match kind {
        CommandKind::Initialize => Some(&INITIALIZE_REPLY),
        CommandKind::Heartbeat => Some(&HEARTBEAT_REPLY),
        CommandKind::Move => None,
    }
}

/// How an actual reply differs from the expected pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyMismatch {
    pub actual_len: usize,
    pub expected_len: usize,
    /// Offsets (within the shorter of the two) where bytes differ.
    pub differing: Vec<usize>,
}

impl ReplyMismatch {
    pub fn length_differs(&self) -> bool {
        self.actual_len != self.expected_len
    }
}

/// Result of comparing a reply against its expected pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyComparison {
    Exact,
    Mismatch(ReplyMismatch),
}

impl ReplyComparison {
    pub fn is_exact(&self) -> bool {
        matches!(self, ReplyComparison::Exact)
    }
}

/// Compare an actual raw reply against an expected one byte by byte.
pub fn compare_reply(actual: &[u8], expected: &[u8]) -> ReplyComparison {
    if actual == expected {
        return ReplyComparison::Exact;
    }
    let differing = actual
        .iter()
        .zip(expected)
        .enumerate()
        .filter(|(_, (a, e))| a != e)
        .map(|(i, _)| i)
        .collect();
    ReplyComparison::Mismatch(ReplyMismatch {
        actual_len: actual.len(),
        expected_len: expected.len(),
        differing,
    })
}
