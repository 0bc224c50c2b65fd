use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use pantilt_command::CommandKind;
use pantilt_frame::HexDump;

/// Which way a frame travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Tx,
    Rx,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Tx => f.write_str("TX"),
            Direction::Rx => f.write_str("RX"),
        }
    }
}

/// One logged frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    /// Session clock time since the session was created.
    pub at: Duration,
    pub direction: Direction,
    /// Command family for transmitted frames.
    pub kind: Option<CommandKind>,
    pub bytes: Bytes,
}

impl fmt::Display for TranscriptEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:>9.3}s] {}", self.at.as_secs_f64(), self.direction)?;
        if let Some(kind) = self.kind {
            write!(f, " {kind}")?;
        }
        write!(f, ": {}", HexDump(&self.bytes))
    }
}

/// Bounded log of the most recent frames in both directions.
#[derive(Debug, Clone)]
pub struct Transcript {
    entries: VecDeque<TranscriptEntry>,
    capacity: usize,
}

impl Transcript {
    /// A capacity of zero disables recording.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn record(&mut self, entry: TranscriptEntry) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn entries(&self) -> impl Iterator<Item = &TranscriptEntry> {
        self.entries.iter()
    }

    /// Entries in one direction, oldest first.
    pub fn sent(&self) -> impl Iterator<Item = &TranscriptEntry> {
        self.entries.iter().filter(|e| e.direction == Direction::Tx)
    }

    pub fn received(&self) -> impl Iterator<Item = &TranscriptEntry> {
        self.entries.iter().filter(|e| e.direction == Direction::Rx)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::with_capacity(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ms: u64, direction: Direction) -> TranscriptEntry {
        TranscriptEntry {
            at: Duration::from_millis(ms),
            direction,
            kind: None,
            bytes: Bytes::from_static(&[0x3C, 0x7C]),
        }
    }

    #[test]
    fn drops_oldest_when_full() {
        let mut transcript = Transcript::with_capacity(2);
        transcript.record(entry(1, Direction::Tx));
        transcript.record(entry(2, Direction::Rx));
        transcript.record(entry(3, Direction::Tx));

        let times: Vec<_> = transcript.entries().map(|e| e.at.as_millis()).collect();
        assert_eq!(times, vec![2, 3]);
        assert_eq!(transcript.sent().count(), 1);
        assert_eq!(transcript.received().count(), 1);
    }

    #[test]
    fn zero_capacity_records_nothing() {
        let mut transcript = Transcript::with_capacity(0);
        transcript.record(entry(1, Direction::Tx));
        assert!(transcript.is_empty());
    }

    #[test]
    fn display_includes_kind_and_hex() {
        let mut e = entry(1500, Direction::Tx);
        e.kind = Some(CommandKind::Heartbeat);
        assert_eq!(e.to_string(), "[    1.500s] TX heartbeat: 3C 7C");
    }
}
