//! In-memory serial line for driving sessions without hardware.
//!
//! [`ScriptedTransport`] shares a [`ManualClock`] with the session under
//! test. Reads jump the clock forward to the next scheduled inbound chunk, or
//! by the full wait when nothing is scheduled, so a fifteen-second retry run
//! completes instantly and every timestamp is exact.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use pantilt_transport::{Result, SerialTransport, TransportError};

use crate::clock::ManualClock;

/// A write observed by the scripted line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    /// Clock time (since the clock's origin) of the write.
    pub at: Duration,
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
struct Responder {
    trigger: Vec<u8>,
    reply: Vec<u8>,
    delay: Duration,
}

#[derive(Debug, Clone, Copy)]
enum WriteFault {
    Fail(io::ErrorKind),
    /// Accept only this many bytes of the write.
    Short(usize),
}

#[derive(Debug, Default)]
struct ScriptState {
    inbound: VecDeque<(Duration, Vec<u8>)>,
    responders: Vec<Responder>,
    writes: Vec<WriteRecord>,
    write_faults: VecDeque<WriteFault>,
    read_failure: Option<io::ErrorKind>,
    cleared_bytes: usize,
    closed: bool,
}

impl ScriptState {
    fn schedule(&mut self, at: Duration, bytes: Vec<u8>) {
        let index = self
            .inbound
            .iter()
            .position(|(t, _)| *t > at)
            .unwrap_or(self.inbound.len());
        self.inbound.insert(index, (at, bytes));
    }
}

/// Scripted serial line. Create with [`ScriptedTransport::new`].
#[derive(Debug)]
pub struct ScriptedTransport {
    state: Arc<Mutex<ScriptState>>,
    clock: ManualClock,
}

/// Test-side view of a [`ScriptedTransport`] that has been handed to a
/// session.
#[derive(Debug, Clone)]
pub struct ScriptHandle {
    state: Arc<Mutex<ScriptState>>,
    clock: ManualClock,
}

impl ScriptedTransport {
    pub fn new(clock: ManualClock) -> (Self, ScriptHandle) {
        let state = Arc::new(Mutex::new(ScriptState::default()));
        let handle = ScriptHandle {
            state: Arc::clone(&state),
            clock: clock.clone(),
        };
        (Self { state, clock }, handle)
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SerialTransport for ScriptedTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        let now = self.clock.elapsed();
        let mut state = self.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }
        let accepted = match state.write_faults.pop_front() {
            Some(WriteFault::Fail(kind)) => return Err(TransportError::Io(kind.into())),
            Some(WriteFault::Short(max)) => max.min(bytes.len()),
            None => bytes.len(),
        };
        let bytes = &bytes[..accepted];

        state.writes.push(WriteRecord {
            at: now,
            bytes: bytes.to_vec(),
        });
        let replies: Vec<_> = state
            .responders
            .iter()
            .filter(|r| r.trigger == bytes)
            .map(|r| (now + r.delay, r.reply.clone()))
            .collect();
        for (at, reply) in replies {
            state.schedule(at, reply);
        }
        Ok(bytes.len())
    }

    fn read(&mut self, max_wait: Duration) -> Result<Vec<u8>> {
        let now = self.clock.elapsed();
        let mut state = self.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }
        if let Some(kind) = state.read_failure {
            return Err(TransportError::Io(kind.into()));
        }

        let deadline = now + max_wait;
        match state.inbound.front() {
            Some((at, _)) if *at <= deadline => {
                let at = *at;
                self.clock.set_elapsed(at);
                Ok(state.inbound.pop_front().map(|(_, bytes)| bytes).unwrap_or_default())
            }
            _ => {
                self.clock.set_elapsed(deadline);
                Ok(Vec::new())
            }
        }
    }

    fn clear_input(&mut self) -> Result<usize> {
        let now = self.clock.elapsed();
        let mut state = self.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }
        let mut dropped = 0;
        while let Some((at, _)) = state.inbound.front() {
            if *at > now {
                break;
            }
            if let Some((_, bytes)) = state.inbound.pop_front() {
                dropped += bytes.len();
            }
        }
        state.cleared_bytes += dropped;
        Ok(dropped)
    }

    fn close(&mut self) -> Result<()> {
        self.lock().closed = true;
        Ok(())
    }
}

impl ScriptHandle {
    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    /// Reply with `reply` `delay` after every write exactly equal to `trigger`.
    pub fn respond_to(&self, trigger: &[u8], reply: &[u8], delay: Duration) {
        self.lock().responders.push(Responder {
            trigger: trigger.to_vec(),
            reply: reply.to_vec(),
            delay,
        });
    }

    /// Deliver `bytes` once the clock reaches `at`.
    pub fn push_inbound(&self, bytes: &[u8], at: Duration) {
        self.lock().schedule(at, bytes.to_vec());
    }

    /// Fail the next `count` writes with an I/O error of `kind`.
    pub fn fail_next_writes(&self, kind: io::ErrorKind, count: usize) {
        let mut state = self.lock();
        for _ in 0..count {
            state.write_faults.push_back(WriteFault::Fail(kind));
        }
    }

    /// Accept only the first `max` bytes of the next write.
    pub fn short_next_write(&self, max: usize) {
        self.lock().write_faults.push_back(WriteFault::Short(max));
    }

    /// Fail every read from now on.
    pub fn fail_reads(&self, kind: io::ErrorKind) {
        self.lock().read_failure = Some(kind);
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.lock().writes.clone()
    }

    /// Every byte written so far, in order.
    pub fn wire(&self) -> Vec<u8> {
        self.lock()
            .writes
            .iter()
            .flat_map(|w| w.bytes.iter().copied())
            .collect()
    }

    /// Times of writes exactly equal to `bytes`.
    pub fn writes_of(&self, bytes: &[u8]) -> Vec<Duration> {
        self.lock()
            .writes
            .iter()
            .filter(|w| w.bytes == bytes)
            .map(|w| w.at)
            .collect()
    }

    pub fn cleared_bytes(&self) -> usize {
        self.lock().cleared_bytes
    }

    pub fn pending_inbound(&self) -> usize {
        self.lock().inbound.len()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
