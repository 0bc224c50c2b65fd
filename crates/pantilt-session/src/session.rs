use std::time::{Duration, Instant};

use bytes::Bytes;
use pantilt_command::{
    compare_reply, expected_reply, Axis, Command, CommandKind, ReplyComparison, HEARTBEAT_REPLY,
};
use pantilt_frame::{Frame, FrameReader, FrameWriter, HexDump, START_MARKER};
use pantilt_transport::SerialTransport;
use serde::Serialize;
use tracing::{debug, error, info, trace, warn};

use crate::cancel::CancelToken;
use crate::clock::{Clock, SystemClock};
use crate::config::{SessionConfig, SyncProbe};
use crate::error::{Result, SessionError};
use crate::state::{FailureReason, SessionState};
use crate::transcript::{Direction, Transcript, TranscriptEntry};

/// Result of a movement command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// A frame arrived within the move-ack window.
    Acknowledged(Frame),
    /// The window closed without a reply. Not an error.
    TimedOut,
}

impl MoveOutcome {
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, MoveOutcome::Acknowledged(_))
    }
}

/// Running counters for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub frames_sent: u64,
    pub initialize_attempts: u64,
    pub heartbeats_sent: u64,
    pub moves_sent: u64,
    pub frames_received: u64,
    /// Frames that arrived while nothing was waiting for a reply.
    pub unsolicited_frames: u64,
    pub framing_errors: u64,
    /// Replies that did not match the expected pattern for their command.
    pub reply_mismatches: u64,
    pub retries: u64,
    pub move_timeouts: u64,
    pub heartbeat_timeouts: u64,
}

/// Protocol session over one serial line.
///
/// All frames go out through one send path in the order operations are
/// called. Heartbeats follow a fixed schedule anchored on their due time:
/// a heartbeat that falls due while another command waits for its reply is
/// sent inside that wait, so movement traffic never shifts the cadence.
///
/// The session is synchronous. Use [`crate::KeepaliveHandle`] to keep
/// heartbeats flowing from a background thread between calls.
pub struct Session<T: SerialTransport, C: Clock = SystemClock> {
    transport: Option<T>,
    clock: C,
    config: SessionConfig,
    state: SessionState,
    reader: FrameReader,
    writer: FrameWriter,
    created: Instant,
    next_heartbeat: Option<Instant>,
    last_heartbeat: Option<Instant>,
    stats: SessionStats,
    transcript: Transcript,
    cancel: CancelToken,
    /// Reply owed to the command whose wait a heartbeat interrupted.
    held: Option<Frame>,
}

impl<T: SerialTransport> Session<T, SystemClock> {
    /// Create a disconnected session reading wall-clock time.
    pub fn new(config: SessionConfig) -> Result<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<T: SerialTransport, C: Clock> Session<T, C> {
    /// Create a disconnected session with an explicit clock.
    pub fn with_clock(config: SessionConfig, clock: C) -> Result<Self> {
        config.validate()?;
        let created = clock.now();
        Ok(Self {
            transport: None,
            reader: FrameReader::with_max_frame_len(config.max_frame_len),
            writer: FrameWriter::new(),
            transcript: Transcript::with_capacity(config.transcript_capacity),
            created,
            clock,
            config,
            state: SessionState::Disconnected,
            next_heartbeat: None,
            last_heartbeat: None,
            stats: SessionStats::default(),
            cancel: CancelToken::new(),
            held: None,
        })
    }

    /// Take ownership of an open line and initialize the unit.
    ///
    /// Sends `Initialize` once per retry-policy attempt and enters `Ready`
    /// on the first reply frame. When every attempt goes unanswered the
    /// session fails with `NoResponse`, or enters `Ready` anyway when
    /// `proceed_without_ack` is set.
    pub fn connect(&mut self, transport: T) -> Result<()> {
        if self.state != SessionState::Disconnected {
            return Err(self.invalid_state("connect"));
        }
        self.transport = Some(transport);
        self.reader.clear();
        self.cancel.reset();
        self.state = SessionState::Initializing;
        info!("session initializing");

        let result = self.initialize();
        self.check(result)
    }

    /// One service step: send the heartbeat if due, otherwise listen for
    /// inbound frames for at most one read slice.
    pub fn poll(&mut self) -> Result<()> {
        self.require_ready("poll")?;
        let result = self.service(None);
        self.check(result)
    }

    /// Keep the session serviced until `deadline`.
    pub fn run_until(&mut self, deadline: Instant) -> Result<()> {
        self.require_ready("run")?;
        while self.clock.now() < deadline {
            let result = self.service(Some(deadline));
            self.check(result)?;
        }
        Ok(())
    }

    pub fn run_for(&mut self, duration: Duration) -> Result<()> {
        let deadline = self.clock.now() + duration;
        self.run_until(deadline)
    }

    /// Move one axis to an absolute angle.
    ///
    /// The angle is validated before anything is sent. A heartbeat already
    /// due goes out first. A missing acknowledgement is reported as
    /// [`MoveOutcome::TimedOut`] and leaves the session `Ready`.
    pub fn move_to(&mut self, axis: Axis, angle_degrees: i32) -> Result<MoveOutcome> {
        self.require_ready("move")?;
        let command = Command::move_to(axis, angle_degrees);
        command.validate()?;

        let result = self.move_inner(command);
        if self.state == SessionState::AwaitingMoveAck {
            self.state = SessionState::Ready;
        }
        self.check(result)
    }

    /// Send a command and wait `command_timeout` for a reply frame.
    pub fn request(&mut self, command: Command) -> Result<Frame> {
        let timeout = self.config.command_timeout;
        self.request_with_timeout(command, timeout)
    }

    /// Send a command and wait up to `timeout` for a reply frame.
    ///
    /// Heartbeats keep their schedule during the wait. No reply yields
    /// [`SessionError::Timeout`], which does not change the session state.
    /// Moves are refused here; they go through [`Session::move_to`].
    pub fn request_with_timeout(&mut self, command: Command, timeout: Duration) -> Result<Frame> {
        self.require_ready("send request")?;
        if command.kind() == CommandKind::Move {
            return Err(SessionError::NotRequestable {
                kind: command.kind(),
            });
        }
        command.validate()?;

        let result = self.request_inner(command, timeout);
        self.check(result)
    }

    /// Send the heartbeat if it is due. Returns whether one was sent.
    pub fn heartbeat_if_due(&mut self) -> Result<bool> {
        if !self.state.is_active() {
            return Err(self.invalid_state("send heartbeat"));
        }
        if !self.heartbeat_due(self.clock.now()) {
            return Ok(false);
        }
        let result = self.send_heartbeat(false);
        self.check(result).map(|()| true)
    }

    /// Time left until the next heartbeat, or `None` when no heartbeat loop
    /// is running.
    pub fn time_until_heartbeat(&self) -> Option<Duration> {
        if !self.state.is_active() {
            return None;
        }
        let due = self.next_heartbeat?;
        Some(due.saturating_duration_since(self.clock.now()))
    }

    /// Close the line and return to `Disconnected`.
    ///
    /// A failed session must be `reset()` instead.
    pub fn disconnect(&mut self) -> Result<()> {
        if self.state.is_failed() {
            return Err(self.invalid_state("disconnect"));
        }
        if self.state != SessionState::Disconnected {
            info!(state = %self.state, "session disconnecting");
        }
        self.release();
        self.state = SessionState::Disconnected;
        Ok(())
    }

    /// Return to `Disconnected` from any state, releasing the line.
    pub fn reset(&mut self) {
        if self.state != SessionState::Disconnected {
            info!(state = %self.state, "session reset");
        }
        self.release();
        self.state = SessionState::Disconnected;
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Token that aborts in-flight waits from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    pub fn last_heartbeat_at(&self) -> Option<Instant> {
        self.last_heartbeat
    }

    pub fn next_heartbeat_at(&self) -> Option<Instant> {
        self.next_heartbeat
    }

    fn initialize(&mut self) -> Result<()> {
        if let Some(probe) = self.config.sync_probe {
            self.sync_probe(probe)?;
        }

        let policy = self.config.init_policy.clone();
        let attempts = policy.attempts();
        for (attempt, timeout) in policy.iter().enumerate() {
            if attempt > 0 {
                self.stats.retries += 1;
            }
            self.stats.initialize_attempts += 1;
            debug!(attempt = attempt + 1, attempts, ?timeout, "sending initialize");

            match self.transmit(Command::Initialize) {
                Ok(_) => {}
                Err(err) if err.is_transient() => {
                    warn!(attempt = attempt + 1, error = %err, "initialize write failed");
                    continue;
                }
                Err(err) => return Err(err),
            }

            if let Some(frame) = self.await_reply(timeout, false)? {
                self.note_reply(CommandKind::Initialize, &frame);
                info!(attempt = attempt + 1, "unit acknowledged initialize");
                self.enter_ready();
                return Ok(());
            }
            warn!(attempt = attempt + 1, attempts, ?timeout, "no reply to initialize");
        }

        if self.config.proceed_without_ack {
            warn!(attempts, "initialize never acknowledged, proceeding without ack");
            self.enter_ready();
            return Ok(());
        }
        self.fail(FailureReason::NoResponse);
        Err(SessionError::NoResponse { attempts })
    }

    /// Send bare start markers until any byte comes back.
    fn sync_probe(&mut self, probe: SyncProbe) -> Result<bool> {
        for attempt in 1..=probe.attempts {
            debug!(attempt, attempts = probe.attempts, "sending sync marker");
            let transport = line(&mut self.transport, self.state)?;
            let sent = self.writer.send_raw(transport, &[START_MARKER]);
            match sent.map_err(SessionError::from) {
                Ok(()) => self.record(Direction::Tx, None, Bytes::from_static(&[START_MARKER])),
                Err(err) if err.is_transient() => {
                    warn!(attempt, error = %err, "sync write failed");
                    continue;
                }
                Err(err) => return Err(err),
            }

            let deadline = self.clock.now() + probe.timeout;
            while let Some(wait) = self.next_wait(deadline, None) {
                self.check_cancelled()?;
                let transport = line(&mut self.transport, self.state)?;
                let bytes = transport.read(wait)?;
                if !bytes.is_empty() {
                    info!(attempt, data = %HexDump(&bytes), "sync answered");
                    self.record(Direction::Rx, None, Bytes::from(bytes));
                    return Ok(true);
                }
            }
        }
        warn!(attempts = probe.attempts, "sync probe got no answer");
        Ok(false)
    }

    fn move_inner(&mut self, command: Command) -> Result<MoveOutcome> {
        if self.heartbeat_due(self.clock.now()) {
            self.send_heartbeat(false)?;
        }

        self.transmit(command)?;
        self.state = SessionState::AwaitingMoveAck;

        let timeout = self.config.move_ack.timeout();
        match self.await_reply(timeout, true)? {
            Some(frame) => {
                debug!(%command, "move acknowledged");
                Ok(MoveOutcome::Acknowledged(frame))
            }
            None => {
                self.stats.move_timeouts += 1;
                debug!(%command, ?timeout, "move not acknowledged");
                Ok(MoveOutcome::TimedOut)
            }
        }
    }

    fn request_inner(&mut self, command: Command, timeout: Duration) -> Result<Frame> {
        if self.heartbeat_due(self.clock.now()) {
            self.send_heartbeat(false)?;
        }

        self.transmit(command)?;
        match self.await_reply(timeout, true)? {
            Some(frame) => {
                self.note_reply(command.kind(), &frame);
                Ok(frame)
            }
            None => Err(SessionError::Timeout(timeout)),
        }
    }

    fn service(&mut self, until: Option<Instant>) -> Result<()> {
        let now = self.clock.now();
        if self.heartbeat_due(now) {
            return self.send_heartbeat(false);
        }

        let mut deadline = self.next_heartbeat.unwrap_or(now + self.config.read_slice);
        if let Some(until) = until {
            deadline = deadline.min(until);
        }
        if let Some(wait) = self.next_wait(deadline, None) {
            self.listen(wait)?;
        }
        Ok(())
    }

    /// Read once and account for whatever arrived with nobody waiting.
    fn listen(&mut self, wait: Duration) -> Result<()> {
        self.check_cancelled()?;
        let transport = line(&mut self.transport, self.state)?;
        self.reader.fill(transport, wait)?;
        while let Some(frame) = self.next_inbound() {
            self.stats.unsolicited_frames += 1;
            debug!(frame = %HexDump(&frame.raw), "unsolicited frame");
        }
        Ok(())
    }

    /// Send one heartbeat, retrying failed attempts up to the policy limit.
    ///
    /// `nested` marks a heartbeat sent while another command awaits its reply.
    fn send_heartbeat(&mut self, nested: bool) -> Result<()> {
        let now = self.clock.now();
        let due = self.next_heartbeat.unwrap_or(now);
        let attempts = self.config.heartbeat_attempts;

        let mut delivered = false;
        for attempt in 0..attempts {
            if attempt > 0 {
                self.stats.retries += 1;
            }
            match self.transmit(Command::Heartbeat) {
                Ok(_) => {}
                Err(err) if err.is_transient() => {
                    warn!(attempt = attempt + 1, attempts, error = %err, "heartbeat write failed");
                    continue;
                }
                Err(err) => return Err(err),
            }

            if !self.config.heartbeat_requires_ack {
                delivered = true;
                break;
            }
            match self.await_heartbeat_ack(nested)? {
                Some(frame) => {
                    self.note_reply(CommandKind::Heartbeat, &frame);
                    delivered = true;
                    break;
                }
                None => {
                    self.stats.heartbeat_timeouts += 1;
                    warn!(attempt = attempt + 1, attempts, "heartbeat not acknowledged");
                }
            }
        }

        if !delivered {
            return Err(SessionError::KeepaliveLost { attempts });
        }
        self.last_heartbeat = Some(now);
        self.schedule_after(due);
        Ok(())
    }

    fn schedule_after(&mut self, due: Instant) {
        let now = self.clock.now();
        let mut next = due + self.config.heartbeat_interval;
        if next <= now {
            warn!(
                late = ?now.saturating_duration_since(due),
                "heartbeat schedule slipped, re-anchoring"
            );
            next = now + self.config.heartbeat_interval;
        }
        self.next_heartbeat = Some(next);
    }

    fn heartbeat_due(&self, now: Instant) -> bool {
        self.state.is_active() && self.next_heartbeat.is_some_and(|due| now >= due)
    }

    fn enter_ready(&mut self) {
        self.state = SessionState::Ready;
        self.next_heartbeat = Some(self.clock.now());
        info!(interval = ?self.config.heartbeat_interval, "session ready");
    }

    /// Encode and write one command frame.
    fn transmit(&mut self, command: Command) -> Result<Bytes> {
        let payload = command.payload()?;
        let flush = self.config.flush_stale_input;
        let transport = line(&mut self.transport, self.state)?;
        if flush {
            let dropped = transport.clear_input()?;
            let buffered = self.reader.clear();
            if dropped + buffered > 0 {
                debug!(dropped, buffered, "discarded stale input");
            }
        }

        let transport = line(&mut self.transport, self.state)?;
        let wire = self.writer.send(transport, &payload)?;

        self.stats.frames_sent += 1;
        match command.kind() {
            CommandKind::Heartbeat => self.stats.heartbeats_sent += 1,
            CommandKind::Move => self.stats.moves_sent += 1,
            CommandKind::Initialize => {}
        }
        trace!(%command, "sent");
        self.record(Direction::Tx, Some(command.kind()), wire.clone());
        Ok(wire)
    }

    /// Wait up to `timeout` for the next well-formed frame.
    ///
    /// With `service_heartbeats`, heartbeats falling due are sent inside the
    /// wait and the wait is sliced so none is late.
    fn await_reply(
        &mut self,
        timeout: Duration,
        service_heartbeats: bool,
    ) -> Result<Option<Frame>> {
        let deadline = self.clock.now() + timeout;
        loop {
            if let Some(frame) = self.next_inbound() {
                return Ok(Some(frame));
            }
            self.check_cancelled()?;

            let now = self.clock.now();
            if service_heartbeats && self.heartbeat_due(now) {
                self.send_heartbeat(true)?;
                continue;
            }
            let heartbeat = if service_heartbeats {
                self.next_heartbeat
            } else {
                None
            };
            let Some(wait) = self.next_wait(deadline, heartbeat) else {
                return Ok(None);
            };
            let transport = line(&mut self.transport, self.state)?;
            self.reader.fill(transport, wait)?;
        }
    }

    /// Wait `heartbeat_ack_timeout` for the heartbeat's reply.
    ///
    /// Replies are matched to commands in send order. Inside another
    /// command's wait the first frame belongs to that command and is held for
    /// it, unless it is an exact heartbeat reply.
    fn await_heartbeat_ack(&mut self, nested: bool) -> Result<Option<Frame>> {
        let deadline = self.clock.now() + self.config.heartbeat_ack_timeout;
        loop {
            while let Some(frame) = self.decode_inbound() {
                let owed = nested
                    && self.held.is_none()
                    && !compare_reply(&frame.raw, &HEARTBEAT_REPLY).is_exact();
                if !owed {
                    return Ok(Some(frame));
                }
                debug!(frame = %HexDump(&frame.raw), "holding reply for the waiting command");
                self.held = Some(frame);
            }
            self.check_cancelled()?;

            let Some(wait) = self.next_wait(deadline, None) else {
                return Ok(None);
            };
            let transport = line(&mut self.transport, self.state)?;
            self.reader.fill(transport, wait)?;
        }
    }

    /// Next frame for whoever is waiting: a held reply first, then the line.
    fn next_inbound(&mut self) -> Option<Frame> {
        self.held.take().or_else(|| self.decode_inbound())
    }

    /// Pop the next decodable frame, counting and dropping malformed input.
    fn decode_inbound(&mut self) -> Option<Frame> {
        while let Some(item) = self.reader.next_frame() {
            match item {
                Ok(frame) => {
                    self.stats.frames_received += 1;
                    debug!(len = frame.wire_size(), frame = %HexDump(&frame.raw), "rx frame");
                    self.record(Direction::Rx, None, frame.raw.clone());
                    return Some(frame);
                }
                Err(err) => {
                    self.stats.framing_errors += 1;
                    warn!(error = %err, "discarding malformed inbound bytes");
                }
            }
        }
        None
    }

    /// Length of the next read slice, or `None` once `deadline` has passed.
    fn next_wait(&self, deadline: Instant, heartbeat: Option<Instant>) -> Option<Duration> {
        let now = self.clock.now();
        if now >= deadline {
            return None;
        }
        let mut wait = (deadline - now).min(self.config.read_slice);
        if let Some(due) = heartbeat {
            wait = wait.min(due.saturating_duration_since(now));
        }
        Some(wait)
    }

    fn note_reply(&mut self, kind: CommandKind, frame: &Frame) {
        let Some(expected) = expected_reply(kind) else {
            return;
        };
        match compare_reply(&frame.raw, expected) {
            ReplyComparison::Exact => debug!(%kind, "reply matches expected pattern"),
            ReplyComparison::Mismatch(mismatch) => {
                self.stats.reply_mismatches += 1;
                debug!(
                    %kind,
                    actual_len = mismatch.actual_len,
                    expected_len = mismatch.expected_len,
                    differing = ?mismatch.differing,
                    "reply differs from expected pattern"
                );
            }
        }
    }

    fn record(&mut self, direction: Direction, kind: Option<CommandKind>, bytes: Bytes) {
        let at = self.clock.now().saturating_duration_since(self.created);
        self.transcript.record(TranscriptEntry {
            at,
            direction,
            kind,
            bytes,
        });
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(SessionError::Cancelled);
        }
        Ok(())
    }

    /// Apply the state consequences of an operation's error.
    fn check<R>(&mut self, result: Result<R>) -> Result<R> {
        match result {
            Err(err) if err.is_fatal() => {
                error!(error = %err, "session lost its line");
                self.fail(FailureReason::TransportLost);
                Err(err)
            }
            Err(SessionError::Cancelled) => {
                info!(state = %self.state, "session wait cancelled, releasing line");
                self.release();
                self.state = SessionState::Disconnected;
                Err(SessionError::Cancelled)
            }
            other => other,
        }
    }

    fn fail(&mut self, reason: FailureReason) {
        warn!(%reason, "session failed");
        self.release();
        self.state = SessionState::Failed(reason);
    }

    fn release(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Err(err) = transport.close() {
                debug!(error = %err, "error closing transport");
            }
        }
        let dropped = self.reader.clear();
        if dropped > 0 {
            trace!(dropped, "dropped buffered input");
        }
        self.held = None;
        self.next_heartbeat = None;
    }

    fn require_ready(&self, operation: &'static str) -> Result<()> {
        if self.state == SessionState::Ready {
            Ok(())
        } else {
            Err(self.invalid_state(operation))
        }
    }

    fn invalid_state(&self, operation: &'static str) -> SessionError {
        SessionError::InvalidState {
            operation,
            state: self.state,
        }
    }
}

/// Borrow the open line without borrowing the rest of the session.
fn line<T>(transport: &mut Option<T>, state: SessionState) -> Result<&mut T> {
    transport.as_mut().ok_or(SessionError::InvalidState {
        operation: "use transport",
        state,
    })
}

impl<T: SerialTransport, C: Clock> std::fmt::Debug for Session<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("connected", &self.transport.is_some())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<T: SerialTransport, C: Clock> Drop for Session<T, C> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use std::io::ErrorKind;

    use pantilt_command::INITIALIZE_REPLY;
    use pantilt_frame::FrameError;

    use super::*;
    use crate::clock::ManualClock;
    use crate::policy::AckProfile;
    use crate::testing::{ScriptHandle, ScriptedTransport};

    type TestSession = Session<ScriptedTransport, ManualClock>;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn rig(config: SessionConfig) -> (TestSession, ScriptedTransport, ScriptHandle) {
        let clock = ManualClock::new();
        let (line, handle) = ScriptedTransport::new(clock.clone());
        let session = Session::with_clock(config, clock).unwrap();
        (session, line, handle)
    }

    fn frame(command: Command) -> Vec<u8> {
        command.frame().unwrap().to_vec()
    }

    /// Session that reached `Ready` at 10 ms through an acknowledged initialize.
    fn ready(config: SessionConfig) -> (TestSession, ScriptHandle) {
        let (mut session, line, handle) = rig(config);
        handle.respond_to(&frame(Command::Initialize), &INITIALIZE_REPLY, ms(10));
        session.connect(line).unwrap();
        assert_eq!(session.state(), SessionState::Ready);
        (session, handle)
    }

    #[test]
    fn unanswered_initialize_fails_after_all_attempts() {
        let (mut session, line, handle) = rig(SessionConfig::default());

        let err = session.connect(line).unwrap_err();
        assert!(matches!(err, SessionError::NoResponse { attempts: 3 }));
        assert_eq!(
            session.state(),
            SessionState::Failed(FailureReason::NoResponse)
        );
        assert!(handle.clock().elapsed() >= Duration::from_secs(15));
        assert_eq!(
            handle.writes_of(&frame(Command::Initialize)),
            vec![Duration::ZERO, Duration::from_secs(5), Duration::from_secs(10)]
        );
        assert_eq!(session.stats().initialize_attempts, 3);
        assert_eq!(session.stats().retries, 2);
        assert!(handle.is_closed());
    }

    #[test]
    fn proceed_without_ack_enters_ready() {
        let config = SessionConfig {
            proceed_without_ack: true,
            ..SessionConfig::default()
        };
        let (mut session, line, handle) = rig(config);

        session.connect(line).unwrap();
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(handle.clock().elapsed(), Duration::from_secs(15));

        session.poll().unwrap();
        assert_eq!(
            handle.writes_of(&frame(Command::Heartbeat)),
            vec![Duration::from_secs(15)]
        );
    }

    #[test]
    fn first_reply_completes_initialize() {
        let (session, handle) = ready(SessionConfig::default());
        assert_eq!(handle.clock().elapsed(), ms(10));
        assert_eq!(session.stats().frames_received, 1);
        assert_eq!(session.stats().reply_mismatches, 0);

        let entries: Vec<_> = session.transcript().entries().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].direction, Direction::Tx);
        assert_eq!(entries[0].kind, Some(CommandKind::Initialize));
        assert_eq!(entries[1].direction, Direction::Rx);
        assert_eq!(entries[1].at, ms(10));
        assert_eq!(entries[1].bytes.as_ref(), &INITIALIZE_REPLY[..]);
    }

    #[test]
    fn any_well_formed_reply_counts() {
        let (mut session, line, handle) = rig(SessionConfig::default());
        handle.respond_to(&frame(Command::Initialize), &HEARTBEAT_REPLY, ms(10));

        session.connect(line).unwrap();
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.stats().reply_mismatches, 1);
    }

    #[test]
    fn move_does_not_shift_heartbeat_cadence() {
        let (mut session, handle) = ready(SessionConfig::default());

        session.poll().unwrap();
        let outcome = session.move_to(Axis::Pan, 15).unwrap();
        assert_eq!(outcome, MoveOutcome::TimedOut);
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(handle.clock().elapsed(), ms(210));

        let pan = frame(Command::move_to(Axis::Pan, 15));
        assert_eq!(&pan[9..11], &[0x0F, 0x0F]);
        assert_eq!(handle.writes_of(&pan), vec![ms(10)]);

        session.run_for(Duration::from_secs(1)).unwrap();
        assert_eq!(
            handle.writes_of(&frame(Command::Heartbeat)),
            vec![ms(10), ms(1010)]
        );
        assert_eq!(session.stats().move_timeouts, 1);
    }

    #[test]
    fn due_heartbeat_goes_out_before_move() {
        let (mut session, handle) = ready(SessionConfig::default());

        session.move_to(Axis::Tilt, 90).unwrap();
        let writes: Vec<_> = handle.writes().into_iter().map(|w| w.bytes).collect();
        assert_eq!(
            writes,
            vec![
                frame(Command::Initialize),
                frame(Command::Heartbeat),
                frame(Command::move_to(Axis::Tilt, 90)),
            ]
        );
    }

    #[test]
    fn long_move_wait_keeps_heartbeats_on_schedule() {
        let config = SessionConfig {
            move_ack: AckProfile::Standard,
            ..SessionConfig::default()
        };
        let (mut session, handle) = ready(config);
        session.poll().unwrap();

        assert_eq!(
            session.move_to(Axis::Pan, 45).unwrap(),
            MoveOutcome::TimedOut
        );
        let beats = handle.writes_of(&frame(Command::Heartbeat));
        assert_eq!(beats.first(), Some(&ms(10)));
        assert_eq!(beats.last(), Some(&ms(10_010)));
        assert!(beats
            .windows(2)
            .all(|pair| pair[1] - pair[0] == Duration::from_secs(1)));
    }

    #[test]
    fn acknowledged_move() {
        let (mut session, handle) = ready(SessionConfig::default());
        let pan = frame(Command::move_to(Axis::Pan, 30));
        handle.respond_to(&pan, &HEARTBEAT_REPLY, ms(50));

        let outcome = session.move_to(Axis::Pan, 30).unwrap();
        assert!(outcome.is_acknowledged());
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.stats().move_timeouts, 0);
    }

    #[test]
    fn invalid_angle_sends_nothing() {
        let (mut session, handle) = ready(SessionConfig::default());
        let before = handle.writes().len();

        for angle in [256, -1] {
            assert!(matches!(
                session.move_to(Axis::Pan, angle),
                Err(SessionError::InvalidAngle { .. })
            ));
        }
        assert_eq!(handle.writes().len(), before);
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[test]
    fn transient_heartbeat_failures_are_retried() {
        let (mut session, handle) = ready(SessionConfig::default());
        handle.fail_next_writes(ErrorKind::TimedOut, 2);

        session.poll().unwrap();
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.stats().retries, 2);
        assert_eq!(handle.writes_of(&frame(Command::Heartbeat)).len(), 1);
    }

    #[test]
    fn heartbeat_failures_escalate_to_transport_lost() {
        let (mut session, handle) = ready(SessionConfig::default());
        handle.fail_next_writes(ErrorKind::TimedOut, 3);

        let err = session.poll().unwrap_err();
        assert!(matches!(err, SessionError::KeepaliveLost { attempts: 3 }));
        assert_eq!(
            session.state(),
            SessionState::Failed(FailureReason::TransportLost)
        );
        assert!(handle.is_closed());
    }

    #[test]
    fn unacknowledged_heartbeats_escalate_when_acks_required() {
        let config = SessionConfig {
            heartbeat_requires_ack: true,
            ..SessionConfig::default()
        };
        let (mut session, handle) = ready(config);

        assert!(matches!(
            session.poll(),
            Err(SessionError::KeepaliveLost { attempts: 3 })
        ));
        assert_eq!(session.stats().heartbeat_timeouts, 3);
        assert_eq!(handle.clock().elapsed(), ms(610));
        assert!(session.state().is_failed());
    }

    #[test]
    fn acknowledged_heartbeat_keeps_session_ready() {
        let config = SessionConfig {
            heartbeat_requires_ack: true,
            ..SessionConfig::default()
        };
        let (mut session, handle) = ready(config);
        handle.respond_to(&frame(Command::Heartbeat), &HEARTBEAT_REPLY, ms(20));

        session.run_for(Duration::from_secs(3)).unwrap();
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.stats().heartbeats_sent, 3);
        assert_eq!(session.stats().heartbeat_timeouts, 0);
        assert_eq!(session.stats().reply_mismatches, 0);
    }

    #[test]
    fn fatal_write_error_fails_session() {
        let (mut session, handle) = ready(SessionConfig::default());
        session.poll().unwrap();
        handle.fail_next_writes(ErrorKind::BrokenPipe, 1);

        let err = session.move_to(Axis::Pan, 10).unwrap_err();
        assert!(matches!(err, SessionError::Transport(_)));
        assert_eq!(
            session.state(),
            SessionState::Failed(FailureReason::TransportLost)
        );
        assert!(handle.is_closed());
    }

    #[test]
    fn fatal_read_error_fails_session() {
        let (mut session, handle) = ready(SessionConfig::default());
        session.poll().unwrap();
        handle.fail_reads(ErrorKind::BrokenPipe);

        assert!(session.poll().is_err());
        assert_eq!(
            session.state(),
            SessionState::Failed(FailureReason::TransportLost)
        );
    }

    #[test]
    fn only_reset_leaves_failed() {
        let (mut session, line, first) = rig(SessionConfig::default());
        assert!(session.connect(line).is_err());
        assert!(session.state().is_failed());

        assert!(matches!(
            session.move_to(Axis::Pan, 10),
            Err(SessionError::InvalidState { .. })
        ));
        assert!(matches!(
            session.disconnect(),
            Err(SessionError::InvalidState { .. })
        ));
        assert!(session.poll().is_err());
        assert!(session.state().is_failed());

        session.reset();
        assert_eq!(session.state(), SessionState::Disconnected);

        let (line, handle) = ScriptedTransport::new(first.clock().clone());
        handle.respond_to(&frame(Command::Initialize), &INITIALIZE_REPLY, ms(5));
        session.connect(line).unwrap();
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[test]
    fn disconnect_closes_line() {
        let (mut session, handle) = ready(SessionConfig::default());
        session.disconnect().unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(!session.is_connected());
        assert!(handle.is_closed());
        assert_eq!(session.time_until_heartbeat(), None);
        assert!(session.disconnect().is_ok());
    }

    #[test]
    fn malformed_inbound_bytes_are_counted_and_dropped() {
        let (mut session, handle) = ready(SessionConfig::default());
        handle.push_inbound(&[0x01, 0x02], ms(100));
        handle.push_inbound(&[0x3C, 0x7C], ms(200));
        handle.push_inbound(&HEARTBEAT_REPLY, ms(300));

        session.run_for(Duration::from_millis(500)).unwrap();
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.stats().framing_errors, 2);
        assert_eq!(session.stats().unsolicited_frames, 1);
    }

    #[test]
    fn request_returns_reply_or_timeout() {
        let (mut session, handle) = ready(SessionConfig::default());

        let reply = session
            .request_with_timeout(Command::Initialize, Duration::from_secs(2))
            .unwrap();
        assert_eq!(reply.raw.as_ref(), &INITIALIZE_REPLY[..]);

        let err = session
            .request_with_timeout(Command::Heartbeat, Duration::from_secs(2))
            .unwrap_err();
        assert!(matches!(err, SessionError::Timeout(t) if t == Duration::from_secs(2)));
        assert_eq!(session.state(), SessionState::Ready);
        assert!(handle.writes_of(&frame(Command::Heartbeat)).contains(&ms(1010)));
    }

    #[test]
    fn request_waits_for_configured_command_timeout() {
        let config = SessionConfig {
            command_timeout: Duration::from_secs(3),
            ..SessionConfig::default()
        };
        let (mut session, handle) = ready(config);

        let err = session.request(Command::Heartbeat).unwrap_err();
        assert!(matches!(err, SessionError::Timeout(t) if t == Duration::from_secs(3)));
        assert_eq!(handle.clock().elapsed(), ms(3010));
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[test]
    fn moves_are_not_requests() {
        let (mut session, handle) = ready(SessionConfig::default());
        let before = handle.writes().len();

        let err = session.request(Command::move_to(Axis::Pan, 5)).unwrap_err();
        assert!(matches!(
            err,
            SessionError::NotRequestable {
                kind: CommandKind::Move
            }
        ));
        assert_eq!(handle.writes().len(), before);
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[test]
    fn partial_heartbeat_write_is_completed_not_resent() {
        let (mut session, handle) = ready(SessionConfig::default());
        let before = handle.wire().len();
        handle.short_next_write(10);
        handle.fail_next_writes(ErrorKind::TimedOut, 1);

        session.poll().unwrap();
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(handle.wire()[before..], frame(Command::Heartbeat)[..]);
        assert_eq!(session.stats().heartbeats_sent, 1);
        assert_eq!(session.stats().retries, 0);
    }

    #[test]
    fn line_stalling_mid_frame_fails_session() {
        let (mut session, handle) = ready(SessionConfig::default());
        handle.short_next_write(10);
        handle.fail_next_writes(ErrorKind::TimedOut, 8);

        let err = session.poll().unwrap_err();
        assert!(matches!(
            err,
            SessionError::Encoding(FrameError::Incomplete { written: 10, .. })
        ));
        assert_eq!(
            session.state(),
            SessionState::Failed(FailureReason::TransportLost)
        );
        assert!(handle.is_closed());
    }

    #[test]
    fn heartbeat_ack_does_not_swallow_move_ack() {
        let config = SessionConfig {
            heartbeat_requires_ack: true,
            move_ack: AckProfile::Standard,
            ..SessionConfig::default()
        };
        let (mut session, handle) = ready(config);
        handle.respond_to(&frame(Command::Heartbeat), &HEARTBEAT_REPLY, ms(20));
        session.poll().unwrap();

        // The move's ack lands just after the in-wait heartbeat goes out.
        handle.push_inbound(&INITIALIZE_REPLY, ms(1015));
        let outcome = session.move_to(Axis::Pan, 60).unwrap();

        match outcome {
            MoveOutcome::Acknowledged(ack) => assert_eq!(ack.raw.as_ref(), &INITIALIZE_REPLY[..]),
            MoveOutcome::TimedOut => panic!("move ack was taken by the heartbeat"),
        }
        assert_eq!(handle.clock().elapsed(), ms(1030));
        assert_eq!(
            handle.writes_of(&frame(Command::Heartbeat)),
            vec![ms(10), ms(1010)]
        );
        assert_eq!(session.stats().heartbeat_timeouts, 0);
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[test]
    fn cancelled_wait_releases_line() {
        let (mut session, handle) = ready(SessionConfig::default());
        session.cancel_token().cancel();

        assert!(matches!(
            session.move_to(Axis::Pan, 10),
            Err(SessionError::Cancelled)
        ));
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(handle.is_closed());
    }

    #[test]
    fn late_heartbeat_reanchors_schedule() {
        let (mut session, handle) = ready(SessionConfig::default());
        assert_eq!(session.time_until_heartbeat(), Some(Duration::ZERO));
        assert!(session.heartbeat_if_due().unwrap());
        assert!(!session.heartbeat_if_due().unwrap());
        assert_eq!(session.time_until_heartbeat(), Some(Duration::from_secs(1)));

        handle.clock().set_elapsed(ms(2500));
        assert!(session.heartbeat_if_due().unwrap());
        let next = session.next_heartbeat_at().unwrap() - handle.clock().origin();
        assert_eq!(next, ms(3500));
    }

    #[test]
    fn sync_probe_runs_before_initialize() {
        let config = SessionConfig {
            sync_probe: Some(SyncProbe {
                attempts: 2,
                timeout: ms(100),
            }),
            ..SessionConfig::default()
        };
        let (mut session, line, handle) = rig(config);
        handle.respond_to(&[START_MARKER], &[START_MARKER], ms(10));
        handle.respond_to(&frame(Command::Initialize), &INITIALIZE_REPLY, ms(10));

        session.connect(line).unwrap();
        let writes = handle.writes();
        assert_eq!(writes[0].bytes, vec![START_MARKER]);
        assert_eq!(writes[1].bytes, frame(Command::Initialize));
        assert_eq!(writes[1].at, ms(10));
    }

    #[test]
    fn unanswered_sync_probe_still_initializes() {
        let config = SessionConfig {
            sync_probe: Some(SyncProbe {
                attempts: 2,
                timeout: ms(100),
            }),
            ..SessionConfig::default()
        };
        let (mut session, line, handle) = rig(config);
        handle.respond_to(&frame(Command::Initialize), &INITIALIZE_REPLY, ms(10));

        session.connect(line).unwrap();
        assert_eq!(handle.writes_of(&[START_MARKER]), vec![ms(0), ms(100)]);
        assert_eq!(handle.writes_of(&frame(Command::Initialize)), vec![ms(200)]);
    }

    #[test]
    fn stale_input_is_flushed_before_sending() {
        let config = SessionConfig {
            flush_stale_input: true,
            ..SessionConfig::default()
        };
        let (mut session, line, handle) = rig(config);
        handle.push_inbound(&[0xAA, 0xBB, 0xCC], Duration::ZERO);
        handle.respond_to(&frame(Command::Initialize), &INITIALIZE_REPLY, ms(10));

        session.connect(line).unwrap();
        assert_eq!(handle.cleared_bytes(), 3);
        assert_eq!(session.stats().framing_errors, 0);
    }

    #[test]
    fn operations_need_a_connection() {
        let (mut session, _line, _handle) = rig(SessionConfig::default());
        assert!(matches!(
            session.poll(),
            Err(SessionError::InvalidState {
                operation: "poll",
                state: SessionState::Disconnected
            })
        ));
        assert!(session.heartbeat_if_due().is_err());
    }
}
