#![cfg(feature = "session")]

use std::io::ErrorKind;
use std::time::Duration;

use pantilt::command::{Axis, Command, INITIALIZE_REPLY};
use pantilt::session::testing::{ScriptHandle, ScriptedTransport};
use pantilt::session::{
    FailureReason, KeepaliveHandle, ManualClock, MoveOutcome, RetryPolicy, Session,
    SessionConfig, SessionError, SessionState,
};

fn frame(command: Command) -> Vec<u8> {
    command.frame().unwrap().to_vec()
}

type TestSession = Session<ScriptedTransport, ManualClock>;

fn session_with(config: SessionConfig) -> (TestSession, ScriptedTransport, ScriptHandle) {
    let clock = ManualClock::new();
    let (line, handle) = ScriptedTransport::new(clock.clone());
    (Session::with_clock(config, clock).unwrap(), line, handle)
}

#[test]
fn silent_unit_fails_after_fifteen_seconds() {
    let (mut session, line, handle) = session_with(SessionConfig::default());

    assert!(matches!(
        session.connect(line),
        Err(SessionError::NoResponse { attempts: 3 })
    ));
    assert_eq!(
        session.state(),
        SessionState::Failed(FailureReason::NoResponse)
    );
    assert!(handle.clock().elapsed() >= Duration::from_secs(15));
}

#[test]
fn diagnostic_ramp_spaces_attempts() {
    let config = SessionConfig {
        init_policy: RetryPolicy::diagnostic_ramp(),
        proceed_without_ack: true,
        ..SessionConfig::default()
    };
    let (mut session, line, handle) = session_with(config);

    session.connect(line).unwrap();
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(
        handle.writes_of(&frame(Command::Initialize)),
        vec![
            Duration::ZERO,
            Duration::from_secs(5),
            Duration::from_secs(15)
        ]
    );
    assert_eq!(handle.clock().elapsed(), Duration::from_secs(45));
}

#[test]
fn move_keeps_one_second_cadence() {
    let config = SessionConfig {
        proceed_without_ack: true,
        ..SessionConfig::default()
    };
    let (mut session, line, handle) = session_with(config);
    session.connect(line).unwrap();
    let ready_at = handle.clock().elapsed();

    session.poll().unwrap();
    assert_eq!(
        session.move_to(Axis::Pan, 15).unwrap(),
        MoveOutcome::TimedOut
    );
    session.run_for(Duration::from_millis(2500)).unwrap();

    let beats = handle.writes_of(&frame(Command::Heartbeat));
    let expected: Vec<_> = (0..3)
        .map(|n| ready_at + Duration::from_secs(n))
        .collect();
    assert_eq!(beats, expected);

    let pan = handle.writes_of(&frame(Command::move_to(Axis::Pan, 15)));
    assert_eq!(pan, vec![ready_at]);
}

#[test]
fn reset_recovers_from_lost_line() {
    let config = SessionConfig {
        proceed_without_ack: true,
        ..SessionConfig::default()
    };
    let (mut session, line, handle) = session_with(config);
    session.connect(line).unwrap();
    handle.fail_next_writes(ErrorKind::TimedOut, 3);

    assert!(session.poll().is_err());
    assert_eq!(
        session.state(),
        SessionState::Failed(FailureReason::TransportLost)
    );
    assert!(session.disconnect().is_err());

    session.reset();
    let (line, handle) = ScriptedTransport::new(handle.clock().clone());
    handle.respond_to(
        &frame(Command::Initialize),
        &INITIALIZE_REPLY,
        Duration::from_millis(20),
    );
    session.connect(line).unwrap();
    assert_eq!(session.state(), SessionState::Ready);
}

#[test]
fn keepalive_serializes_moves_with_heartbeats() {
    let config = SessionConfig {
        proceed_without_ack: true,
        ..SessionConfig::default()
    };
    let (mut session, line, handle) = session_with(config);
    session.connect(line).unwrap();

    let keepalive = KeepaliveHandle::spawn(session).unwrap();
    keepalive.move_to(Axis::Tilt, 45).unwrap();
    keepalive.move_to(Axis::Pan, 120).unwrap();
    assert_eq!(keepalive.state(), SessionState::Ready);
    assert_eq!(keepalive.stats().moves_sent, 2);

    let session = keepalive.shutdown().unwrap();
    assert_eq!(session.state(), SessionState::Disconnected);

    let sent: Vec<_> = handle
        .writes()
        .into_iter()
        .map(|w| w.bytes)
        .filter(|b| *b != frame(Command::Initialize))
        .collect();
    assert_eq!(
        sent,
        vec![
            frame(Command::Heartbeat),
            frame(Command::move_to(Axis::Tilt, 45)),
            frame(Command::move_to(Axis::Pan, 120)),
        ]
    );
}
