use std::fmt;

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    /// Initialization retries ran out without a reply.
    NoResponse,
    /// The line failed, or heartbeats could not be delivered.
    TransportLost,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NoResponse => f.write_str("no response"),
            FailureReason::TransportLost => f.write_str("transport lost"),
        }
    }
}

/// Protocol state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Initializing,
    /// Heartbeat loop active.
    Ready,
    AwaitingMoveAck,
    /// Terminal until `reset()`.
    Failed(FailureReason),
}

impl SessionState {
    /// Whether the heartbeat loop should be running.
    pub fn is_active(self) -> bool {
        matches!(self, SessionState::Ready | SessionState::AwaitingMoveAck)
    }

    pub fn is_failed(self) -> bool {
        matches!(self, SessionState::Failed(_))
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => f.write_str("disconnected"),
            SessionState::Initializing => f.write_str("initializing"),
            SessionState::Ready => f.write_str("ready"),
            SessionState::AwaitingMoveAck => f.write_str("awaiting move ack"),
            SessionState::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}
