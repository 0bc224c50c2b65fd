use std::time::Duration;

use pantilt_command::{CommandError, CommandKind};
use pantilt_frame::{DecodeError, FrameError};
use pantilt_transport::TransportError;

use crate::state::SessionState;

/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The serial line failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// An inbound frame could not be decoded.
    #[error("framing error: {0}")]
    Framing(#[from] DecodeError),

    /// An outbound frame could not be produced or written completely.
    #[error("frame error: {0}")]
    Encoding(FrameError),

    /// No reply within the wait.
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// Move angle outside the single-byte range.
    #[error("invalid angle {angle} (expected 0..={max})")]
    InvalidAngle { angle: i32, max: u8 },

    /// Initialization retries ran out without a reply.
    #[error("no response after {attempts} initialize attempts")]
    NoResponse { attempts: usize },

    /// Heartbeats could not be delivered within the retry limit.
    #[error("heartbeat failed after {attempts} attempts")]
    KeepaliveLost { attempts: usize },

    /// The operation is not valid in the current state.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// The command has its own operation and cannot be sent as a request.
    #[error("{kind} commands are sent with move_to, not request")]
    NotRequestable { kind: CommandKind },

    /// Configuration rejected by `SessionConfig::validate`.
    #[error("invalid session config: {0}")]
    InvalidConfig(String),

    /// A wait was aborted through the cancel token.
    #[error("operation cancelled")]
    Cancelled,
}

impl SessionError {
    /// Whether this error ends the session (`Failed(TransportLost)`).
    pub fn is_fatal(&self) -> bool {
        match self {
            SessionError::Transport(err) => !err.is_transient(),
            SessionError::Encoding(FrameError::Transport(err)) => !err.is_transient(),
            SessionError::Encoding(FrameError::ConnectionClosed) => true,
            SessionError::Encoding(FrameError::Incomplete { .. }) => true,
            SessionError::KeepaliveLost { .. } => true,
            _ => false,
        }
    }

    /// Whether the same transmission may succeed if retried.
    pub fn is_transient(&self) -> bool {
        match self {
            SessionError::Transport(err) => err.is_transient(),
            SessionError::Encoding(FrameError::Transport(err)) => err.is_transient(),
            SessionError::Timeout(_) => true,
            _ => false,
        }
    }
}

impl From<FrameError> for SessionError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Decode(err) => SessionError::Framing(err),
            FrameError::Transport(err) if !err.is_transient() => SessionError::Transport(err),
            other => SessionError::Encoding(other),
        }
    }
}

impl From<CommandError> for SessionError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::InvalidAngle { angle, max } => SessionError::InvalidAngle { angle, max },
            CommandError::Frame(err) => err.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
