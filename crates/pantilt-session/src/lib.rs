//! Device session management for the pan-tilt unit.
//!
//! A [`Session`] owns the serial line and walks it through the protocol:
//! initialize (with retries), keep the unit alive with heartbeats at a fixed
//! cadence, and interleave movement commands without disturbing that cadence.
//!
//! Time is read through a [`Clock`] so the whole state machine can be driven
//! deterministically with a [`ManualClock`] and the in-memory transport from
//! [`testing`].

pub mod cancel;
pub mod clock;
pub mod config;
pub mod error;
pub mod keepalive;
pub mod policy;
pub mod session;
pub mod state;
pub mod testing;
pub mod transcript;

pub use cancel::CancelToken;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{SessionConfig, SyncProbe};
pub use error::{Result, SessionError};
pub use keepalive::KeepaliveHandle;
pub use policy::{
    AckProfile, RetryPolicy, COMMAND_TIMEOUT, EXTENDED_TIMEOUT, HEARTBEAT_INTERVAL,
    INITIALIZE_TIMEOUT, MOVE_ACK_TIMEOUT,
};
pub use session::{MoveOutcome, Session, SessionStats};
pub use state::{FailureReason, SessionState};
pub use transcript::{Direction, Transcript, TranscriptEntry};
