use std::time::Duration;

use pantilt_command::Command;
use pantilt_frame::{DEFAULT_MAX_FRAME_LEN, MIN_FRAME_LEN};
use pantilt_transport::duration_ms;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};
use crate::policy::{AckProfile, RetryPolicy, COMMAND_TIMEOUT, HEARTBEAT_INTERVAL};

const DEFAULT_HEARTBEAT_ATTEMPTS: usize = 3;
const DEFAULT_HEARTBEAT_ACK_TIMEOUT: Duration = Duration::from_millis(200);
const DEFAULT_READ_SLICE: Duration = Duration::from_millis(50);
const DEFAULT_TRANSCRIPT_CAPACITY: usize = 256;

const DEFAULT_SYNC_ATTEMPTS: usize = 5;
const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(1);

/// Pre-initialization sync: send a bare start marker and wait for any byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncProbe {
    pub attempts: usize,
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
}

impl Default for SyncProbe {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_SYNC_ATTEMPTS,
            timeout: DEFAULT_SYNC_TIMEOUT,
        }
    }
}

/// Session timing and retry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Per-attempt reply timeouts for `Initialize`.
    pub init_policy: RetryPolicy,
    /// Enter `Ready` even when every `Initialize` attempt went unanswered.
    pub proceed_without_ack: bool,
    #[serde(with = "duration_ms")]
    pub heartbeat_interval: Duration,
    /// Treat a heartbeat without a reply as a failed attempt.
    pub heartbeat_requires_ack: bool,
    #[serde(with = "duration_ms")]
    pub heartbeat_ack_timeout: Duration,
    /// Attempts per heartbeat before the line is considered lost.
    pub heartbeat_attempts: usize,
    pub move_ack: AckProfile,
    /// Default reply wait for `Session::request`.
    #[serde(with = "duration_ms")]
    pub command_timeout: Duration,
    /// Longest single transport wait inside a longer deadline.
    #[serde(with = "duration_ms")]
    pub read_slice: Duration,
    /// Discard pending inbound bytes before each transmission.
    pub flush_stale_input: bool,
    pub sync_probe: Option<SyncProbe>,
    pub transcript_capacity: usize,
    pub max_frame_len: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            init_policy: RetryPolicy::default(),
            proceed_without_ack: false,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            heartbeat_requires_ack: false,
            heartbeat_ack_timeout: DEFAULT_HEARTBEAT_ACK_TIMEOUT,
            heartbeat_attempts: DEFAULT_HEARTBEAT_ATTEMPTS,
            move_ack: AckProfile::default(),
            command_timeout: COMMAND_TIMEOUT,
            read_slice: DEFAULT_READ_SLICE,
            flush_stale_input: false,
            sync_probe: None,
            transcript_capacity: DEFAULT_TRANSCRIPT_CAPACITY,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl SessionConfig {
    /// Reject settings the session cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.init_policy.is_empty() {
            return Err(invalid("init_policy needs at least one attempt"));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(invalid("heartbeat_interval must be non-zero"));
        }
        if self.heartbeat_attempts == 0 {
            return Err(invalid("heartbeat_attempts must be at least 1"));
        }
        if self.read_slice.is_zero() {
            return Err(invalid("read_slice must be non-zero"));
        }
        if self.heartbeat_requires_ack && self.heartbeat_ack_timeout >= self.heartbeat_interval {
            return Err(invalid(
                "heartbeat_ack_timeout must be shorter than heartbeat_interval",
            ));
        }
        let longest = Command::Initialize
            .frame()
            .map_or(MIN_FRAME_LEN, |frame| frame.len());
        if self.max_frame_len < longest {
            return Err(SessionError::InvalidConfig(format!(
                "max_frame_len must be at least {longest}"
            )));
        }
        if let Some(probe) = self.sync_probe {
            if probe.attempts == 0 {
                return Err(invalid("sync_probe.attempts must be at least 1"));
            }
        }
        Ok(())
    }
}

fn invalid(reason: &str) -> SessionError {
    SessionError::InvalidConfig(reason.to_string())
}
