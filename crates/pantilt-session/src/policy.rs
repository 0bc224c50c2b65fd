use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Reply wait for each `Initialize` attempt.
pub const INITIALIZE_TIMEOUT: Duration = Duration::from_secs(5);

/// Reply wait for generic commands.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Reply wait for extended diagnostic exchanges.
pub const EXTENDED_TIMEOUT: Duration = Duration::from_secs(30);

/// Minimum spacing after a move before heartbeats resume.
pub const MOVE_ACK_TIMEOUT: Duration = Duration::from_millis(200);

/// Keepalive cadence.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

const DEFAULT_INIT_ATTEMPTS: usize = 3;

/// Ordered per-attempt reply timeouts.
///
/// The number of attempts is the length of the list; attempt `n` waits
/// `timeouts[n]` for a reply before the next one starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RetryPolicy {
    #[serde(with = "pantilt_transport::duration_ms::list")]
    timeouts: Vec<Duration>,
}

impl RetryPolicy {
    /// `attempts` tries with the same timeout. At least one attempt is made.
    pub fn fixed(attempts: usize, timeout: Duration) -> Self {
        Self {
            timeouts: vec![timeout; attempts.max(1)],
        }
    }

    /// One attempt per listed timeout, in order.
    pub fn ramp(timeouts: impl IntoIterator<Item = Duration>) -> Self {
        Self {
            timeouts: timeouts.into_iter().collect(),
        }
    }

    /// The 5 s → 10 s → 30 s ramp used for diagnostics.
    pub fn diagnostic_ramp() -> Self {
        Self::ramp([INITIALIZE_TIMEOUT, COMMAND_TIMEOUT, EXTENDED_TIMEOUT])
    }

    pub fn attempts(&self) -> usize {
        self.timeouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timeouts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Duration> + '_ {
        self.timeouts.iter().copied()
    }

    /// Worst-case time spent waiting across all attempts.
    pub fn total(&self) -> Duration {
        self.timeouts.iter().sum()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_INIT_ATTEMPTS, INITIALIZE_TIMEOUT)
    }
}

/// How long to wait for a move acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckProfile {
    /// 0.2 s, the observed spacing before heartbeats resume.
    #[default]
    Fast,
    /// 10 s, the generic command wait.
    Standard,
    /// 30 s, for diagnostic runs.
    Extended,
}

impl AckProfile {
    pub fn timeout(self) -> Duration {
        match self {
            AckProfile::Fast => MOVE_ACK_TIMEOUT,
            AckProfile::Standard => COMMAND_TIMEOUT,
            AckProfile::Extended => EXTENDED_TIMEOUT,
        }
    }
}
