use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::duration_ms;

/// Exponential backoff policy shared by the polling and relay transports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Delay after the first failure.
    #[serde(with = "duration_ms", rename = "initial_ms")]
    pub initial: Duration,
    /// Ceiling for the doubled delay.
    #[serde(with = "duration_ms", rename = "max_ms")]
    pub max: Duration,
    /// Consecutive failures after which the connection is reported lost.
    pub escalate_after: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(16),
            escalate_after: 6,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retrying after `attempt` previous consecutive failures
    /// (0-indexed): `initial * 2^attempt`, capped at `max`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

/// Consecutive-failure counter driving a [`BackoffPolicy`].
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    failures: u32,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            failures: 0,
        }
    }

    /// Records a failure and returns how long to wait before the next try.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.policy.delay_for(self.failures);
        self.failures = self.failures.saturating_add(1);
        delay
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// True exactly once, on the failure that reaches the escalation bound.
    pub fn just_exhausted(&self) -> bool {
        self.failures == self.policy.escalate_after
    }
}
