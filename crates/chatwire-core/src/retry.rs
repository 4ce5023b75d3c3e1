//! Capped exponential back-off for automatic reconnection.
//!
//! State machine: `Idle → Retrying(1) → … → Retrying(max) → GivenUp`.
//! Attempt `n` waits `2^n * base_delay_ms`. A successful connect from any
//! state resets to `Idle`. `GivenUp` is terminal until the user connects
//! again by hand.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reconnection limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1000,
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

/// Where the reconnection procedure currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconnectState {
    #[default]
    Idle,
    Retrying(u32),
    GivenUp,
}

/// What to do after a connection failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Schedule attempt `attempt` after `delay`.
    Retry { attempt: u32, max: u32, delay: Duration },
    /// No further automatic attempts.
    GiveUp,
}

impl RetryDecision {
    /// Status line shown to the user for this decision.
    pub fn status_text(&self) -> String {
        match self {
            RetryDecision::Retry {
                attempt,
                max,
                delay,
            } => format!(
                "Reconnecting in {}s... ({attempt}/{max})",
                delay.as_secs_f64()
            ),
            RetryDecision::GiveUp => "Connection lost. Please reconnect manually.".to_string(),
        }
    }
}

/// Bounded retry counter.
#[derive(Debug, Clone)]
pub struct Reconnector {
    policy: RetryPolicy,
    state: ReconnectState,
}

impl Reconnector {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: ReconnectState::Idle,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn state(&self) -> ReconnectState {
        self.state
    }

    /// Attempts made since the last successful connect.
    pub fn attempts(&self) -> u32 {
        match self.state {
            ReconnectState::Idle => 0,
            ReconnectState::Retrying(n) => n,
            ReconnectState::GivenUp => self.policy.max_attempts,
        }
    }

    /// Record an unclean failure and decide whether to try again.
    pub fn on_failure(&mut self) -> RetryDecision {
        let next = match self.state {
            ReconnectState::Idle => 1,
            ReconnectState::Retrying(n) => n + 1,
            ReconnectState::GivenUp => return RetryDecision::GiveUp,
        };

        if next > self.policy.max_attempts {
            self.state = ReconnectState::GivenUp;
            return RetryDecision::GiveUp;
        }

        self.state = ReconnectState::Retrying(next);
        RetryDecision::Retry {
            attempt: next,
            max: self.policy.max_attempts,
            delay: self.policy.delay_for(next),
        }
    }

    /// A connection succeeded.
    pub fn reset(&mut self) {
        self.state = ReconnectState::Idle;
    }
}
