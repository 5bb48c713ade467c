use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff as _;

use super::config::ReconnectConfig;

/// Where the reconnect policy currently stands.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconnectPhase {
    /// Not attempting to reconnect
    #[default]
    Idle,
    /// A reconnect timer is pending
    Scheduled,
    /// The attempt cap was hit; only an explicit `connect` leaves this phase
    Exhausted,
}

/// Snapshot of the reconnect policy.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconnectAttempt {
    /// Consecutive reconnect attempts since the last successful open
    pub count: u32,
    /// Delay of the most recently scheduled attempt
    pub next_delay: Option<Duration>,
    pub phase: ReconnectPhase,
}

/// What to do after a connection closed.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Reconnect after the given delay
    Retry(Duration),
    /// The cap was just reached; report exhaustion
    Exhausted,
    /// Exhaustion was already reported; do nothing
    Halted,
}

/// Capped exponential backoff with a finite attempt budget.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    backoff: ExponentialBackoff,
    attempt: ReconnectAttempt,
}

impl ReconnectPolicy {
    #[must_use]
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            backoff: config.clone().into(),
            config,
            attempt: ReconnectAttempt::default(),
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> Option<u32> {
        self.config.max_attempts
    }

    #[must_use]
    pub fn attempt(&self) -> ReconnectAttempt {
        self.attempt
    }

    /// Start over: zero attempts, base delay, idle.
    ///
    /// Called when a connection opens and when a collaborator calls `connect`.
    pub fn reset(&mut self) {
        self.backoff.reset();
        self.attempt = ReconnectAttempt::default();
    }

    /// Decide how to react to a closed connection.
    pub fn on_close(&mut self) -> Decision {
        if self.attempt.phase == ReconnectPhase::Exhausted {
            return Decision::Halted;
        }

        if let Some(max) = self.config.max_attempts
            && self.attempt.count >= max
        {
            self.attempt.phase = ReconnectPhase::Exhausted;
            self.attempt.next_delay = None;
            return Decision::Exhausted;
        }

        let delay = self
            .backoff
            .next_backoff()
            .unwrap_or(self.config.max_backoff)
            .min(self.config.max_backoff);

        self.attempt.count = self.attempt.count.saturating_add(1);
        self.attempt.next_delay = Some(delay);
        self.attempt.phase = ReconnectPhase::Scheduled;

        Decision::Retry(delay)
    }

    /// The scheduled attempt is starting now.
    pub fn on_fire(&mut self) {
        if self.attempt.phase == ReconnectPhase::Scheduled {
            self.attempt.phase = ReconnectPhase::Idle;
        }
    }

    /// The scheduled attempt was cancelled by an explicit teardown.
    pub fn cancel(&mut self) {
        if self.attempt.phase == ReconnectPhase::Scheduled {
            self.attempt.phase = ReconnectPhase::Idle;
            self.attempt.next_delay = None;
        }
    }
}
