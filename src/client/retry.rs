//! Retry state machine for the request executor
//!
//! Every attempt ends in an [`AttemptOutcome`]. [`RetryState::on_outcome`]
//! turns it into a [`RetryDecision`] without doing any I/O, so the executor
//! loop only carries out what the state machine decided.
//!
//! Two independent delay schedules exist:
//!
//! - connection failures back off from `backoff_seed`, doubling up to
//!   `backoff_cap`
//! - HTTP 429 waits at least `max(rate_limit_floor, Retry-After)`, doubling
//!   for repeated 429s up to `rate_limit_cap`
//!
//! Rate limiting never advances the connection-failure schedule. All paths
//! share the same attempt budget.

use crate::config::RetryConfig;
use std::time::Duration;

/// Result classification of a single attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// 2xx with a usable body
    Success,
    /// 2xx with an empty body, an implicit session expiry
    EmptyBody,
    /// HTTP 429
    RateLimited { retry_after: Option<u64> },
    /// Timeout or transport failure
    ConnectionFailure,
    /// Anything that retrying cannot fix
    Fatal,
}

/// What the executor does next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    /// Sleep, optionally log in again, then make another attempt
    Retry { delay: Duration, relogin: bool },
    /// Return the last outcome to the caller
    Stop,
}

/// Decision for one attempt outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    /// Replace the session before anything else happens
    pub recreate_session: bool,
    pub action: RetryAction,
}

impl RetryDecision {
    fn stop() -> Self {
        Self {
            recreate_session: false,
            action: RetryAction::Stop,
        }
    }

    fn retry(delay: Duration, relogin: bool) -> Self {
        Self {
            recreate_session: false,
            action: RetryAction::Retry { delay, relogin },
        }
    }
}

/// Wait after a 429.
///
/// Never shorter than `max(floor, retry_after)`. A repeated 429 doubles the
/// previous wait, capped at `cap`, unless the server asks for even longer.
pub fn rate_limit_delay(
    floor: Duration,
    cap: Duration,
    retry_after: Option<u64>,
    previous: Option<Duration>,
) -> Duration {
    let requested = Duration::from_secs(retry_after.unwrap_or(0));
    let base = floor.max(requested);
    let escalated = previous
        .map(|p| p.saturating_mul(2).min(cap))
        .unwrap_or(Duration::ZERO);
    base.max(escalated)
}

/// Per-request retry state
#[derive(Debug, Clone)]
pub struct RetryState {
    config: RetryConfig,
    attempt: u32,
    next_backoff: Duration,
    last_rate_limit_wait: Option<Duration>,
    empty_body_retried: bool,
}

impl RetryState {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            config: config.clone(),
            attempt: 0,
            next_backoff: config.backoff_seed,
            last_rate_limit_wait: None,
            empty_body_retried: false,
        }
    }

    /// Start the next attempt and return its 1-based number
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    /// Attempts made so far
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    pub fn has_attempts_left(&self) -> bool {
        self.attempt < self.config.max_attempts
    }

    /// Decide what follows an attempt.
    ///
    /// `consecutive_failures` is the client-wide count of connection failures
    /// in a row, this attempt included.
    pub fn on_outcome(&mut self, outcome: AttemptOutcome, consecutive_failures: u32) -> RetryDecision {
        match outcome {
            AttemptOutcome::Success | AttemptOutcome::Fatal => RetryDecision::stop(),

            AttemptOutcome::EmptyBody => {
                if self.empty_body_retried || !self.has_attempts_left() {
                    return RetryDecision::stop();
                }
                self.empty_body_retried = true;
                RetryDecision::retry(Duration::ZERO, true)
            }

            AttemptOutcome::RateLimited { retry_after } => {
                if !self.has_attempts_left() {
                    return RetryDecision::stop();
                }
                let wait = rate_limit_delay(
                    self.config.rate_limit_floor,
                    self.config.rate_limit_cap,
                    retry_after,
                    self.last_rate_limit_wait,
                );
                self.last_rate_limit_wait = Some(wait);
                RetryDecision::retry(wait, false)
            }

            AttemptOutcome::ConnectionFailure => {
                let recreate_session = consecutive_failures >= self.config.failure_threshold;
                if !self.has_attempts_left() {
                    return RetryDecision {
                        recreate_session,
                        action: RetryAction::Stop,
                    };
                }
                let delay = self.next_backoff;
                self.next_backoff = self
                    .next_backoff
                    .saturating_mul(2)
                    .min(self.config.backoff_cap);
                RetryDecision {
                    recreate_session,
                    // a recreation already logs in on the new session
                    action: RetryAction::Retry {
                        delay,
                        relogin: !recreate_session,
                    },
                }
            }
        }
    }
}
