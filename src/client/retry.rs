//! Bounded retry with exponential backoff
//!
//! `RetryState` is a plain state machine: the fetcher reports each failed attempt and gets
//! back either a delay to sleep (plus whether to rotate the API key first) or a verdict to
//! give up. Sleeping goes through the `Sleeper` trait so tests can observe the schedule
//! without waiting on a clock.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::FetchConfig;

/// Boxed future returned by a `Sleeper`
pub type SleepFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Source of delays for backoff and inter-page pauses
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> SleepFuture;
}

/// Sleeper backed by the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> SleepFuture {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Sleeper that returns immediately and remembers every requested delay
#[derive(Debug, Default, Clone)]
pub struct RecordingSleeper {
    calls: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// All delays requested so far, in order
    pub fn calls(&self) -> Vec<Duration> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) -> SleepFuture {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(duration);
        }
        Box::pin(std::future::ready(()))
    }
}

/// Backoff parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(120),
            max_attempts: 5,
        }
    }
}

impl From<&FetchConfig> for RetryPolicy {
    fn from(config: &FetchConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
            max_attempts: config.max_attempts,
        }
    }
}

/// Kind of a retryable failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// HTTP 429
    RateLimited,
    /// 5xx, timeout or connection failure
    Transient,
}

/// What the fetcher should do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep `delay`, rotating the API key first when `rotate_key` is set, then try again
    Retry { delay: Duration, rotate_key: bool },
    /// Stop retrying this request
    GiveUp,
}

/// Per-request retry bookkeeping
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    key_budget: usize,
    attempts: u32,
    rate_limit_hits: usize,
    next_delay: Duration,
    last_failure: Option<FailureKind>,
}

impl RetryState {
    /// Starts a fresh request; `key_count` bounds how many 429s are tolerated
    pub fn new(policy: RetryPolicy, key_count: usize) -> Self {
        Self {
            policy,
            key_budget: key_count.max(1),
            attempts: 0,
            rate_limit_hits: 0,
            next_delay: policy.base_delay.min(policy.max_delay),
            last_failure: None,
        }
    }

    /// Number of failed attempts recorded so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn rate_limit_hits(&self) -> usize {
        self.rate_limit_hits
    }

    pub fn last_failure(&self) -> Option<FailureKind> {
        self.last_failure
    }

    /// Records a failed attempt and decides what happens next
    pub fn on_failure(&mut self, kind: FailureKind) -> RetryDecision {
        self.attempts += 1;
        self.last_failure = Some(kind);

        if kind == FailureKind::RateLimited {
            self.rate_limit_hits += 1;
            // Every key has now answered 429 for this request.
            if self.rate_limit_hits >= self.key_budget {
                return RetryDecision::GiveUp;
            }
        }

        if self.attempts >= self.policy.max_attempts {
            return RetryDecision::GiveUp;
        }

        let delay = self.next_delay;
        self.next_delay = (self.next_delay * 2).min(self.policy.max_delay);

        RetryDecision::Retry {
            delay,
            rotate_key: kind == FailureKind::RateLimited,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_transient_backoff_doubles_until_attempts_exhausted() {
        let mut state = RetryState::new(RetryPolicy::default(), 1);
        let mut delays = Vec::new();
        loop {
            match state.on_failure(FailureKind::Transient) {
                RetryDecision::Retry { delay, rotate_key } => {
                    assert!(!rotate_key);
                    delays.push(delay);
                }
                RetryDecision::GiveUp => break,
            }
        }
        assert_eq!(delays, vec![secs(5), secs(10), secs(20), secs(40)]);
        assert_eq!(state.attempts(), 5);
    }

    #[test]
    fn test_backoff_capped_at_max_delay() {
        let policy = RetryPolicy {
            base_delay: secs(50),
            max_delay: secs(120),
            max_attempts: 10,
        };
        let mut state = RetryState::new(policy, 1);
        let delays: Vec<_> = (0..4)
            .map(|_| match state.on_failure(FailureKind::Transient) {
                RetryDecision::Retry { delay, .. } => delay,
                RetryDecision::GiveUp => panic!("gave up early"),
            })
            .collect();
        assert_eq!(delays, vec![secs(50), secs(100), secs(120), secs(120)]);
    }

    #[test]
    fn test_rate_limit_bounded_by_key_count() {
        let mut state = RetryState::new(RetryPolicy::default(), 3);
        assert_eq!(
            state.on_failure(FailureKind::RateLimited),
            RetryDecision::Retry {
                delay: secs(5),
                rotate_key: true
            }
        );
        assert_eq!(
            state.on_failure(FailureKind::RateLimited),
            RetryDecision::Retry {
                delay: secs(10),
                rotate_key: true
            }
        );
        assert_eq!(state.on_failure(FailureKind::RateLimited), RetryDecision::GiveUp);
        assert_eq!(state.rate_limit_hits(), 3);
    }

    #[test]
    fn test_single_key_gives_up_on_first_rate_limit() {
        let mut state = RetryState::new(RetryPolicy::default(), 1);
        assert_eq!(state.on_failure(FailureKind::RateLimited), RetryDecision::GiveUp);
    }

    #[test]
    fn test_mixed_failures_share_attempt_budget() {
        let policy = RetryPolicy {
            max_attempts: 3,
            ..RetryPolicy::default()
        };
        let mut state = RetryState::new(policy, 10);
        assert!(matches!(
            state.on_failure(FailureKind::Transient),
            RetryDecision::Retry { rotate_key: false, .. }
        ));
        assert!(matches!(
            state.on_failure(FailureKind::RateLimited),
            RetryDecision::Retry { rotate_key: true, .. }
        ));
        assert_eq!(state.on_failure(FailureKind::Transient), RetryDecision::GiveUp);
        assert_eq!(state.last_failure(), Some(FailureKind::Transient));
    }

    #[tokio::test]
    async fn test_recording_sleeper_records_in_order() {
        let sleeper = RecordingSleeper::new();
        sleeper.sleep(secs(1)).await;
        sleeper.sleep(secs(2)).await;
        assert_eq!(sleeper.calls(), vec![secs(1), secs(2)]);
    }
}
