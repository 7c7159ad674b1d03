//! Retry & Backoff State Machine
//!
//! Explicit attempt accounting instead of sleep-and-loop control flow, so
//! retry decisions compose with deadlines and cancellation. Throttling and
//! transient failures keep distinct counters.

use rand::Rng;
use std::time::Duration;

/// Retry policy shared by the client and the manager's auth retries.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// First backoff delay; doubles each attempt.
    pub base_delay: Duration,
    /// Upper bound for any computed delay.
    pub max_delay: Duration,
    /// Maximum attempts per failure category.
    pub max_attempts: u32,
    /// Jitter fraction applied to computed delays (0.2 = ±20%).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Start a fresh schedule for one logical call.
    pub fn schedule(&self) -> RetrySchedule {
        RetrySchedule {
            policy: self.clone(),
            throttle_failures: 0,
            transient_failures: 0,
        }
    }

    /// Deterministic variant for tests.
    pub fn without_jitter(mut self) -> Self {
        self.jitter = 0.0;
        self
    }
}

/// Outcome of consulting the schedule after a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackoffDecision {
    /// Suspend for this long, then retry.
    Delay(Duration),
    /// Attempt budget spent; surface the failure.
    GiveUp,
}

/// Per-call retry state.
pub struct RetrySchedule {
    policy: RetryPolicy,
    throttle_failures: u32,
    transient_failures: u32,
}

impl RetrySchedule {
    /// Record a throttled attempt. An upstream hint overrides the computed
    /// delay verbatim; without one the exponential curve applies.
    pub fn next_throttle(&mut self, hint: Option<Duration>) -> BackoffDecision {
        self.throttle_failures += 1;
        if self.throttle_failures >= self.policy.max_attempts {
            return BackoffDecision::GiveUp;
        }
        let delay = hint.unwrap_or_else(|| self.exponential(self.throttle_failures));
        BackoffDecision::Delay(delay)
    }

    /// Record a transient network/server failure.
    pub fn next_transient(&mut self) -> BackoffDecision {
        self.transient_failures += 1;
        if self.transient_failures >= self.policy.max_attempts {
            return BackoffDecision::GiveUp;
        }
        BackoffDecision::Delay(self.exponential(self.transient_failures))
    }

    pub fn throttle_failures(&self) -> u32 {
        self.throttle_failures
    }

    pub fn transient_failures(&self) -> u32 {
        self.transient_failures
    }

    fn exponential(&self, failure: u32) -> Duration {
        let doubled = self
            .policy
            .base_delay
            .saturating_mul(1u32 << (failure - 1).min(16));
        let capped = doubled.min(self.policy.max_delay);
        if self.policy.jitter <= 0.0 {
            return capped;
        }
        let factor = rand::thread_rng()
            .gen_range(1.0 - self.policy.jitter..=1.0 + self.policy.jitter);
        Duration::from_secs_f64(capped.as_secs_f64() * factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::default().without_jitter()
    }

    #[test]
    fn test_delays_double_until_cap() {
        let mut schedule = policy().schedule();
        assert_eq!(
            schedule.next_transient(),
            BackoffDecision::Delay(Duration::from_secs(1))
        );
        assert_eq!(
            schedule.next_transient(),
            BackoffDecision::Delay(Duration::from_secs(2))
        );
        assert_eq!(
            schedule.next_transient(),
            BackoffDecision::Delay(Duration::from_secs(4))
        );
    }

    #[test]
    fn test_hint_overrides_computed_delay() {
        let mut schedule = policy().schedule();
        let hint = Duration::from_secs(7);
        assert_eq!(
            schedule.next_throttle(Some(hint)),
            BackoffDecision::Delay(hint)
        );
    }

    #[test]
    fn test_gives_up_at_max_attempts() {
        let mut schedule = policy().schedule();
        for _ in 1..5 {
            assert!(matches!(
                schedule.next_throttle(None),
                BackoffDecision::Delay(_)
            ));
        }
        assert_eq!(schedule.next_throttle(None), BackoffDecision::GiveUp);
    }

    #[test]
    fn test_counters_are_independent() {
        let mut schedule = policy().schedule();
        for _ in 1..5 {
            schedule.next_throttle(None);
        }
        // Throttle budget spent, transient budget untouched.
        assert_eq!(schedule.next_throttle(None), BackoffDecision::GiveUp);
        assert!(matches!(
            schedule.next_transient(),
            BackoffDecision::Delay(_)
        ));
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let jittered = RetryPolicy {
            jitter: 0.2,
            ..RetryPolicy::default()
        };
        let mut schedule = jittered.schedule();
        for _ in 0..20 {
            schedule = jittered.schedule();
            if let BackoffDecision::Delay(d) = schedule.next_transient() {
                assert!(d >= Duration::from_millis(800));
                assert!(d <= Duration::from_millis(1200));
            }
        }
    }
}
