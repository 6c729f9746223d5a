//! Backoff schedule for re-establishing a broken broker session.

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Fraction of the delay added or removed at random, in `[0, 1]`.
    pub jitter: f64,
    /// `None` keeps retrying forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: 0.2,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    pub fn without_jitter(mut self) -> Self {
        self.jitter = 0.0;
        self
    }

    /// Delay before the attempt following `failures` consecutive failures,
    /// without jitter: `base_delay * multiplier^(failures - 1)`, capped.
    pub fn backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let cap = self.max_delay.as_secs_f64();

        if secs.is_finite() && secs < cap {
            Duration::from_secs_f64(secs)
        } else {
            self.max_delay
        }
    }

    /// [`backoff`](Self::backoff) with jitter applied, still capped.
    pub fn next_delay(&self, failures: u32) -> Duration {
        let delay = self.backoff(failures);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return delay;
        }

        let factor = rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter));
        delay.mul_f64(factor).min(self.max_delay)
    }

    /// Whether attempt number `attempt` (1-based) may run.
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempt <= max)
    }
}

/// Tracks consecutive recovery failures and when the next attempt is due.
#[derive(Debug, Default)]
pub struct RecoveryState {
    failures: u32,
    next_attempt_at: Option<Instant>,
}

impl RecoveryState {
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn is_exhausted(&self, policy: &ReconnectPolicy) -> bool {
        !policy.allows(self.failures + 1)
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.next_attempt_at.is_none_or(|at| now >= at)
    }

    /// Records a failed attempt and returns the wait before the next one.
    pub fn record_failure(&mut self, policy: &ReconnectPolicy, now: Instant) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let delay = policy.next_delay(self.failures);
        self.next_attempt_at = Some(now + delay);
        delay
    }

    pub fn reset(&mut self) {
        self.failures = 0;
        self.next_attempt_at = None;
    }
}
