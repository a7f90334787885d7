//! Reconnect backoff policies shared by the agent's stream manager and
//! health monitor.

use rand::Rng;
use std::time::Duration;

/// Attempt-scaled backoff with jitter and a hard ceiling.
///
/// The delay for attempt `n` (1-based) is `min(cap, base * n * multiplier)`
/// with `jitter` applied as a symmetric fraction of the result.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base: Duration,
    pub multiplier: f64,
    pub jitter: f64,
    pub cap: Duration,
    attempt: u32,
}

impl RetryPolicy {
    pub fn new(base: Duration, multiplier: f64, jitter: f64, cap: Duration) -> Self {
        Self {
            base,
            multiplier,
            jitter,
            cap,
            attempt: 0,
        }
    }

    /// Stream-open policy: base 1s, multiplier 2.0, jitter +/-20%, cap 60s.
    pub fn connect() -> Self {
        Self::new(Duration::from_secs(1), 2.0, 0.2, Duration::from_secs(60))
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Record a failure and return the delay to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        let raw = self.base.as_secs_f64() * f64::from(self.attempt) * self.multiplier;
        let capped = raw.min(self.cap.as_secs_f64());
        Duration::from_secs_f64(apply_jitter(capped, self.jitter))
    }

    /// Reset after any successful attempt.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Doubling backoff without jitter, used by the health watch loop:
/// base 2s, doubled per failure, capped at 30s, reset on success.
#[derive(Debug, Clone)]
pub struct DoublingBackoff {
    base: Duration,
    cap: Duration,
    current: Duration,
}

impl DoublingBackoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            current: base,
        }
    }

    pub fn watch() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(30))
    }

    /// The delay to sleep for this failure; doubles the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.cap);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }
}

fn apply_jitter(secs: f64, jitter: f64) -> f64 {
    if jitter <= 0.0 {
        return secs;
    }
    let spread = secs * jitter;
    let offset = rand::thread_rng().gen_range(-spread..=spread);
    (secs + offset).max(0.0)
}
