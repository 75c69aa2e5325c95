//! The dispatcher's retry backoff. Default is exponential with a 60-second
//! cap and ~250ms jitter, injectable so handlers can supply their own.

use std::time::Duration;

use rand::Rng;

pub trait BackoffPolicy: Send + Sync {
    /// `attempt` is the attempt number the row is about to enter (i.e. the
    /// abandon that just happened was attempt - 1's failure).
    fn delay_for_attempt(&self, attempt: u32) -> Duration;
}

/// `min(60s, 2^min(10, attempt) * 250ms) + uniform(0, 250ms)`.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    pub cap: Duration,
    pub unit: Duration,
    pub jitter: Duration,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            cap: Duration::from_secs(60),
            unit: Duration::from_millis(250),
            jitter: Duration::from_millis(250),
        }
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(10);
        let base = self.unit.saturating_mul(1u32 << exponent);
        let capped = base.min(self.cap);
        let jitter_ms = rand::thread_rng().gen_range(0..=self.jitter.as_millis() as u64);
        capped + Duration::from_millis(jitter_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_at_sixty_seconds() {
        let backoff = ExponentialBackoff::default();
        for attempt in 0..40 {
            let delay = backoff.delay_for_attempt(attempt);
            assert!(delay <= Duration::from_millis(60_250), "attempt {attempt} gave {delay:?}");
        }
    }

    #[test]
    fn grows_with_attempt_before_the_cap() {
        let backoff = ExponentialBackoff::default();
        // Compare floors (subtracting jitter) since jitter makes a single
        // sample noisy; the deterministic component must still grow.
        let floor = |attempt: u32| backoff.unit * (1u32 << attempt.min(10));
        assert!(floor(1) < floor(2));
        assert!(floor(2) < floor(3));
    }
}
