use std::time::Duration;

use rand::Rng;

/// Fixed-delay retry configuration shared by reconnect and resync loops.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RetryConfig {
    pub(crate) delay: Duration,
    pub(crate) jitter: f64,
    pub(crate) max_attempts: u32,
}

impl RetryConfig {
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.delay.is_zero() {
            return Err("Retry delay must be > 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.jitter) || !self.jitter.is_finite() {
            return Err("Jitter must be between 0.0 and 1.0".to_string());
        }
        if self.max_attempts == 0 {
            return Err("Max attempts must be > 0".to_string());
        }
        Ok(())
    }

    /// Whether `attempts` consecutive failures exhaust the bound.
    pub(crate) fn exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

/// Delay before the next attempt. The delay does not grow with the attempt
/// count; jitter only spreads it downwards.
pub(crate) fn retry_delay(config: RetryConfig) -> Duration {
    let base = config.delay.as_secs_f64();

    if config.jitter == 0.0 {
        return config.delay;
    }

    let mut rng = rand::rng();
    let randomized = rng.random_range(0.0..=base);
    let blended = base * (1.0 - config.jitter) + randomized * config.jitter;
    Duration::from_secs_f64(blended)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(jitter: f64) -> RetryConfig {
        RetryConfig {
            delay: Duration::from_millis(500),
            jitter,
            max_attempts: 3,
        }
    }

    #[test]
    fn retry_delay_without_jitter_is_fixed() {
        let config = config(0.0);
        for _ in 0..5 {
            assert_eq!(retry_delay(config), Duration::from_millis(500));
        }
    }

    #[test]
    fn retry_delay_with_jitter_stays_within_base() {
        let config = config(0.5);
        for _ in 0..50 {
            let delay = retry_delay(config);
            assert!(delay >= Duration::from_millis(250));
            assert!(delay <= Duration::from_millis(500));
        }
    }

    #[test]
    fn exhausted_at_bound() {
        let config = config(0.0);
        assert!(!config.exhausted(2));
        assert!(config.exhausted(3));
        assert!(config.exhausted(4));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut bad = config(1.5);
        assert_eq!(
            bad.validate().unwrap_err(),
            "Jitter must be between 0.0 and 1.0"
        );
        bad.jitter = 0.0;
        bad.max_attempts = 0;
        assert_eq!(bad.validate().unwrap_err(), "Max attempts must be > 0");
        bad.max_attempts = 1;
        bad.delay = Duration::ZERO;
        assert_eq!(bad.validate().unwrap_err(), "Retry delay must be > 0");
    }
}
