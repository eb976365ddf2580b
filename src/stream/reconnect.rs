use std::time::Duration;

use rand::Rng;

use crate::error::{Error, Result};

/// Configuration for reconnection behavior
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Initial delay before first reconnection attempt
    pub initial_delay: Duration,
    /// Maximum delay between reconnection attempts
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Fraction of each delay that is randomized, 0.0 to 1.0
    pub jitter_factor: f64,
    /// Consecutive failed attempts tolerated before the session gives up
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: 10,
        }
    }
}

impl ReconnectConfig {
    pub fn validate(&self) -> Result<()> {
        if self.initial_delay > self.max_delay {
            return Err(Error::Config(
                "reconnect initial_delay exceeds max_delay".to_string(),
            ));
        }
        if !(self.multiplier >= 1.0 && self.multiplier.is_finite()) {
            return Err(Error::Config(
                "reconnect multiplier must be at least 1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(Error::Config(
                "reconnect jitter_factor must be between 0.0 and 1.0".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(Error::Config(
                "reconnect max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Exponential backoff calculator
#[derive(Debug, Clone)]
pub(crate) struct ExponentialBackoff {
    initial_delay: Duration,
    current_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter_factor: f64,
}

impl ExponentialBackoff {
    pub(crate) fn new(config: &ReconnectConfig) -> Self {
        Self {
            initial_delay: config.initial_delay,
            current_delay: config.initial_delay,
            max_delay: config.max_delay,
            multiplier: config.multiplier,
            jitter_factor: config.jitter_factor,
        }
    }

    /// Get the next delay duration
    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay = self.current_delay;
        self.current_delay = std::cmp::min(
            Duration::from_secs_f64(delay.as_secs_f64() * self.multiplier),
            self.max_delay,
        );
        self.jittered(delay)
    }

    /// Reset the backoff to initial delay
    pub(crate) fn reset(&mut self) {
        self.current_delay = self.initial_delay;
    }

    /// Spread `delay` by up to `jitter_factor` in either direction, never
    /// past `max_delay`
    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter_factor <= 0.0 || delay.is_zero() {
            return delay;
        }
        let spread = delay.as_secs_f64() * self.jitter_factor;
        let offset = rand::thread_rng().gen_range(-spread..=spread);
        let secs = (delay.as_secs_f64() + offset).max(0.0);
        std::cmp::min(Duration::from_secs_f64(secs), self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff(initial: u64, max: u64, jitter_factor: f64) -> ExponentialBackoff {
        ExponentialBackoff::new(&ReconnectConfig {
            initial_delay: Duration::from_secs(initial),
            max_delay: Duration::from_secs(max),
            multiplier: 2.0,
            jitter_factor,
            max_attempts: 10,
        })
    }

    #[test]
    fn test_backoff() {
        let mut backoff = backoff(1, 60, 0.0);

        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(4));
        assert_eq!(backoff.next_delay(), Duration::from_secs(8));
    }

    #[test]
    fn test_backoff_max() {
        let mut backoff = backoff(1, 5, 0.0);

        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(4));
        assert_eq!(backoff.next_delay(), Duration::from_secs(5)); // capped
        assert_eq!(backoff.next_delay(), Duration::from_secs(5)); // still capped
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = backoff(3, 60, 0.0);

        assert_eq!(backoff.next_delay(), Duration::from_secs(3));
        assert_eq!(backoff.next_delay(), Duration::from_secs(6));

        backoff.reset();

        assert_eq!(backoff.next_delay(), Duration::from_secs(3));
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let mut backoff = backoff(10, 15, 0.5);
        for _ in 0..50 {
            backoff.reset();
            let delay = backoff.next_delay();
            assert!(delay >= Duration::from_secs(5), "{:?}", delay);
            assert!(delay <= Duration::from_secs(15), "{:?}", delay);
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(ReconnectConfig::default().validate().is_ok());

        let config = ReconnectConfig {
            max_attempts: 0,
            ..ReconnectConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ReconnectConfig {
            multiplier: 0.5,
            ..ReconnectConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(120),
            ..ReconnectConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
