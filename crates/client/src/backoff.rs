//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

use crate::config::BackoffConfig;

/// Delays between retry attempts.
///
/// The n-th delay is `first_delay * factor^n`, stretched by a random fraction
/// below `jitter` and capped at `max_delay`. Jitter is kept below
/// `factor - 1`, so delays strictly increase until the cap.
#[derive(Debug, Clone)]
pub struct Backoff {
    first_delay_ms: f64,
    factor: f64,
    max_delay_ms: f64,
    jitter: f64,
    attempt: i32,
}

impl Backoff {
    pub fn new(config: &BackoffConfig) -> Self {
        let factor = if config.factor.is_finite() && config.factor > 1.0 { config.factor } else { 2.0 };
        let jitter = if config.jitter.is_finite() { config.jitter.clamp(0.0, (factor - 1.0) * 0.99) } else { 0.0 };

        Self {
            first_delay_ms: config.first_delay_ms.max(1) as f64,
            factor,
            max_delay_ms: config.max_delay_ms as f64,
            jitter,
            attempt: 0,
        }
    }

    pub fn attempt(&self) -> i32 {
        self.attempt
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let base = self.first_delay_ms * self.factor.powi(self.attempt);
        let stretch = if self.jitter > 0.0 { rand::thread_rng().gen_range(0.0..self.jitter) } else { 0.0 };
        self.attempt = self.attempt.saturating_add(1);

        let delay_ms = (base * (1.0 + stretch)).min(self.max_delay_ms);
        Some(Duration::from_nanos((delay_ms.max(0.0) * 1_000_000.0) as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_strictly_increase_until_cap() {
        for _ in 0..100 {
            let delays: Vec<Duration> = Backoff::new(&BackoffConfig::default()).take(6).collect();
            assert!(delays.windows(2).all(|w| w[0] < w[1]), "{delays:?}");
            assert!(delays[0] >= Duration::from_millis(50) && delays[0] < Duration::from_millis(55));
        }
    }

    #[test]
    fn delays_are_capped() {
        let config = BackoffConfig { first_delay_ms: 100, factor: 10.0, max_delay_ms: 1_000, jitter: 0.5 };
        let delays: Vec<Duration> = Backoff::new(&config).take(4).collect();
        assert_eq!(delays[2], Duration::from_secs(1));
        assert_eq!(delays[3], Duration::from_secs(1));
    }

    #[test]
    fn oversized_jitter_is_clamped() {
        let config = BackoffConfig { first_delay_ms: 10, factor: 1.5, max_delay_ms: 60_000, jitter: 5.0 };
        for _ in 0..100 {
            let delays: Vec<Duration> = Backoff::new(&config).take(8).collect();
            assert!(delays.windows(2).all(|w| w[0] < w[1]), "{delays:?}");
        }
    }

    #[test]
    fn without_jitter_delays_are_exact() {
        let config = BackoffConfig { first_delay_ms: 50, factor: 2.0, max_delay_ms: 10_000, jitter: 0.0 };
        let delays: Vec<u128> = Backoff::new(&config).take(3).map(|d| d.as_millis()).collect();
        assert_eq!(delays, vec![50, 100, 200]);
    }
}
