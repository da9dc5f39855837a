use std::time::Duration;

use crate::gateway::constants::BACKOFF_MAX_EXPONENT;

/// Exponential reconnect delay: `base`, `2 * base`, `4 * base`, then
/// `8 * base` for every later attempt.
#[derive(Debug, Clone)]
pub struct Backoff {
    base_ms: u64,
    max_attempts: u32,
    attempt: u32,
}

impl Backoff {
    pub fn new(base_ms: u64, max_attempts: u32) -> Self {
        Self {
            base_ms,
            max_attempts,
            attempt: 0,
        }
    }

    pub fn next(&mut self) -> Duration {
        self.attempt += 1;
        let delay = self.base_ms * 2u64.pow((self.attempt - 1).min(BACKOFF_MAX_EXPONENT));
        Duration::from_millis(delay)
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_then_caps() {
        let mut backoff = Backoff::new(1_000, 10);
        let delays: Vec<u64> = (0..6).map(|_| backoff.next().as_millis() as u64).collect();
        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 8_000, 8_000]);
    }

    #[test]
    fn exhausts_after_max_attempts() {
        let mut backoff = Backoff::new(10, 2);
        assert!(!backoff.is_exhausted());
        backoff.next();
        backoff.next();
        assert!(backoff.is_exhausted());
        assert_eq!(backoff.attempt(), 2);
    }

    #[test]
    fn zero_attempts_is_exhausted_immediately() {
        assert!(Backoff::new(10, 0).is_exhausted());
    }
}
