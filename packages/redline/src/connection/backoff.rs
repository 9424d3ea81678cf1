//! Reconnect delay schedule.

use std::time::Duration;

/// Exponential backoff: `min(base * 2^(attempt - 1), cap)`, bounded by a
/// maximum number of attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1000),
            cap: Duration::from_millis(30_000),
            max_attempts: 5,
        }
    }
}

impl Backoff {
    /// Delay before the 1-based `attempt`, or `None` once the budget is spent.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let factor = 2u32.checked_pow(attempt - 1).unwrap_or(u32::MAX);
        Some(self.base.saturating_mul(factor).min(self.cap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule() {
        let backoff = Backoff::default();
        let delays: Vec<u128> = (1..=5)
            .map(|n| backoff.delay(n).unwrap().as_millis())
            .collect();
        assert_eq!(delays, [1000, 2000, 4000, 8000, 16000]);
        assert_eq!(backoff.delay(6), None);
        assert_eq!(backoff.delay(0), None);
    }

    #[test]
    fn delay_is_capped() {
        let backoff = Backoff {
            max_attempts: 40,
            ..Backoff::default()
        };
        assert_eq!(backoff.delay(6), Some(Duration::from_millis(30_000)));
        assert_eq!(backoff.delay(40), Some(Duration::from_millis(30_000)));
    }
}
