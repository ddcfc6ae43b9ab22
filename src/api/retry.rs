use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `base * 2^attempt`, capped at `max_delay`.
    Exponential,
    /// `base * (attempt + 1)`, capped at `max_delay`.
    Linear,
}

/// How many times to try again and how long to wait in between.
///
/// `attempt` is zero-based: `delay_for(0)` is the pause after the first failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Transport-level policy used by the API client.
    pub fn http() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(5000),
            backoff: Backoff::Exponential,
        }
    }

    /// Stream resolution policy used by the playback session: three attempts in total.
    pub fn playback() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            backoff: Backoff::Linear,
        }
    }

    pub fn with_max_retries(self, max_retries: u32) -> Self {
        Self {
            max_retries,
            ..self
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = match self.backoff {
            Backoff::Exponential => {
                let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
                self.base_delay.saturating_mul(factor)
            }
            Backoff::Linear => self.base_delay.saturating_mul(attempt.saturating_add(1)),
        };
        delay.min(self.max_delay)
    }
}
