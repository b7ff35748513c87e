use std::time::Duration;

use crate::source::SourceError;

/// Decides whether a failed page fetch is attempted again.
///
/// Consulted only for errors where [`SourceError::is_retryable`] holds.
/// `attempt` counts the failures so far for the current page, starting at 1.
pub trait RetryPolicy: Send + Sync {
    /// Delay before the next attempt, or `None` to give up.
    fn next_delay(&self, attempt: u32, error: &SourceError) -> Option<Duration>;
}

/// Fail on the first error.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn next_delay(&self, _attempt: u32, _error: &SourceError) -> Option<Duration> {
        None
    }
}

/// Exponential backoff with an upper bound on attempts and delay.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub max_retries: u32,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_retries: 5,
        }
    }
}

impl ExponentialBackoff {
    pub fn new(min_delay: Duration, max_delay: Duration, max_retries: u32) -> Self {
        Self {
            min_delay,
            max_delay,
            max_retries,
        }
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32, _error: &SourceError) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_retries {
            return None;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        Some(self.min_delay.saturating_mul(factor).min(self.max_delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> SourceError {
        SourceError::Transport("HTTP 503".into())
    }

    #[test]
    fn no_retry_never_retries() {
        assert_eq!(NoRetry.next_delay(1, &transport()), None);
    }

    #[test]
    fn backoff_doubles_until_capped() {
        let policy = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(5), 4);

        assert_eq!(policy.next_delay(1, &transport()), Some(Duration::from_secs(1)));
        assert_eq!(policy.next_delay(2, &transport()), Some(Duration::from_secs(2)));
        assert_eq!(policy.next_delay(3, &transport()), Some(Duration::from_secs(4)));
        assert_eq!(policy.next_delay(4, &transport()), Some(Duration::from_secs(5)));
        assert_eq!(policy.next_delay(5, &transport()), None);
    }
}
