//! Exponential backoff for Graph calls.

use std::time::Duration;

use rand::Rng as _;

use super::config::GraphConfig;

/// Which failures a call may be retried on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOn {
    /// 429 and 5xx; for reads that can be repeated safely.
    Transient,
    /// 429 only; a 5xx may mean the request was already applied.
    RateLimitOnly,
}

impl RetryOn {
    pub fn allows(&self, status: u16) -> bool {
        match self {
            Self::Transient => status == 429 || (500..600).contains(&status),
            Self::RateLimitOnly => status == 429,
        }
    }
}

/// Bounded exponential backoff honouring `Retry-After`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff,
        }
    }

    pub fn from_config(config: &GraphConfig) -> Self {
        Self::new(config.max_attempts, config.initial_backoff, config.max_backoff)
    }

    /// Total attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns true if another attempt may follow attempt number `attempt`
    /// (1-based).
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay after the `attempt`-th failed attempt, without jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let base = self.initial_backoff.as_secs_f64();
        let delay = base * 2_f64.powi(attempt as i32 - 1);
        Duration::from_secs_f64(delay.min(self.max_backoff.as_secs_f64()))
    }

    /// Delay before the next attempt: the server's `Retry-After` if given,
    /// otherwise the backoff plus up to 10% jitter. Always capped.
    pub fn next_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(retry_after) = retry_after {
            return retry_after.min(self.max_backoff);
        }
        let delay = self.backoff_delay(attempt);
        let jitter = rand::rng().random_range(0.0..=0.1) * delay.as_secs_f64();
        (delay + Duration::from_secs_f64(jitter)).min(self.max_backoff)
    }
}

/// Parses a `Retry-After` header given in seconds.
///
/// The HTTP-date form is not used by Graph and is ignored.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(500), Duration::from_secs(30))
    }

    #[test]
    fn exponential_delay() {
        let policy = policy();
        assert_eq!(policy.backoff_delay(0), Duration::ZERO);
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(500));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(2));
    }

    #[test]
    fn delay_is_capped() {
        let policy = policy();
        assert_eq!(policy.backoff_delay(20), Duration::from_secs(30));
        assert_eq!(
            policy.next_delay(1, Some(Duration::from_secs(120))),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn retry_after_wins_over_backoff() {
        let policy = policy();
        assert_eq!(
            policy.next_delay(1, Some(Duration::from_secs(2))),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn jitter_stays_within_ten_percent() {
        let policy = policy();
        for _ in 0..50 {
            let delay = policy.next_delay(2, None);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_millis(1100));
        }
    }

    #[test]
    fn attempt_ceiling() {
        let policy = policy();
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert_eq!(RetryPolicy::new(0, Duration::ZERO, Duration::ZERO).max_attempts(), 1);
    }

    #[test]
    fn retry_classes() {
        assert!(RetryOn::Transient.allows(429));
        assert!(RetryOn::Transient.allows(503));
        assert!(!RetryOn::Transient.allows(404));
        assert!(RetryOn::RateLimitOnly.allows(429));
        assert!(!RetryOn::RateLimitOnly.allows(500));
    }

    #[test]
    fn parses_retry_after_seconds() {
        assert_eq!(parse_retry_after(" 7 "), Some(Duration::from_secs(7)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }
}
