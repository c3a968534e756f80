//! Retry policy for transient upstream failures

use reqwest::StatusCode;
use std::time::Duration;

/// Cloudflare "a timeout occurred" status
pub const CLOUDFLARE_TIMEOUT: u16 = 524;

/// Bounded linear backoff applied to each network send.
///
/// The first attempt goes out immediately; retry attempt `n` (1-based, n >= 2)
/// is preceded by a delay of `n * base_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Delay unit multiplied by the attempt number
    pub base_delay: Duration,
    /// Statuses treated as an upstream timeout
    pub transient_statuses: Vec<StatusCode>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            ..Self::default()
        }
    }

    /// A policy that never retries
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_transient_statuses(mut self, statuses: Vec<StatusCode>) -> Self {
        self.transient_statuses = statuses;
        self
    }

    /// Whether `status` signals an upstream timeout
    pub fn is_transient_status(&self, status: StatusCode) -> bool {
        self.transient_statuses.contains(&status)
    }

    /// Delay to sleep before `attempt` (1-based); zero for the first attempt
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            Duration::ZERO
        } else {
            self.base_delay * attempt
        }
    }

    /// Whether another attempt may follow `attempt`
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            transient_statuses: vec![
                StatusCode::GATEWAY_TIMEOUT,
                StatusCode::from_u16(CLOUDFLARE_TIMEOUT).unwrap_or(StatusCode::GATEWAY_TIMEOUT),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert!(policy.is_transient_status(StatusCode::GATEWAY_TIMEOUT));
        assert!(policy.is_transient_status(StatusCode::from_u16(524).unwrap()));
        assert!(!policy.is_transient_status(StatusCode::BAD_GATEWAY));
        assert!(!policy.is_transient_status(StatusCode::PAYMENT_REQUIRED));
    }

    #[test]
    fn test_delays_increase_linearly() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        assert_eq!(policy.delay_before(1), Duration::ZERO);
        assert_eq!(policy.delay_before(2), Duration::from_millis(200));
        assert_eq!(policy.delay_before(3), Duration::from_millis(300));
    }

    #[test]
    fn test_attempt_budget() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        assert!(policy.allows_retry_after(1));
        assert!(policy.allows_retry_after(2));
        assert!(!policy.allows_retry_after(3));

        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
        assert!(!RetryPolicy::none().allows_retry_after(1));
    }
}
