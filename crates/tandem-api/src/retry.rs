//! Retry with exponential backoff for API requests.

use rand::Rng;
use tandem_types::ApiError;

/// Configuration for retry behavior on transient API errors.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries).
    pub max_retries: u32,
    /// Initial delay in milliseconds before the first retry.
    pub initial_delay_ms: u64,
    /// Maximum delay in milliseconds between retries.
    pub max_delay_ms: u64,
    /// Multiplier applied to the delay after each attempt.
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay_ms: 1000,
            max_delay_ms: 60_000,
            backoff_factor: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay before retrying after `attempt` (0-based).
    ///
    /// A server-provided `Retry-After` wins, clamped to `max_delay_ms`.
    /// Otherwise `initial_delay_ms * backoff_factor^attempt` with ±25% jitter.
    pub fn delay_ms(&self, attempt: u32, retry_after_ms: Option<u64>) -> u64 {
        if let Some(server_delay) = retry_after_ms {
            return server_delay.min(self.max_delay_ms);
        }
        let base = self.initial_delay_ms as f64 * self.backoff_factor.powi(attempt as i32);
        let jitter = rand::rng().random_range(0.75..=1.25);
        ((base.min(self.max_delay_ms as f64) * jitter) as u64).min(self.max_delay_ms)
    }
}

/// Whether the error is transient and the request should be retried.
pub fn is_retryable(error: &ApiError) -> bool {
    matches!(
        error,
        ApiError::RateLimited { .. }
            | ApiError::Overloaded
            | ApiError::Server { .. }
            | ApiError::Network(_)
            | ApiError::Timeout
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_retry() {
        assert!(is_retryable(&ApiError::RateLimited {
            retry_after_ms: None
        }));
        assert!(is_retryable(&ApiError::Overloaded));
        assert!(is_retryable(&ApiError::Timeout));
        assert!(is_retryable(&ApiError::Network("reset".into())));
        assert!(is_retryable(&ApiError::Server {
            status: 502,
            message: "bad gateway".into(),
        }));
    }

    #[test]
    fn permanent_errors_do_not_retry() {
        assert!(!is_retryable(&ApiError::Auth {
            message: "invalid key".into()
        }));
        assert!(!is_retryable(&ApiError::BadRequest {
            message: "bad input".into()
        }));
        assert!(!is_retryable(&ApiError::StreamParse("bad json".into())));
        assert!(!is_retryable(&ApiError::EmptyResponse));
    }

    #[test]
    fn backoff_grows_with_jitter() {
        let config = RetryConfig::default();
        let d0 = config.delay_ms(0, None);
        let d2 = config.delay_ms(2, None);
        assert!((750..=1250).contains(&d0), "d0={d0}");
        assert!((3000..=5000).contains(&d2), "d2={d2}");
    }

    #[test]
    fn retry_after_wins_but_is_capped() {
        let config = RetryConfig {
            max_delay_ms: 10_000,
            ..RetryConfig::default()
        };
        assert_eq!(config.delay_ms(0, Some(4000)), 4000);
        assert_eq!(config.delay_ms(0, Some(30_000)), 10_000);
        assert!(config.delay_ms(20, None) <= 10_000);
    }
}
