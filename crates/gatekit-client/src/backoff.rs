//! Retry classification and backoff delays.

use std::time::Duration;

use rand::Rng;
use tonic::Code;

/// Delay before the first retry.
pub const BASE_DELAY: Duration = Duration::from_secs(1);

/// Upper bound for any single backoff delay.
pub const MAX_DELAY: Duration = Duration::from_secs(30);

/// Whether a failed call with this status code may be attempted again.
///
/// Only transient conditions qualify: the server being unreachable, the
/// deadline expiring, or the server shedding load.
pub fn is_retryable(code: Code) -> bool {
    matches!(
        code,
        Code::Unavailable | Code::DeadlineExceeded | Code::ResourceExhausted
    )
}

/// `min(2^attempt seconds, 30 seconds)`; `attempt` is 0 for the first retry.
pub fn backoff(attempt: u32) -> Duration {
    BackoffPolicy::default().exponential(attempt)
}

/// Exponential backoff with an upper bound and optional full jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: BASE_DELAY,
            max: MAX_DELAY,
            jitter: false,
        }
    }
}

impl BackoffPolicy {
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Deterministic delay for a retry index.
    pub fn exponential(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Delay to sleep before retry `attempt`.
    ///
    /// With jitter enabled the delay is uniform in `[0, exponential(attempt)]`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let ceiling = self.exponential(attempt);
        if !self.jitter || ceiling.is_zero() {
            return ceiling;
        }
        let nanos = u64::try_from(ceiling.as_nanos()).unwrap_or(u64::MAX);
        Duration::from_nanos(rand::thread_rng().gen_range(0..=nanos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_codes() {
        assert!(is_retryable(Code::Unavailable));
        assert!(is_retryable(Code::DeadlineExceeded));
        assert!(is_retryable(Code::ResourceExhausted));
    }

    #[test]
    fn terminal_codes() {
        let terminal = [
            Code::Ok,
            Code::Cancelled,
            Code::Unknown,
            Code::InvalidArgument,
            Code::NotFound,
            Code::AlreadyExists,
            Code::PermissionDenied,
            Code::FailedPrecondition,
            Code::Aborted,
            Code::OutOfRange,
            Code::Unimplemented,
            Code::Internal,
            Code::DataLoss,
            Code::Unauthenticated,
        ];
        for code in terminal {
            assert!(!is_retryable(code), "{code:?} must not be retried");
        }
    }

    #[test]
    fn backoff_doubles_until_cap() {
        assert_eq!(backoff(0), Duration::from_secs(1));
        assert_eq!(backoff(1), Duration::from_secs(2));
        assert_eq!(backoff(2), Duration::from_secs(4));
        assert_eq!(backoff(3), Duration::from_secs(8));
        assert_eq!(backoff(4), Duration::from_secs(16));
        assert_eq!(backoff(5), Duration::from_secs(30));
        assert_eq!(backoff(6), Duration::from_secs(30));
    }

    #[test]
    fn backoff_saturates_for_large_attempts() {
        assert_eq!(backoff(31), MAX_DELAY);
        assert_eq!(backoff(32), MAX_DELAY);
        assert_eq!(backoff(u32::MAX), MAX_DELAY);
    }

    #[test]
    fn delay_without_jitter_is_deterministic() {
        let policy = BackoffPolicy::default();
        for attempt in 0..8 {
            assert_eq!(policy.delay(attempt), policy.exponential(attempt));
        }
    }

    #[test]
    fn jittered_delay_stays_within_ceiling() {
        let policy = BackoffPolicy::default().with_jitter(true);
        for attempt in 0..8 {
            for _ in 0..32 {
                assert!(policy.delay(attempt) <= policy.exponential(attempt));
            }
        }
    }
}
