//! Retry utility for operations that lose races to other processes
//!
//! Claiming a message, advancing the sequence counter and picking a fresh
//! message id all follow the same shape: try an atomic filesystem step, and
//! if another process got there first, look again and retry.

use std::thread::sleep;
use std::time::Duration;

/// Configurable retry policy for contended operations
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    /// Pause after the first lost attempt; grows linearly up to `max_delay`
    pub delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Retry straight away, without sleeping
    pub fn immediate(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    fn pause_after(&self, attempt: usize) -> Duration {
        let factor = u32::try_from(attempt + 1).unwrap_or(u32::MAX);
        self.delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Run `attempt` until it produces a value, fails, or the policy is exhausted.
///
/// The closure returns `Ok(Some(value))` on success, `Ok(None)` when it lost a
/// race and should be retried, and `Err` for anything that retrying will not
/// fix. Exhausting the policy yields `Ok(None)`.
///
/// # Examples
/// ```rust
/// use ddmq::core::retry::{retry_contended, RetryPolicy};
///
/// let mut tries = 0;
/// let result: Result<Option<u32>, String> =
///     retry_contended("example", &RetryPolicy::immediate(5), |_| {
///         tries += 1;
///         Ok(if tries == 3 { Some(42) } else { None })
///     });
/// assert_eq!(result, Ok(Some(42)));
/// ```
pub fn retry_contended<T, E, F>(
    operation_name: &str,
    policy: &RetryPolicy,
    mut attempt: F,
) -> Result<Option<T>, E>
where
    F: FnMut(usize) -> Result<Option<T>, E>,
{
    for n in 0..policy.max_attempts {
        if let Some(value) = attempt(n)? {
            return Ok(Some(value));
        }
        if n + 1 < policy.max_attempts {
            let pause = policy.pause_after(n);
            log::debug!(
                "Operation '{}' lost a race on attempt {}/{}, retrying in {:?}",
                operation_name,
                n + 1,
                policy.max_attempts,
                pause
            );
            if !pause.is_zero() {
                sleep(pause);
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_succeeds_immediately() {
        let result =
            retry_contended("test_operation", &RetryPolicy::default(), |_| Ok::<_, String>(Some(42)));
        assert_eq!(result, Ok(Some(42)));
    }

    #[test]
    fn test_retry_succeeds_after_lost_races() {
        let mut attempts = 0;
        let policy = RetryPolicy {
            max_attempts: 5,
            delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };

        let result = retry_contended("test_operation", &policy, |n| {
            attempts += 1;
            Ok::<_, String>(if n < 2 { None } else { Some(n) })
        });

        assert_eq!(result, Ok(Some(2)));
        assert_eq!(attempts, 3);
    }

    #[test]
    fn test_retry_exhausts_attempts() {
        let mut attempts = 0;
        let result: Result<Option<i32>, String> =
            retry_contended("test_operation", &RetryPolicy::immediate(4), |_| {
                attempts += 1;
                Ok(None)
            });

        assert_eq!(result, Ok(None));
        assert_eq!(attempts, 4);
    }

    #[test]
    fn test_retry_stops_on_hard_error() {
        let mut attempts = 0;
        let result: Result<Option<i32>, &str> =
            retry_contended("test_operation", &RetryPolicy::immediate(10), |_| {
                attempts += 1;
                Err("disk on fire")
            });

        assert_eq!(result, Err("disk on fire"));
        assert_eq!(attempts, 1);
    }

    #[test]
    fn test_pause_grows_and_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            delay: Duration::from_millis(2),
            max_delay: Duration::from_millis(5),
        };
        assert_eq!(policy.pause_after(0), Duration::from_millis(2));
        assert_eq!(policy.pause_after(1), Duration::from_millis(4));
        assert_eq!(policy.pause_after(7), Duration::from_millis(5));
    }
}
