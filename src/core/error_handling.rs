//! Generic error handling utilities
//!
//! Separates errors the user can fix (bad queue name, missing root, invalid
//! settings) from system failures (IO errors, persistent contention), so the
//! CLI can report the former verbatim and keep the latter at debug level.

/// Trait for errors that can distinguish between user-actionable and system errors
///
/// When `is_user_actionable()` returns `true`, `user_message()` should return
/// `Some(message)`; otherwise it should return `None`.
pub trait ContextualError: std::error::Error {
    /// Returns true if this error carries a specific message the user can act on
    ///
    /// Examples of user-actionable errors:
    /// - Unknown queue or uninitialised root
    /// - Invalid queue names or claim handles
    /// - Settings files with values of the wrong type
    ///
    /// Examples of system errors:
    /// - IO failures
    /// - Sequence allocation giving up under contention
    fn is_user_actionable(&self) -> bool;

    /// Returns the specific user message if this is a user-actionable error
    fn user_message(&self) -> Option<String>;
}

/// Log errors with appropriate detail level based on error specificity
///
/// User-actionable errors log their own message after `FATAL:`, system errors
/// log `operation_context`. The full error is always logged at debug level.
///
/// # Examples
/// ```rust,no_run
/// # use ddmq::core::error_handling::log_error_with_context;
/// # use ddmq::queue::QueueError;
/// let err = QueueError::QueueNotFound { queue: "jobs".to_string() };
/// log_error_with_context(&err, "Publishing message");
/// // Logs: "FATAL: Queue not found: jobs"
/// ```
pub fn log_error_with_context<E: ContextualError + std::fmt::Display + std::fmt::Debug>(
    error: &E,
    operation_context: &str,
) {
    match error.user_message().filter(|_| error.is_user_actionable()) {
        Some(user_msg) => log::error!("FATAL: {}", user_msg),
        None => log::error!("FATAL: {}", operation_context),
    }
    log::debug!("DETAIL: {}", error);
    log::debug!("DEBUG_DETAILS: {:?}", error);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::store::StoreError;
    use crate::queue::QueueError;
    use std::path::PathBuf;

    #[test]
    fn test_user_actionable_error_shows_specific_message() {
        let error = QueueError::QueueNotFound {
            queue: "jobs".to_string(),
        };

        assert!(error.is_user_actionable());
        assert_eq!(error.user_message().as_deref(), Some("Queue not found: jobs"));
    }

    #[test]
    fn test_system_error_uses_generic_context() {
        let error = QueueError::Store(StoreError::Io {
            path: PathBuf::from("/srv/ddmq/jobs"),
            source: std::io::Error::other("disk full"),
        });

        assert!(!error.is_user_actionable());
        assert_eq!(error.user_message(), None);

        // must not panic for either kind
        log_error_with_context(&error, "Publishing message");
    }

    #[test]
    fn test_contention_is_a_system_error() {
        let error = QueueError::SequenceContention {
            queue: "jobs".to_string(),
            attempts: 200,
        };
        assert!(!error.is_user_actionable());
    }
}
