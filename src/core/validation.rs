//! Validation utilities for names and CLI arguments

use once_cell::sync::Lazy;
use regex::Regex;

use crate::queue::error::{QueueError, QueueResult};

static QUEUE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("queue name pattern"));

/// Queue names become directory names, so only a safe character set is allowed
pub fn validate_queue_name(name: &str) -> QueueResult<()> {
    if QUEUE_NAME.is_match(name) {
        Ok(())
    } else {
        Err(QueueError::InvalidQueueName {
            name: name.to_string(),
        })
    }
}

/// True for names that pass [`validate_queue_name`]
pub fn is_valid_queue_name(name: &str) -> bool {
    QUEUE_NAME.is_match(name)
}

/// Validate positive integer value
pub fn validate_positive_int(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("Value must be greater than 0".to_string()),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("'{}' is not a valid positive integer", value)),
    }
}

/// Validate a timeout in seconds (must be > 0)
pub fn validate_timeout(value: &str) -> Result<u64, String> {
    match value.parse::<u64>() {
        Ok(0) => Err("Timeout must be greater than 0 seconds".to_string()),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("'{}' is not a valid number of seconds", value)),
    }
}

/// Split a comma separated argument list, dropping empty entries
///
/// ```rust
/// use ddmq::core::validation::split_list;
/// assert_eq!(split_list(&["a,b".to_string(), " c ".to_string()]), vec!["a", "b", "c"]);
/// ```
pub fn split_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect()
}
