//! Queue Error Types

use std::path::PathBuf;

use crate::queue::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Root directory not initialised: {} (ddmq.yaml missing)", root.display())]
    RootNotFound { root: PathBuf },

    #[error("Queue not found: {queue}")]
    QueueNotFound { queue: String },

    #[error("Queue already exists: {queue}")]
    QueueAlreadyExists { queue: String },

    #[error("Queue {queue} is not empty ({pending} pending, {in_flight} in flight)")]
    QueueNotEmpty {
        queue: String,
        pending: usize,
        in_flight: usize,
    },

    #[error("Queue {queue} holds entries that do not belong to it: {}", entries.join(", "))]
    ForeignEntries { queue: String, entries: Vec<String> },

    #[error("Invalid queue name: '{name}' (allowed characters: A-Z a-z 0-9 _ -)")]
    InvalidQueueName { name: String },

    #[error("Invalid claim handle: '{handle}'")]
    InvalidClaimHandle { handle: String },

    #[error("Not a message file name: '{name}'")]
    InvalidMessageName { name: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Corrupt message file {}: {reason}", path.display())]
    CorruptMessage { path: PathBuf, reason: String },

    #[error("Could not allocate a sequence number for {queue} after {attempts} attempts")]
    SequenceContention { queue: String, attempts: usize },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl QueueError {
    pub fn config(message: impl Into<String>) -> Self {
        QueueError::Config {
            message: message.into(),
        }
    }
}

impl crate::core::error_handling::ContextualError for QueueError {
    fn is_user_actionable(&self) -> bool {
        !matches!(
            self,
            QueueError::Store(_) | QueueError::SequenceContention { .. }
        )
    }

    fn user_message(&self) -> Option<String> {
        if self.is_user_actionable() {
            Some(self.to_string())
        } else {
            None
        }
    }
}

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;
