//! CLI error type

use std::path::PathBuf;

use crate::core::error_handling::ContextualError;
use crate::queue::QueueError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("Invalid JSON command: {0}")]
    Payload(String),

    #[error("Configuration file {}: {message}", path.display())]
    ConfigFile { path: PathBuf, message: String },

    #[error("Failed to render output: {0}")]
    Render(String),

    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl ContextualError for AppError {
    fn is_user_actionable(&self) -> bool {
        match self {
            AppError::Queue(e) => e.is_user_actionable(),
            AppError::Payload(_) | AppError::ConfigFile { .. } => true,
            AppError::Render(_) | AppError::Io(_) => false,
        }
    }

    fn user_message(&self) -> Option<String> {
        match self {
            AppError::Queue(e) => e.user_message(),
            AppError::Payload(_) | AppError::ConfigFile { .. } => Some(self.to_string()),
            AppError::Render(_) | AppError::Io(_) => None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Render(e.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(e: serde_yaml::Error) -> Self {
        AppError::Render(e.to_string())
    }
}
