// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
///
/// Launch and transport failures always embed the engine log captured so far,
/// since it is usually the only trace an engine that died silently leaves behind.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Launch error: {message}\nLog-file says:\n{log}")]
    Launch { message: String, log: String },

    #[error("Transport error: {message}\nLog-file says:\n{log}")]
    Transport { message: String, log: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Execution error: {0}")]
    Execution(#[from] crate::port::ExecutionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl AppError {
    pub fn launch(message: impl Into<String>, log: impl Into<String>) -> Self {
        AppError::Launch {
            message: message.into(),
            log: log.into(),
        }
    }

    pub fn transport(message: impl Into<String>, log: impl Into<String>) -> Self {
        AppError::Transport {
            message: message.into(),
            log: log.into(),
        }
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
