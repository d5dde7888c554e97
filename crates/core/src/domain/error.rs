// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("task has no targets")]
    NoTargets,

    #[error("target cursor {index} out of range for {len} targets")]
    CursorOutOfRange { index: usize, len: usize },

    #[error("unknown task type code: {0}")]
    UnknownTaskType(i32),

    #[error("unknown task status: {0}")]
    UnknownTaskStatus(String),

    #[error("unknown result status code: {0}")]
    UnknownLogStatus(i32),

    #[error("invalid log transition: {from} -> {to}")]
    InvalidLogTransition { from: String, to: String },

    #[error("validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
