use thiserror::Error;

/// Error taxonomy for the supervisor core. Every failure mode that can reach
/// an operator or a file row is represented here rather than as a bare
/// `anyhow::Error`, so callers can match on the kind (see §7 of the spec).
#[derive(Error, Debug)]
pub enum ReencodeError {
    #[error("validation failed for field `{field}`: {message}")]
    Validation { field: String, message: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("probe failed: {0}")]
    ProbeFailed(String),

    #[error("no video stream in {0}")]
    NoVideoStream(String),

    #[error("encode failed: {0}")]
    EncodeFailed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, ReencodeError>;

impl ReencodeError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}
