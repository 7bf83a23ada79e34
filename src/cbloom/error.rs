use thiserror::Error;

pub type Result<T> = std::result::Result<T, CbloomError>;

#[derive(Error, Debug, PartialEq)]
pub enum CbloomError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("Tokio runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error(
        "Failed to parse environment variable {var_name}: value '{value}' - {error}"
    )]
    EnvParseError {
        var_name: String,
        value: String,
        error: String,
    },
}

// Validation messages from `CountingFilterConfig::validate`
impl From<String> for CbloomError {
    fn from(msg: String) -> Self {
        CbloomError::InvalidConfig(msg)
    }
}

impl From<serde_json::Error> for CbloomError {
    fn from(err: serde_json::Error) -> Self {
        CbloomError::SerializationError(err.to_string())
    }
}
