use thiserror::Error;

#[derive(Debug, Error)]
pub enum FairValueError {
    #[error("Invalid input for {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Unknown region '{0}': not present in the assumption set")]
    UnknownRegion(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid assumption set: {0}")]
    InvalidConfiguration(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for FairValueError {
    fn from(e: serde_json::Error) -> Self {
        FairValueError::SerializationError(e.to_string())
    }
}
