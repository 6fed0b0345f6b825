//! Error types for the conversation stream.

use dialog_session::StoreError;
use tonic::Status;

/// Result type for stream operations.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Faults a conversation stream can hit. Only some of these end the
/// stream; see the orchestrator for the policy.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("a Config frame must precede any other input")]
    MissingConfig,

    #[error("session could not be loaded: {0}")]
    SessionLoad(#[from] StoreError),

    #[error("language model unavailable: {0}")]
    LlmUnavailable(String),

    #[error("client went away")]
    ClientGone,
}

impl From<ApiError> for Status {
    fn from(err: ApiError) -> Self {
        match &err {
            ApiError::MissingConfig => Status::failed_precondition(err.to_string()),
            ApiError::SessionLoad(_) => Status::internal(err.to_string()),
            ApiError::LlmUnavailable(_) => Status::unavailable(err.to_string()),
            ApiError::ClientGone => Status::cancelled(err.to_string()),
        }
    }
}
