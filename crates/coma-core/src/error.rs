use thiserror::Error;

use crate::ports::RepositoryError;
use crate::pubsub::PubsubError;
use crate::routine::RoutineError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("duplicate {0}")]
    Duplicate(String),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("pubsub error: {0}")]
    Pubsub(#[from] PubsubError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A routine task panicked or the routine timed out.
    #[error("concurrent lookup failed: {0}")]
    Concurrency(String),
}

impl From<RoutineError<ServiceError>> for ServiceError {
    fn from(err: RoutineError<ServiceError>) -> Self {
        match err.into_source() {
            Ok(source) => source,
            Err(other) => Self::Concurrency(other.to_string()),
        }
    }
}
