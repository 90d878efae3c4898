use crate::cluster::ClusterError;
use crate::object_storage::errors::ObjectStorageError;
use crate::repository::RepositoryError;
use strum_macros::Display;
use thiserror::Error;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum QuotaScope {
    Lob,
    Team,
}

/// Error taxonomy surfaced by every public operation of the platform.
///
/// The HTTP layer (out of scope here) maps variants as follows:
/// `InvalidRequest` -> 400, `Forbidden` -> 403, `*NotFound` -> 404,
/// `QuotaExceeded` -> 429, `Cluster(Unavailable)` -> 503, `Canceled` is not
/// converted to a response when the caller already disconnected, everything
/// else -> 500.
#[derive(Clone, Error, Debug)]
pub enum EngineError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Access to this resource is denied")]
    Forbidden,

    #[error("Test job `{job_id}` not found")]
    JobNotFound { job_id: Uuid },

    #[error("Schedule `{schedule_id}` not found")]
    ScheduleNotFound { schedule_id: Uuid },

    #[error("Configuration `{config_id}` not found")]
    ConfigNotFound { config_id: Uuid },

    #[error("Concurrent job quota exceeded for {scope} `{scope_id}`: {active} active, {max_allowed} allowed")]
    QuotaExceeded {
        scope: QuotaScope,
        scope_id: String,
        active: u32,
        max_allowed: u32,
    },

    #[error("Cluster error: {0}")]
    Cluster(ClusterError),

    #[error("Object storage error: {0}")]
    Storage(#[from] ObjectStorageError),

    #[error("Repository error: {raw_error_message}")]
    Repository { raw_error_message: String },

    #[error("Operation canceled")]
    Canceled,
}

impl EngineError {
    pub fn invalid_request<S: Into<String>>(message: S) -> Self {
        EngineError::InvalidRequest {
            message: message.into(),
        }
    }
}

impl From<ClusterError> for EngineError {
    fn from(err: ClusterError) -> Self {
        match err {
            ClusterError::Canceled => EngineError::Canceled,
            other => EngineError::Cluster(other),
        }
    }
}

impl From<RepositoryError> for EngineError {
    fn from(err: RepositoryError) -> Self {
        EngineError::Repository {
            raw_error_message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for EngineError {
    fn from(err: serde_yaml::Error) -> Self {
        EngineError::InvalidRequest {
            message: format!("Malformed YAML body: {err}"),
        }
    }
}
