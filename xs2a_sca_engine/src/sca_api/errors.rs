use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::traits::PersistenceError;

/// Outcomes of the authorisation API that are not expressed as a response.
///
/// Business and technical failures of a stage transition are reported in the response's `error` field. The variants
/// here are for conditions where there is no transition to report: the authorisation has expired, could not be read,
/// or the deployment is not configured for the request.
#[derive(Debug, Clone, Error)]
pub enum ScaEngineError {
    #[error("Configuration error. {0}")]
    Configuration(String),
    #[error("Unsupported operation. {0}")]
    UnsupportedOperation(String),
    #[error("Authorisation {authorisation_id} expired at {expired_at}")]
    Expired { authorisation_id: String, expired_at: DateTime<Utc> },
    #[error("Authorisation {0} does not exist")]
    AuthorisationNotFound(String),
    #[error("{0} does not exist or can no longer be authorised")]
    NoActiveParent(String),
    #[error("{0} has already been authorised")]
    AlreadyAuthorised(String),
    #[error("Database error: {0}")]
    Persistence(#[from] PersistenceError),
}

impl ScaEngineError {
    pub fn is_expired(&self) -> bool {
        matches!(self, ScaEngineError::Expired { .. })
    }
}
