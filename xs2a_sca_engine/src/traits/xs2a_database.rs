use thiserror::Error;

use crate::{
    db_types::ScaStatus,
    traits::{AuthorisationManagement, ConsentManagement, PaymentManagement},
};

/// This trait defines the highest level of behaviour for storage backends supporting the SCA engine.
///
/// A backend stores consents, payments and their authorisations, and is responsible for:
/// * Guarding authorisation writes with a version number, rejecting stale writes with
///   [`PersistenceError::StaleWrite`].
/// * Refusing to modify authorisations that have reached a terminal status.
/// * Aggregating the SCA progress of multilevel consents and payments after an authorisation is finalised.
#[allow(async_fn_in_trait)]
pub trait Xs2aDatabase: Clone + AuthorisationManagement + ConsentManagement + PaymentManagement {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), PersistenceError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum PersistenceError {
    #[error("We have an internal database engine (configuration/uptime etc.) error: {0}")]
    DatabaseError(String),
    #[error("Authorisation {id} was modified by someone else since version {expected_version} was read")]
    StaleWrite { id: String, expected_version: i64 },
    #[error("Authorisation {0} is {1} and can no longer be modified")]
    AuthorisationFinalised(String, ScaStatus),
    #[error("The requested authorisation {0} does not exist")]
    AuthorisationNotFound(String),
    #[error("The requested consent {0} does not exist")]
    ConsentNotFound(String),
    #[error("The requested payment {0} does not exist")]
    PaymentNotFound(String),
    #[error("Cannot insert {0}, since it already exists")]
    AlreadyExists(String),
    #[error("A stored record could not be read. {0}")]
    CorruptRecord(String),
}

impl PersistenceError {
    pub fn is_stale_write(&self) -> bool {
        matches!(self, PersistenceError::StaleWrite { .. })
    }
}

impl From<sqlx::Error> for PersistenceError {
    fn from(e: sqlx::Error) -> Self {
        PersistenceError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(e: serde_json::Error) -> Self {
        PersistenceError::CorruptRecord(e.to_string())
    }
}
