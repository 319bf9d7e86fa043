use crate::{
    db_types::{Authorisation, AuthorisationKind, AuthorisationUpdate, NewAuthorisation},
    traits::PersistenceError,
};

/// The `AuthorisationManagement` trait defines the read and write contract for authorisation records.
#[allow(async_fn_in_trait)]
pub trait AuthorisationManagement {
    /// Fetches the authorisation with the given id, or `None` if it does not exist.
    async fn fetch_authorisation(&self, authorisation_id: &str) -> Result<Option<Authorisation>, PersistenceError>;

    /// Fetches all authorisations of the given kind that belong to the consent or payment `parent_id`, oldest first.
    async fn fetch_authorisations_for_parent(
        &self,
        parent_id: &str,
        kind: AuthorisationKind,
    ) -> Result<Vec<Authorisation>, PersistenceError>;

    /// Stores a new authorisation in the `RECEIVED` status and returns it, with a freshly generated id.
    async fn insert_authorisation(&self, authorisation: NewAuthorisation) -> Result<Authorisation, PersistenceError>;

    /// Applies `update` to the authorisation, provided its stored version still equals `expected_version`.
    ///
    /// ## Errors
    /// - [`PersistenceError::StaleWrite`] if the authorisation was written since `expected_version` was read.
    /// - [`PersistenceError::AuthorisationFinalised`] if the authorisation is already in a terminal status.
    /// - [`PersistenceError::AuthorisationNotFound`] if there is no such authorisation.
    ///
    /// When the update finalises the authorisation, the backend also brings the parent's status up to date with the
    /// SCA progress of all of its authorisations.
    async fn update_authorisation(
        &self,
        authorisation_id: &str,
        expected_version: i64,
        update: AuthorisationUpdate,
    ) -> Result<Authorisation, PersistenceError>;
}
