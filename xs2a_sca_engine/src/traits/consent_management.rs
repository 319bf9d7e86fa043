use crate::{
    db_types::{AisConsent, ConsentStatus, NewConsent},
    traits::PersistenceError,
};

#[allow(async_fn_in_trait)]
pub trait ConsentManagement {
    async fn insert_consent(&self, consent: NewConsent) -> Result<AisConsent, PersistenceError>;

    async fn fetch_consent(&self, consent_id: &str) -> Result<Option<AisConsent>, PersistenceError>;

    async fn update_consent_status(
        &self,
        consent_id: &str,
        status: ConsentStatus,
    ) -> Result<AisConsent, PersistenceError>;
}
