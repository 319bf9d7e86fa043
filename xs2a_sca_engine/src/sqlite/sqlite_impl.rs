//! `SqliteDatabase` is a concrete implementation of an SCA engine storage backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module.
use std::fmt::Debug;

use log::*;
use sqlx::{SqliteConnection, SqlitePool};

use super::db::{authorisations, consents, db_url, new_pool, payments};
use crate::{
    config::ScaConfig,
    db_types::{
        AisConsent,
        Authorisable,
        Authorisation,
        AuthorisationKind,
        AuthorisationUpdate,
        ConsentStatus,
        NewAuthorisation,
        NewConsent,
        NewPayment,
        ParentStatus,
        PaymentObject,
        PisCommonPayment,
        ScaStatus,
        TransactionStatus,
    },
    traits::{AuthorisationManagement, ConsentManagement, PaymentManagement, PersistenceError, Xs2aDatabase},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl Xs2aDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn close(&mut self) -> Result<(), PersistenceError> {
        self.pool.close().await;
        Ok(())
    }
}

impl AuthorisationManagement for SqliteDatabase {
    async fn fetch_authorisation(&self, authorisation_id: &str) -> Result<Option<Authorisation>, PersistenceError> {
        let mut conn = self.pool.acquire().await?;
        authorisations::fetch_authorisation(authorisation_id, &mut conn).await
    }

    async fn fetch_authorisations_for_parent(
        &self,
        parent_id: &str,
        kind: AuthorisationKind,
    ) -> Result<Vec<Authorisation>, PersistenceError> {
        let mut conn = self.pool.acquire().await?;
        authorisations::fetch_authorisations_for_parent(parent_id, kind, &mut conn).await
    }

    async fn insert_authorisation(&self, authorisation: NewAuthorisation) -> Result<Authorisation, PersistenceError> {
        let mut conn = self.pool.acquire().await?;
        authorisations::insert_authorisation(authorisation, &mut conn).await
    }

    /// Updates the authorisation and, in the same transaction, brings the status of a multilevel consent or payment
    /// up to date when the authorisation has succeeded. A parent status carried by the update is written last, so
    /// the ASPSP's word wins over the aggregate.
    async fn update_authorisation(
        &self,
        authorisation_id: &str,
        expected_version: i64,
        update: AuthorisationUpdate,
    ) -> Result<Authorisation, PersistenceError> {
        let parent_status = update.parent_status;
        let mut tx = self.pool.begin().await?;
        let authorisation =
            authorisations::update_authorisation(authorisation_id, expected_version, update, &mut tx).await?;
        if matches!(authorisation.sca_status, ScaStatus::Finalised | ScaStatus::Exempted) {
            aggregate_parent_status(&authorisation, &mut tx).await?;
        }
        if let Some(status) = parent_status {
            write_parent_status(&authorisation.parent_id, status, &mut tx).await?;
        }
        tx.commit().await?;
        Ok(authorisation)
    }
}

impl ConsentManagement for SqliteDatabase {
    async fn insert_consent(&self, consent: NewConsent) -> Result<AisConsent, PersistenceError> {
        let mut tx = self.pool.begin().await?;
        let consent = consents::insert_consent(consent, &mut tx).await?;
        tx.commit().await?;
        Ok(consent)
    }

    async fn fetch_consent(&self, consent_id: &str) -> Result<Option<AisConsent>, PersistenceError> {
        let mut conn = self.pool.acquire().await?;
        let consent = consents::fetch_consent(consent_id, &mut conn).await?;
        Ok(consent)
    }

    async fn update_consent_status(
        &self,
        consent_id: &str,
        status: ConsentStatus,
    ) -> Result<AisConsent, PersistenceError> {
        let mut conn = self.pool.acquire().await?;
        consents::update_consent_status(consent_id, status, &mut conn).await
    }
}

impl PaymentManagement for SqliteDatabase {
    async fn insert_payment(&self, payment: NewPayment) -> Result<PisCommonPayment, PersistenceError> {
        let mut tx = self.pool.begin().await?;
        let payment = payments::insert_payment(payment, &mut tx).await?;
        tx.commit().await?;
        Ok(payment)
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<Option<PisCommonPayment>, PersistenceError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_payment(payment_id, &mut conn).await
    }

    async fn save_payment_object(
        &self,
        payment_id: &str,
        payment: &PaymentObject,
    ) -> Result<PisCommonPayment, PersistenceError> {
        let mut conn = self.pool.acquire().await?;
        payments::save_payment_object(payment_id, payment, &mut conn).await
    }

    async fn update_transaction_status(
        &self,
        payment_id: &str,
        status: TransactionStatus,
    ) -> Result<PisCommonPayment, PersistenceError> {
        let mut conn = self.pool.acquire().await?;
        payments::update_transaction_status(payment_id, status, &mut conn).await
    }
}

/// Recomputes the status of the consent or payment that `authorisation` belongs to from the SCA progress of all of
/// its authorisations. Cancellations do not change the payment's status here; that is up to the ASPSP.
async fn aggregate_parent_status(
    authorisation: &Authorisation,
    conn: &mut SqliteConnection,
) -> Result<(), PersistenceError> {
    let parent_id = authorisation.parent_id.as_str();
    let kind = authorisation.kind;
    match kind {
        AuthorisationKind::Account => {
            let Some(consent) = consents::fetch_consent(parent_id, conn).await? else {
                return Ok(());
            };
            let all = authorisations::fetch_authorisations_for_parent(parent_id, kind, conn).await?;
            let progress = Authorisable::Consent(consent.clone()).sca_progress(&all);
            if let Some(status) = consent.status_after(progress) {
                consents::update_consent_status(parent_id, status, conn).await?;
                debug!("🗃️📜️ Consent {parent_id} is {status} after authorisation {}", authorisation.id);
            }
        },
        AuthorisationKind::PaymentInitiation => {
            let Some(payment) = payments::fetch_payment(parent_id, conn).await? else {
                return Ok(());
            };
            let all = authorisations::fetch_authorisations_for_parent(parent_id, kind, conn).await?;
            let progress = Authorisable::Payment(payment.clone()).sca_progress(&all);
            if let Some(status) = payment.status_after(progress) {
                payments::update_transaction_status(parent_id, status, conn).await?;
                debug!("🗃️💸️ Payment {parent_id} is {status} after authorisation {}", authorisation.id);
            }
        },
        AuthorisationKind::PaymentCancellation => {},
    }
    Ok(())
}

async fn write_parent_status(
    parent_id: &str,
    status: ParentStatus,
    conn: &mut SqliteConnection,
) -> Result<(), PersistenceError> {
    match status {
        ParentStatus::Consent(status) => {
            consents::update_consent_status(parent_id, status, conn).await?;
            debug!("🗃️📜️ Consent {parent_id} set to {status} by the ASPSP");
        },
        ParentStatus::Transaction(status) => {
            payments::update_transaction_status(parent_id, status, conn).await?;
            debug!("🗃️💸️ Payment {parent_id} set to {status} by the ASPSP");
        },
    }
    Ok(())
}

impl SqliteDatabase {
    /// Creates a new database API object, using the URL in `XS2A_DATABASE_URL`.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    /// Creates a new database API object for the database and pool size in `config`.
    pub async fn from_config(config: &ScaConfig) -> Result<Self, sqlx::Error> {
        SqliteDatabase::new_with_url(&config.database_url, config.max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
