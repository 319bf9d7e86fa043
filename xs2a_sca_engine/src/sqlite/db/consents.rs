use chrono::{DateTime, NaiveDate, Utc};
use log::*;
use sqlx::{FromRow, SqliteConnection};

use super::psu_data::{fetch_psu_data, insert_psu_data};
use crate::{
    db_types::{AisConsent, ConsentStatus, NewConsent, PsuIdData},
    traits::PersistenceError,
};

#[derive(Debug, Clone, FromRow)]
struct ConsentRow {
    consent_id: String,
    consent_status: ConsentStatus,
    multilevel_sca_required: bool,
    recurring_indicator: bool,
    frequency_per_day: i64,
    valid_until: NaiveDate,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ConsentRow {
    fn into_consent(self, psu_data: Vec<PsuIdData>) -> AisConsent {
        AisConsent {
            consent_id: self.consent_id,
            consent_status: self.consent_status,
            psu_data,
            multilevel_sca_required: self.multilevel_sca_required,
            recurring_indicator: self.recurring_indicator,
            frequency_per_day: self.frequency_per_day,
            valid_until: self.valid_until,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Inserts a new consent in the `RECEIVED` status, along with its PSUs. This is not atomic; run it inside a
/// transaction.
pub async fn insert_consent(consent: NewConsent, conn: &mut SqliteConnection) -> Result<AisConsent, PersistenceError> {
    if fetch_consent(&consent.consent_id, conn).await?.is_some() {
        return Err(PersistenceError::AlreadyExists(format!("Consent {}", consent.consent_id)));
    }
    let row: ConsentRow = sqlx::query_as(
        r#"
            INSERT INTO consents (
                consent_id,
                multilevel_sca_required,
                recurring_indicator,
                frequency_per_day,
                valid_until
            ) VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(&consent.consent_id)
    .bind(consent.multilevel_sca_required)
    .bind(consent.recurring_indicator)
    .bind(consent.frequency_per_day)
    .bind(consent.valid_until)
    .fetch_one(&mut *conn)
    .await?;
    insert_psu_data(&consent.consent_id, &consent.psu_data, conn).await?;
    debug!("🗃️📜️ Consent {} inserted with {} PSUs", row.consent_id, consent.psu_data.len());
    Ok(row.into_consent(consent.psu_data))
}

pub async fn fetch_consent(consent_id: &str, conn: &mut SqliteConnection) -> Result<Option<AisConsent>, sqlx::Error> {
    let row: Option<ConsentRow> = sqlx::query_as("SELECT * FROM consents WHERE consent_id = $1")
        .bind(consent_id)
        .fetch_optional(&mut *conn)
        .await?;
    match row {
        Some(row) => {
            let psu_data = fetch_psu_data(consent_id, conn).await?;
            Ok(Some(row.into_consent(psu_data)))
        },
        None => Ok(None),
    }
}

pub async fn update_consent_status(
    consent_id: &str,
    status: ConsentStatus,
    conn: &mut SqliteConnection,
) -> Result<AisConsent, PersistenceError> {
    let row: Option<ConsentRow> = sqlx::query_as(
        "UPDATE consents SET consent_status = $1, updated_at = $2 WHERE consent_id = $3 RETURNING *",
    )
    .bind(status)
    .bind(Utc::now())
    .bind(consent_id)
    .fetch_optional(&mut *conn)
    .await?;
    let row = row.ok_or_else(|| PersistenceError::ConsentNotFound(consent_id.to_string()))?;
    trace!("🗃️📜️ Consent {consent_id} is now {status}");
    let psu_data = fetch_psu_data(consent_id, conn).await?;
    Ok(row.into_consent(psu_data))
}
