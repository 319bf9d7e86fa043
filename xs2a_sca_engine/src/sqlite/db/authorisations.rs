use chrono::{DateTime, Utc};
use log::*;
use sqlx::{FromRow, SqliteConnection};
use xs2a_common::Secret;

use super::new_id;
use crate::{
    db_types::{
        Authorisation,
        AuthorisationKind,
        AuthorisationUpdate,
        NewAuthorisation,
        ScaApproach,
        ScaStatus,
    },
    traits::PersistenceError,
};

/// An authorisation as stored. The PSU, SCA method and challenge columns hold JSON.
#[derive(Debug, Clone, FromRow)]
struct AuthorisationRow {
    id: String,
    parent_id: String,
    kind: AuthorisationKind,
    sca_status: ScaStatus,
    sca_approach: ScaApproach,
    psu_id_data: String,
    chosen_sca_method: Option<String>,
    challenge_data: Option<String>,
    sca_authentication_data: Option<String>,
    expires_at: DateTime<Utc>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AuthorisationRow> for Authorisation {
    type Error = PersistenceError;

    fn try_from(row: AuthorisationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            psu_id_data: serde_json::from_str(&row.psu_id_data)?,
            chosen_sca_method: row.chosen_sca_method.as_deref().map(serde_json::from_str).transpose()?,
            challenge_data: row.challenge_data.as_deref().map(serde_json::from_str).transpose()?,
            sca_authentication_data: row.sca_authentication_data.map(Secret::new),
            id: row.id,
            parent_id: row.parent_id,
            kind: row.kind,
            sca_status: row.sca_status,
            sca_approach: row.sca_approach,
            expires_at: row.expires_at,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub async fn insert_authorisation(
    authorisation: NewAuthorisation,
    conn: &mut SqliteConnection,
) -> Result<Authorisation, PersistenceError> {
    let id = new_id();
    let psu_id_data = serde_json::to_string(&authorisation.psu_id_data)?;
    let row: AuthorisationRow = sqlx::query_as(
        r#"
            INSERT INTO authorisations (
                id,
                parent_id,
                kind,
                sca_approach,
                psu_id_data,
                expires_at
            ) VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(&id)
    .bind(&authorisation.parent_id)
    .bind(authorisation.kind)
    .bind(authorisation.sca_approach)
    .bind(psu_id_data)
    .bind(authorisation.expires_at)
    .fetch_one(conn)
    .await?;
    debug!("🗃️🔐️ {} authorisation {id} inserted for {}", row.kind, row.parent_id);
    row.try_into()
}

pub async fn fetch_authorisation(
    authorisation_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Authorisation>, PersistenceError> {
    let row: Option<AuthorisationRow> = sqlx::query_as("SELECT * FROM authorisations WHERE id = $1")
        .bind(authorisation_id)
        .fetch_optional(conn)
        .await?;
    row.map(Authorisation::try_from).transpose()
}

/// All authorisations of `kind` for the given consent or payment, oldest first.
pub async fn fetch_authorisations_for_parent(
    parent_id: &str,
    kind: AuthorisationKind,
    conn: &mut SqliteConnection,
) -> Result<Vec<Authorisation>, PersistenceError> {
    let rows: Vec<AuthorisationRow> = sqlx::query_as(
        "SELECT * FROM authorisations WHERE parent_id = $1 AND kind = $2 ORDER BY created_at, rowid",
    )
    .bind(parent_id)
    .bind(kind)
    .fetch_all(conn)
    .await?;
    rows.into_iter().map(Authorisation::try_from).collect()
}

/// Applies `update` to the authorisation if its stored version is still `expected_version`, and bumps the version.
///
/// Terminal authorisations are never written. This is not atomic; run it inside a transaction.
pub async fn update_authorisation(
    authorisation_id: &str,
    expected_version: i64,
    update: AuthorisationUpdate,
    conn: &mut SqliteConnection,
) -> Result<Authorisation, PersistenceError> {
    let current = fetch_authorisation(authorisation_id, conn)
        .await?
        .ok_or_else(|| PersistenceError::AuthorisationNotFound(authorisation_id.to_string()))?;
    if current.sca_status.is_finalised() {
        return Err(PersistenceError::AuthorisationFinalised(current.id, current.sca_status));
    }
    let stale = || PersistenceError::StaleWrite { id: authorisation_id.to_string(), expected_version };
    if current.version != expected_version {
        return Err(stale());
    }
    let psu_id_data = update.psu_id_data.as_ref().map(serde_json::to_string).transpose()?;
    let chosen_sca_method = update.chosen_sca_method.as_ref().map(serde_json::to_string).transpose()?;
    let challenge_data = update.challenge_data.as_ref().map(serde_json::to_string).transpose()?;
    let secret = update.sca_authentication_data.as_ref().map(|s| s.reveal().clone());
    let row: Option<AuthorisationRow> = sqlx::query_as(
        r#"
            UPDATE authorisations SET
                sca_status = $1,
                psu_id_data = COALESCE($2, psu_id_data),
                chosen_sca_method = COALESCE($3, chosen_sca_method),
                challenge_data = COALESCE($4, challenge_data),
                sca_authentication_data = COALESCE($5, sca_authentication_data),
                version = version + 1,
                updated_at = $6
            WHERE id = $7 AND version = $8
            RETURNING *;
        "#,
    )
    .bind(update.sca_status)
    .bind(psu_id_data)
    .bind(chosen_sca_method)
    .bind(challenge_data)
    .bind(secret)
    .bind(Utc::now())
    .bind(authorisation_id)
    .bind(expected_version)
    .fetch_optional(conn)
    .await?;
    let authorisation: Authorisation = row.ok_or_else(stale)?.try_into()?;
    trace!(
        "🗃️🔐️ Authorisation {authorisation_id} moved from {} to {} (version {})",
        current.sca_status,
        authorisation.sca_status,
        authorisation.version
    );
    Ok(authorisation)
}
