use sqlx::SqliteConnection;

use crate::{db_types::PsuIdData, traits::PersistenceError};

/// Links the given PSUs to a consent or payment.
pub async fn insert_psu_data(
    parent_id: &str,
    psus: &[PsuIdData],
    conn: &mut SqliteConnection,
) -> Result<(), PersistenceError> {
    for psu in psus {
        sqlx::query(
            r#"
            INSERT INTO psu_data (parent_id, psu_id, psu_id_type, psu_corporate_id, psu_corporate_id_type)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(parent_id)
        .bind(&psu.psu_id)
        .bind(&psu.psu_id_type)
        .bind(&psu.psu_corporate_id)
        .bind(&psu.psu_corporate_id_type)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// The PSUs linked to a consent or payment, in the order they were added.
pub async fn fetch_psu_data(parent_id: &str, conn: &mut SqliteConnection) -> Result<Vec<PsuIdData>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT psu_id, psu_id_type, psu_corporate_id, psu_corporate_id_type
        FROM psu_data WHERE parent_id = $1 ORDER BY id
        "#,
    )
    .bind(parent_id)
    .fetch_all(conn)
    .await
}
