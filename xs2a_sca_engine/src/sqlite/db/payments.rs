use chrono::{DateTime, Utc};
use log::*;
use sqlx::{FromRow, SqliteConnection};

use super::psu_data::{fetch_psu_data, insert_psu_data};
use crate::{
    db_types::{NewPayment, PaymentObject, PaymentType, PisCommonPayment, PsuIdData, TransactionStatus},
    traits::PersistenceError,
};

#[derive(Debug, Clone, FromRow)]
struct PaymentRow {
    payment_id: String,
    payment_type: PaymentType,
    payment_product: String,
    transaction_status: TransactionStatus,
    multilevel_sca_required: bool,
    payment_data: Option<Vec<u8>>,
    payment_object: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PaymentRow {
    fn into_payment(self, psu_data: Vec<PsuIdData>) -> Result<PisCommonPayment, PersistenceError> {
        let payment = self.payment_object.as_deref().map(serde_json::from_str::<PaymentObject>).transpose()?;
        Ok(PisCommonPayment {
            payment_id: self.payment_id,
            payment_type: self.payment_type,
            payment_product: self.payment_product,
            transaction_status: self.transaction_status,
            psu_data,
            multilevel_sca_required: self.multilevel_sca_required,
            payment_data: self.payment_data,
            payment,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Inserts a new payment, along with its PSUs. This is not atomic; run it inside a transaction.
pub async fn insert_payment(
    payment: NewPayment,
    conn: &mut SqliteConnection,
) -> Result<PisCommonPayment, PersistenceError> {
    if fetch_payment(&payment.payment_id, conn).await?.is_some() {
        return Err(PersistenceError::AlreadyExists(format!("Payment {}", payment.payment_id)));
    }
    let payment_object = payment.payment.as_ref().map(serde_json::to_string).transpose()?;
    let row: PaymentRow = sqlx::query_as(
        r#"
            INSERT INTO payments (
                payment_id,
                payment_type,
                payment_product,
                transaction_status,
                multilevel_sca_required,
                payment_data,
                payment_object
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(&payment.payment_id)
    .bind(payment.payment_type)
    .bind(&payment.payment_product)
    .bind(payment.transaction_status)
    .bind(payment.multilevel_sca_required)
    .bind(&payment.payment_data)
    .bind(payment_object)
    .fetch_one(&mut *conn)
    .await?;
    insert_psu_data(&payment.payment_id, &payment.psu_data, conn).await?;
    debug!(
        "🗃️💸️ {} payment {} inserted ({})",
        row.payment_type,
        row.payment_id,
        if row.payment_object.is_some() { "materialised" } else { "raw" }
    );
    row.into_payment(payment.psu_data)
}

pub async fn fetch_payment(
    payment_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PisCommonPayment>, PersistenceError> {
    let row: Option<PaymentRow> = sqlx::query_as("SELECT * FROM payments WHERE payment_id = $1")
        .bind(payment_id)
        .fetch_optional(&mut *conn)
        .await?;
    match row {
        Some(row) => {
            let psu_data = fetch_psu_data(payment_id, conn).await?;
            Ok(Some(row.into_payment(psu_data)?))
        },
        None => Ok(None),
    }
}

/// Stores the materialised form of the payment. The raw payload is left in place.
pub async fn save_payment_object(
    payment_id: &str,
    payment: &PaymentObject,
    conn: &mut SqliteConnection,
) -> Result<PisCommonPayment, PersistenceError> {
    let json = serde_json::to_string(payment)?;
    let row: Option<PaymentRow> =
        sqlx::query_as("UPDATE payments SET payment_object = $1, updated_at = $2 WHERE payment_id = $3 RETURNING *")
            .bind(json)
            .bind(Utc::now())
            .bind(payment_id)
            .fetch_optional(&mut *conn)
            .await?;
    let row = row.ok_or_else(|| PersistenceError::PaymentNotFound(payment_id.to_string()))?;
    trace!("🗃️💸️ Materialised payment {payment_id} stored");
    let psu_data = fetch_psu_data(payment_id, conn).await?;
    row.into_payment(psu_data)
}

pub async fn update_transaction_status(
    payment_id: &str,
    status: TransactionStatus,
    conn: &mut SqliteConnection,
) -> Result<PisCommonPayment, PersistenceError> {
    let row: Option<PaymentRow> = sqlx::query_as(
        "UPDATE payments SET transaction_status = $1, updated_at = $2 WHERE payment_id = $3 RETURNING *",
    )
    .bind(status)
    .bind(Utc::now())
    .bind(payment_id)
    .fetch_optional(&mut *conn)
    .await?;
    let row = row.ok_or_else(|| PersistenceError::PaymentNotFound(payment_id.to_string()))?;
    trace!("🗃️💸️ Payment {payment_id} is now {status}");
    let psu_data = fetch_psu_data(payment_id, conn).await?;
    row.into_payment(psu_data)
}
