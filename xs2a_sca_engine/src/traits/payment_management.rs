use crate::{
    db_types::{NewPayment, PaymentObject, PisCommonPayment, TransactionStatus},
    traits::PersistenceError,
};

#[allow(async_fn_in_trait)]
pub trait PaymentManagement {
    async fn insert_payment(&self, payment: NewPayment) -> Result<PisCommonPayment, PersistenceError>;

    async fn fetch_payment(&self, payment_id: &str) -> Result<Option<PisCommonPayment>, PersistenceError>;

    /// Stores the materialised form of a payment next to its raw payload. The raw payload is kept.
    async fn save_payment_object(
        &self,
        payment_id: &str,
        payment: &PaymentObject,
    ) -> Result<PisCommonPayment, PersistenceError>;

    async fn update_transaction_status(
        &self,
        payment_id: &str,
        status: TransactionStatus,
    ) -> Result<PisCommonPayment, PersistenceError>;
}
