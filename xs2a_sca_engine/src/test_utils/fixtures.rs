//! Seed data for tests: consents, and payments stored in raw or materialised form.
use chrono::NaiveDate;

use crate::{
    db_types::{AisConsent, NewConsent, NewPayment, PaymentObject, PaymentType, PisCommonPayment, PsuIdData},
    traits::{ConsentManagement, PaymentManagement, PersistenceError},
};

/// A single SEPA credit transfer, as a TPP would submit it.
pub const SINGLE_PAYMENT_JSON: &str = r#"{
    "endToEndIdentification": "WBG-123456789",
    "debtorAccount": {"iban": "DE40100100103307118608", "currency": "EUR"},
    "instructedAmount": {"currency": "EUR", "amount": "1520.00"},
    "creditorAccount": {"iban": "DE02100100109307118603", "currency": "EUR"},
    "creditorAgent": "AAAADEBBXXX",
    "creditorName": "WBG",
    "remittanceInformationUnstructured": "Ref. Number WBG-1222"
}"#;

pub fn valid_until() -> NaiveDate {
    NaiveDate::from_ymd_opt(2035, 12, 31).unwrap_or_default()
}

pub fn psus(names: &[&str]) -> Vec<PsuIdData> {
    names.iter().map(|n| PsuIdData::new(*n)).collect()
}

pub async fn seed_consent<B: ConsentManagement>(
    db: &B,
    consent_id: &str,
    psu_names: &[&str],
    multilevel: bool,
) -> Result<AisConsent, PersistenceError> {
    let mut consent = NewConsent::new(consent_id, valid_until());
    consent.psu_data = psus(psu_names);
    consent.multilevel_sca_required = multilevel;
    db.insert_consent(consent).await
}

/// Stores a single payment that only has its raw payload, as older payments do.
pub async fn seed_raw_payment<B: PaymentManagement>(
    db: &B,
    payment_id: &str,
    psu_names: &[&str],
) -> Result<PisCommonPayment, PersistenceError> {
    let mut payment = NewPayment::raw(payment_id, PaymentType::Single, SINGLE_PAYMENT_JSON.as_bytes().to_vec());
    payment.psu_data = psus(psu_names);
    db.insert_payment(payment).await
}

pub async fn seed_payment<B: PaymentManagement>(
    db: &B,
    payment_id: &str,
    psu_names: &[&str],
    multilevel: bool,
) -> Result<PisCommonPayment, PersistenceError> {
    let object = PaymentObject::from_raw(PaymentType::Single, SINGLE_PAYMENT_JSON.as_bytes())
        .map_err(|e| PersistenceError::CorruptRecord(e.to_string()))?;
    let mut payment = NewPayment::materialised(payment_id, object);
    payment.psu_data = psus(psu_names);
    payment.multilevel_sca_required = multilevel;
    db.insert_payment(payment).await
}
