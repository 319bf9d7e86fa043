use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;
use xs2a_common::Secret;

use crate::sca_objects::ErrorNamespace;

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ConversionError(String);

/// Generates `Display` and `FromStr` for enums that are stored and logged by their upper-case name.
macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => f.write_str($text)),+
                }
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    other => Err(ConversionError(format!("Invalid {}: {other}", stringify!($name)))),
                }
            }
        }
    };
}

//--------------------------------------      ScaStatus       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum ScaStatus {
    /// The authorisation was created. Nothing is known about the PSU yet.
    Received,
    /// The PSU has been identified against the consent or payment.
    PsuIdentified,
    /// The PSU credentials were accepted by the ASPSP.
    PsuAuthenticated,
    /// An SCA method was chosen and, if applicable, a challenge was issued.
    ScaMethodSelected,
    /// The SCA data was verified; the business effect has not been applied yet.
    Started,
    Finalised,
    Failed,
    /// The ASPSP waived SCA for this authorisation.
    Exempted,
}

string_enum!(ScaStatus {
    Received => "RECEIVED",
    PsuIdentified => "PSUIDENTIFIED",
    PsuAuthenticated => "PSUAUTHENTICATED",
    ScaMethodSelected => "SCAMETHODSELECTED",
    Started => "STARTED",
    Finalised => "FINALISED",
    Failed => "FAILED",
    Exempted => "EXEMPTED",
});

impl ScaStatus {
    /// Terminal statuses. An authorisation in one of these statuses is never written again.
    pub fn is_finalised(&self) -> bool {
        matches!(self, ScaStatus::Finalised | ScaStatus::Failed | ScaStatus::Exempted)
    }

    /// Whether the stage processor chain may move an authorisation from `self` to `next`.
    ///
    /// Staying put is always allowed for non-terminal statuses. `Failed` is reachable from any non-terminal status,
    /// `Exempted` only from `Received`. Everything else moves exactly one step forward.
    pub fn permits(&self, next: ScaStatus) -> bool {
        use ScaStatus::*;
        if self.is_finalised() {
            return *self == next;
        }
        match (self, next) {
            (current, next) if *current == next => true,
            (_, Failed) => true,
            (Received, PsuIdentified | Exempted) => true,
            (PsuIdentified, PsuAuthenticated) => true,
            (PsuAuthenticated, ScaMethodSelected) => true,
            (ScaMethodSelected, Started) => true,
            (Started, Finalised) => true,
            _ => false,
        }
    }
}

//--------------------------------------     ScaApproach      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum ScaApproach {
    Redirect,
    Embedded,
    Decoupled,
    Oauth,
}

string_enum!(ScaApproach {
    Redirect => "REDIRECT",
    Embedded => "EMBEDDED",
    Decoupled => "DECOUPLED",
    Oauth => "OAUTH",
});

impl ScaApproach {
    /// Payments can only be created under the redirect, embedded or decoupled approaches.
    pub fn is_supported_for_payments(&self) -> bool {
        !matches!(self, ScaApproach::Oauth)
    }
}

//--------------------------------------     ServiceType      ---------------------------------------------------------
/// The service an authorisation request is addressed to. Only `Account` and `Payment` have processor services;
/// the others are recognised so that they can be rejected as a configuration error instead of a parse error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceType {
    Account,
    Payment,
    FundsConfirmation,
    SigningBasket,
}

string_enum!(ServiceType {
    Account => "ACCOUNT",
    Payment => "PAYMENT",
    FundsConfirmation => "FUNDS_CONFIRMATION",
    SigningBasket => "SIGNING_BASKET",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentAuthorisationType {
    Initiation,
    Cancellation,
}

string_enum!(PaymentAuthorisationType {
    Initiation => "INITIATION",
    Cancellation => "CANCELLATION",
});

//--------------------------------------  AuthorisationKind   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorisationKind {
    Account,
    PaymentInitiation,
    PaymentCancellation,
}

string_enum!(AuthorisationKind {
    Account => "ACCOUNT",
    PaymentInitiation => "PAYMENT_INITIATION",
    PaymentCancellation => "PAYMENT_CANCELLATION",
});

impl AuthorisationKind {
    pub fn error_namespace(&self) -> ErrorNamespace {
        match self {
            AuthorisationKind::Account => ErrorNamespace::Ais,
            AuthorisationKind::PaymentInitiation | AuthorisationKind::PaymentCancellation => ErrorNamespace::Pis,
        }
    }

    pub fn is_payment(&self) -> bool {
        !matches!(self, AuthorisationKind::Account)
    }
}

//--------------------------------------      PsuIdData       ---------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PsuIdData {
    pub psu_id: Option<String>,
    pub psu_id_type: Option<String>,
    pub psu_corporate_id: Option<String>,
    pub psu_corporate_id_type: Option<String>,
}

impl PsuIdData {
    pub fn new<S: Into<String>>(psu_id: S) -> Self {
        Self { psu_id: Some(psu_id.into()), ..Default::default() }
    }

    pub fn with_corporate_id<S: Into<String>>(mut self, corporate_id: S) -> Self {
        self.psu_corporate_id = Some(corporate_id.into());
        self
    }

    /// True when no PSU id is present. Corporate ids alone do not identify a PSU.
    pub fn is_empty(&self) -> bool {
        self.psu_id.as_deref().map(|s| s.trim().is_empty()).unwrap_or(true)
    }

    /// Two PSU records refer to the same person when both the PSU id and the corporate id agree.
    pub fn same_psu(&self, other: &PsuIdData) -> bool {
        !self.is_empty() && self.psu_id == other.psu_id && self.psu_corporate_id == other.psu_corporate_id
    }
}

impl Display for PsuIdData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.psu_id, &self.psu_corporate_id) {
            (Some(id), Some(corp)) => write!(f, "{id}@{corp}"),
            (Some(id), None) => write!(f, "{id}"),
            _ => write!(f, "<anonymous PSU>"),
        }
    }
}

//-------------------------------------- AuthenticationObject ---------------------------------------------------------
/// An SCA method offered by the ASPSP, e.g. an SMS OTP or a push notification to a banking app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationObject {
    pub authentication_type: String,
    pub authentication_method_id: String,
    pub name: Option<String>,
    pub explanation: Option<String>,
    /// True when the method is performed out-of-band (decoupled).
    #[serde(default)]
    pub decoupled: bool,
}

impl AuthenticationObject {
    pub fn new<S: Into<String>>(authentication_type: S, method_id: S) -> Self {
        Self {
            authentication_type: authentication_type.into(),
            authentication_method_id: method_id.into(),
            name: None,
            explanation: None,
            decoupled: false,
        }
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn decoupled(mut self) -> Self {
        self.decoupled = true;
        self
    }
}

//--------------------------------------    ChallengeData     ---------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeData {
    #[serde(default)]
    pub data: Vec<String>,
    pub otp_format: Option<String>,
    pub otp_max_length: Option<i32>,
    pub additional_information: Option<String>,
    pub image_link: Option<String>,
}

//--------------------------------------    Authorisation     ---------------------------------------------------------
/// A single SCA attempt for one consent or payment.
#[derive(Debug, Clone)]
pub struct Authorisation {
    pub id: String,
    /// The consent id or payment id this authorisation belongs to.
    pub parent_id: String,
    pub kind: AuthorisationKind,
    pub sca_status: ScaStatus,
    pub sca_approach: ScaApproach,
    pub psu_id_data: PsuIdData,
    pub chosen_sca_method: Option<AuthenticationObject>,
    pub challenge_data: Option<ChallengeData>,
    /// The secret bound to the chosen SCA method. It doubles as the reference value for confirmation codes.
    pub sca_authentication_data: Option<Secret<String>>,
    pub expires_at: DateTime<Utc>,
    /// Incremented by the store on every write. Updates must quote the version they were based on.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Authorisation {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[derive(Debug, Clone)]
pub struct NewAuthorisation {
    pub parent_id: String,
    pub kind: AuthorisationKind,
    pub sca_approach: ScaApproach,
    pub psu_id_data: PsuIdData,
    pub expires_at: DateTime<Utc>,
}

/// The fields of an authorisation that a stage transition may change. `None` leaves the stored value untouched.
#[derive(Debug, Clone)]
pub struct AuthorisationUpdate {
    pub sca_status: ScaStatus,
    pub psu_id_data: Option<PsuIdData>,
    pub chosen_sca_method: Option<AuthenticationObject>,
    pub challenge_data: Option<ChallengeData>,
    pub sca_authentication_data: Option<Secret<String>>,
    /// Written to the consent or payment in the same transaction as the authorisation, after status aggregation.
    pub parent_status: Option<ParentStatus>,
}

impl AuthorisationUpdate {
    pub fn new(sca_status: ScaStatus) -> Self {
        Self {
            sca_status,
            psu_id_data: None,
            chosen_sca_method: None,
            challenge_data: None,
            sca_authentication_data: None,
            parent_status: None,
        }
    }
}

/// A status change of the consent or payment reported by the banking backend, to be recorded alongside the
/// authorisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentStatus {
    Consent(ConsentStatus),
    Transaction(TransactionStatus),
}

//--------------------------------------    ConsentStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsentStatus {
    Received,
    /// Some, but not all, of the PSUs of a multilevel consent have authorised it.
    PartiallyAuthorised,
    Valid,
    Rejected,
    RevokedByPsu,
    Expired,
    TerminatedByTpp,
    TerminatedByAspsp,
}

string_enum!(ConsentStatus {
    Received => "RECEIVED",
    PartiallyAuthorised => "PARTIALLY_AUTHORISED",
    Valid => "VALID",
    Rejected => "REJECTED",
    RevokedByPsu => "REVOKED_BY_PSU",
    Expired => "EXPIRED",
    TerminatedByTpp => "TERMINATED_BY_TPP",
    TerminatedByAspsp => "TERMINATED_BY_ASPSP",
});

impl ConsentStatus {
    pub fn is_finalised(&self) -> bool {
        matches!(
            self,
            ConsentStatus::Rejected |
                ConsentStatus::RevokedByPsu |
                ConsentStatus::Expired |
                ConsentStatus::TerminatedByTpp |
                ConsentStatus::TerminatedByAspsp
        )
    }
}

//--------------------------------------  TransactionStatus   ---------------------------------------------------------
/// ISO 20022 payment status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Accc,
    Accp,
    Acsc,
    Acsp,
    Actc,
    Acwc,
    Acwp,
    Rcvd,
    Pdng,
    Rjct,
    Canc,
    Acfc,
    Patc,
    Part,
}

string_enum!(TransactionStatus {
    Accc => "ACCC",
    Accp => "ACCP",
    Acsc => "ACSC",
    Acsp => "ACSP",
    Actc => "ACTC",
    Acwc => "ACWC",
    Acwp => "ACWP",
    Rcvd => "RCVD",
    Pdng => "PDNG",
    Rjct => "RJCT",
    Canc => "CANC",
    Acfc => "ACFC",
    Patc => "PATC",
    Part => "PART",
});

impl TransactionStatus {
    pub fn is_finalised(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Accc | TransactionStatus::Acsc | TransactionStatus::Rjct | TransactionStatus::Canc
        )
    }
}

//--------------------------------------     PaymentType      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum PaymentType {
    Single,
    Periodic,
    Bulk,
}

string_enum!(PaymentType {
    Single => "SINGLE",
    Periodic => "PERIODIC",
    Bulk => "BULK",
});

//--------------------------------------    PaymentObject     ---------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountReference {
    pub iban: Option<String>,
    pub bban: Option<String>,
    pub pan: Option<String>,
    pub currency: Option<String>,
}

impl AccountReference {
    pub fn iban<S: Into<String>>(iban: S) -> Self {
        Self { iban: Some(iban.into()), ..Default::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    pub currency: String,
    /// Decimal amount, kept as the TPP sent it.
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SinglePayment {
    pub end_to_end_identification: Option<String>,
    pub debtor_account: AccountReference,
    pub instructed_amount: Amount,
    pub creditor_account: AccountReference,
    pub creditor_agent: Option<String>,
    pub creditor_name: String,
    pub remittance_information_unstructured: Option<String>,
    pub requested_execution_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodicPayment {
    #[serde(flatten)]
    pub payment: SinglePayment,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub execution_rule: Option<String>,
    pub frequency: String,
    pub day_of_execution: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkPayment {
    pub batch_booking_preferred: Option<bool>,
    pub debtor_account: AccountReference,
    pub requested_execution_date: Option<NaiveDate>,
    pub payments: Vec<SinglePayment>,
}

/// The materialised form of a payment, as opposed to the raw bytes the TPP submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "payment")]
pub enum PaymentObject {
    Single(SinglePayment),
    Periodic(PeriodicPayment),
    Bulk(BulkPayment),
}

#[derive(Debug, Clone, Error)]
pub enum PaymentMaterialisationError {
    #[error("Payment {0} has neither a raw nor a materialised representation")]
    NoPaymentData(String),
    #[error("Payment {payment_id} could not be deserialized as a {payment_type} payment. {reason}")]
    Malformed { payment_id: String, payment_type: PaymentType, reason: String },
}

impl PaymentObject {
    /// Deserializes the raw TPP payload according to the payment type it was submitted under.
    pub fn from_raw(payment_type: PaymentType, raw: &[u8]) -> Result<Self, serde_json::Error> {
        let payment = match payment_type {
            PaymentType::Single => PaymentObject::Single(serde_json::from_slice(raw)?),
            PaymentType::Periodic => PaymentObject::Periodic(serde_json::from_slice(raw)?),
            PaymentType::Bulk => PaymentObject::Bulk(serde_json::from_slice(raw)?),
        };
        Ok(payment)
    }

    pub fn payment_type(&self) -> PaymentType {
        match self {
            PaymentObject::Single(_) => PaymentType::Single,
            PaymentObject::Periodic(_) => PaymentType::Periodic,
            PaymentObject::Bulk(_) => PaymentType::Bulk,
        }
    }
}

//--------------------------------------   PisCommonPayment   ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct PisCommonPayment {
    pub payment_id: String,
    pub payment_type: PaymentType,
    pub payment_product: String,
    pub transaction_status: TransactionStatus,
    pub psu_data: Vec<PsuIdData>,
    pub multilevel_sca_required: bool,
    /// The payload as the TPP submitted it. Older payments only have this.
    pub payment_data: Option<Vec<u8>>,
    pub payment: Option<PaymentObject>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PisCommonPayment {
    pub fn is_materialised(&self) -> bool {
        self.payment.is_some()
    }

    /// Returns the materialised payment, deserializing the raw payload if necessary. Nothing is stored.
    pub fn payment_object(&self) -> Result<PaymentObject, PaymentMaterialisationError> {
        if let Some(payment) = &self.payment {
            return Ok(payment.clone());
        }
        let raw = self
            .payment_data
            .as_ref()
            .ok_or_else(|| PaymentMaterialisationError::NoPaymentData(self.payment_id.clone()))?;
        PaymentObject::from_raw(self.payment_type, raw).map_err(|e| PaymentMaterialisationError::Malformed {
            payment_id: self.payment_id.clone(),
            payment_type: self.payment_type,
            reason: e.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub payment_id: String,
    pub payment_type: PaymentType,
    pub payment_product: String,
    pub transaction_status: TransactionStatus,
    pub psu_data: Vec<PsuIdData>,
    pub multilevel_sca_required: bool,
    pub payment_data: Option<Vec<u8>>,
    pub payment: Option<PaymentObject>,
}

impl NewPayment {
    /// A payment stored only in its raw form, as submitted by the TPP.
    pub fn raw<S: Into<String>>(payment_id: S, payment_type: PaymentType, raw: Vec<u8>) -> Self {
        Self {
            payment_id: payment_id.into(),
            payment_type,
            payment_product: "sepa-credit-transfers".to_string(),
            transaction_status: TransactionStatus::Rcvd,
            psu_data: Vec::new(),
            multilevel_sca_required: false,
            payment_data: Some(raw),
            payment: None,
        }
    }

    pub fn materialised<S: Into<String>>(payment_id: S, payment: PaymentObject) -> Self {
        Self {
            payment_id: payment_id.into(),
            payment_type: payment.payment_type(),
            payment_product: "sepa-credit-transfers".to_string(),
            transaction_status: TransactionStatus::Rcvd,
            psu_data: Vec::new(),
            multilevel_sca_required: false,
            payment_data: None,
            payment: Some(payment),
        }
    }

    pub fn with_psu(mut self, psu: PsuIdData) -> Self {
        self.psu_data.push(psu);
        self
    }

    pub fn with_multilevel_sca(mut self) -> Self {
        self.multilevel_sca_required = true;
        self
    }

    pub fn with_transaction_status(mut self, status: TransactionStatus) -> Self {
        self.transaction_status = status;
        self
    }

    pub fn with_payment_product<S: Into<String>>(mut self, product: S) -> Self {
        self.payment_product = product.into();
        self
    }
}

//--------------------------------------      AisConsent      ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct AisConsent {
    pub consent_id: String,
    pub consent_status: ConsentStatus,
    pub psu_data: Vec<PsuIdData>,
    pub multilevel_sca_required: bool,
    pub recurring_indicator: bool,
    pub frequency_per_day: i64,
    pub valid_until: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewConsent {
    pub consent_id: String,
    pub psu_data: Vec<PsuIdData>,
    pub multilevel_sca_required: bool,
    pub recurring_indicator: bool,
    pub frequency_per_day: i64,
    pub valid_until: NaiveDate,
}

impl NewConsent {
    pub fn new<S: Into<String>>(consent_id: S, valid_until: NaiveDate) -> Self {
        Self {
            consent_id: consent_id.into(),
            psu_data: Vec::new(),
            multilevel_sca_required: false,
            recurring_indicator: true,
            frequency_per_day: 4,
            valid_until,
        }
    }

    pub fn with_psu(mut self, psu: PsuIdData) -> Self {
        self.psu_data.push(psu);
        self
    }

    pub fn with_multilevel_sca(mut self) -> Self {
        self.multilevel_sca_required = true;
        self
    }
}

//--------------------------------------     Authorisable     ---------------------------------------------------------
/// The business object that owns an authorisation.
#[derive(Debug, Clone)]
pub enum Authorisable {
    Consent(AisConsent),
    Payment(PisCommonPayment),
}

/// How far the PSUs of a consent or payment have got with SCA, taken over all of its authorisations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaProgress {
    NotStarted,
    /// A multilevel parent where some, but not all, of the required PSUs have authorised.
    Partial,
    Complete,
}

impl Authorisable {
    pub fn id(&self) -> &str {
        match self {
            Authorisable::Consent(c) => c.consent_id.as_str(),
            Authorisable::Payment(p) => p.payment_id.as_str(),
        }
    }

    pub fn psu_data(&self) -> &[PsuIdData] {
        match self {
            Authorisable::Consent(c) => &c.psu_data,
            Authorisable::Payment(p) => &p.psu_data,
        }
    }

    pub fn is_multilevel_sca_required(&self) -> bool {
        match self {
            Authorisable::Consent(c) => c.multilevel_sca_required,
            Authorisable::Payment(p) => p.multilevel_sca_required,
        }
    }

    /// True when the parent's own lifecycle is over, so no new authorisation may be started for it.
    pub fn is_finalised(&self) -> bool {
        match self {
            Authorisable::Consent(c) => c.consent_status.is_finalised(),
            Authorisable::Payment(p) => p.transaction_status.is_finalised(),
        }
    }

    pub fn contains_psu(&self, psu: &PsuIdData) -> bool {
        self.psu_data().iter().any(|p| p.same_psu(psu))
    }

    /// Aggregates the given authorisations of this parent. Exempted authorisations count as authorised.
    ///
    /// A single-level parent is complete as soon as one authorisation has succeeded. A multilevel parent is complete
    /// once every PSU on it has a successful authorisation.
    pub fn sca_progress(&self, authorisations: &[Authorisation]) -> ScaProgress {
        let authorised = authorisations
            .iter()
            .filter(|a| a.parent_id == self.id())
            .filter(|a| matches!(a.sca_status, ScaStatus::Finalised | ScaStatus::Exempted))
            .collect::<Vec<_>>();
        if authorised.is_empty() {
            return ScaProgress::NotStarted;
        }
        if !self.is_multilevel_sca_required() || self.psu_data().is_empty() {
            return ScaProgress::Complete;
        }
        let all_signed = self.psu_data().iter().all(|psu| authorised.iter().any(|a| a.psu_id_data.same_psu(psu)));
        if all_signed {
            ScaProgress::Complete
        } else {
            ScaProgress::Partial
        }
    }
}

impl AisConsent {
    /// The consent status implied by the SCA progress of its authorisations, if it differs from the current one.
    ///
    /// Consents whose lifecycle is over are never touched.
    pub fn status_after(&self, progress: ScaProgress) -> Option<ConsentStatus> {
        if self.consent_status.is_finalised() {
            return None;
        }
        let status = match progress {
            ScaProgress::NotStarted => return None,
            ScaProgress::Partial => ConsentStatus::PartiallyAuthorised,
            ScaProgress::Complete => ConsentStatus::Valid,
        };
        (status != self.consent_status).then_some(status)
    }
}

impl PisCommonPayment {
    /// The transaction status implied by the SCA progress of the payment's initiation authorisations.
    ///
    /// Only payments that have not been picked up by the ASPSP yet (`RCVD` or `PATC`) are affected.
    pub fn status_after(&self, progress: ScaProgress) -> Option<TransactionStatus> {
        if !matches!(self.transaction_status, TransactionStatus::Rcvd | TransactionStatus::Patc) {
            return None;
        }
        let status = match progress {
            ScaProgress::NotStarted => return None,
            ScaProgress::Partial => TransactionStatus::Patc,
            ScaProgress::Complete => TransactionStatus::Actc,
        };
        (status != self.transaction_status).then_some(status)
    }
}
