//! Value objects passed into and out of the SCA authorisation API.
//!
//! Requests and responses are immutable once built. Each stage of the authorisation flow builds a fresh response from
//! the request it was given, so a transition is a function of the stored authorisation and the PSU's input only.
use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use xs2a_common::Secret;

use crate::{
    db_types::{
        AuthenticationObject,
        Authorisation,
        AuthorisationKind,
        ChallengeData,
        ParentStatus,
        PaymentAuthorisationType,
        PsuIdData,
        ScaApproach,
        ScaStatus,
        ServiceType,
    },
    traits::{PersistenceError, SpiError},
};

//--------------------------------------    MessageError      ---------------------------------------------------------
/// Errors are reported in the namespace of the service that was called, i.e. account information or payment
/// initiation. The boundary uses this to choose the error vocabulary it sends to the TPP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ErrorNamespace {
    Ais,
    Pis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ErrorCategory {
    /// The payload did not carry what the current stage needs. Nothing was changed.
    Validation,
    /// The ASPSP rejected the PSU or the operation. Usually accompanied by a `FAILED` status.
    Business,
    /// The banking backend could not be reached or failed technically. The status is unchanged.
    Backend,
    /// The store failed, or rejected a stale write. The status is unchanged.
    Persistence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageErrorCode {
    FormatError,
    FormatErrorScaStatus,
    PsuCredentialsInvalid,
    ScaMethodUnknown,
    ScaInvalid,
    StatusInvalid,
    ServiceInvalid,
    ResourceUnknown,
    PaymentFailed,
    ConsentInvalid,
    InternalServerError,
}

impl Display for MessageErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MessageErrorCode::FormatError => "FORMAT_ERROR",
            MessageErrorCode::FormatErrorScaStatus => "FORMAT_ERROR_SCA_STATUS",
            MessageErrorCode::PsuCredentialsInvalid => "PSU_CREDENTIALS_INVALID",
            MessageErrorCode::ScaMethodUnknown => "SCA_METHOD_UNKNOWN",
            MessageErrorCode::ScaInvalid => "SCA_INVALID",
            MessageErrorCode::StatusInvalid => "STATUS_INVALID",
            MessageErrorCode::ServiceInvalid => "SERVICE_INVALID",
            MessageErrorCode::ResourceUnknown => "RESOURCE_UNKNOWN",
            MessageErrorCode::PaymentFailed => "PAYMENT_FAILED",
            MessageErrorCode::ConsentInvalid => "CONSENT_INVALID",
            MessageErrorCode::InternalServerError => "INTERNAL_SERVER_ERROR",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageError {
    pub namespace: ErrorNamespace,
    pub category: ErrorCategory,
    pub code: MessageErrorCode,
    pub text: Option<String>,
}

impl MessageError {
    pub fn new(namespace: ErrorNamespace, category: ErrorCategory, code: MessageErrorCode) -> Self {
        Self { namespace, category, code, text: None }
    }

    pub fn with_text<S: Into<String>>(mut self, text: S) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn validation<S: Into<String>>(namespace: ErrorNamespace, code: MessageErrorCode, text: S) -> Self {
        Self::new(namespace, ErrorCategory::Validation, code).with_text(text)
    }

    pub fn business<S: Into<String>>(namespace: ErrorNamespace, code: MessageErrorCode, text: S) -> Self {
        Self::new(namespace, ErrorCategory::Business, code).with_text(text)
    }

    pub fn backend(namespace: ErrorNamespace, error: &SpiError) -> Self {
        let code = match error {
            SpiError::Unsupported(_) => MessageErrorCode::ServiceInvalid,
            _ => MessageErrorCode::InternalServerError,
        };
        Self::new(namespace, ErrorCategory::Backend, code).with_text(error.to_string())
    }

    pub fn persistence(namespace: ErrorNamespace, error: &PersistenceError) -> Self {
        Self::new(namespace, ErrorCategory::Persistence, MessageErrorCode::InternalServerError)
            .with_text(error.to_string())
    }
}

impl Display for MessageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}/{}", self.namespace, self.code)?;
        if let Some(text) = &self.text {
            write!(f, ": {text}")?;
        }
        Ok(())
    }
}

//--------------------------------------   Inbound requests   ---------------------------------------------------------
/// An update to an existing authorisation, as handed over by the HTTP boundary.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAuthorisationRequest {
    pub authorisation_id: String,
    pub business_object_id: String,
    pub service_type: ServiceType,
    pub payment_authorisation_type: Option<PaymentAuthorisationType>,
    #[serde(default)]
    pub psu_id_data: PsuIdData,
    pub password: Option<Secret<String>>,
    pub authentication_method_id: Option<String>,
    pub sca_authentication_data: Option<Secret<String>>,
    pub confirmation_code: Option<Secret<String>>,
}

impl UpdateAuthorisationRequest {
    pub fn new<S: Into<String>>(
        service_type: ServiceType,
        payment_authorisation_type: Option<PaymentAuthorisationType>,
        business_object_id: S,
        authorisation_id: S,
    ) -> Self {
        Self {
            authorisation_id: authorisation_id.into(),
            business_object_id: business_object_id.into(),
            service_type,
            payment_authorisation_type,
            psu_id_data: PsuIdData::default(),
            password: None,
            authentication_method_id: None,
            sca_authentication_data: None,
            confirmation_code: None,
        }
    }

    pub fn account<S: Into<String>>(consent_id: S, authorisation_id: S) -> Self {
        Self::new(ServiceType::Account, None, consent_id, authorisation_id)
    }

    pub fn payment_initiation<S: Into<String>>(payment_id: S, authorisation_id: S) -> Self {
        Self::new(ServiceType::Payment, Some(PaymentAuthorisationType::Initiation), payment_id, authorisation_id)
    }

    pub fn payment_cancellation<S: Into<String>>(payment_id: S, authorisation_id: S) -> Self {
        Self::new(ServiceType::Payment, Some(PaymentAuthorisationType::Cancellation), payment_id, authorisation_id)
    }

    pub fn with_psu(mut self, psu: PsuIdData) -> Self {
        self.psu_id_data = psu;
        self
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(Secret::from(password));
        self
    }

    pub fn with_authentication_method<S: Into<String>>(mut self, method_id: S) -> Self {
        self.authentication_method_id = Some(method_id.into());
        self
    }

    pub fn with_sca_authentication_data(mut self, data: &str) -> Self {
        self.sca_authentication_data = Some(Secret::from(data));
        self
    }

    pub fn with_confirmation_code(mut self, code: &str) -> Self {
        self.confirmation_code = Some(Secret::from(code));
        self
    }
}

/// A request to start a new authorisation for a consent or payment.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartAuthorisationRequest {
    pub business_object_id: String,
    pub service_type: ServiceType,
    pub payment_authorisation_type: Option<PaymentAuthorisationType>,
    #[serde(default)]
    pub psu_id_data: PsuIdData,
    /// The approach the TPP asked for. `None` selects the configured default.
    pub sca_approach: Option<String>,
}

impl StartAuthorisationRequest {
    pub fn new<S: Into<String>>(
        service_type: ServiceType,
        payment_authorisation_type: Option<PaymentAuthorisationType>,
        business_object_id: S,
    ) -> Self {
        Self {
            business_object_id: business_object_id.into(),
            service_type,
            payment_authorisation_type,
            psu_id_data: PsuIdData::default(),
            sca_approach: None,
        }
    }

    pub fn account<S: Into<String>>(consent_id: S) -> Self {
        Self::new(ServiceType::Account, None, consent_id)
    }

    pub fn payment_initiation<S: Into<String>>(payment_id: S) -> Self {
        Self::new(ServiceType::Payment, Some(PaymentAuthorisationType::Initiation), payment_id)
    }

    pub fn payment_cancellation<S: Into<String>>(payment_id: S) -> Self {
        Self::new(ServiceType::Payment, Some(PaymentAuthorisationType::Cancellation), payment_id)
    }

    pub fn with_psu(mut self, psu: PsuIdData) -> Self {
        self.psu_id_data = psu;
        self
    }

    pub fn with_sca_approach<S: Into<String>>(mut self, approach: S) -> Self {
        self.sca_approach = Some(approach.into());
        self
    }
}

//-------------------------------------- Processor request   ---------------------------------------------------------
/// The input of a single stage transition: the PSU's update merged with the stored state of the authorisation.
#[derive(Debug, Clone)]
pub struct AuthorisationProcessorRequest {
    pub service_type: ServiceType,
    pub payment_authorisation_type: Option<PaymentAuthorisationType>,
    pub kind: AuthorisationKind,
    pub authorisation_id: String,
    pub business_object_id: String,
    pub psu_id_data: PsuIdData,
    pub sca_approach: ScaApproach,
    pub current_sca_status: ScaStatus,
    pub password: Option<Secret<String>>,
    pub authentication_method_id: Option<String>,
    pub sca_authentication_data: Option<Secret<String>>,
    pub confirmation_code: Option<Secret<String>>,
    /// The secret persisted by an earlier stage, used as the reference for confirmation codes.
    pub stored_sca_authentication_data: Option<Secret<String>>,
    pub authorisation_version: i64,
    pub expires_at: DateTime<Utc>,
}

impl AuthorisationProcessorRequest {
    /// Merges the update with the stored authorisation. The PSU named in the update wins over the stored one, so
    /// that a PSU can be identified on an authorisation that was started anonymously.
    pub fn new(update: UpdateAuthorisationRequest, authorisation: &Authorisation) -> Self {
        let psu_id_data =
            if update.psu_id_data.is_empty() { authorisation.psu_id_data.clone() } else { update.psu_id_data };
        Self {
            service_type: update.service_type,
            payment_authorisation_type: update.payment_authorisation_type,
            kind: authorisation.kind,
            authorisation_id: authorisation.id.clone(),
            business_object_id: authorisation.parent_id.clone(),
            psu_id_data,
            sca_approach: authorisation.sca_approach,
            current_sca_status: authorisation.sca_status,
            password: update.password,
            authentication_method_id: update.authentication_method_id,
            sca_authentication_data: update.sca_authentication_data,
            confirmation_code: update.confirmation_code,
            stored_sca_authentication_data: authorisation.sca_authentication_data.clone(),
            authorisation_version: authorisation.version,
            expires_at: authorisation.expires_at,
        }
    }

    pub fn error_namespace(&self) -> ErrorNamespace {
        self.kind.error_namespace()
    }

    pub fn has_password(&self) -> bool {
        self.password.as_ref().map(|p| !p.is_blank()).unwrap_or(false)
    }

    pub fn has_authentication_method_id(&self) -> bool {
        self.authentication_method_id.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false)
    }

    pub fn has_sca_authentication_data(&self) -> bool {
        self.sca_authentication_data.as_ref().map(|s| !s.is_blank()).unwrap_or(false)
    }

    pub fn has_confirmation_code(&self) -> bool {
        self.confirmation_code.as_ref().map(|s| !s.is_blank()).unwrap_or(false)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

//-------------------------------------- Processor response  ---------------------------------------------------------
/// The outcome of one stage transition.
///
/// `error` being present means the transition failed. In that case `sca_status` is either the unchanged status
/// or `FAILED`, never an advance.
#[derive(Debug, Clone)]
pub struct AuthorisationProcessorResponse {
    pub business_object_id: String,
    pub authorisation_id: String,
    pub sca_status: ScaStatus,
    pub available_sca_methods: Vec<AuthenticationObject>,
    pub chosen_sca_method: Option<AuthenticationObject>,
    pub challenge_data: Option<ChallengeData>,
    pub psu_message: Option<String>,
    pub parent_status: Option<ParentStatus>,
    /// A secret to persist on the authorisation, e.g. a verified TAN.
    pub sca_authentication_data: Option<Secret<String>>,
    pub error: Option<MessageError>,
}

impl AuthorisationProcessorResponse {
    fn with_status(request: &AuthorisationProcessorRequest, sca_status: ScaStatus) -> Self {
        Self {
            business_object_id: request.business_object_id.clone(),
            authorisation_id: request.authorisation_id.clone(),
            sca_status,
            available_sca_methods: Vec::new(),
            chosen_sca_method: None,
            challenge_data: None,
            psu_message: None,
            parent_status: None,
            sca_authentication_data: None,
            error: None,
        }
    }

    /// A successful transition to `next`.
    pub fn advance(request: &AuthorisationProcessorRequest, next: ScaStatus) -> Self {
        Self::with_status(request, next)
    }

    /// No transition, and no error. Used when a stage has to wait for something else to happen first.
    pub fn unchanged(request: &AuthorisationProcessorRequest) -> Self {
        Self::with_status(request, request.current_sca_status)
    }

    /// The transition was refused, but the authorisation may be retried.
    pub fn rejected(request: &AuthorisationProcessorRequest, error: MessageError) -> Self {
        Self { error: Some(error), ..Self::unchanged(request) }
    }

    /// The authorisation failed for good.
    pub fn failed(request: &AuthorisationProcessorRequest, error: MessageError) -> Self {
        Self { error: Some(error), ..Self::with_status(request, ScaStatus::Failed) }
    }

    pub fn with_sca_methods(mut self, methods: Vec<AuthenticationObject>) -> Self {
        self.available_sca_methods = methods;
        self
    }

    pub fn with_chosen_sca_method(mut self, method: AuthenticationObject) -> Self {
        self.chosen_sca_method = Some(method);
        self
    }

    pub fn with_challenge_data(mut self, challenge: Option<ChallengeData>) -> Self {
        self.challenge_data = challenge;
        self
    }

    pub fn with_psu_message<S: Into<String>>(mut self, message: S) -> Self {
        self.psu_message = Some(message.into());
        self
    }

    pub fn with_parent_status(mut self, status: Option<ParentStatus>) -> Self {
        self.parent_status = status;
        self
    }

    pub fn with_sca_authentication_data(mut self, data: Secret<String>) -> Self {
        self.sca_authentication_data = Some(data);
        self
    }

    pub fn is_successful(&self) -> bool {
        self.error.is_none()
    }
}
