//! # Per-domain processor services
//!
//! Each authorisation kind has its own processor service, which knows how to find the consent or payment being
//! authorised, how to apply the business effect of a completed authorisation, and how to record the outcome of a
//! stage transition.
//!
//! The services are selected with a [`ProcessorServiceRegistry`], which is built once from the database and banking
//! backend and maps `(service type, payment authorisation type)` keys to services. Unknown keys are a configuration
//! error.
use std::{collections::HashMap, fmt::Debug};

use log::*;
use thiserror::Error;
use xs2a_common::Secret;

use crate::{
    config::ScaConfig,
    db_types::{
        AuthenticationObject,
        Authorisable,
        Authorisation,
        AuthorisationKind,
        AuthorisationUpdate,
        ParentStatus,
        PaymentAuthorisationType,
        PaymentMaterialisationError,
        ScaApproach,
        ServiceType,
    },
    sca_api::errors::ScaEngineError,
    sca_objects::{
        AuthorisationProcessorRequest,
        AuthorisationProcessorResponse,
        ErrorNamespace,
        MessageError,
    },
    traits::{
        AuthorisationManagement,
        BankingSpi,
        PersistenceError,
        SpiAuthorisationCode,
        SpiAuthorisationStatus,
        SpiConfirmationCodeCheckResult,
        SpiContext,
        SpiError,
        Xs2aDatabase,
    },
};

mod account;
mod payment_cancellation;
mod payment_initiation;

pub use account::AccountProcessorService;
pub use payment_cancellation::PaymentCancellationProcessorService;
pub use payment_initiation::PaymentInitiationProcessorService;

//--------------------------------------  ProcessorError      ---------------------------------------------------------
#[derive(Debug, Clone, Error)]
pub enum ProcessorError {
    #[error("{0}")]
    Backend(#[from] SpiError),
    #[error("{0}")]
    Persistence(#[from] PersistenceError),
    #[error("{0}")]
    Materialisation(#[from] PaymentMaterialisationError),
    #[error("A {kind} authorisation cannot be applied to {parent_id}")]
    WrongParent { kind: AuthorisationKind, parent_id: String },
}

impl ProcessorError {
    pub fn to_message(&self, namespace: ErrorNamespace) -> MessageError {
        match self {
            ProcessorError::Backend(e) => MessageError::backend(namespace, e),
            ProcessorError::Persistence(e) => MessageError::persistence(namespace, e),
            ProcessorError::Materialisation(e) => {
                MessageError::persistence(namespace, &PersistenceError::CorruptRecord(e.to_string()))
            },
            ProcessorError::WrongParent { .. } => {
                MessageError::persistence(namespace, &PersistenceError::CorruptRecord(self.to_string()))
            },
        }
    }
}

/// The result of applying the business effect of an authorisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Finalisation {
    pub outcome: SpiAuthorisationStatus,
    /// A new status for the consent or payment, if the ASPSP reported one.
    pub parent_status: Option<ParentStatus>,
}

impl Finalisation {
    pub fn new(outcome: SpiAuthorisationStatus, parent_status: Option<ParentStatus>) -> Self {
        Self { outcome, parent_status }
    }
}

//-------------------------------------- AuthorisationProcessor -------------------------------------------------------
/// The operations stage handlers need from a per-domain processor service.
#[allow(async_fn_in_trait)]
pub trait AuthorisationProcessor {
    fn kind(&self) -> AuthorisationKind;

    /// True when authorisations under `approach` have to be concluded with a confirmation code.
    fn confirmation_code_required(&self, approach: ScaApproach) -> bool;

    /// Finds the consent or payment, provided its own lifecycle is not over yet.
    async fn find_active_parent(&self, parent_id: &str) -> Result<Option<Authorisable>, PersistenceError>;

    /// Finds the consent or payment regardless of its status.
    async fn find_parent(&self, parent_id: &str) -> Result<Option<Authorisable>, PersistenceError>;

    /// Writes the outcome of a transition back to the store: the new status, chosen SCA method, challenge data, the
    /// authentication secret and any parent status reported by the ASPSP. Either all of it is written or none of it.
    async fn persist_outcome(
        &self,
        request: &AuthorisationProcessorRequest,
        response: &AuthorisationProcessorResponse,
    ) -> Result<(), PersistenceError>;

    async fn check_sca_exemption(&self, ctx: &SpiContext, parent: &Authorisable) -> Result<bool, SpiError>;

    async fn authorise_psu(
        &self,
        ctx: &SpiContext,
        password: &Secret<String>,
        parent: &Authorisable,
    ) -> Result<SpiAuthorisationStatus, SpiError>;

    async fn available_sca_methods(
        &self,
        ctx: &SpiContext,
        parent: &Authorisable,
    ) -> Result<Vec<AuthenticationObject>, SpiError>;

    async fn request_authorisation_code(
        &self,
        ctx: &SpiContext,
        authentication_method_id: &str,
        parent: &Authorisable,
    ) -> Result<SpiAuthorisationCode, SpiError>;

    async fn verify_sca_authorisation(
        &self,
        ctx: &SpiContext,
        sca_authentication_data: &Secret<String>,
        parent: &Authorisable,
    ) -> Result<SpiAuthorisationStatus, SpiError>;

    /// Applies the business effect of a completed authorisation: confirms the consent, executes the payment or
    /// cancels it.
    async fn finalise(&self, ctx: &SpiContext, parent: &Authorisable) -> Result<Finalisation, ProcessorError>;

    /// Has the ASPSP check a confirmation code against the materialised payment.
    async fn check_confirmation_code(
        &self,
        ctx: &SpiContext,
        confirmation_code: &Secret<String>,
        parent: &Authorisable,
    ) -> Result<SpiConfirmationCodeCheckResult, ProcessorError>;
}

/// Writes a transition outcome in one guarded update: the authorisation and, if given, the new status of its consent
/// or payment. Fields the response leaves empty keep their stored values.
pub(crate) async fn persist_authorisation<B: AuthorisationManagement>(
    db: &B,
    request: &AuthorisationProcessorRequest,
    response: &AuthorisationProcessorResponse,
    parent_status: Option<ParentStatus>,
) -> Result<Authorisation, PersistenceError> {
    let mut update = AuthorisationUpdate::new(response.sca_status);
    update.parent_status = parent_status;
    if !request.psu_id_data.is_empty() {
        update.psu_id_data = Some(request.psu_id_data.clone());
    }
    update.chosen_sca_method = response.chosen_sca_method.clone();
    update.challenge_data = response.challenge_data.clone();
    update.sca_authentication_data = response.sca_authentication_data.clone();
    let authorisation =
        db.update_authorisation(&request.authorisation_id, request.authorisation_version, update).await?;
    trace!(
        "🔄️🔐️ Authorisation {} stored as {} (version {})",
        authorisation.id,
        authorisation.sca_status,
        authorisation.version
    );
    Ok(authorisation)
}

//--------------------------------------  ProcessorService    ---------------------------------------------------------
/// One of the three per-domain processor services.
#[derive(Clone)]
pub enum ProcessorService<B, S> {
    Account(AccountProcessorService<B, S>),
    PaymentInitiation(PaymentInitiationProcessorService<B, S>),
    PaymentCancellation(PaymentCancellationProcessorService<B, S>),
}

impl<B, S> Debug for ProcessorService<B, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessorService::Account(_) => write!(f, "AccountProcessorService"),
            ProcessorService::PaymentInitiation(_) => write!(f, "PaymentInitiationProcessorService"),
            ProcessorService::PaymentCancellation(_) => write!(f, "PaymentCancellationProcessorService"),
        }
    }
}

macro_rules! delegate {
    ($self:ident, $service:ident => $call:expr) => {
        match $self {
            ProcessorService::Account($service) => $call,
            ProcessorService::PaymentInitiation($service) => $call,
            ProcessorService::PaymentCancellation($service) => $call,
        }
    };
}

impl<B, S> AuthorisationProcessor for ProcessorService<B, S>
where
    B: Xs2aDatabase,
    S: BankingSpi,
{
    fn kind(&self) -> AuthorisationKind {
        delegate!(self, s => s.kind())
    }

    fn confirmation_code_required(&self, approach: ScaApproach) -> bool {
        delegate!(self, s => s.confirmation_code_required(approach))
    }

    async fn find_active_parent(&self, parent_id: &str) -> Result<Option<Authorisable>, PersistenceError> {
        delegate!(self, s => s.find_active_parent(parent_id).await)
    }

    async fn find_parent(&self, parent_id: &str) -> Result<Option<Authorisable>, PersistenceError> {
        delegate!(self, s => s.find_parent(parent_id).await)
    }

    async fn persist_outcome(
        &self,
        request: &AuthorisationProcessorRequest,
        response: &AuthorisationProcessorResponse,
    ) -> Result<(), PersistenceError> {
        delegate!(self, s => s.persist_outcome(request, response).await)
    }

    async fn check_sca_exemption(&self, ctx: &SpiContext, parent: &Authorisable) -> Result<bool, SpiError> {
        delegate!(self, s => s.check_sca_exemption(ctx, parent).await)
    }

    async fn authorise_psu(
        &self,
        ctx: &SpiContext,
        password: &Secret<String>,
        parent: &Authorisable,
    ) -> Result<SpiAuthorisationStatus, SpiError> {
        delegate!(self, s => s.authorise_psu(ctx, password, parent).await)
    }

    async fn available_sca_methods(
        &self,
        ctx: &SpiContext,
        parent: &Authorisable,
    ) -> Result<Vec<AuthenticationObject>, SpiError> {
        delegate!(self, s => s.available_sca_methods(ctx, parent).await)
    }

    async fn request_authorisation_code(
        &self,
        ctx: &SpiContext,
        authentication_method_id: &str,
        parent: &Authorisable,
    ) -> Result<SpiAuthorisationCode, SpiError> {
        delegate!(self, s => s.request_authorisation_code(ctx, authentication_method_id, parent).await)
    }

    async fn verify_sca_authorisation(
        &self,
        ctx: &SpiContext,
        sca_authentication_data: &Secret<String>,
        parent: &Authorisable,
    ) -> Result<SpiAuthorisationStatus, SpiError> {
        delegate!(self, s => s.verify_sca_authorisation(ctx, sca_authentication_data, parent).await)
    }

    async fn finalise(&self, ctx: &SpiContext, parent: &Authorisable) -> Result<Finalisation, ProcessorError> {
        delegate!(self, s => s.finalise(ctx, parent).await)
    }

    async fn check_confirmation_code(
        &self,
        ctx: &SpiContext,
        confirmation_code: &Secret<String>,
        parent: &Authorisable,
    ) -> Result<SpiConfirmationCodeCheckResult, ProcessorError> {
        delegate!(self, s => s.check_confirmation_code(ctx, confirmation_code, parent).await)
    }
}

//--------------------------------------  Registry            ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessorKey {
    pub service_type: ServiceType,
    pub payment_authorisation_type: Option<PaymentAuthorisationType>,
}

impl ProcessorKey {
    pub fn new(service_type: ServiceType, payment_authorisation_type: Option<PaymentAuthorisationType>) -> Self {
        Self { service_type, payment_authorisation_type }
    }

    /// Builds a key from the names used on the wire. Unknown names are a configuration error.
    pub fn parse(service_type: &str, payment_authorisation_type: Option<&str>) -> Result<Self, ScaEngineError> {
        let service_type = service_type
            .parse::<ServiceType>()
            .map_err(|e| ScaEngineError::Configuration(format!("Unknown service type. {e}")))?;
        let payment_authorisation_type = payment_authorisation_type
            .map(|s| s.parse::<PaymentAuthorisationType>())
            .transpose()
            .map_err(|e| ScaEngineError::Configuration(format!("Unknown payment authorisation type. {e}")))?;
        Ok(Self { service_type, payment_authorisation_type })
    }
}

impl std::fmt::Display for ProcessorKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.payment_authorisation_type {
            Some(t) => write!(f, "{}/{t}", self.service_type),
            None => write!(f, "{}", self.service_type),
        }
    }
}

/// Maps service keys to processor services. Built once, then only read.
#[derive(Clone)]
pub struct ProcessorServiceRegistry<B, S> {
    services: HashMap<ProcessorKey, ProcessorService<B, S>>,
}

impl<B, S> Debug for ProcessorServiceRegistry<B, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys = self.services.keys().map(|k| k.to_string()).collect::<Vec<_>>();
        write!(f, "ProcessorServiceRegistry({})", keys.join(", "))
    }
}

impl<B, S> ProcessorServiceRegistry<B, S>
where
    B: Clone,
    S: Clone,
{
    pub fn new(db: B, spi: S, config: &ScaConfig) -> Self {
        let mandated = config.authorisation_confirmation_mandated;
        let mut services = HashMap::with_capacity(3);
        services.insert(
            ProcessorKey::new(ServiceType::Account, None),
            ProcessorService::Account(AccountProcessorService::new(db.clone(), spi.clone())),
        );
        services.insert(
            ProcessorKey::new(ServiceType::Payment, Some(PaymentAuthorisationType::Initiation)),
            ProcessorService::PaymentInitiation(PaymentInitiationProcessorService::new(
                db.clone(),
                spi.clone(),
                mandated,
            )),
        );
        services.insert(
            ProcessorKey::new(ServiceType::Payment, Some(PaymentAuthorisationType::Cancellation)),
            ProcessorService::PaymentCancellation(PaymentCancellationProcessorService::new(db, spi, mandated)),
        );
        debug!("🔄️🗂️ Processor service registry built with {} services", services.len());
        Self { services }
    }
}

impl<B, S> ProcessorServiceRegistry<B, S> {
    pub fn resolve(&self, key: ProcessorKey) -> Result<&ProcessorService<B, S>, ScaEngineError> {
        self.services.get(&key).ok_or_else(|| {
            error!("🔄️🗂️ No processor service is registered for {key}");
            ScaEngineError::Configuration(format!("No processor service is registered for {key}"))
        })
    }

    pub fn resolve_by_name(
        &self,
        service_type: &str,
        payment_authorisation_type: Option<&str>,
    ) -> Result<&ProcessorService<B, S>, ScaEngineError> {
        let key = ProcessorKey::parse(service_type, payment_authorisation_type)?;
        self.resolve(key)
    }
}
