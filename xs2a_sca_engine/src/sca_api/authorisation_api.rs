use std::fmt::Debug;

use chrono::Utc;
use log::*;

use crate::{
    config::ScaConfig,
    db_types::{Authorisation, NewAuthorisation, ScaProgress, ScaStatus},
    sca_api::{
        access_guard::AuthorisationAccessGuard,
        approach_resolver::ScaApproachResolver,
        confirmation_code::{process_confirmation_code, ConfirmationCheck},
        errors::ScaEngineError,
        processor_services::{AuthorisationProcessor, ProcessorKey, ProcessorServiceRegistry},
        stage_validator::{validate_psu, validate_stage},
        stages::process_stage,
    },
    sca_objects::{
        AuthorisationProcessorRequest,
        AuthorisationProcessorResponse,
        MessageError,
        StartAuthorisationRequest,
        UpdateAuthorisationRequest,
    },
    traits::{AuthorisationManagement, BankingSpi, Xs2aDatabase},
};

/// The entry point of the SCA engine.
///
/// `AuthorisationApi` starts authorisations for consents and payments, and moves them through the SCA stages as the
/// PSU supplies credentials, picks an SCA method and enters TANs or confirmation codes.
pub struct AuthorisationApi<B, S> {
    db: B,
    registry: ProcessorServiceRegistry<B, S>,
    resolver: ScaApproachResolver<B>,
    guard: AuthorisationAccessGuard<B>,
    config: ScaConfig,
}

impl<B, S> Debug for AuthorisationApi<B, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AuthorisationApi({:?})", self.registry)
    }
}

impl<B, S> AuthorisationApi<B, S>
where
    B: Clone,
    S: Clone,
{
    pub fn new(db: B, spi: S, config: ScaConfig) -> Self {
        let registry = ProcessorServiceRegistry::new(db.clone(), spi, &config);
        let resolver = ScaApproachResolver::new(db.clone(), config.default_sca_approach);
        let guard = AuthorisationAccessGuard::new(db.clone(), config.authorisation_confirmation_mandated);
        Self { db, registry, resolver, guard, config }
    }
}

impl<B, S> AuthorisationApi<B, S> {
    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }

    pub fn config(&self) -> &ScaConfig {
        &self.config
    }

    /// The guard the boundary consults before forwarding an update to [`Self::update_authorisation`].
    pub fn access_guard(&self) -> &AuthorisationAccessGuard<B> {
        &self.guard
    }

    pub fn approach_resolver(&self) -> &ScaApproachResolver<B> {
        &self.resolver
    }

    pub fn registry(&self) -> &ProcessorServiceRegistry<B, S> {
        &self.registry
    }
}

impl<B, S> AuthorisationApi<B, S>
where
    B: Xs2aDatabase,
    S: BankingSpi,
{
    /// Starts a new authorisation for a consent or payment.
    ///
    /// The authorisation is created in the `RECEIVED` status under the requested SCA approach (or the configured
    /// default), and expires after the configured lifetime.
    ///
    /// ## Errors
    /// * [`ScaEngineError::Configuration`] if no processor service handles the request's service type.
    /// * [`ScaEngineError::UnsupportedOperation`] if the approach is unknown, or not available for payments.
    /// * [`ScaEngineError::NoActiveParent`] if the consent or payment does not exist or its lifecycle is over.
    /// * [`ScaEngineError::AlreadyAuthorised`] if a single-level consent or payment already has a successful
    ///   authorisation.
    pub async fn start_authorisation(
        &self,
        request: StartAuthorisationRequest,
    ) -> Result<Authorisation, ScaEngineError> {
        let key = ProcessorKey::new(request.service_type, request.payment_authorisation_type);
        let processor = self.registry.resolve(key)?;
        let kind = processor.kind();
        let requested = request.sca_approach.as_deref();
        let sca_approach = if kind.is_payment() {
            self.resolver.payment_creation_approach(requested)?
        } else {
            self.resolver.account_approach(requested)?
        };
        let parent_id = request.business_object_id;
        let parent = processor
            .find_active_parent(&parent_id)
            .await?
            .ok_or_else(|| ScaEngineError::NoActiveParent(parent_id.clone()))?;
        if !parent.is_multilevel_sca_required() {
            let existing = self.db.fetch_authorisations_for_parent(&parent_id, kind).await?;
            if parent.sca_progress(&existing) == ScaProgress::Complete {
                warn!("🔄️🔐️ {parent_id} already has a successful {kind} authorisation");
                return Err(ScaEngineError::AlreadyAuthorised(parent_id));
            }
        }
        let new_authorisation = NewAuthorisation {
            parent_id,
            kind,
            sca_approach,
            psu_id_data: request.psu_id_data,
            expires_at: Utc::now() + self.config.authorisation_expiry,
        };
        let authorisation = self.db.insert_authorisation(new_authorisation).await?;
        info!(
            "🔄️🔐️ {kind} authorisation {} started for {} using {sca_approach}",
            authorisation.id, authorisation.parent_id
        );
        Ok(authorisation)
    }

    /// Moves an authorisation through one SCA stage.
    ///
    /// Updates that name a PSU other than the one the authorisation belongs to are refused without a write. Requests
    /// carrying a confirmation code go to the confirmation code check. All others are checked for the field
    /// their current stage needs, and handed to the handler for that stage. The outcome is written back through the
    /// processor service, unless the authorisation was already in a terminal status.
    ///
    /// Business and technical failures of the transition are reported in the response. `Err` is reserved for requests
    /// that cannot be processed at all. These are unknown service types, unknown or expired authorisations, and
    /// failures to read the authorisation.
    pub async fn update_authorisation(
        &self,
        update: UpdateAuthorisationRequest,
    ) -> Result<AuthorisationProcessorResponse, ScaEngineError> {
        let key = ProcessorKey::new(update.service_type, update.payment_authorisation_type);
        let processor = self.registry.resolve(key)?;
        let authorisation = self
            .db
            .fetch_authorisation(&update.authorisation_id)
            .await?
            .filter(|a| a.parent_id == update.business_object_id && a.kind == processor.kind())
            .ok_or_else(|| ScaEngineError::AuthorisationNotFound(update.authorisation_id.clone()))?;
        let request = AuthorisationProcessorRequest::new(update, &authorisation);
        if request.is_expired(Utc::now()) {
            info!("🔄️🔐️ Authorisation {} expired at {}", request.authorisation_id, request.expires_at);
            return Err(ScaEngineError::Expired {
                authorisation_id: request.authorisation_id,
                expired_at: request.expires_at,
            });
        }
        if let Err(e) = validate_psu(&request, &authorisation) {
            warn!("🔄️🔐️ Update of authorisation {} refused. {e}", request.authorisation_id);
            return Ok(AuthorisationProcessorResponse::rejected(&request, e));
        }
        let response = if request.has_confirmation_code() {
            let check = ConfirmationCheck::from_flag(self.config.confirmation_check_by_xs2a);
            process_confirmation_code(&request, processor, check).await
        } else {
            if let Err(e) = validate_stage(&request) {
                debug!("🔄️🔐️ Update of authorisation {} refused. {e}", request.authorisation_id);
                return Ok(AuthorisationProcessorResponse::rejected(&request, e));
            }
            process_stage(&request, processor).await
        };
        if request.current_sca_status.is_finalised() {
            return Ok(response);
        }
        match processor.persist_outcome(&request, &response).await {
            Ok(()) => Ok(response),
            Err(e) => {
                warn!("🔄️🔐️ Could not store the outcome for authorisation {}. {e}", request.authorisation_id);
                let error = MessageError::persistence(request.error_namespace(), &e);
                Ok(AuthorisationProcessorResponse::rejected(&request, error))
            },
        }
    }

    /// The current SCA status of an authorisation.
    pub async fn sca_status(&self, authorisation_id: &str) -> Result<ScaStatus, ScaEngineError> {
        self.fetch_authorisation(authorisation_id).await.map(|a| a.sca_status)
    }

    pub async fn fetch_authorisation(&self, authorisation_id: &str) -> Result<Authorisation, ScaEngineError> {
        self.db
            .fetch_authorisation(authorisation_id)
            .await?
            .ok_or_else(|| ScaEngineError::AuthorisationNotFound(authorisation_id.to_string()))
    }

    /// Closes the underlying database connection.
    pub async fn close(&mut self) -> Result<(), ScaEngineError> {
        self.db.close().await?;
        Ok(())
    }
}

impl<B, S> AuthorisationApi<B, S>
where B: AuthorisationManagement
{
    /// Whether the TPP may update the consent authorisation at its current stage. See [`AuthorisationAccessGuard`].
    pub async fn is_account_endpoint_accessible(
        &self,
        consent_id: &str,
        authorisation_id: &str,
        confirmation_code_received: bool,
    ) -> bool {
        self.guard.is_account_endpoint_accessible(consent_id, authorisation_id, confirmation_code_received).await
    }

    /// Whether the TPP may update the payment authorisation at its current stage. See [`AuthorisationAccessGuard`].
    pub async fn is_payment_endpoint_accessible(
        &self,
        authorisation_id: &str,
        confirmation_code_received: bool,
    ) -> bool {
        self.guard.is_payment_endpoint_accessible(authorisation_id, confirmation_code_received).await
    }
}
