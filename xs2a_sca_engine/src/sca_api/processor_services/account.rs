use log::*;
use xs2a_common::Secret;

use super::{persist_authorisation, AuthorisationProcessor, Finalisation, ProcessorError};
use crate::{
    db_types::{AuthenticationObject, Authorisable, AuthorisationKind, ConsentStatus, ParentStatus, ScaApproach},
    sca_objects::{AuthorisationProcessorRequest, AuthorisationProcessorResponse},
    traits::{
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

/// Processes authorisations of account information consents.
#[derive(Clone)]
pub struct AccountProcessorService<B, S> {
    db: B,
    spi: S,
}

impl<B, S> AccountProcessorService<B, S> {
    pub fn new(db: B, spi: S) -> Self {
        Self { db, spi }
    }
}

impl<B, S> AuthorisationProcessor for AccountProcessorService<B, S>
where
    B: Xs2aDatabase,
    S: BankingSpi,
{
    fn kind(&self) -> AuthorisationKind {
        AuthorisationKind::Account
    }

    fn confirmation_code_required(&self, _approach: ScaApproach) -> bool {
        false
    }

    async fn find_active_parent(&self, parent_id: &str) -> Result<Option<Authorisable>, PersistenceError> {
        let consent = self.db.fetch_consent(parent_id).await?;
        Ok(consent.filter(|c| !c.consent_status.is_finalised()).map(Authorisable::Consent))
    }

    async fn find_parent(&self, parent_id: &str) -> Result<Option<Authorisable>, PersistenceError> {
        let consent = self.db.fetch_consent(parent_id).await?;
        Ok(consent.map(Authorisable::Consent))
    }

    async fn persist_outcome(
        &self,
        request: &AuthorisationProcessorRequest,
        response: &AuthorisationProcessorResponse,
    ) -> Result<(), PersistenceError> {
        let parent_status = match response.parent_status {
            Some(ParentStatus::Transaction(status)) => {
                warn!(
                    "🔄️📜️ Ignoring transaction status {status} reported for consent {}",
                    request.business_object_id
                );
                None
            },
            other => other,
        };
        persist_authorisation(&self.db, request, response, parent_status).await?;
        if let Some(ParentStatus::Consent(status)) = parent_status {
            debug!("🔄️📜️ Consent {} is now {status}", request.business_object_id);
        }
        Ok(())
    }

    async fn check_sca_exemption(&self, ctx: &SpiContext, parent: &Authorisable) -> Result<bool, SpiError> {
        self.spi.check_sca_exemption(ctx, parent).await
    }

    async fn authorise_psu(
        &self,
        ctx: &SpiContext,
        password: &Secret<String>,
        parent: &Authorisable,
    ) -> Result<SpiAuthorisationStatus, SpiError> {
        self.spi.authorise_psu(ctx, password, parent).await
    }

    async fn available_sca_methods(
        &self,
        ctx: &SpiContext,
        parent: &Authorisable,
    ) -> Result<Vec<AuthenticationObject>, SpiError> {
        self.spi.request_available_sca_methods(ctx, parent).await
    }

    async fn request_authorisation_code(
        &self,
        ctx: &SpiContext,
        authentication_method_id: &str,
        parent: &Authorisable,
    ) -> Result<SpiAuthorisationCode, SpiError> {
        self.spi.request_authorisation_code(ctx, authentication_method_id, parent).await
    }

    async fn verify_sca_authorisation(
        &self,
        ctx: &SpiContext,
        sca_authentication_data: &Secret<String>,
        parent: &Authorisable,
    ) -> Result<SpiAuthorisationStatus, SpiError> {
        self.spi.verify_sca_authorisation(ctx, sca_authentication_data, parent).await
    }

    /// Confirms the consent with the ASPSP. A successful confirmation leaves the consent status to the store, which
    /// accounts for the other PSUs of multilevel consents. A refusal rejects the consent.
    async fn finalise(&self, ctx: &SpiContext, parent: &Authorisable) -> Result<Finalisation, ProcessorError> {
        let Authorisable::Consent(consent) = parent else {
            return Err(ProcessorError::WrongParent { kind: self.kind(), parent_id: parent.id().to_string() });
        };
        let outcome = self.spi.confirm_consent(ctx, consent).await?;
        let parent_status = match outcome {
            SpiAuthorisationStatus::Failure => Some(ParentStatus::Consent(ConsentStatus::Rejected)),
            _ => None,
        };
        Ok(Finalisation::new(outcome, parent_status))
    }

    async fn check_confirmation_code(
        &self,
        _ctx: &SpiContext,
        _confirmation_code: &Secret<String>,
        _parent: &Authorisable,
    ) -> Result<SpiConfirmationCodeCheckResult, ProcessorError> {
        Err(SpiError::Unsupported("Confirmation codes for account consents".to_string()).into())
    }
}
