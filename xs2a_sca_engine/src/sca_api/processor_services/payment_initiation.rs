use log::*;
use xs2a_common::Secret;

use super::{persist_authorisation, AuthorisationProcessor, Finalisation, ProcessorError};
use crate::{
    db_types::{
        AuthenticationObject,
        Authorisable,
        AuthorisationKind,
        ParentStatus,
        PisCommonPayment,
        ScaApproach,
        ScaProgress,
        ScaStatus,
    },
    sca_objects::{AuthorisationProcessorRequest, AuthorisationProcessorResponse},
    traits::{
        AspspConsentDataHandle,
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

/// Processes authorisations that initiate a payment.
#[derive(Clone)]
pub struct PaymentInitiationProcessorService<B, S> {
    db: B,
    spi: S,
    confirmation_mandated: bool,
}

impl<B, S> PaymentInitiationProcessorService<B, S> {
    pub fn new(db: B, spi: S, confirmation_mandated: bool) -> Self {
        Self { db, spi, confirmation_mandated }
    }
}

impl<B, S> PaymentInitiationProcessorService<B, S>
where B: Xs2aDatabase
{
    /// Whether the payment will be fully authorised once the authorisation in `ctx` is finalised.
    async fn completes_sca(&self, ctx: &SpiContext, parent: &Authorisable) -> Result<bool, PersistenceError> {
        if !parent.is_multilevel_sca_required() {
            return Ok(true);
        }
        let kind = AuthorisationKind::PaymentInitiation;
        let mut authorisations = self.db.fetch_authorisations_for_parent(parent.id(), kind).await?;
        for auth in authorisations.iter_mut().filter(|a| a.id == ctx.authorisation_id) {
            auth.sca_status = ScaStatus::Finalised;
            auth.psu_id_data = ctx.psu_id_data.clone();
        }
        Ok(parent.sca_progress(&authorisations) == ScaProgress::Complete)
    }
}

pub(super) fn payment_of<'a>(
    kind: AuthorisationKind,
    parent: &'a Authorisable,
) -> Result<&'a PisCommonPayment, ProcessorError> {
    match parent {
        Authorisable::Payment(payment) => Ok(payment),
        Authorisable::Consent(c) => Err(ProcessorError::WrongParent { kind, parent_id: c.consent_id.clone() }),
    }
}

impl<B, S> AuthorisationProcessor for PaymentInitiationProcessorService<B, S>
where
    B: Xs2aDatabase,
    S: BankingSpi,
{
    fn kind(&self) -> AuthorisationKind {
        AuthorisationKind::PaymentInitiation
    }

    fn confirmation_code_required(&self, approach: ScaApproach) -> bool {
        self.confirmation_mandated && matches!(approach, ScaApproach::Embedded | ScaApproach::Decoupled)
    }

    async fn find_active_parent(&self, parent_id: &str) -> Result<Option<Authorisable>, PersistenceError> {
        let payment = self.db.fetch_payment(parent_id).await?;
        Ok(payment.filter(|p| !p.transaction_status.is_finalised()).map(Authorisable::Payment))
    }

    async fn find_parent(&self, parent_id: &str) -> Result<Option<Authorisable>, PersistenceError> {
        let payment = self.db.fetch_payment(parent_id).await?;
        Ok(payment.map(Authorisable::Payment))
    }

    async fn persist_outcome(
        &self,
        request: &AuthorisationProcessorRequest,
        response: &AuthorisationProcessorResponse,
    ) -> Result<(), PersistenceError> {
        let parent_status = match response.parent_status {
            Some(ParentStatus::Consent(status)) => {
                let payment_id = &request.business_object_id;
                warn!("🔄️💸️ Ignoring consent status {status} reported for payment {payment_id}");
                None
            },
            other => other,
        };
        persist_authorisation(&self.db, request, response, parent_status).await?;
        if let Some(ParentStatus::Transaction(status)) = parent_status {
            debug!("🔄️💸️ Payment {} is now {status}", request.business_object_id);
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

    /// Executes the payment, unless other PSUs of a multilevel payment still have to authorise it. In that case the
    /// store records the partial authorisation and nothing is sent to the ASPSP yet.
    async fn finalise(&self, ctx: &SpiContext, parent: &Authorisable) -> Result<Finalisation, ProcessorError> {
        let payment = payment_of(self.kind(), parent)?;
        if !self.completes_sca(ctx, parent).await? {
            debug!(
                "🔄️💸️ Payment {} still needs authorisations from other PSUs. Deferring execution.",
                payment.payment_id
            );
            return Ok(Finalisation::new(SpiAuthorisationStatus::Success, None));
        }
        let object = payment.payment_object()?;
        let execution = self.spi.execute_payment(ctx, &object).await?;
        info!(
            "🔄️💸️ Payment {} executed by the ASPSP: {:?}, {}",
            payment.payment_id, execution.outcome, execution.transaction_status
        );
        Ok(Finalisation::new(execution.outcome, Some(ParentStatus::Transaction(execution.transaction_status))))
    }

    async fn check_confirmation_code(
        &self,
        ctx: &SpiContext,
        confirmation_code: &Secret<String>,
        parent: &Authorisable,
    ) -> Result<SpiConfirmationCodeCheckResult, ProcessorError> {
        let payment = payment_of(self.kind(), parent)?;
        let object = payment.payment_object()?;
        let handle = AspspConsentDataHandle::new(payment.payment_id.as_str());
        let result = self.spi.check_confirmation_code(ctx, confirmation_code, &object, &handle).await?;
        Ok(result)
    }
}
