use log::*;
use xs2a_common::Secret;

use super::{
    payment_initiation::payment_of,
    persist_authorisation,
    AuthorisationProcessor,
    Finalisation,
    ProcessorError,
};
use crate::{
    db_types::{AuthenticationObject, Authorisable, AuthorisationKind, ParentStatus, PisCommonPayment, ScaApproach},
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

/// Processes authorisations that cancel a payment.
///
/// Cancellation needs the materialised payment. Payments that were stored only in their raw form are materialised,
/// and the materialisation is saved, the first time they are looked up.
#[derive(Clone)]
pub struct PaymentCancellationProcessorService<B, S> {
    db: B,
    spi: S,
    confirmation_mandated: bool,
}

impl<B, S> PaymentCancellationProcessorService<B, S> {
    pub fn new(db: B, spi: S, confirmation_mandated: bool) -> Self {
        Self { db, spi, confirmation_mandated }
    }
}

impl<B, S> PaymentCancellationProcessorService<B, S>
where B: Xs2aDatabase
{
    async fn fetch_materialised_payment(&self, payment_id: &str) -> Result<Option<PisCommonPayment>, PersistenceError> {
        let payment = match self.db.fetch_payment(payment_id).await? {
            Some(payment) => payment,
            None => return Ok(None),
        };
        if payment.is_materialised() {
            return Ok(Some(payment));
        }
        let object = payment.payment_object().map_err(|e| {
            error!("🔄️🧾️ Payment {payment_id} cannot be materialised for cancellation. {e}");
            PersistenceError::CorruptRecord(e.to_string())
        })?;
        let payment = self.db.save_payment_object(payment_id, &object).await?;
        info!("🔄️🧾️ Raw {} payment {payment_id} has been materialised", payment.payment_type);
        Ok(Some(payment))
    }
}

impl<B, S> AuthorisationProcessor for PaymentCancellationProcessorService<B, S>
where
    B: Xs2aDatabase,
    S: BankingSpi,
{
    fn kind(&self) -> AuthorisationKind {
        AuthorisationKind::PaymentCancellation
    }

    fn confirmation_code_required(&self, approach: ScaApproach) -> bool {
        self.confirmation_mandated && matches!(approach, ScaApproach::Embedded | ScaApproach::Decoupled)
    }

    async fn find_active_parent(&self, parent_id: &str) -> Result<Option<Authorisable>, PersistenceError> {
        let payment = self.fetch_materialised_payment(parent_id).await?;
        Ok(payment.filter(|p| !p.transaction_status.is_finalised()).map(Authorisable::Payment))
    }

    async fn find_parent(&self, parent_id: &str) -> Result<Option<Authorisable>, PersistenceError> {
        let payment = self.fetch_materialised_payment(parent_id).await?;
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
                warn!("🔄️🧾️ Ignoring consent status {status} reported for payment {payment_id}");
                None
            },
            other => other,
        };
        persist_authorisation(&self.db, request, response, parent_status).await?;
        if let Some(ParentStatus::Transaction(status)) = parent_status {
            debug!("🔄️🧾️ Payment {} is now {status}", request.business_object_id);
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

    async fn finalise(&self, ctx: &SpiContext, parent: &Authorisable) -> Result<Finalisation, ProcessorError> {
        let payment = payment_of(self.kind(), parent)?;
        let object = payment.payment_object()?;
        let execution = self.spi.cancel_payment(ctx, &object).await?;
        info!(
            "🔄️🧾️ Cancellation of payment {} processed by the ASPSP: {:?}, {}",
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
