use thiserror::Error;
use xs2a_common::Secret;

use crate::{
    db_types::{AisConsent, AuthenticationObject, Authorisable, PaymentObject},
    traits::data_objects::{
        AspspConsentDataHandle,
        SpiAuthorisationCode,
        SpiAuthorisationStatus,
        SpiConfirmationCodeCheckResult,
        SpiContext,
        SpiPaymentExecution,
    },
};

/// The call contract of the ASPSP's banking backend (the SPI).
///
/// How the bank authenticates PSUs is its own business. The engine only relies on the outcomes reported here.
/// Technical failures are reported as [`SpiError`]s; business verdicts (wrong password, rejected TAN, refused
/// payment) are reported in the `Ok` values.
#[allow(async_fn_in_trait)]
pub trait BankingSpi {
    /// Asks whether SCA can be waived for this consent or payment, e.g. for low-value or trusted-beneficiary payments.
    async fn check_sca_exemption(&self, ctx: &SpiContext, parent: &Authorisable) -> Result<bool, SpiError>;

    async fn authorise_psu(
        &self,
        ctx: &SpiContext,
        password: &Secret<String>,
        parent: &Authorisable,
    ) -> Result<SpiAuthorisationStatus, SpiError>;

    /// The SCA methods available to the PSU, in the order the ASPSP prefers them.
    async fn request_available_sca_methods(
        &self,
        ctx: &SpiContext,
        parent: &Authorisable,
    ) -> Result<Vec<AuthenticationObject>, SpiError>;

    /// Starts SCA with the chosen method. For decoupled methods this triggers the out-of-band confirmation.
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

    async fn confirm_consent(&self, ctx: &SpiContext, consent: &AisConsent) -> Result<SpiAuthorisationStatus, SpiError>;

    async fn execute_payment(&self, ctx: &SpiContext, payment: &PaymentObject) -> Result<SpiPaymentExecution, SpiError>;

    async fn cancel_payment(&self, ctx: &SpiContext, payment: &PaymentObject) -> Result<SpiPaymentExecution, SpiError>;

    async fn check_confirmation_code(
        &self,
        ctx: &SpiContext,
        confirmation_code: &Secret<String>,
        payment: &PaymentObject,
        consent_data: &AspspConsentDataHandle,
    ) -> Result<SpiConfirmationCodeCheckResult, SpiError>;
}

#[derive(Debug, Clone, Error)]
pub enum SpiError {
    #[error("The ASPSP could not be reached. {0}")]
    Unavailable(String),
    #[error("The ASPSP refused to process the request. {0}")]
    Rejected(String),
    #[error("{0} is not supported by the ASPSP")]
    Unsupported(String),
}
