//! A scriptable stand-in for the ASPSP's banking backend.
//!
//! Out of the box the fake accepts the password `secret`, offers an SMS OTP and a decoupled push method, and accepts
//! the TAN `123456`. The decoupled method issues `654321` as the confirmation code, which is also the code the fake
//! accepts when it checks confirmation codes itself. Every call is recorded, so tests can assert on what the engine
//! asked the bank to do.
use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard},
};

use log::*;
use xs2a_common::Secret;

use crate::{
    db_types::{
        AisConsent,
        AuthenticationObject,
        Authorisable,
        ChallengeData,
        PaymentObject,
        ScaStatus,
        TransactionStatus,
    },
    traits::{
        AspspConsentDataHandle,
        BankingSpi,
        SpiAuthorisationCode,
        SpiAuthorisationStatus,
        SpiConfirmationCodeCheckResult,
        SpiContext,
        SpiError,
        SpiPaymentExecution,
    },
};

pub const PSU_PASSWORD: &str = "secret";
/// A password that locks the PSU out.
pub const LOCKED_PASSWORD: &str = "locked";
pub const VALID_TAN: &str = "123456";
/// A TAN that makes the ASPSP give up on the authorisation.
pub const BLOCKING_TAN: &str = "000000";
pub const CONFIRMATION_CODE: &str = "654321";

#[derive(Debug)]
struct FakeAspspState {
    password: String,
    tan: String,
    confirmation_code: String,
    sca_methods: Vec<AuthenticationObject>,
    exempted_parents: HashSet<String>,
    unavailable: bool,
    refuse_business_effect: bool,
    calls: Vec<String>,
}

impl Default for FakeAspspState {
    fn default() -> Self {
        Self {
            password: PSU_PASSWORD.to_string(),
            tan: VALID_TAN.to_string(),
            confirmation_code: CONFIRMATION_CODE.to_string(),
            sca_methods: vec![
                AuthenticationObject::new("SMS_OTP", "sms").with_name("SMS to +49 *** 1234"),
                AuthenticationObject::new("PUSH_OTP", "push").with_name("Banking app").decoupled(),
            ],
            exempted_parents: HashSet::new(),
            unavailable: false,
            refuse_business_effect: false,
            calls: Vec::new(),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct FakeAspsp {
    state: Arc<Mutex<FakeAspspState>>,
}

impl FakeAspsp {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeAspspState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records the call and fails it if the backend has been made unavailable.
    fn enter(&self, call: &str, ctx: &SpiContext) -> Result<MutexGuard<'_, FakeAspspState>, SpiError> {
        let mut state = self.state();
        trace!("🏦️ {call} for authorisation {}", ctx.authorisation_id);
        state.calls.push(call.to_string());
        if state.unavailable {
            return Err(SpiError::Unavailable(format!("{call} timed out")));
        }
        Ok(state)
    }

    pub fn with_sca_methods(self, methods: Vec<AuthenticationObject>) -> Self {
        self.state().sca_methods = methods;
        self
    }

    pub fn with_exemption_for<S: Into<String>>(self, parent_id: S) -> Self {
        self.state().exempted_parents.insert(parent_id.into());
        self
    }

    /// Makes every subsequent call fail with [`SpiError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    /// Makes the ASPSP refuse to confirm consents, execute payments and cancel them.
    pub fn set_refuse_business_effect(&self, refuse: bool) {
        self.state().refuse_business_effect = refuse;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn call_count(&self, call: &str) -> usize {
        self.state().calls.iter().filter(|c| c.as_str() == call).count()
    }

    fn execution(
        &self,
        call: &str,
        ctx: &SpiContext,
        done: TransactionStatus,
    ) -> Result<SpiPaymentExecution, SpiError> {
        let state = self.enter(call, ctx)?;
        let (outcome, transaction_status) = if state.refuse_business_effect {
            (SpiAuthorisationStatus::Failure, TransactionStatus::Rjct)
        } else {
            (SpiAuthorisationStatus::Success, done)
        };
        Ok(SpiPaymentExecution { outcome, transaction_status })
    }
}

fn verdict(given: &Secret<String>, expected: &str, blocking: &str) -> SpiAuthorisationStatus {
    match given.reveal().as_str() {
        s if s == expected => SpiAuthorisationStatus::Success,
        s if s == blocking => SpiAuthorisationStatus::Failure,
        _ => SpiAuthorisationStatus::AttemptFailure,
    }
}

impl BankingSpi for FakeAspsp {
    async fn check_sca_exemption(&self, ctx: &SpiContext, parent: &Authorisable) -> Result<bool, SpiError> {
        let state = self.enter("check_sca_exemption", ctx)?;
        Ok(state.exempted_parents.contains(parent.id()))
    }

    async fn authorise_psu(
        &self,
        ctx: &SpiContext,
        password: &Secret<String>,
        _parent: &Authorisable,
    ) -> Result<SpiAuthorisationStatus, SpiError> {
        let state = self.enter("authorise_psu", ctx)?;
        Ok(verdict(password, &state.password, LOCKED_PASSWORD))
    }

    async fn request_available_sca_methods(
        &self,
        ctx: &SpiContext,
        _parent: &Authorisable,
    ) -> Result<Vec<AuthenticationObject>, SpiError> {
        let state = self.enter("request_available_sca_methods", ctx)?;
        Ok(state.sca_methods.clone())
    }

    async fn request_authorisation_code(
        &self,
        ctx: &SpiContext,
        authentication_method_id: &str,
        _parent: &Authorisable,
    ) -> Result<SpiAuthorisationCode, SpiError> {
        let state = self.enter("request_authorisation_code", ctx)?;
        let method = state
            .sca_methods
            .iter()
            .find(|m| m.authentication_method_id == authentication_method_id)
            .cloned()
            .ok_or_else(|| SpiError::Rejected(format!("Unknown SCA method {authentication_method_id}")))?;
        let code = if method.decoupled {
            SpiAuthorisationCode {
                chosen_sca_method: method,
                challenge_data: None,
                psu_message: Some("Please confirm the request in your banking app".to_string()),
                confirmation_code: Some(Secret::from(state.confirmation_code.as_str())),
            }
        } else {
            let challenge = ChallengeData {
                otp_format: Some("integer".to_string()),
                otp_max_length: Some(state.tan.len() as i32),
                additional_information: Some("Enter the TAN sent to your phone".to_string()),
                ..Default::default()
            };
            SpiAuthorisationCode {
                chosen_sca_method: method,
                challenge_data: Some(challenge),
                psu_message: None,
                confirmation_code: None,
            }
        };
        Ok(code)
    }

    async fn verify_sca_authorisation(
        &self,
        ctx: &SpiContext,
        sca_authentication_data: &Secret<String>,
        _parent: &Authorisable,
    ) -> Result<SpiAuthorisationStatus, SpiError> {
        let state = self.enter("verify_sca_authorisation", ctx)?;
        Ok(verdict(sca_authentication_data, &state.tan, BLOCKING_TAN))
    }

    async fn confirm_consent(
        &self,
        ctx: &SpiContext,
        _consent: &AisConsent,
    ) -> Result<SpiAuthorisationStatus, SpiError> {
        let state = self.enter("confirm_consent", ctx)?;
        if state.refuse_business_effect {
            Ok(SpiAuthorisationStatus::Failure)
        } else {
            Ok(SpiAuthorisationStatus::Success)
        }
    }

    async fn execute_payment(
        &self,
        ctx: &SpiContext,
        _payment: &PaymentObject,
    ) -> Result<SpiPaymentExecution, SpiError> {
        self.execution("execute_payment", ctx, TransactionStatus::Acsp)
    }

    async fn cancel_payment(
        &self,
        ctx: &SpiContext,
        _payment: &PaymentObject,
    ) -> Result<SpiPaymentExecution, SpiError> {
        self.execution("cancel_payment", ctx, TransactionStatus::Canc)
    }

    async fn check_confirmation_code(
        &self,
        ctx: &SpiContext,
        confirmation_code: &Secret<String>,
        _payment: &PaymentObject,
        consent_data: &AspspConsentDataHandle,
    ) -> Result<SpiConfirmationCodeCheckResult, SpiError> {
        let state = self.enter("check_confirmation_code", ctx)?;
        debug!("🏦️ Checking confirmation code against the ASPSP data of {}", consent_data.business_object_id);
        let (sca_status, transaction_status) = if confirmation_code.reveal() == &state.confirmation_code {
            (ScaStatus::Finalised, TransactionStatus::Acsp)
        } else {
            (ScaStatus::Failed, TransactionStatus::Rjct)
        };
        Ok(SpiConfirmationCodeCheckResult { sca_status, transaction_status })
    }
}
