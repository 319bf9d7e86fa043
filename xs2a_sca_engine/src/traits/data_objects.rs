use serde::{Deserialize, Serialize};
use xs2a_common::Secret;

use crate::{
    db_types::{
        AuthenticationObject,
        AuthorisationKind,
        ChallengeData,
        PsuIdData,
        ScaApproach,
        ScaStatus,
        TransactionStatus,
    },
    sca_objects::AuthorisationProcessorRequest,
};

/// Who is authorising what, passed along with every call to the banking backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiContext {
    pub authorisation_id: String,
    pub business_object_id: String,
    pub kind: AuthorisationKind,
    pub sca_approach: ScaApproach,
    pub psu_id_data: PsuIdData,
}

impl From<&AuthorisationProcessorRequest> for SpiContext {
    fn from(request: &AuthorisationProcessorRequest) -> Self {
        Self {
            authorisation_id: request.authorisation_id.clone(),
            business_object_id: request.business_object_id.clone(),
            kind: request.kind,
            sca_approach: request.sca_approach,
            psu_id_data: request.psu_id_data.clone(),
        }
    }
}

/// A reference to the opaque data the ASPSP keeps for a consent or payment. The engine never reads that data; it
/// only tells the backend which record to use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AspspConsentDataHandle {
    pub business_object_id: String,
}

impl AspspConsentDataHandle {
    pub fn new<S: Into<String>>(business_object_id: S) -> Self {
        Self { business_object_id: business_object_id.into() }
    }
}

/// The ASPSP's verdict on credentials or SCA data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpiAuthorisationStatus {
    Success,
    /// Wrong input, but the PSU may try again.
    AttemptFailure,
    /// Wrong input and no more attempts are allowed.
    Failure,
}

#[derive(Debug, Clone)]
pub struct SpiAuthorisationCode {
    pub chosen_sca_method: AuthenticationObject,
    pub challenge_data: Option<ChallengeData>,
    pub psu_message: Option<String>,
    /// The confirmation code the ASPSP issued for the chosen method, if any. Decoupled methods hand it to the PSU
    /// out of band, and it becomes the reference for the confirmation code check.
    pub confirmation_code: Option<Secret<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiPaymentExecution {
    pub outcome: SpiAuthorisationStatus,
    pub transaction_status: TransactionStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiConfirmationCodeCheckResult {
    pub sca_status: ScaStatus,
    pub transaction_status: TransactionStatus,
}
