use chrono::{NaiveDate, Utc};
use mockall::mock;
use xs2a_common::Secret;

use crate::{
    db_types::{
        AisConsent,
        AuthenticationObject,
        Authorisable,
        Authorisation,
        AuthorisationKind,
        AuthorisationUpdate,
        ConsentStatus,
        NewAuthorisation,
        PaymentType,
        PisCommonPayment,
        PsuIdData,
        ScaApproach,
        TransactionStatus,
    },
    sca_api::processor_services::{AuthorisationProcessor, Finalisation, ProcessorError},
    sca_objects::{AuthorisationProcessorRequest, AuthorisationProcessorResponse},
    traits::{
        AuthorisationManagement,
        PersistenceError,
        SpiAuthorisationCode,
        SpiAuthorisationStatus,
        SpiConfirmationCodeCheckResult,
        SpiContext,
        SpiError,
    },
};

mock! {
    pub Processor {}
    impl AuthorisationProcessor for Processor {
        fn kind(&self) -> AuthorisationKind;
        fn confirmation_code_required(&self, approach: ScaApproach) -> bool;
        async fn find_active_parent(&self, parent_id: &str) -> Result<Option<Authorisable>, PersistenceError>;
        async fn find_parent(&self, parent_id: &str) -> Result<Option<Authorisable>, PersistenceError>;
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
        async fn finalise(&self, ctx: &SpiContext, parent: &Authorisable) -> Result<Finalisation, ProcessorError>;
        async fn check_confirmation_code(
            &self,
            ctx: &SpiContext,
            confirmation_code: &Secret<String>,
            parent: &Authorisable,
        ) -> Result<SpiConfirmationCodeCheckResult, ProcessorError>;
    }
}

mock! {
    pub AuthorisationStore {}
    impl AuthorisationManagement for AuthorisationStore {
        async fn fetch_authorisation(&self, authorisation_id: &str) -> Result<Option<Authorisation>, PersistenceError>;
        async fn fetch_authorisations_for_parent(
            &self,
            parent_id: &str,
            kind: AuthorisationKind,
        ) -> Result<Vec<Authorisation>, PersistenceError>;
        async fn insert_authorisation(
            &self,
            authorisation: NewAuthorisation,
        ) -> Result<Authorisation, PersistenceError>;
        async fn update_authorisation(
            &self,
            authorisation_id: &str,
            expected_version: i64,
            update: AuthorisationUpdate,
        ) -> Result<Authorisation, PersistenceError>;
    }
}

pub fn consent(id: &str, psus: &[&str]) -> Authorisable {
    let now = Utc::now();
    Authorisable::Consent(AisConsent {
        consent_id: id.to_string(),
        consent_status: ConsentStatus::Received,
        psu_data: psus.iter().map(|p| PsuIdData::new(*p)).collect(),
        multilevel_sca_required: false,
        recurring_indicator: true,
        frequency_per_day: 4,
        valid_until: NaiveDate::from_ymd_opt(2030, 12, 31).unwrap_or_default(),
        created_at: now,
        updated_at: now,
    })
}

pub fn payment(id: &str, psus: &[&str]) -> Authorisable {
    let now = Utc::now();
    Authorisable::Payment(PisCommonPayment {
        payment_id: id.to_string(),
        payment_type: PaymentType::Single,
        payment_product: "sepa-credit-transfers".to_string(),
        transaction_status: TransactionStatus::Rcvd,
        psu_data: psus.iter().map(|p| PsuIdData::new(*p)).collect(),
        multilevel_sca_required: false,
        payment_data: Some(b"{}".to_vec()),
        payment: None,
        created_at: now,
        updated_at: now,
    })
}
