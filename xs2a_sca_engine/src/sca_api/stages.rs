//! The stage processor chain.
//!
//! Every non-terminal SCA status has its own handler, and [`process_stage`] picks it by matching on the authorisation's
//! current status. The terminal statuses share one handler that refuses the update. A handler turns the request into
//! a response carrying the next status, the unchanged status with an error (the PSU may try again), or `FAILED` with
//! an error. Handlers do not write anything; the caller persists the response.
//!
//! ```text
//! RECEIVED -> PSUIDENTIFIED -> PSUAUTHENTICATED -> SCAMETHODSELECTED -> STARTED -> FINALISED
//!     \-> EXEMPTED              (any non-terminal status) -> FAILED
//! ```
use log::*;

use crate::{
    db_types::{Authorisable, AuthorisationKind, ScaStatus},
    sca_api::processor_services::AuthorisationProcessor,
    sca_objects::{
        AuthorisationProcessorRequest,
        AuthorisationProcessorResponse as Response,
        ErrorCategory,
        MessageError,
        MessageErrorCode,
    },
    traits::{SpiAuthorisationStatus, SpiContext},
};

/// Runs the handler for the request's current status and checks its outcome against the transition graph.
pub async fn process_stage<P: AuthorisationProcessor>(
    request: &AuthorisationProcessorRequest,
    processor: &P,
) -> Response {
    let current = request.current_sca_status;
    trace!("🔄️🔐️ Processing {current} stage of authorisation {}", request.authorisation_id);
    let response = match current {
        ScaStatus::Received => received_stage(request, processor).await,
        ScaStatus::PsuIdentified => psu_identified_stage(request, processor).await,
        ScaStatus::PsuAuthenticated => psu_authenticated_stage(request, processor).await,
        ScaStatus::ScaMethodSelected => sca_method_selected_stage(request, processor).await,
        ScaStatus::Started => started_stage(request, processor).await,
        ScaStatus::Finalised | ScaStatus::Failed | ScaStatus::Exempted => terminal_stage(request),
    };
    if !current.permits(response.sca_status) {
        error!(
            "🔄️🔐️ The {current} handler moved authorisation {} to {}. This is not allowed.",
            request.authorisation_id, response.sca_status
        );
        let ns = request.error_namespace();
        let error = MessageError::new(ns, ErrorCategory::Backend, MessageErrorCode::InternalServerError)
            .with_text(format!("Transition from {current} to {} is not allowed", response.sca_status));
        return Response::rejected(request, error);
    }
    match &response.error {
        None => debug!(
            "🔄️🔐️ Authorisation {} moves from {current} to {}",
            request.authorisation_id, response.sca_status
        ),
        Some(e) => info!(
            "🔄️🔐️ Authorisation {} at {current} resulted in {} with error {e}",
            request.authorisation_id, response.sca_status
        ),
    }
    response
}

async fn load_parent<P: AuthorisationProcessor>(
    request: &AuthorisationProcessorRequest,
    processor: &P,
) -> Result<Authorisable, Response> {
    let ns = request.error_namespace();
    match processor.find_parent(&request.business_object_id).await {
        Ok(Some(parent)) => Ok(parent),
        Ok(None) => {
            let text = format!("{} does not exist", request.business_object_id);
            Err(Response::rejected(request, MessageError::business(ns, MessageErrorCode::ResourceUnknown, text)))
        },
        Err(e) => Err(Response::rejected(request, MessageError::persistence(ns, &e))),
    }
}

fn missing_field(request: &AuthorisationProcessorRequest, field: &str) -> Response {
    let text = format!("The {field} is required when the authorisation is {}", request.current_sca_status);
    let error = MessageError::validation(request.error_namespace(), MessageErrorCode::FormatError, text);
    Response::rejected(request, error)
}

macro_rules! try_parent {
    ($request:expr, $processor:expr) => {
        match load_parent($request, $processor).await {
            Ok(parent) => parent,
            Err(response) => return response,
        }
    };
}

//--------------------------------------       RECEIVED       ---------------------------------------------------------
/// Identifies the PSU against the consent or payment and asks the ASPSP whether SCA can be waived.
async fn received_stage<P: AuthorisationProcessor>(request: &AuthorisationProcessorRequest, processor: &P) -> Response {
    let ns = request.error_namespace();
    if request.psu_id_data.is_empty() {
        return Response::rejected(
            request,
            MessageError::validation(ns, MessageErrorCode::FormatError, "A PSU id is required to identify the PSU"),
        );
    }
    let parent = try_parent!(request, processor);
    let psu = &request.psu_id_data;
    if !parent.psu_data().is_empty() && !parent.contains_psu(psu) {
        if parent.is_multilevel_sca_required() {
            debug!("🔄️🔐️ PSU {psu} joins the multilevel authorisation of {}", parent.id());
        } else {
            let text = format!("PSU {psu} is not authorised for {}", parent.id());
            return Response::failed(request, MessageError::business(ns, MessageErrorCode::PsuCredentialsInvalid, text));
        }
    }
    let ctx = SpiContext::from(request);
    match processor.check_sca_exemption(&ctx, &parent).await {
        Ok(true) => {
            info!("🔄️🔐️ SCA is exempted for authorisation {}", request.authorisation_id);
            Response::advance(request, ScaStatus::Exempted)
        },
        Ok(false) => Response::advance(request, ScaStatus::PsuIdentified),
        Err(e) => Response::rejected(request, MessageError::backend(ns, &e)),
    }
}

//--------------------------------------    PSUIDENTIFIED     ---------------------------------------------------------
/// Authenticates the PSU with their password and offers the SCA methods available to them.
async fn psu_identified_stage<P: AuthorisationProcessor>(
    request: &AuthorisationProcessorRequest,
    processor: &P,
) -> Response {
    let ns = request.error_namespace();
    let Some(password) = request.password.as_ref() else {
        return missing_field(request, "PSU password");
    };
    let parent = try_parent!(request, processor);
    let ctx = SpiContext::from(request);
    match processor.authorise_psu(&ctx, password, &parent).await {
        Ok(SpiAuthorisationStatus::Success) => {},
        Ok(SpiAuthorisationStatus::AttemptFailure) => {
            let error = MessageError::business(ns, MessageErrorCode::PsuCredentialsInvalid, "Wrong PSU credentials");
            return Response::rejected(request, error);
        },
        Ok(SpiAuthorisationStatus::Failure) => {
            let text = "PSU authentication failed";
            let error = MessageError::business(ns, MessageErrorCode::PsuCredentialsInvalid, text);
            return Response::failed(request, error);
        },
        Err(e) => return Response::rejected(request, MessageError::backend(ns, &e)),
    }
    match processor.available_sca_methods(&ctx, &parent).await {
        Ok(methods) if methods.is_empty() => {
            let text = "The ASPSP offers no SCA methods for this PSU";
            Response::failed(request, MessageError::business(ns, MessageErrorCode::ScaMethodUnknown, text))
        },
        Ok(methods) => Response::advance(request, ScaStatus::PsuAuthenticated).with_sca_methods(methods),
        Err(e) => Response::rejected(request, MessageError::backend(ns, &e)),
    }
}

//--------------------------------------   PSUAUTHENTICATED   ---------------------------------------------------------
/// Starts SCA with the method the PSU chose from the offered ones. A confirmation code issued for the method is kept
/// as the reference for the confirmation code check.
async fn psu_authenticated_stage<P: AuthorisationProcessor>(
    request: &AuthorisationProcessorRequest,
    processor: &P,
) -> Response {
    let ns = request.error_namespace();
    let Some(method_id) = request.authentication_method_id.as_deref() else {
        return missing_field(request, "authentication method id");
    };
    let parent = try_parent!(request, processor);
    let ctx = SpiContext::from(request);
    let methods = match processor.available_sca_methods(&ctx, &parent).await {
        Ok(methods) => methods,
        Err(e) => return Response::rejected(request, MessageError::backend(ns, &e)),
    };
    if !methods.iter().any(|m| m.authentication_method_id == method_id) {
        let text = format!("{method_id} is not one of the offered SCA methods");
        return Response::rejected(request, MessageError::business(ns, MessageErrorCode::ScaMethodUnknown, text))
            .with_sca_methods(methods);
    }
    match processor.request_authorisation_code(&ctx, method_id, &parent).await {
        Ok(code) => {
            let mut response = Response::advance(request, ScaStatus::ScaMethodSelected)
                .with_sca_methods(methods)
                .with_chosen_sca_method(code.chosen_sca_method)
                .with_challenge_data(code.challenge_data);
            if let Some(confirmation_code) = code.confirmation_code {
                response = response.with_sca_authentication_data(confirmation_code);
            }
            match code.psu_message {
                Some(message) => response.with_psu_message(message),
                None => response,
            }
        },
        Err(e) => Response::rejected(request, MessageError::backend(ns, &e)),
    }
}

//--------------------------------------  SCAMETHODSELECTED   ---------------------------------------------------------
/// Verifies the SCA data (e.g. a TAN) and keeps it as the reference for a later confirmation code.
async fn sca_method_selected_stage<P: AuthorisationProcessor>(
    request: &AuthorisationProcessorRequest,
    processor: &P,
) -> Response {
    let ns = request.error_namespace();
    let Some(sca_data) = request.sca_authentication_data.as_ref() else {
        return missing_field(request, "SCA authentication data");
    };
    let parent = try_parent!(request, processor);
    let ctx = SpiContext::from(request);
    match processor.verify_sca_authorisation(&ctx, sca_data, &parent).await {
        Ok(SpiAuthorisationStatus::Success) => {
            Response::advance(request, ScaStatus::Started).with_sca_authentication_data(sca_data.clone())
        },
        Ok(SpiAuthorisationStatus::AttemptFailure) => {
            let error = MessageError::business(ns, MessageErrorCode::ScaInvalid, "Wrong SCA authentication data");
            Response::rejected(request, error)
        },
        Ok(SpiAuthorisationStatus::Failure) => {
            let error = MessageError::business(ns, MessageErrorCode::ScaInvalid, "SCA was refused by the ASPSP");
            Response::failed(request, error)
        },
        Err(e) => Response::rejected(request, MessageError::backend(ns, &e)),
    }
}

//--------------------------------------       STARTED        ---------------------------------------------------------
/// Applies the business effect of the authorisation, unless a confirmation code has to be supplied first.
async fn started_stage<P: AuthorisationProcessor>(request: &AuthorisationProcessorRequest, processor: &P) -> Response {
    let ns = request.error_namespace();
    if processor.confirmation_code_required(request.sca_approach) {
        debug!("🔄️🔐️ Authorisation {} is waiting for a confirmation code", request.authorisation_id);
        return Response::unchanged(request)
            .with_psu_message("Please confirm the authorisation with the confirmation code you received");
    }
    let parent = try_parent!(request, processor);
    let ctx = SpiContext::from(request);
    let finalisation = match processor.finalise(&ctx, &parent).await {
        Ok(f) => f,
        Err(e) => return Response::rejected(request, e.to_message(ns)),
    };
    let code = match request.kind {
        AuthorisationKind::Account => MessageErrorCode::ConsentInvalid,
        _ => MessageErrorCode::PaymentFailed,
    };
    match finalisation.outcome {
        SpiAuthorisationStatus::Success => Response::advance(request, ScaStatus::Finalised),
        SpiAuthorisationStatus::AttemptFailure => {
            let text = "The ASPSP could not complete the request yet";
            Response::rejected(request, MessageError::business(ns, code, text))
        },
        SpiAuthorisationStatus::Failure => {
            Response::failed(request, MessageError::business(ns, code, "The ASPSP refused the request"))
        },
    }
    .with_parent_status(finalisation.parent_status)
}

//--------------------------------------   Terminal stages    ---------------------------------------------------------
fn terminal_stage(request: &AuthorisationProcessorRequest) -> Response {
    let (id, status) = (&request.authorisation_id, request.current_sca_status);
    let text = format!("Authorisation {id} is {status} and cannot be updated");
    let error = MessageError::business(request.error_namespace(), MessageErrorCode::StatusInvalid, text);
    Response::rejected(request, error)
}

#[cfg(test)]
mod test {
    use chrono::{Duration, Utc};
    use mockall::predicate::eq;

    use super::*;
    use crate::{
        db_types::{
            AuthenticationObject,
            Authorisation,
            ConsentStatus,
            ParentStatus,
            PsuIdData,
            ScaApproach,
            TransactionStatus,
        },
        sca_api::{
            processor_services::Finalisation,
            test_mocks::{consent, payment, MockProcessor},
        },
        sca_objects::{ErrorNamespace, UpdateAuthorisationRequest},
        traits::{SpiAuthorisationCode, SpiError},
    };

    fn request(
        kind: AuthorisationKind,
        status: ScaStatus,
        update: UpdateAuthorisationRequest,
    ) -> AuthorisationProcessorRequest {
        let now = Utc::now();
        let stored = Authorisation {
            id: "auth1".into(),
            parent_id: "parent1".into(),
            kind,
            sca_status: status,
            sca_approach: ScaApproach::Embedded,
            psu_id_data: PsuIdData::default(),
            chosen_sca_method: None,
            challenge_data: None,
            sca_authentication_data: None,
            expires_at: now + Duration::hours(1),
            version: 1,
            created_at: now,
            updated_at: now,
        };
        AuthorisationProcessorRequest::new(update, &stored)
    }

    fn account_update() -> UpdateAuthorisationRequest {
        UpdateAuthorisationRequest::account("parent1", "auth1").with_psu(PsuIdData::new("alice"))
    }

    fn methods() -> Vec<AuthenticationObject> {
        vec![AuthenticationObject::new("SMS_OTP", "sms"), AuthenticationObject::new("PUSH_OTP", "push").decoupled()]
    }

    #[tokio::test]
    async fn received_with_password_identifies_the_psu() {
        let mut processor = MockProcessor::new();
        processor.expect_find_parent().with(eq("parent1")).returning(|_| Ok(Some(consent("parent1", &["alice"]))));
        processor.expect_check_sca_exemption().times(1).returning(|_, _| Ok(false));
        let req = request(AuthorisationKind::Account, ScaStatus::Received, account_update().with_password("secret"));
        let response = process_stage(&req, &processor).await;
        assert!(response.is_successful());
        assert_eq!(response.sca_status, ScaStatus::PsuIdentified);
    }

    #[tokio::test]
    async fn received_can_be_exempted() {
        let mut processor = MockProcessor::new();
        processor.expect_find_parent().returning(|_| Ok(Some(payment("parent1", &[]))));
        processor.expect_check_sca_exemption().returning(|_, _| Ok(true));
        let update = UpdateAuthorisationRequest::payment_initiation("parent1", "auth1")
            .with_psu(PsuIdData::new("bob"))
            .with_password("secret");
        let req = request(AuthorisationKind::PaymentInitiation, ScaStatus::Received, update);
        let response = process_stage(&req, &processor).await;
        assert_eq!(response.sca_status, ScaStatus::Exempted);
    }

    #[tokio::test]
    async fn received_rejects_unknown_psu_on_single_level_parent() {
        let mut processor = MockProcessor::new();
        processor.expect_find_parent().returning(|_| Ok(Some(consent("parent1", &["bob"]))));
        processor.expect_check_sca_exemption().never();
        let req = request(AuthorisationKind::Account, ScaStatus::Received, account_update().with_password("secret"));
        let response = process_stage(&req, &processor).await;
        assert_eq!(response.sca_status, ScaStatus::Failed);
        assert_eq!(response.error.unwrap().code, MessageErrorCode::PsuCredentialsInvalid);
    }

    #[tokio::test]
    async fn received_without_psu_is_a_format_error() {
        let mut processor = MockProcessor::new();
        processor.expect_find_parent().never();
        let update = UpdateAuthorisationRequest::account("parent1", "auth1").with_password("secret");
        let req = request(AuthorisationKind::Account, ScaStatus::Received, update);
        let response = process_stage(&req, &processor).await;
        assert_eq!(response.sca_status, ScaStatus::Received);
        let error = response.error.unwrap();
        assert_eq!(error.code, MessageErrorCode::FormatError);
        assert_eq!(error.namespace, ErrorNamespace::Ais);
    }

    #[tokio::test]
    async fn psu_identified_offers_sca_methods() {
        let mut processor = MockProcessor::new();
        processor.expect_find_parent().returning(|_| Ok(Some(consent("parent1", &["alice"]))));
        processor.expect_authorise_psu().returning(|_, _, _| Ok(SpiAuthorisationStatus::Success));
        processor.expect_available_sca_methods().returning(|_, _| Ok(methods()));
        let update = account_update().with_password("secret");
        let req = request(AuthorisationKind::Account, ScaStatus::PsuIdentified, update);
        let response = process_stage(&req, &processor).await;
        assert_eq!(response.sca_status, ScaStatus::PsuAuthenticated);
        assert_eq!(response.available_sca_methods, methods());
    }

    #[tokio::test]
    async fn psu_identified_wrong_password() {
        let mut processor = MockProcessor::new();
        processor.expect_find_parent().returning(|_| Ok(Some(consent("parent1", &["alice"]))));
        processor.expect_authorise_psu().returning(|_, _, _| Ok(SpiAuthorisationStatus::AttemptFailure));
        processor.expect_available_sca_methods().never();
        let update = account_update().with_password("wrong");
        let req = request(AuthorisationKind::Account, ScaStatus::PsuIdentified, update);
        let response = process_stage(&req, &processor).await;
        assert_eq!(response.sca_status, ScaStatus::PsuIdentified);
        assert_eq!(response.error.unwrap().code, MessageErrorCode::PsuCredentialsInvalid);

        let mut processor = MockProcessor::new();
        processor.expect_find_parent().returning(|_| Ok(Some(consent("parent1", &["alice"]))));
        processor.expect_authorise_psu().returning(|_, _, _| Ok(SpiAuthorisationStatus::Failure));
        let response = process_stage(&req, &processor).await;
        assert_eq!(response.sca_status, ScaStatus::Failed);
    }

    #[tokio::test]
    async fn backend_errors_leave_the_status_unchanged() {
        let mut processor = MockProcessor::new();
        processor.expect_find_parent().returning(|_| Ok(Some(consent("parent1", &["alice"]))));
        processor.expect_authorise_psu().returning(|_, _, _| Err(SpiError::Unavailable("timeout".into())));
        let update = account_update().with_password("secret");
        let req = request(AuthorisationKind::Account, ScaStatus::PsuIdentified, update);
        let response = process_stage(&req, &processor).await;
        assert_eq!(response.sca_status, ScaStatus::PsuIdentified);
        let error = response.error.unwrap();
        assert_eq!(error.category, ErrorCategory::Backend);
        assert_eq!(error.code, MessageErrorCode::InternalServerError);
    }

    #[tokio::test]
    async fn psu_authenticated_selects_method() {
        let mut processor = MockProcessor::new();
        processor.expect_find_parent().returning(|_| Ok(Some(consent("parent1", &["alice"]))));
        processor.expect_available_sca_methods().returning(|_, _| Ok(methods()));
        processor.expect_request_authorisation_code().withf(|_, id, _| id == "sms").returning(|_, _, _| {
            Ok(SpiAuthorisationCode {
                chosen_sca_method: AuthenticationObject::new("SMS_OTP", "sms"),
                challenge_data: None,
                psu_message: Some("Check your phone".into()),
                confirmation_code: None,
            })
        });
        let update = account_update().with_authentication_method("sms");
        let req = request(AuthorisationKind::Account, ScaStatus::PsuAuthenticated, update);
        let response = process_stage(&req, &processor).await;
        assert_eq!(response.sca_status, ScaStatus::ScaMethodSelected);
        assert_eq!(response.chosen_sca_method.unwrap().authentication_method_id, "sms");
        assert_eq!(response.psu_message.as_deref(), Some("Check your phone"));
    }

    #[tokio::test]
    async fn psu_authenticated_unknown_method() {
        let mut processor = MockProcessor::new();
        processor.expect_find_parent().returning(|_| Ok(Some(consent("parent1", &["alice"]))));
        processor.expect_available_sca_methods().returning(|_, _| Ok(methods()));
        processor.expect_request_authorisation_code().never();
        let update = account_update().with_authentication_method("carrier-pigeon");
        let req = request(AuthorisationKind::Account, ScaStatus::PsuAuthenticated, update);
        let response = process_stage(&req, &processor).await;
        assert_eq!(response.sca_status, ScaStatus::PsuAuthenticated);
        assert_eq!(response.error.unwrap().code, MessageErrorCode::ScaMethodUnknown);
    }

    #[tokio::test]
    async fn sca_method_selected_keeps_the_secret() {
        let mut processor = MockProcessor::new();
        processor.expect_find_parent().returning(|_| Ok(Some(payment("parent1", &["alice"]))));
        processor
            .expect_verify_sca_authorisation()
            .withf(|_, tan, _| tan.reveal() == "123456")
            .returning(|_, _, _| Ok(SpiAuthorisationStatus::Success));
        let update =
            UpdateAuthorisationRequest::payment_initiation("parent1", "auth1").with_sca_authentication_data("123456");
        let req = request(AuthorisationKind::PaymentInitiation, ScaStatus::ScaMethodSelected, update);
        let response = process_stage(&req, &processor).await;
        assert_eq!(response.sca_status, ScaStatus::Started);
        assert_eq!(response.sca_authentication_data.unwrap().reveal(), "123456");
    }

    #[tokio::test]
    async fn started_executes_the_payment() {
        let mut processor = MockProcessor::new();
        processor.expect_confirmation_code_required().returning(|_| false);
        processor.expect_find_parent().returning(|_| Ok(Some(payment("parent1", &["alice"]))));
        processor.expect_finalise().times(1).returning(|_, _| {
            Ok(Finalisation::new(
                SpiAuthorisationStatus::Success,
                Some(ParentStatus::Transaction(TransactionStatus::Acsp)),
            ))
        });
        let update = UpdateAuthorisationRequest::payment_initiation("parent1", "auth1");
        let req = request(AuthorisationKind::PaymentInitiation, ScaStatus::Started, update);
        let response = process_stage(&req, &processor).await;
        assert_eq!(response.sca_status, ScaStatus::Finalised);
        assert_eq!(response.parent_status, Some(ParentStatus::Transaction(TransactionStatus::Acsp)));
    }

    #[tokio::test]
    async fn started_waits_for_confirmation_code() {
        let mut processor = MockProcessor::new();
        processor.expect_confirmation_code_required().with(eq(ScaApproach::Embedded)).returning(|_| true);
        processor.expect_finalise().never();
        let update = UpdateAuthorisationRequest::payment_initiation("parent1", "auth1");
        let req = request(AuthorisationKind::PaymentInitiation, ScaStatus::Started, update);
        let response = process_stage(&req, &processor).await;
        assert_eq!(response.sca_status, ScaStatus::Started);
        assert!(response.is_successful());
        assert!(response.psu_message.is_some());
    }

    #[tokio::test]
    async fn started_consent_refused() {
        let mut processor = MockProcessor::new();
        processor.expect_confirmation_code_required().returning(|_| false);
        processor.expect_find_parent().returning(|_| Ok(Some(consent("parent1", &["alice"]))));
        processor.expect_finalise().returning(|_, _| {
            Ok(Finalisation::new(SpiAuthorisationStatus::Failure, Some(ParentStatus::Consent(ConsentStatus::Rejected))))
        });
        let req = request(AuthorisationKind::Account, ScaStatus::Started, account_update());
        let response = process_stage(&req, &processor).await;
        assert_eq!(response.sca_status, ScaStatus::Failed);
        assert_eq!(response.error.unwrap().code, MessageErrorCode::ConsentInvalid);
        assert_eq!(response.parent_status, Some(ParentStatus::Consent(ConsentStatus::Rejected)));
    }

    #[tokio::test]
    async fn terminal_statuses_are_not_reprocessed() {
        for status in [ScaStatus::Finalised, ScaStatus::Failed, ScaStatus::Exempted] {
            let processor = MockProcessor::new();
            let req = request(AuthorisationKind::Account, status, account_update().with_password("secret"));
            let response = process_stage(&req, &processor).await;
            assert_eq!(response.sca_status, status);
            assert_eq!(response.error.unwrap().code, MessageErrorCode::StatusInvalid);
        }
    }

    #[tokio::test]
    async fn missing_parent_is_reported() {
        let mut processor = MockProcessor::new();
        processor.expect_find_parent().returning(|_| Ok(None));
        let req = request(AuthorisationKind::Account, ScaStatus::Received, account_update().with_password("secret"));
        let response = process_stage(&req, &processor).await;
        assert_eq!(response.sca_status, ScaStatus::Received);
        assert_eq!(response.error.unwrap().code, MessageErrorCode::ResourceUnknown);
    }
}
