//! The confirmation code check that concludes embedded and decoupled payment authorisations when the deployment
//! mandates authorisation confirmation.
//!
//! The check runs once, from `SCAMETHODSELECTED` or `STARTED`. It is either done locally, by comparing the code with
//! the SCA authentication data stored on the authorisation, or delegated to the ASPSP.
use log::*;

use crate::{
    db_types::{ParentStatus, ScaStatus},
    sca_api::processor_services::AuthorisationProcessor,
    sca_objects::{
        AuthorisationProcessorRequest,
        AuthorisationProcessorResponse as Response,
        MessageError,
        MessageErrorCode,
    },
    traits::SpiContext,
};

/// How confirmation codes are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationCheck {
    /// Exact comparison with the stored SCA authentication data.
    Local,
    /// The ASPSP checks the code, and its verdict is adopted.
    Backend,
}

impl ConfirmationCheck {
    pub fn from_flag(check_by_xs2a: bool) -> Self {
        if check_by_xs2a {
            ConfirmationCheck::Local
        } else {
            ConfirmationCheck::Backend
        }
    }
}

pub async fn process_confirmation_code<P: AuthorisationProcessor>(
    request: &AuthorisationProcessorRequest,
    processor: &P,
    check: ConfirmationCheck,
) -> Response {
    let ns = request.error_namespace();
    let status = request.current_sca_status;
    if status.is_finalised() {
        let text = format!("Authorisation {} is already {status}", request.authorisation_id);
        return Response::rejected(request, MessageError::business(ns, MessageErrorCode::StatusInvalid, text));
    }
    if !processor.confirmation_code_required(request.sca_approach) {
        let text = format!("Confirmation codes are not used for {} authorisations", request.sca_approach);
        return Response::rejected(request, MessageError::business(ns, MessageErrorCode::ServiceInvalid, text));
    }
    if !matches!(status, ScaStatus::ScaMethodSelected | ScaStatus::Started) {
        let text = format!("A confirmation code cannot be accepted while the authorisation is {status}");
        return Response::rejected(request, MessageError::business(ns, MessageErrorCode::StatusInvalid, text));
    }
    let Some(code) = request.confirmation_code.as_ref().filter(|c| !c.is_blank()) else {
        let text = "The confirmation code is missing";
        return Response::rejected(request, MessageError::validation(ns, MessageErrorCode::FormatError, text));
    };
    match check {
        ConfirmationCheck::Local => {
            let matched = request.stored_sca_authentication_data.as_ref().map(|s| s.matches(code)).unwrap_or(false);
            if matched {
                info!("🔄️🔑️ Confirmation code accepted for authorisation {}", request.authorisation_id);
                Response::advance(request, ScaStatus::Finalised)
            } else {
                debug!("🔄️🔑️ Confirmation code mismatch for authorisation {}", request.authorisation_id);
                let text = "The confirmation code does not match";
                Response::rejected(request, MessageError::validation(ns, MessageErrorCode::FormatErrorScaStatus, text))
            }
        },
        ConfirmationCheck::Backend => {
            let parent = match processor.find_parent(&request.business_object_id).await {
                Ok(Some(parent)) => parent,
                Ok(None) => {
                    let text = format!("{} does not exist", request.business_object_id);
                    let error = MessageError::business(ns, MessageErrorCode::ResourceUnknown, text);
                    return Response::rejected(request, error);
                },
                Err(e) => return Response::rejected(request, MessageError::persistence(ns, &e)),
            };
            let ctx = SpiContext::from(request);
            let result = match processor.check_confirmation_code(&ctx, code, &parent).await {
                Ok(result) => result,
                Err(e) => return Response::rejected(request, e.to_message(ns)),
            };
            info!(
                "🔄️🔑️ ASPSP checked the confirmation code for authorisation {}: {}, {}",
                request.authorisation_id, result.sca_status, result.transaction_status
            );
            let parent_status = Some(ParentStatus::Transaction(result.transaction_status));
            match result.sca_status {
                ScaStatus::Finalised => Response::advance(request, ScaStatus::Finalised),
                ScaStatus::Failed => Response::failed(
                    request,
                    MessageError::business(ns, MessageErrorCode::ScaInvalid, "The confirmation code was refused"),
                ),
                other => {
                    let id = &request.authorisation_id;
                    warn!("🔄️🔑️ The ASPSP reported {other} for a confirmation code. {id} stays {status}.");
                    let text = format!("The confirmation code check ended in {other}");
                    let error = MessageError::validation(ns, MessageErrorCode::FormatErrorScaStatus, text);
                    Response::rejected(request, error)
                },
            }
            .with_parent_status(parent_status)
        },
    }
}
