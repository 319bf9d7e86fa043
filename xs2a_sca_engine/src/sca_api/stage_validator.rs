use crate::{
    db_types::{Authorisation, ScaStatus},
    sca_objects::{AuthorisationProcessorRequest, MessageError, MessageErrorCode},
};

/// Checks that the request carries the field needed to leave the authorisation's current stage.
///
/// | current status                | required field            |
/// |-------------------------------|---------------------------|
/// | RECEIVED, PSUIDENTIFIED       | password                  |
/// | PSUAUTHENTICATED              | authenticationMethodId    |
/// | SCAMETHODSELECTED             | scaAuthenticationData     |
/// | others                        | none                      |
///
/// Blank values count as missing. The error is a `FORMAT_ERROR` in the namespace of the authorisation's service.
pub fn validate_stage(request: &AuthorisationProcessorRequest) -> Result<(), MessageError> {
    let missing = match request.current_sca_status {
        ScaStatus::Received | ScaStatus::PsuIdentified if !request.has_password() => Some("PSU password"),
        ScaStatus::PsuAuthenticated if !request.has_authentication_method_id() => Some("authentication method id"),
        ScaStatus::ScaMethodSelected if !request.has_sca_authentication_data() => Some("SCA authentication data"),
        _ => None,
    };
    match missing {
        Some(field) => Err(MessageError::validation(
            request.error_namespace(),
            MessageErrorCode::FormatError,
            format!("The {field} is required when the authorisation is {}", request.current_sca_status),
        )),
        None => Ok(()),
    }
}

/// Checks that the PSU named in the request is the one the authorisation belongs to.
///
/// An authorisation started without a PSU takes on the first PSU that identifies itself. From then on, updates that
/// name a different PSU are refused with `PSU_CREDENTIALS_INVALID`.
pub fn validate_psu(request: &AuthorisationProcessorRequest, stored: &Authorisation) -> Result<(), MessageError> {
    if stored.psu_id_data.is_empty() || request.psu_id_data.same_psu(&stored.psu_id_data) {
        return Ok(());
    }
    Err(MessageError::business(
        request.error_namespace(),
        MessageErrorCode::PsuCredentialsInvalid,
        format!("Authorisation {} belongs to another PSU", stored.id),
    ))
}

#[cfg(test)]
mod test {
    use chrono::{Duration, Utc};
    use xs2a_common::Secret;

    use super::*;
    use crate::{
        db_types::{Authorisation, AuthorisationKind, PsuIdData, ScaApproach},
        sca_objects::{ErrorCategory, ErrorNamespace, UpdateAuthorisationRequest},
    };

    fn stored(kind: AuthorisationKind, status: ScaStatus, psu: PsuIdData) -> Authorisation {
        let now = Utc::now();
        Authorisation {
            id: "auth1".into(),
            parent_id: "parent1".into(),
            kind,
            sca_status: status,
            sca_approach: ScaApproach::Embedded,
            psu_id_data: psu,
            chosen_sca_method: None,
            challenge_data: None,
            sca_authentication_data: None,
            expires_at: now + Duration::hours(1),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn request(
        kind: AuthorisationKind,
        status: ScaStatus,
        update: UpdateAuthorisationRequest,
    ) -> AuthorisationProcessorRequest {
        AuthorisationProcessorRequest::new(update, &stored(kind, status, PsuIdData::new("alice")))
    }

    #[test]
    fn required_fields_per_stage() {
        let empty = UpdateAuthorisationRequest::account("parent1", "auth1");
        use ScaStatus::*;
        for status in [Received, PsuIdentified, PsuAuthenticated, ScaMethodSelected] {
            let err = validate_stage(&request(AuthorisationKind::Account, status, empty.clone())).unwrap_err();
            assert_eq!(err.code, MessageErrorCode::FormatError);
            assert_eq!(err.category, ErrorCategory::Validation);
            assert_eq!(err.namespace, ErrorNamespace::Ais);
        }
        for status in [Started, Finalised, Failed, Exempted] {
            assert!(validate_stage(&request(AuthorisationKind::Account, status, empty.clone())).is_ok());
        }
    }

    #[test]
    fn fields_satisfy_their_stage_only() {
        let with_password = UpdateAuthorisationRequest::payment_initiation("parent1", "auth1").with_password("secret");
        let req = request(AuthorisationKind::PaymentInitiation, ScaStatus::Received, with_password.clone());
        assert!(validate_stage(&req).is_ok());
        let req = request(AuthorisationKind::PaymentInitiation, ScaStatus::PsuAuthenticated, with_password);
        let err = validate_stage(&req).unwrap_err();
        assert_eq!(err.namespace, ErrorNamespace::Pis);

        let with_method =
            UpdateAuthorisationRequest::payment_initiation("parent1", "auth1").with_authentication_method("sms");
        let req = request(AuthorisationKind::PaymentInitiation, ScaStatus::PsuAuthenticated, with_method);
        assert!(validate_stage(&req).is_ok());

        let mut blank_tan = UpdateAuthorisationRequest::payment_cancellation("parent1", "auth1");
        blank_tan.sca_authentication_data = Some(Secret::from(" "));
        let req = request(AuthorisationKind::PaymentCancellation, ScaStatus::ScaMethodSelected, blank_tan);
        assert!(validate_stage(&req).is_err());
    }

    #[test]
    fn another_psu_cannot_take_over() {
        let auth = stored(AuthorisationKind::Account, ScaStatus::PsuIdentified, PsuIdData::new("alice"));
        let update = UpdateAuthorisationRequest::account("parent1", "auth1").with_psu(PsuIdData::new("mallory"));
        let err = validate_psu(&AuthorisationProcessorRequest::new(update, &auth), &auth).unwrap_err();
        assert_eq!(err.code, MessageErrorCode::PsuCredentialsInvalid);
        assert_eq!(err.category, ErrorCategory::Business);

        let update = UpdateAuthorisationRequest::account("parent1", "auth1").with_psu(PsuIdData::new("alice"));
        assert!(validate_psu(&AuthorisationProcessorRequest::new(update, &auth), &auth).is_ok());
        let anonymous = UpdateAuthorisationRequest::account("parent1", "auth1");
        assert!(validate_psu(&AuthorisationProcessorRequest::new(anonymous, &auth), &auth).is_ok());

        let unnamed = stored(AuthorisationKind::Account, ScaStatus::Received, PsuIdData::default());
        let update = UpdateAuthorisationRequest::account("parent1", "auth1").with_psu(PsuIdData::new("bob"));
        assert!(validate_psu(&AuthorisationProcessorRequest::new(update, &unnamed), &unnamed).is_ok());
    }
}
