use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{AuthorisationKind, ScaApproach},
    sca_api::errors::ScaEngineError,
    traits::AuthorisationManagement,
};

/// Works out which SCA approach applies to an authorisation.
///
/// The approach is chosen when an authorisation is created, and is pinned to it from then on. Creation requests that
/// do not name an approach get the configured default.
pub struct ScaApproachResolver<B> {
    db: B,
    default_approach: ScaApproach,
}

impl<B> Debug for ScaApproachResolver<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ScaApproachResolver(default: {})", self.default_approach)
    }
}

impl<B> ScaApproachResolver<B> {
    pub fn new(db: B, default_approach: ScaApproach) -> Self {
        Self { db, default_approach }
    }

    pub fn default_approach(&self) -> ScaApproach {
        self.default_approach
    }

    /// The approach for a new payment authorisation.
    ///
    /// Payments can only be authorised under REDIRECT, EMBEDDED or DECOUPLED. Asking for OAUTH, or for an approach
    /// that does not exist, is an [`ScaEngineError::UnsupportedOperation`].
    pub fn payment_creation_approach(&self, requested: Option<&str>) -> Result<ScaApproach, ScaEngineError> {
        let approach = self.parse_or_default(requested)?;
        if !approach.is_supported_for_payments() {
            warn!("🔄️🧭️ {approach} was requested for a payment authorisation");
            return Err(ScaEngineError::UnsupportedOperation(format!("{approach} is not supported for payments")));
        }
        Ok(approach)
    }

    /// The approach for a new consent authorisation. Any known approach is accepted.
    pub fn account_approach(&self, requested: Option<&str>) -> Result<ScaApproach, ScaEngineError> {
        self.parse_or_default(requested)
    }

    fn parse_or_default(&self, requested: Option<&str>) -> Result<ScaApproach, ScaEngineError> {
        match requested.map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(self.default_approach),
            Some(s) => s.parse::<ScaApproach>().map_err(|e| {
                warn!("🔄️🧭️ Unknown SCA approach requested. {e}");
                ScaEngineError::UnsupportedOperation(e.to_string())
            }),
        }
    }
}

impl<B> ScaApproachResolver<B>
where B: AuthorisationManagement
{
    /// The approach pinned to the payment initiation authorisation `authorisation_id`.
    pub async fn initiation_approach(&self, authorisation_id: &str) -> Result<ScaApproach, ScaEngineError> {
        self.pinned_approach(authorisation_id, AuthorisationKind::PaymentInitiation).await
    }

    /// The approach pinned to the payment cancellation authorisation `authorisation_id`.
    pub async fn cancellation_approach(&self, authorisation_id: &str) -> Result<ScaApproach, ScaEngineError> {
        self.pinned_approach(authorisation_id, AuthorisationKind::PaymentCancellation).await
    }

    async fn pinned_approach(
        &self,
        authorisation_id: &str,
        kind: AuthorisationKind,
    ) -> Result<ScaApproach, ScaEngineError> {
        match self.db.fetch_authorisation(authorisation_id).await? {
            Some(a) if a.kind == kind => Ok(a.sca_approach),
            _ => Err(ScaEngineError::AuthorisationNotFound(authorisation_id.to_string())),
        }
    }
}

#[cfg(test)]
mod test {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::{
        db_types::{Authorisation, PsuIdData, ScaStatus},
        sca_api::test_mocks::MockAuthorisationStore,
    };

    fn resolver(default_approach: ScaApproach) -> ScaApproachResolver<MockAuthorisationStore> {
        let mut db = MockAuthorisationStore::new();
        db.expect_fetch_authorisation().returning(|id| {
            let now = Utc::now();
            let kind = match id {
                "init1" => AuthorisationKind::PaymentInitiation,
                "cancel1" => AuthorisationKind::PaymentCancellation,
                _ => return Ok(None),
            };
            Ok(Some(Authorisation {
                id: id.to_string(),
                parent_id: "pay1".into(),
                kind,
                sca_status: ScaStatus::Received,
                sca_approach: if kind == AuthorisationKind::PaymentInitiation {
                    ScaApproach::Decoupled
                } else {
                    ScaApproach::Embedded
                },
                psu_id_data: PsuIdData::new("alice"),
                chosen_sca_method: None,
                challenge_data: None,
                sca_authentication_data: None,
                expires_at: now + Duration::hours(1),
                version: 0,
                created_at: now,
                updated_at: now,
            }))
        });
        ScaApproachResolver::new(db, default_approach)
    }

    #[test]
    fn payment_creation_rejects_oauth_and_unknown_approaches() {
        let resolver = resolver(ScaApproach::Redirect);
        assert_eq!(resolver.payment_creation_approach(None).unwrap(), ScaApproach::Redirect);
        assert_eq!(resolver.payment_creation_approach(Some("embedded")).unwrap(), ScaApproach::Embedded);
        assert_eq!(resolver.payment_creation_approach(Some(" ")).unwrap(), ScaApproach::Redirect);
        let err = resolver.payment_creation_approach(Some("OAUTH")).unwrap_err();
        assert!(matches!(err, ScaEngineError::UnsupportedOperation(_)), "{err}");
        let err = resolver.payment_creation_approach(Some("CARRIER_PIGEON")).unwrap_err();
        assert!(matches!(err, ScaEngineError::UnsupportedOperation(_)), "{err}");
    }

    #[test]
    fn consents_accept_oauth() {
        let resolver = resolver(ScaApproach::Embedded);
        assert_eq!(resolver.account_approach(Some("OAUTH")).unwrap(), ScaApproach::Oauth);
        assert_eq!(resolver.account_approach(None).unwrap(), ScaApproach::Embedded);
        assert!(resolver.account_approach(Some("nope")).is_err());
    }

    #[tokio::test]
    async fn pinned_approaches_are_looked_up_by_kind() {
        let resolver = resolver(ScaApproach::Redirect);
        assert_eq!(resolver.initiation_approach("init1").await.unwrap(), ScaApproach::Decoupled);
        assert_eq!(resolver.cancellation_approach("cancel1").await.unwrap(), ScaApproach::Embedded);
        let err = resolver.cancellation_approach("init1").await.unwrap_err();
        assert!(matches!(err, ScaEngineError::AuthorisationNotFound(_)), "{err}");
        assert!(resolver.initiation_approach("missing").await.is_err());
    }
}
