use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{Authorisation, AuthorisationKind, ScaApproach, ScaStatus},
    traits::AuthorisationManagement,
};

/// Decides whether the TPP-facing update endpoints may be used for an authorisation at its current stage.
///
/// The guard is read-only. When the authorisation cannot be looked up, whether due to a storage failure, an unknown
/// id or a consent id that does not match, the endpoint is reported as accessible and the update path deals with the
/// request.
pub struct AuthorisationAccessGuard<B> {
    db: B,
    confirmation_mandated: bool,
}

impl<B> Debug for AuthorisationAccessGuard<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AuthorisationAccessGuard(confirmation_mandated: {})", self.confirmation_mandated)
    }
}

impl<B> AuthorisationAccessGuard<B> {
    pub fn new(db: B, confirmation_mandated: bool) -> Self {
        Self { db, confirmation_mandated }
    }
}

impl<B> AuthorisationAccessGuard<B>
where B: AuthorisationManagement
{
    pub async fn is_account_endpoint_accessible(
        &self,
        consent_id: &str,
        authorisation_id: &str,
        confirmation_code_received: bool,
    ) -> bool {
        let authorisation = match self.lookup(authorisation_id).await {
            Some(a) if a.parent_id == consent_id && a.kind == AuthorisationKind::Account => a,
            Some(_) => {
                warn!("🔄️🚧️ Authorisation {authorisation_id} is not part of consent {consent_id}. Allowing access.");
                return true;
            },
            None => return true,
        };
        if self.confirmation_mandated && authorisation.sca_status == ScaStatus::Received {
            debug!("🔄️🚧️ Authorisation {authorisation_id} must be confirmed before it can be updated");
            return false;
        }
        is_accessible(&authorisation, confirmation_code_received)
    }

    pub async fn is_payment_endpoint_accessible(
        &self,
        authorisation_id: &str,
        confirmation_code_received: bool,
    ) -> bool {
        match self.lookup(authorisation_id).await {
            Some(authorisation) => is_accessible(&authorisation, confirmation_code_received),
            None => true,
        }
    }

    async fn lookup(&self, authorisation_id: &str) -> Option<Authorisation> {
        match self.db.fetch_authorisation(authorisation_id).await {
            Ok(Some(authorisation)) => Some(authorisation),
            Ok(None) => {
                debug!("🔄️🚧️ Authorisation {authorisation_id} not found. Allowing access.");
                None
            },
            Err(e) => {
                warn!("🔄️🚧️ Could not look up authorisation {authorisation_id}. Allowing access. {e}");
                None
            },
        }
    }
}

fn is_accessible(authorisation: &Authorisation, confirmation_code_received: bool) -> bool {
    match authorisation.sca_approach {
        ScaApproach::Redirect => false,
        ScaApproach::Decoupled
            if authorisation.sca_status == ScaStatus::ScaMethodSelected && !confirmation_code_received =>
        {
            false
        },
        _ => true,
    }
}

#[cfg(test)]
mod test {
    use chrono::{Duration, Utc};
    use mockall::predicate::eq;

    use super::*;
    use crate::{
        db_types::PsuIdData,
        sca_api::test_mocks::MockAuthorisationStore,
        traits::PersistenceError,
    };

    fn authorisation(kind: AuthorisationKind, approach: ScaApproach, status: ScaStatus) -> Authorisation {
        let now = Utc::now();
        Authorisation {
            id: "auth1".into(),
            parent_id: "parent1".into(),
            kind,
            sca_status: status,
            sca_approach: approach,
            psu_id_data: PsuIdData::new("alice"),
            chosen_sca_method: None,
            challenge_data: None,
            sca_authentication_data: None,
            expires_at: now + Duration::hours(1),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn guard_for(auth: Authorisation, mandated: bool) -> AuthorisationAccessGuard<MockAuthorisationStore> {
        let mut db = MockAuthorisationStore::new();
        db.expect_fetch_authorisation().with(eq("auth1")).returning(move |_| Ok(Some(auth.clone())));
        db.expect_fetch_authorisation().returning(|_| Ok(None));
        AuthorisationAccessGuard::new(db, mandated)
    }

    #[tokio::test]
    async fn redirect_is_never_accessible() {
        for status in [ScaStatus::Received, ScaStatus::PsuAuthenticated, ScaStatus::Started] {
            let auth = authorisation(AuthorisationKind::PaymentInitiation, ScaApproach::Redirect, status);
            let guard = guard_for(auth, false);
            assert!(!guard.is_payment_endpoint_accessible("auth1", false).await);
            assert!(!guard.is_payment_endpoint_accessible("auth1", true).await);
        }
    }

    #[tokio::test]
    async fn decoupled_waits_for_confirmation() {
        let kind = AuthorisationKind::PaymentInitiation;
        let auth = authorisation(kind, ScaApproach::Decoupled, ScaStatus::ScaMethodSelected);
        let guard = guard_for(auth, false);
        assert!(!guard.is_payment_endpoint_accessible("auth1", false).await);
        assert!(guard.is_payment_endpoint_accessible("auth1", true).await);
        let auth = authorisation(AuthorisationKind::PaymentInitiation, ScaApproach::Decoupled, ScaStatus::Started);
        let guard = guard_for(auth, false);
        assert!(guard.is_payment_endpoint_accessible("auth1", false).await);
    }

    #[tokio::test]
    async fn mandated_confirmation_blocks_received_account_authorisations() {
        let auth = authorisation(AuthorisationKind::Account, ScaApproach::Embedded, ScaStatus::Received);
        assert!(!guard_for(auth.clone(), true).is_account_endpoint_accessible("parent1", "auth1", false).await);
        assert!(guard_for(auth, false).is_account_endpoint_accessible("parent1", "auth1", false).await);
        let auth = authorisation(AuthorisationKind::Account, ScaApproach::Embedded, ScaStatus::PsuIdentified);
        assert!(guard_for(auth, true).is_account_endpoint_accessible("parent1", "auth1", false).await);
    }

    #[tokio::test]
    async fn lookup_failures_fail_open() {
        let mut db = MockAuthorisationStore::new();
        db.expect_fetch_authorisation().returning(|_| Err(PersistenceError::DatabaseError("disk on fire".into())));
        let guard = AuthorisationAccessGuard::new(db, true);
        assert!(guard.is_payment_endpoint_accessible("auth1", false).await);
        assert!(guard.is_account_endpoint_accessible("parent1", "auth1", false).await);

        let auth = authorisation(AuthorisationKind::Account, ScaApproach::Redirect, ScaStatus::Received);
        let guard = guard_for(auth, true);
        assert!(guard.is_account_endpoint_accessible("parent1", "unknown", false).await);
        assert!(guard.is_account_endpoint_accessible("another-consent", "auth1", false).await);
    }
}
