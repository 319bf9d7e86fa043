//! A thread-safe in-memory storage backend.
//!
//! It behaves like [`crate::SqliteDatabase`] (version-guarded writes, no writes to terminal authorisations, parent
//! status aggregation), and additionally counts writes and lets tests inject storage failures.
use std::{collections::HashMap, sync::Arc};

use chrono::{Duration, Utc};
use log::*;
use tokio::sync::RwLock;

use crate::{
    db_types::{
        AisConsent,
        Authorisable,
        Authorisation,
        AuthorisationKind,
        AuthorisationUpdate,
        ConsentStatus,
        NewAuthorisation,
        NewConsent,
        NewPayment,
        ParentStatus,
        PaymentObject,
        PisCommonPayment,
        ScaStatus,
        TransactionStatus,
    },
    traits::{AuthorisationManagement, ConsentManagement, PaymentManagement, PersistenceError, Xs2aDatabase},
};

/// Write counters, per kind of record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteCounts {
    pub authorisation_inserts: usize,
    pub authorisation_updates: usize,
    pub consent_status_updates: usize,
    pub transaction_status_updates: usize,
    pub payment_objects_saved: usize,
}

#[derive(Debug, Default)]
struct MemoryState {
    consents: HashMap<String, AisConsent>,
    payments: HashMap<String, PisCommonPayment>,
    /// Kept in insertion order, so that parent lookups return the oldest authorisation first.
    authorisations: Vec<Authorisation>,
    writes: WriteCounts,
    fail_reads: Option<PersistenceError>,
    fail_next_update: Option<PersistenceError>,
    fail_next_parent_status: Option<PersistenceError>,
}

impl MemoryState {
    fn authorisation_mut(&mut self, id: &str) -> Option<&mut Authorisation> {
        self.authorisations.iter_mut().find(|a| a.id == id)
    }

    fn check_reads(&self) -> Result<(), PersistenceError> {
        match &self.fail_reads {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn aggregate_parent_status(&mut self, authorisation: &Authorisation) {
        let all = self
            .authorisations
            .iter()
            .filter(|a| a.parent_id == authorisation.parent_id && a.kind == authorisation.kind)
            .cloned()
            .collect::<Vec<_>>();
        let now = Utc::now();
        match authorisation.kind {
            AuthorisationKind::Account => {
                if let Some(consent) = self.consents.get_mut(&authorisation.parent_id) {
                    let progress = Authorisable::Consent(consent.clone()).sca_progress(&all);
                    if let Some(status) = consent.status_after(progress) {
                        consent.consent_status = status;
                        consent.updated_at = now;
                        self.writes.consent_status_updates += 1;
                    }
                }
            },
            AuthorisationKind::PaymentInitiation => {
                if let Some(payment) = self.payments.get_mut(&authorisation.parent_id) {
                    let progress = Authorisable::Payment(payment.clone()).sca_progress(&all);
                    if let Some(status) = payment.status_after(progress) {
                        payment.transaction_status = status;
                        payment.updated_at = now;
                        self.writes.transaction_status_updates += 1;
                    }
                }
            },
            AuthorisationKind::PaymentCancellation => {},
        }
    }

    /// Fails if a parent status cannot be written to `parent_id`. Nothing is changed either way.
    fn check_parent_status(&mut self, parent_id: &str, status: ParentStatus) -> Result<(), PersistenceError> {
        if let Some(e) = self.fail_next_parent_status.take() {
            warn!("🗃️🔐️ Injected failure for the status write of {parent_id}: {e}");
            return Err(e);
        }
        match status {
            ParentStatus::Consent(_) if !self.consents.contains_key(parent_id) => {
                Err(PersistenceError::ConsentNotFound(parent_id.to_string()))
            },
            ParentStatus::Transaction(_) if !self.payments.contains_key(parent_id) => {
                Err(PersistenceError::PaymentNotFound(parent_id.to_string()))
            },
            _ => Ok(()),
        }
    }

    fn write_parent_status(&mut self, parent_id: &str, status: ParentStatus) {
        let now = Utc::now();
        match status {
            ParentStatus::Consent(status) => {
                if let Some(consent) = self.consents.get_mut(parent_id) {
                    consent.consent_status = status;
                    consent.updated_at = now;
                    self.writes.consent_status_updates += 1;
                }
            },
            ParentStatus::Transaction(status) => {
                if let Some(payment) = self.payments.get_mut(parent_id) {
                    payment.transaction_status = status;
                    payment.updated_at = now;
                    self.writes.transaction_status_updates += 1;
                }
            },
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryDatabase {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn write_counts(&self) -> WriteCounts {
        self.state.read().await.writes
    }

    /// The number of authorisation updates, the writes stage transitions produce.
    pub async fn authorisation_updates(&self) -> usize {
        self.state.read().await.writes.authorisation_updates
    }

    /// Makes every subsequent read of an authorisation fail with `error`, until cleared with `None`.
    pub async fn fail_reads(&self, error: Option<PersistenceError>) {
        self.state.write().await.fail_reads = error;
    }

    /// Makes the next authorisation update fail with `error`. The update is not applied.
    pub async fn fail_next_update(&self, error: PersistenceError) {
        self.state.write().await.fail_next_update = Some(error);
    }

    /// Makes the next parent status write that comes with an authorisation update fail with `error`. Like a rolled
    /// back transaction, neither the authorisation nor its parent is changed.
    pub async fn fail_next_parent_status(&self, error: PersistenceError) {
        self.state.write().await.fail_next_parent_status = Some(error);
    }

    /// Moves the expiry of an authorisation into the past, without counting it as a write.
    pub async fn expire_authorisation(&self, authorisation_id: &str) {
        if let Some(a) = self.state.write().await.authorisation_mut(authorisation_id) {
            a.expires_at = Utc::now() - Duration::seconds(1);
        }
    }

    /// Simulates a write by someone else, so that updates based on the previous version become stale.
    pub async fn bump_version(&self, authorisation_id: &str) {
        if let Some(a) = self.state.write().await.authorisation_mut(authorisation_id) {
            a.version += 1;
        }
    }
}

impl Xs2aDatabase for InMemoryDatabase {
    fn url(&self) -> &str {
        "memory://"
    }
}

impl AuthorisationManagement for InMemoryDatabase {
    async fn fetch_authorisation(&self, authorisation_id: &str) -> Result<Option<Authorisation>, PersistenceError> {
        let state = self.state.read().await;
        state.check_reads()?;
        Ok(state.authorisations.iter().find(|a| a.id == authorisation_id).cloned())
    }

    async fn fetch_authorisations_for_parent(
        &self,
        parent_id: &str,
        kind: AuthorisationKind,
    ) -> Result<Vec<Authorisation>, PersistenceError> {
        let state = self.state.read().await;
        state.check_reads()?;
        Ok(state.authorisations.iter().filter(|a| a.parent_id == parent_id && a.kind == kind).cloned().collect())
    }

    async fn insert_authorisation(&self, authorisation: NewAuthorisation) -> Result<Authorisation, PersistenceError> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let authorisation = Authorisation {
            id: format!("{:032x}", rand::random::<u128>()),
            parent_id: authorisation.parent_id,
            kind: authorisation.kind,
            sca_status: ScaStatus::Received,
            sca_approach: authorisation.sca_approach,
            psu_id_data: authorisation.psu_id_data,
            chosen_sca_method: None,
            challenge_data: None,
            sca_authentication_data: None,
            expires_at: authorisation.expires_at,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        state.authorisations.push(authorisation.clone());
        state.writes.authorisation_inserts += 1;
        Ok(authorisation)
    }

    async fn update_authorisation(
        &self,
        authorisation_id: &str,
        expected_version: i64,
        update: AuthorisationUpdate,
    ) -> Result<Authorisation, PersistenceError> {
        let mut state = self.state.write().await;
        if let Some(e) = state.fail_next_update.take() {
            warn!("🗃️🔐️ Injected failure for update of authorisation {authorisation_id}: {e}");
            return Err(e);
        }
        let authorisation = state
            .authorisation_mut(authorisation_id)
            .ok_or_else(|| PersistenceError::AuthorisationNotFound(authorisation_id.to_string()))?;
        if authorisation.sca_status.is_finalised() {
            return Err(PersistenceError::AuthorisationFinalised(authorisation.id.clone(), authorisation.sca_status));
        }
        if authorisation.version != expected_version {
            return Err(PersistenceError::StaleWrite { id: authorisation_id.to_string(), expected_version });
        }
        let parent_id = authorisation.parent_id.clone();
        if let Some(status) = update.parent_status {
            state.check_parent_status(&parent_id, status)?;
        }
        let authorisation = state
            .authorisation_mut(authorisation_id)
            .ok_or_else(|| PersistenceError::AuthorisationNotFound(authorisation_id.to_string()))?;
        authorisation.sca_status = update.sca_status;
        if let Some(psu) = update.psu_id_data {
            authorisation.psu_id_data = psu;
        }
        if let Some(method) = update.chosen_sca_method {
            authorisation.chosen_sca_method = Some(method);
        }
        if let Some(challenge) = update.challenge_data {
            authorisation.challenge_data = Some(challenge);
        }
        if let Some(secret) = update.sca_authentication_data {
            authorisation.sca_authentication_data = Some(secret);
        }
        authorisation.version += 1;
        authorisation.updated_at = Utc::now();
        let authorisation = authorisation.clone();
        state.writes.authorisation_updates += 1;
        if matches!(authorisation.sca_status, ScaStatus::Finalised | ScaStatus::Exempted) {
            state.aggregate_parent_status(&authorisation);
        }
        if let Some(status) = update.parent_status {
            state.write_parent_status(&parent_id, status);
        }
        Ok(authorisation)
    }
}

impl ConsentManagement for InMemoryDatabase {
    async fn insert_consent(&self, consent: NewConsent) -> Result<AisConsent, PersistenceError> {
        let mut state = self.state.write().await;
        if state.consents.contains_key(&consent.consent_id) {
            return Err(PersistenceError::AlreadyExists(format!("Consent {}", consent.consent_id)));
        }
        let now = Utc::now();
        let consent = AisConsent {
            consent_id: consent.consent_id,
            consent_status: ConsentStatus::Received,
            psu_data: consent.psu_data,
            multilevel_sca_required: consent.multilevel_sca_required,
            recurring_indicator: consent.recurring_indicator,
            frequency_per_day: consent.frequency_per_day,
            valid_until: consent.valid_until,
            created_at: now,
            updated_at: now,
        };
        state.consents.insert(consent.consent_id.clone(), consent.clone());
        Ok(consent)
    }

    async fn fetch_consent(&self, consent_id: &str) -> Result<Option<AisConsent>, PersistenceError> {
        Ok(self.state.read().await.consents.get(consent_id).cloned())
    }

    async fn update_consent_status(
        &self,
        consent_id: &str,
        status: ConsentStatus,
    ) -> Result<AisConsent, PersistenceError> {
        let mut state = self.state.write().await;
        let consent = state
            .consents
            .get_mut(consent_id)
            .ok_or_else(|| PersistenceError::ConsentNotFound(consent_id.to_string()))?;
        consent.consent_status = status;
        consent.updated_at = Utc::now();
        let consent = consent.clone();
        state.writes.consent_status_updates += 1;
        Ok(consent)
    }
}

impl PaymentManagement for InMemoryDatabase {
    async fn insert_payment(&self, payment: NewPayment) -> Result<PisCommonPayment, PersistenceError> {
        let mut state = self.state.write().await;
        if state.payments.contains_key(&payment.payment_id) {
            return Err(PersistenceError::AlreadyExists(format!("Payment {}", payment.payment_id)));
        }
        let now = Utc::now();
        let payment = PisCommonPayment {
            payment_id: payment.payment_id,
            payment_type: payment.payment_type,
            payment_product: payment.payment_product,
            transaction_status: payment.transaction_status,
            psu_data: payment.psu_data,
            multilevel_sca_required: payment.multilevel_sca_required,
            payment_data: payment.payment_data,
            payment: payment.payment,
            created_at: now,
            updated_at: now,
        };
        state.payments.insert(payment.payment_id.clone(), payment.clone());
        Ok(payment)
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<Option<PisCommonPayment>, PersistenceError> {
        Ok(self.state.read().await.payments.get(payment_id).cloned())
    }

    async fn save_payment_object(
        &self,
        payment_id: &str,
        payment: &PaymentObject,
    ) -> Result<PisCommonPayment, PersistenceError> {
        let mut state = self.state.write().await;
        let stored = state
            .payments
            .get_mut(payment_id)
            .ok_or_else(|| PersistenceError::PaymentNotFound(payment_id.to_string()))?;
        stored.payment = Some(payment.clone());
        stored.updated_at = Utc::now();
        let stored = stored.clone();
        state.writes.payment_objects_saved += 1;
        Ok(stored)
    }

    async fn update_transaction_status(
        &self,
        payment_id: &str,
        status: TransactionStatus,
    ) -> Result<PisCommonPayment, PersistenceError> {
        let mut state = self.state.write().await;
        let payment = state
            .payments
            .get_mut(payment_id)
            .ok_or_else(|| PersistenceError::PaymentNotFound(payment_id.to_string()))?;
        payment.transaction_status = status;
        payment.updated_at = Utc::now();
        let payment = payment.clone();
        state.writes.transaction_status_updates += 1;
        Ok(payment)
    }
}
