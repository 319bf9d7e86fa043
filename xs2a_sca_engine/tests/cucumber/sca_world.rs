use std::collections::HashMap;

use cucumber::World;
use log::*;
use xs2a_sca_engine::{
    db_types::AuthorisationKind,
    sca_objects::{AuthorisationProcessorResponse, UpdateAuthorisationRequest},
    test_utils::{
        fake_spi::FakeAspsp,
        prepare_env::{prepare_test_env, random_db_path},
    },
    AuthorisationApi,
    ScaConfig,
    ScaEngineError,
    SqliteDatabase,
};
use tokio::time::sleep;

#[derive(Default, Debug, World)]
pub struct ScaWorld {
    pub system: Option<ScaSystem>,
    /// The authorisation each PSU is working on, by PSU id.
    pub authorisations: HashMap<String, ActiveAuthorisation>,
    pub last_response: Option<AuthorisationProcessorResponse>,
    pub last_error: Option<ScaEngineError>,
}

#[derive(Debug)]
pub struct ScaSystem {
    pub db_path: String,
    pub api: AuthorisationApi<SqliteDatabase, FakeAspsp>,
    pub aspsp: FakeAspsp,
}

#[derive(Debug, Clone)]
pub struct ActiveAuthorisation {
    pub id: String,
    pub parent_id: String,
    pub kind: AuthorisationKind,
}

impl ActiveAuthorisation {
    pub fn update_request(&self) -> UpdateAuthorisationRequest {
        let (parent, id) = (self.parent_id.as_str(), self.id.as_str());
        match self.kind {
            AuthorisationKind::Account => UpdateAuthorisationRequest::account(parent, id),
            AuthorisationKind::PaymentInitiation => UpdateAuthorisationRequest::payment_initiation(parent, id),
            AuthorisationKind::PaymentCancellation => UpdateAuthorisationRequest::payment_cancellation(parent, id),
        }
    }
}

impl ScaWorld {
    pub fn api(&self) -> &AuthorisationApi<SqliteDatabase, FakeAspsp> {
        &self.system.as_ref().expect("AuthorisationApi not initialised").api
    }

    pub fn aspsp(&self) -> &FakeAspsp {
        &self.system.as_ref().expect("ASPSP not initialised").aspsp
    }

    pub fn authorisation_of(&self, psu: &str) -> &ActiveAuthorisation {
        self.authorisations.get(psu).unwrap_or_else(|| panic!("PSU {psu} has not started an authorisation"))
    }

    pub fn response(&self) -> &AuthorisationProcessorResponse {
        self.last_response.as_ref().expect("No update has been sent yet")
    }
}

impl ScaSystem {
    pub async fn new(config: ScaConfig) -> Self {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 1).await.expect("Error creating connection to database");
        debug!("🚀️ Created database: {url}");
        sleep(std::time::Duration::from_millis(50)).await;
        let aspsp = FakeAspsp::new();
        let api = AuthorisationApi::new(db, aspsp.clone(), config);
        Self { db_path: url, api, aspsp }
    }
}
