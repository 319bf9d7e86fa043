use futures_util::future::join_all;
use log::*;
use tokio::runtime::Runtime;
use xs2a_sca_engine::{
    db_types::{PsuIdData, ScaApproach, ScaStatus},
    sca_objects::{ErrorCategory, StartAuthorisationRequest, UpdateAuthorisationRequest},
    test_utils::{
        fake_spi::{FakeAspsp, PSU_PASSWORD},
        fixtures::seed_consent,
        prepare_env::{drop_database, prepare_test_env},
    },
    AuthorisationApi,
    ScaConfig,
    SqliteDatabase,
};

const NUM_UPDATES: usize = 20;

/// Fires a burst of identical updates at one authorisation. Every update reads the same version, so the store has to
/// turn all but the first writer of each version away.
#[test]
fn burst_updates() {
    info!("🚀️ Starting concurrent update test");

    let sys = Runtime::new().unwrap();

    sys.block_on(async move {
        let url = "sqlite://../data/test_burst_updates.db";
        prepare_test_env(url).await;
        let mut config = ScaConfig::default().with_default_sca_approach(ScaApproach::Embedded);
        config.database_url = url.to_string();
        let db = SqliteDatabase::from_config(&config).await.expect("Error creating database");
        let mut api = AuthorisationApi::new(db, FakeAspsp::new(), config);
        seed_consent(api.db(), "consent1", &["alice"], false).await.expect("Error seeding consent");
        let start = StartAuthorisationRequest::account("consent1").with_psu(PsuIdData::new("alice"));
        let auth = api.start_authorisation(start).await.expect("Error starting authorisation");

        info!("🚀️ Sending {NUM_UPDATES} updates");
        let updates = (0..NUM_UPDATES).map(|_| {
            let request =
                UpdateAuthorisationRequest::account("consent1", auth.id.as_str()).with_password(PSU_PASSWORD);
            api.update_authorisation(request)
        });
        let responses = join_all(updates).await;

        let mut written = 0i64;
        for response in responses {
            let response = response.expect("Update returned an error");
            match &response.error {
                None => written += 1,
                // Late updates may find the authorisation a stage further on, where a password is not enough.
                Some(e) => assert!(
                    matches!(e.category, ErrorCategory::Persistence | ErrorCategory::Validation),
                    "Unexpected error: {e}"
                ),
            }
        }
        let stored = api.fetch_authorisation(&auth.id).await.expect("Error fetching authorisation");
        info!("🚀️ {written} of {NUM_UPDATES} updates were written. Authorisation is {}", stored.sca_status);
        assert!(written >= 1, "No update was written");
        assert_eq!(stored.version, written, "Every successful update must be stored exactly once");
        assert!(matches!(stored.sca_status, ScaStatus::PsuIdentified | ScaStatus::PsuAuthenticated));

        if let Err(e) = api.close().await {
            error!("🚀️ Failed to close database: {e}");
        }
        drop_database(url).await;
    });
    info!("🚀️ test complete");
}
