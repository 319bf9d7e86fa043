use std::time::Duration;

use cucumber::{given, then, when};
use xs2a_sca_engine::{
    db_types::{AuthorisationKind, ConsentStatus, PsuIdData, ScaStatus, TransactionStatus},
    sca_objects::{StartAuthorisationRequest, UpdateAuthorisationRequest},
    test_utils::fixtures::{seed_consent, seed_payment, seed_raw_payment},
    AuthorisationManagement,
    ConsentManagement,
    PaymentManagement,
};

use crate::cucumber::{sca_world::ActiveAuthorisation, ScaWorld};

fn psu_list(psus: &str) -> Vec<&str> {
    psus.split(',').map(str::trim).filter(|s| !s.is_empty()).collect()
}

//--------------------------------------     Seed data      ---------------------------------------------------------

#[given(expr = "a consent {word} for PSUs {string}")]
async fn a_consent(world: &mut ScaWorld, consent_id: String, psus: String) {
    seed_consent(world.api().db(), &consent_id, &psu_list(&psus), false).await.expect("Error seeding consent");
}

#[given(expr = "a multilevel consent {word} for PSUs {string}")]
async fn a_multilevel_consent(world: &mut ScaWorld, consent_id: String, psus: String) {
    seed_consent(world.api().db(), &consent_id, &psu_list(&psus), true).await.expect("Error seeding consent");
}

#[given(expr = "a payment {word} for PSUs {string}")]
async fn a_payment(world: &mut ScaWorld, payment_id: String, psus: String) {
    seed_payment(world.api().db(), &payment_id, &psu_list(&psus), false).await.expect("Error seeding payment");
}

#[given(expr = "a multilevel payment {word} for PSUs {string}")]
async fn a_multilevel_payment(world: &mut ScaWorld, payment_id: String, psus: String) {
    seed_payment(world.api().db(), &payment_id, &psu_list(&psus), true).await.expect("Error seeding payment");
}

#[given(expr = "a raw payment {word} for PSUs {string}")]
async fn a_raw_payment(world: &mut ScaWorld, payment_id: String, psus: String) {
    seed_raw_payment(world.api().db(), &payment_id, &psu_list(&psus)).await.expect("Error seeding payment");
}

#[given(expr = "the ASPSP exempts {word} from SCA")]
async fn exemption(world: &mut ScaWorld, parent_id: String) {
    let _ = world.aspsp().clone().with_exemption_for(parent_id);
}

#[when("the ASPSP is unavailable")]
async fn aspsp_unavailable(world: &mut ScaWorld) {
    world.aspsp().set_unavailable(true);
}

#[when("the ASPSP is back")]
async fn aspsp_available(world: &mut ScaWorld) {
    world.aspsp().set_unavailable(false);
}

//--------------------------------------  Authorisation flow ---------------------------------------------------------

async fn start(world: &mut ScaWorld, psu: String, request: StartAuthorisationRequest) {
    let request = request.with_psu(PsuIdData::new(psu.as_str()));
    match world.api().start_authorisation(request).await {
        Ok(auth) => {
            let active = ActiveAuthorisation { id: auth.id, parent_id: auth.parent_id, kind: auth.kind };
            world.authorisations.insert(psu, active);
            world.last_error = None;
        },
        Err(e) => world.last_error = Some(e),
    }
}

#[when(expr = "PSU {string} starts authorising consent {word} using {word}")]
async fn start_consent(world: &mut ScaWorld, psu: String, consent_id: String, approach: String) {
    start(world, psu, StartAuthorisationRequest::account(consent_id).with_sca_approach(approach)).await;
}

#[when(expr = "PSU {string} starts authorising payment {word} using {word}")]
async fn start_payment(world: &mut ScaWorld, psu: String, payment_id: String, approach: String) {
    start(world, psu, StartAuthorisationRequest::payment_initiation(payment_id).with_sca_approach(approach)).await;
}

#[when(expr = "PSU {string} starts cancelling payment {word} using {word}")]
async fn start_cancellation(world: &mut ScaWorld, psu: String, payment_id: String, approach: String) {
    start(world, psu, StartAuthorisationRequest::payment_cancellation(payment_id).with_sca_approach(approach)).await;
}

async fn send<F>(world: &mut ScaWorld, psu: &str, f: F)
where F: FnOnce(UpdateAuthorisationRequest) -> UpdateAuthorisationRequest {
    let request = f(world.authorisation_of(psu).update_request());
    match world.api().update_authorisation(request).await {
        Ok(response) => {
            world.last_response = Some(response);
            world.last_error = None;
        },
        Err(e) => {
            world.last_response = None;
            world.last_error = Some(e);
        },
    }
}

#[when(expr = "PSU {string} submits the password {string}")]
async fn submit_password(world: &mut ScaWorld, psu: String, password: String) {
    send(world, &psu, |r| r.with_password(&password)).await;
}

#[when(expr = "PSU {string} chooses the SCA method {string}")]
async fn choose_method(world: &mut ScaWorld, psu: String, method: String) {
    send(world, &psu, |r| r.with_authentication_method(method)).await;
}

#[when(expr = "PSU {string} submits the TAN {string}")]
async fn submit_tan(world: &mut ScaWorld, psu: String, tan: String) {
    send(world, &psu, |r| r.with_sca_authentication_data(&tan)).await;
}

#[when(expr = "PSU {string} submits the confirmation code {string}")]
async fn submit_confirmation_code(world: &mut ScaWorld, psu: String, code: String) {
    send(world, &psu, |r| r.with_confirmation_code(&code)).await;
}

#[when(expr = "PSU {string} sends an empty update")]
async fn empty_update(world: &mut ScaWorld, psu: String) {
    send(world, &psu, |r| r).await;
}

#[when(expr = "PSU {string} completes SCA with the password {string} and the TAN {string}")]
async fn complete_sca(world: &mut ScaWorld, psu: String, password: String, tan: String) {
    send(world, &psu, |r| r.with_password(&password)).await;
    send(world, &psu, |r| r.with_password(&password)).await;
    send(world, &psu, |r| r.with_authentication_method("sms")).await;
    send(world, &psu, |r| r.with_sca_authentication_data(&tan)).await;
    let response = world.response();
    assert!(response.is_successful(), "SCA did not complete: {:?}", response.error);
}

#[when(expr = "I pause for {int}ms")]
async fn pause(_world: &mut ScaWorld, ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

//--------------------------------------     Assertions     ---------------------------------------------------------

#[then(expr = "the authorisation of PSU {string} is {word}")]
async fn authorisation_status(world: &mut ScaWorld, psu: String, status: ScaStatus) {
    let id = world.authorisation_of(&psu).id.clone();
    let authorisation = world
        .api()
        .db()
        .fetch_authorisation(&id)
        .await
        .expect("Error fetching authorisation")
        .expect("Authorisation {id} does not exist");
    assert_eq!(authorisation.sca_status, status, "SCA status is incorrect");
}

#[then(expr = "the response status is {word}")]
async fn response_status(world: &mut ScaWorld, status: ScaStatus) {
    let response = world.response();
    assert_eq!(response.sca_status, status, "Response status is incorrect. Error: {:?}", response.error);
}

#[then("the update succeeds")]
async fn update_succeeds(world: &mut ScaWorld) {
    let response = world.response();
    assert!(response.is_successful(), "Update failed: {:?}", response.error);
}

#[then(expr = "the update fails with {word}")]
async fn update_fails(world: &mut ScaWorld, code: String) {
    let error = world.response().error.as_ref().expect("The update did not fail");
    assert_eq!(error.code.to_string(), code, "Error code is incorrect: {error}");
}

#[then("the update is refused because the authorisation expired")]
async fn update_refused_expired(world: &mut ScaWorld) {
    let error = world.last_error.as_ref().expect("The update was not refused");
    assert!(error.is_expired(), "Unexpected error: {error}");
}

#[then(expr = "{int} SCA methods are offered")]
async fn methods_offered(world: &mut ScaWorld, count: usize) {
    assert_eq!(world.response().available_sca_methods.len(), count, "Number of SCA methods is incorrect");
}

#[then(expr = "starting the authorisation fails with {string}")]
async fn start_fails(world: &mut ScaWorld, message: String) {
    let error = world.last_error.as_ref().expect("The authorisation was started");
    assert!(error.to_string().contains(&message), "Unexpected error: {error}");
}

#[then(expr = "consent {word} has status {word}")]
async fn consent_status(world: &mut ScaWorld, consent_id: String, status: ConsentStatus) {
    let consent = world
        .api()
        .db()
        .fetch_consent(&consent_id)
        .await
        .expect("Error fetching consent")
        .expect("Consent {consent_id} does not exist");
    assert_eq!(consent.consent_status, status, "Consent status is incorrect");
}

#[then(expr = "payment {word} has transaction status {word}")]
async fn payment_status(world: &mut ScaWorld, payment_id: String, status: TransactionStatus) {
    let payment = world
        .api()
        .db()
        .fetch_payment(&payment_id)
        .await
        .expect("Error fetching payment")
        .expect("Payment {payment_id} does not exist");
    assert_eq!(payment.transaction_status, status, "Transaction status is incorrect");
}

#[then(expr = "payment {word} is materialised")]
async fn payment_materialised(world: &mut ScaWorld, payment_id: String) {
    let payment = world.api().db().fetch_payment(&payment_id).await.expect("Error fetching payment");
    assert!(payment.map(|p| p.is_materialised()).unwrap_or(false), "Payment {payment_id} is not materialised");
}

#[then(expr = "the ASPSP was asked to {word} {int} time(s)")]
async fn aspsp_calls(world: &mut ScaWorld, call: String, count: usize) {
    assert_eq!(world.aspsp().call_count(&call), count, "Calls: {:?}", world.aspsp().calls());
}

#[then(expr = "PSU {string} may update a {word} authorisation {word} a confirmation code")]
async fn endpoint_accessible(world: &mut ScaWorld, psu: String, kind: AuthorisationKind, with: String) {
    let active = world.authorisation_of(&psu).clone();
    let code = with == "with";
    let accessible = match kind {
        AuthorisationKind::Account => {
            world.api().is_account_endpoint_accessible(&active.parent_id, &active.id, code).await
        },
        _ => world.api().is_payment_endpoint_accessible(&active.id, code).await,
    };
    assert!(accessible, "The endpoint is not accessible");
}

#[then(expr = "PSU {string} may not update a {word} authorisation {word} a confirmation code")]
async fn endpoint_not_accessible(world: &mut ScaWorld, psu: String, kind: AuthorisationKind, with: String) {
    let active = world.authorisation_of(&psu).clone();
    let code = with == "with";
    let accessible = match kind {
        AuthorisationKind::Account => {
            world.api().is_account_endpoint_accessible(&active.parent_id, &active.id, code).await
        },
        _ => world.api().is_payment_endpoint_accessible(&active.id, code).await,
    };
    assert!(!accessible, "The endpoint is accessible");
}
