use cucumber::given;
use xs2a_sca_engine::{db_types::ScaApproach, ScaConfig};

use crate::cucumber::{sca_world::ScaSystem, ScaWorld};

#[given("a fresh install")]
async fn fresh_database(world: &mut ScaWorld) {
    let config = ScaConfig::default().with_default_sca_approach(ScaApproach::Embedded);
    world.system = Some(ScaSystem::new(config).await);
}

#[given("a fresh install where payment authorisations must be confirmed")]
async fn fresh_database_with_confirmation(world: &mut ScaWorld) {
    let config = ScaConfig::default().with_default_sca_approach(ScaApproach::Embedded).with_confirmation_mandated(true);
    world.system = Some(ScaSystem::new(config).await);
}

#[given("a fresh install where authorisations expire immediately")]
async fn fresh_database_with_short_expiry(world: &mut ScaWorld) {
    let config = ScaConfig::default()
        .with_default_sca_approach(ScaApproach::Embedded)
        .with_authorisation_expiry(chrono::Duration::milliseconds(1));
    world.system = Some(ScaSystem::new(config).await);
}
