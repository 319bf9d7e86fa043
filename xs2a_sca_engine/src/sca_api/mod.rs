//! # SCA authorisation API
//!
//! [`AuthorisationApi`] is the public face of the engine. An update travels through these parts:
//!
//! 1. [`access_guard`]: the boundary asks whether the TPP endpoint may be used at the authorisation's current stage.
//! 2. [`stage_validator`]: checks that the payload carries what the current stage needs.
//! 3. [`stages`]: one handler per SCA status moves the authorisation forward, with
//!    [`confirmation_code`] taking over when the request carries a confirmation code.
//! 4. [`processor_services`]: the per-domain services find the consent or payment, apply the business effect and
//!    write the outcome back.
//!
//! [`approach_resolver`] decides which SCA approach a new authorisation gets.
pub mod access_guard;
pub mod approach_resolver;
pub mod authorisation_api;
pub mod confirmation_code;
pub mod errors;
pub mod processor_services;
pub mod stage_validator;
pub mod stages;

#[cfg(test)]
mod test_mocks;

pub use access_guard::AuthorisationAccessGuard;
pub use approach_resolver::ScaApproachResolver;
pub use authorisation_api::AuthorisationApi;
pub use errors::ScaEngineError;
