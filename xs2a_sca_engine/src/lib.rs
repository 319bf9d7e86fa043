//! XS2A SCA Engine
//!
//! The SCA engine drives a PSU through strong customer authentication for account information consents, payment
//! initiations and payment cancellations. It is the state machine behind the authorisation endpoints of an open
//! banking (XS2A) interface, and knows nothing about HTTP.
//!
//! The library is divided into these sections:
//! 1. The public API ([`mod@sca_api`]). [`AuthorisationApi`] starts authorisations and moves them through the SCA
//!    stages, and exposes the endpoint accessibility guard and the SCA approach resolver.
//! 2. Collaborator contracts ([`mod@traits`]). Storage backends implement [`Xs2aDatabase`], and the bank's service
//!    provider interface is reached through [`BankingSpi`].
//! 3. Storage. [`SqliteDatabase`] is the SQLite backend. The data types it stores are defined in [`mod@db_types`].
pub mod config;
pub mod db_types;
pub mod sca_api;
pub mod sca_objects;
pub mod traits;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use config::ScaConfig;
pub use sca_api::{AuthorisationAccessGuard, AuthorisationApi, ScaApproachResolver, ScaEngineError};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{
    AuthorisationManagement,
    BankingSpi,
    ConsentManagement,
    PaymentManagement,
    PersistenceError,
    SpiError,
    Xs2aDatabase,
};
