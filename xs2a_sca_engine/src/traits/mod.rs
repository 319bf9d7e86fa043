//! # Collaborator contracts
//!
//! This module defines the interfaces the SCA engine needs from the outside world. The engine owns none of the data
//! it works on: consents, payments and authorisations live in a storage backend, and PSU authentication is done by
//! the bank.
//!
//! ## Storage
//! * [`Xs2aDatabase`] is the umbrella trait a storage backend implements. It combines
//! * [`AuthorisationManagement`], the read/write contract for authorisations, with version-guarded updates,
//! * [`ConsentManagement`] for account information consents, and
//! * [`PaymentManagement`] for payments, including the materialised form of raw payment payloads.
//!
//! ## Banking backend
//! * [`BankingSpi`] is the call contract of the bank's service provider interface. The engine calls it to check
//!   exemptions, authenticate the PSU, run SCA and apply the business effect of a successful authorisation.
mod authorisation_management;
mod banking_spi;
mod consent_management;
mod payment_management;
mod xs2a_database;

mod data_objects;

pub use authorisation_management::AuthorisationManagement;
pub use banking_spi::{BankingSpi, SpiError};
pub use consent_management::ConsentManagement;
pub use data_objects::{
    AspspConsentDataHandle,
    SpiAuthorisationCode,
    SpiAuthorisationStatus,
    SpiConfirmationCodeCheckResult,
    SpiContext,
    SpiPaymentExecution,
};
pub use payment_management::PaymentManagement;
pub use xs2a_database::{PersistenceError, Xs2aDatabase};
