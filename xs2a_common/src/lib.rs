//! Types and helpers shared by the XS2A crates.
mod helpers;
mod secret;

pub use helpers::{env_flag, parse_boolean_flag};
pub use secret::Secret;
