mod sca_world;
mod setups;
mod steps;

pub use sca_world::ScaWorld;
