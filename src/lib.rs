pub mod advective;
pub mod config;
pub mod error;
pub mod listener;
pub mod mesh;
pub mod particles;
pub mod reference;
pub mod shape;

pub extern crate nalgebra;

pub mod quadrature {
    pub use advecta_quadrature::*;
}

pub use advective::{AdvectiveReconstructor, AdvectiveState};
pub use config::AdvectiveConfig;
pub use error::ReconstructionError;
