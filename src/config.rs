//! Configuration of the advective reconstruction engine.
use crate::error::ReconstructionError;
use serde::{Deserialize, Serialize};

/// Upper bound on the number of faces of a mesh element.
///
/// Six faces accommodate every element shape the engine deals with, up to hexahedra.
pub const MAX_FACES: usize = 6;

fn default_upwind_alpha() -> f64 {
    1.0
}

fn default_activation_min_life() -> u32 {
    10
}

/// Parameters of the advective reconstruction.
///
/// Zero thresholds and a zero DOF count are *not* rejected by [`validate`](Self::validate):
/// they are reported by the first operation that depends on them, so that a partially
/// configured engine can still be constructed and inspected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvectiveConfig {
    /// Number of faces of every mesh element.
    pub faces_per_element: usize,
    /// Number of coefficients of an element's local density representation.
    pub dofs_per_element: usize,
    /// Fraction of the shape peak that face coefficients must exceed to activate a neighbor.
    pub activation_threshold: f64,
    /// Fraction of the particle charge below which an element is retired.
    pub kill_threshold: f64,
    /// Blend between upwind (1) and centered (0) fluxes.
    #[serde(default = "default_upwind_alpha")]
    pub upwind_alpha: f64,
    /// Number of upkeep cycles a dynamically activated element is protected from retirement.
    #[serde(default = "default_activation_min_life")]
    pub activation_min_life: u32,
}

impl AdvectiveConfig {
    pub fn new(
        faces_per_element: usize,
        dofs_per_element: usize,
        activation_threshold: f64,
        kill_threshold: f64,
    ) -> Self {
        Self {
            faces_per_element,
            dofs_per_element,
            activation_threshold,
            kill_threshold,
            upwind_alpha: default_upwind_alpha(),
            activation_min_life: default_activation_min_life(),
        }
    }

    pub fn with_upwind_alpha(self, upwind_alpha: f64) -> Self {
        Self { upwind_alpha, ..self }
    }

    pub fn with_activation_min_life(self, activation_min_life: u32) -> Self {
        Self {
            activation_min_life,
            ..self
        }
    }

    pub fn validate(&self) -> Result<(), ReconstructionError> {
        if self.faces_per_element == 0 || self.faces_per_element > MAX_FACES {
            return Err(ReconstructionError::InvalidConfig(format!(
                "faces_per_element must be in 1..={}, got {}",
                MAX_FACES, self.faces_per_element
            )));
        }
        if !(0.0..=1.0).contains(&self.upwind_alpha) {
            return Err(ReconstructionError::InvalidConfig(format!(
                "upwind_alpha must be in [0, 1], got {}",
                self.upwind_alpha
            )));
        }
        for (name, value) in [
            ("activation_threshold", self.activation_threshold),
            ("kill_threshold", self.kill_threshold),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ReconstructionError::InvalidConfig(format!(
                    "{} must be finite and non-negative, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}
