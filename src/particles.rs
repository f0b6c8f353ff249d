//! Per-particle state consumed by the reconstruction engine.
use crate::error::ReconstructionError;
use serde::{Deserialize, Serialize};

/// Positions and charges of all particles, stored as flat interleaved arrays.
///
/// Particle `pn` has position `positions[pn * dimensions_pos .. (pn + 1) * dimensions_pos]`
/// and charge `charges[pn]`. Velocities are not stored here: they are passed to every
/// operation that needs them, strided by [`dimensions_velocity`](Self::dimensions_velocity).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleState {
    pub dimensions_pos: usize,
    pub dimensions_velocity: usize,
    pub positions: Vec<f64>,
    pub charges: Vec<f64>,
}

impl ParticleState {
    pub fn new(dimensions_pos: usize, dimensions_velocity: usize) -> Self {
        Self {
            dimensions_pos,
            dimensions_velocity,
            positions: Vec::new(),
            charges: Vec::new(),
        }
    }

    /// Appends a particle and returns its index.
    ///
    /// # Panics
    ///
    /// Panics if the position does not have `dimensions_pos` components.
    pub fn push(&mut self, position: &[f64], charge: f64) -> usize {
        assert_eq!(position.len(), self.dimensions_pos, "Position dimension mismatch");
        self.positions.extend_from_slice(position);
        self.charges.push(charge);
        self.charges.len() - 1
    }

    pub fn particle_count(&self) -> usize {
        self.charges.len()
    }

    pub fn position(&self, pn: usize) -> &[f64] {
        let d = self.dimensions_pos;
        &self.positions[d * pn..d * (pn + 1)]
    }

    /// The velocity of particle `pn` within a flat velocity array.
    pub fn velocity<'v>(&self, velocities: &'v [f64], pn: usize) -> &'v [f64] {
        let d = self.dimensions_velocity;
        &velocities[d * pn..d * (pn + 1)]
    }

    /// Checks that a flat velocity array covers every particle.
    pub fn check_velocities(&self, velocities: &[f64]) -> Result<(), ReconstructionError> {
        let expected = self.dimensions_velocity * self.particle_count();
        if velocities.len() != expected {
            return Err(ReconstructionError::DimensionMismatch {
                what: "velocities",
                expected,
                actual: velocities.len(),
            });
        }
        Ok(())
    }
}
