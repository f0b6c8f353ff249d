//! Quadrature rules used to build reference element matrices and shape normalizers.
//!
//! All rules are defined on the reference interval `[-1, 1]` or on tensor products of it,
//! except for [`radial`] rules which integrate over the radius of a ball.

use std::fmt;
use std::fmt::{Display, Formatter};

pub mod radial;
pub mod tensor;
pub mod univariate;

/// Library-wide error type.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The requested number of points or dimensions does not describe a valid rule.
    InvalidRuleSize,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRuleSize => {
                write!(f, "a quadrature rule needs at least one point and one dimension")
            }
        }
    }
}

impl std::error::Error for Error {}

/// A quadrature rule whose points have a dimension only known at runtime.
///
/// Points are stored contiguously, `dim` coordinates per point.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    dim: usize,
    weights: Vec<f64>,
    coords: Vec<f64>,
}

impl Rule {
    pub fn from_weights_and_coords(dim: usize, weights: Vec<f64>, coords: Vec<f64>) -> Self {
        assert_eq!(weights.len() * dim, coords.len(), "coordinate count must match weights");
        Self { dim, weights, coords }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn point(&self, index: usize) -> &[f64] {
        &self.coords[self.dim * index..self.dim * (index + 1)]
    }

    pub fn iter(&self) -> impl '_ + Iterator<Item = (f64, &[f64])> {
        self.weights
            .iter()
            .copied()
            .zip(self.coords.chunks_exact(self.dim.max(1)))
    }

    /// Approximates the integral of `f` over the domain of the rule.
    pub fn integrate(&self, f: impl Fn(&[f64]) -> f64) -> f64 {
        self.iter().map(|(w, x)| w * f(x)).sum()
    }
}
