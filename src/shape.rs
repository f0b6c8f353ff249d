//! Compactly supported radial shape functions.
use crate::error::ReconstructionError;
use advecta_quadrature::radial::try_integrate_ball;
use serde::{Deserialize, Serialize};

/// Number of radial Gauss points used to compute the normalizer.
///
/// Exact for integer exponents up to 22 in three dimensions.
const NORMALIZER_QUADRATURE_POINTS: usize = 24;

/// A radial bump `normalizer * (l - r²/l)^α` supported on the ball of radius `l`.
///
/// The normalizer is chosen so that the bump integrates to one over its support.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShapeFunction {
    normalizer: f64,
    alpha: f64,
    radius: f64,
    radius_squared: f64,
}

impl ShapeFunction {
    /// Constructs a shape function with the default exponent `α = 2`.
    ///
    /// # Panics
    ///
    /// Panics if the radius is not positive, or if `dimensions` is not in `1..=3`.
    pub fn new(radius: f64, dimensions: usize) -> Self {
        Self::with_exponent(radius, dimensions, 2.0)
    }

    /// Same as [`try_with_exponent`](Self::try_with_exponent), but panics on invalid parameters.
    pub fn with_exponent(radius: f64, dimensions: usize, alpha: f64) -> Self {
        Self::try_with_exponent(radius, dimensions, alpha).expect("Invalid shape function parameters")
    }

    pub fn try_new(radius: f64, dimensions: usize) -> Result<Self, ReconstructionError> {
        Self::try_with_exponent(radius, dimensions, 2.0)
    }

    pub fn try_with_exponent(radius: f64, dimensions: usize, alpha: f64) -> Result<Self, ReconstructionError> {
        if !(radius.is_finite() && radius > 0.0) {
            return Err(ReconstructionError::InvalidConfig(format!(
                "shape function radius must be finite and positive, got {}",
                radius
            )));
        }
        if !alpha.is_finite() {
            return Err(ReconstructionError::InvalidConfig(format!(
                "shape function exponent must be finite, got {}",
                alpha
            )));
        }
        let radius_squared = radius * radius;
        let unnormalized = |r: f64| (radius - r * r / radius).max(0.0).powf(alpha);
        let integral = try_integrate_ball(dimensions, radius, NORMALIZER_QUADRATURE_POINTS, unnormalized)
            .map_err(|_| {
                ReconstructionError::InvalidConfig(format!(
                    "shape functions are only supported in 1 to 3 dimensions, got {}",
                    dimensions
                ))
            })?;
        Ok(Self {
            normalizer: 1.0 / integral,
            alpha,
            radius,
            radius_squared,
        })
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn exponent(&self) -> f64 {
        self.alpha
    }

    pub fn normalizer(&self) -> f64 {
        self.normalizer
    }

    /// Evaluates the shape function at the offset `r` from its center.
    pub fn evaluate(&self, r: &[f64]) -> f64 {
        let r_squared: f64 = r.iter().map(|x| x * x).sum();
        self.evaluate_squared(r_squared)
    }

    /// Value at the center of the support.
    pub fn peak(&self) -> f64 {
        self.evaluate_squared(0.0)
    }

    fn evaluate_squared(&self, r_squared: f64) -> f64 {
        if r_squared > self.radius_squared {
            0.0
        } else {
            self.normalizer * (self.radius - r_squared / self.radius).powf(self.alpha)
        }
    }
}
