//! Integration of radially symmetric functions over balls.
//!
//! A radial function `f(|x|)` on the `d`-dimensional ball of radius `R` satisfies
//! `∫ f = S_{d-1} ∫_0^R r^{d-1} f(r) dr`, where `S_{d-1}` is the surface measure of the unit
//! sphere. The radial integral is evaluated with a Gauss rule mapped to `[0, R]`.

use crate::univariate::try_gauss;
use crate::Error;
use std::f64::consts::PI;

/// Surface measure of the unit sphere in `dim` dimensions.
///
/// Only `dim` in `1..=3` is supported, which covers all meshes of interest.
pub fn unit_sphere_measure(dim: usize) -> Option<f64> {
    match dim {
        1 => Some(2.0),
        2 => Some(2.0 * PI),
        3 => Some(4.0 * PI),
        _ => None,
    }
}

/// Integrates the radial profile `f` over the `dim`-dimensional ball of the given radius.
pub fn try_integrate_ball(
    dim: usize,
    radius: f64,
    num_points: usize,
    f: impl Fn(f64) -> f64,
) -> Result<f64, Error> {
    let sphere = unit_sphere_measure(dim).ok_or(Error::InvalidRuleSize)?;
    let (weights, points) = try_gauss(num_points)?;
    let half = 0.5 * radius;
    let radial: f64 = weights
        .iter()
        .zip(&points)
        .map(|(w, xi)| {
            let r = half * (xi + 1.0);
            w * half * r.powi(dim as i32 - 1) * f(r)
        })
        .sum();
    Ok(sphere * radial)
}
