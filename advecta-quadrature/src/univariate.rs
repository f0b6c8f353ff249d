//! Gauss-Legendre rules on the reference interval `[-1, 1]`.

use crate::{Error, Rule};
use std::f64::consts::PI;

/// Evaluates the Legendre polynomial `P_n` and its derivative at `x` with the three-term
/// recurrence `m P_m = (2m - 1) x P_{m-1} - (m - 1) P_{m-2}`.
///
/// The derivative formula divides by `x^2 - 1`, so `x` must lie in the open interval.
fn legendre(n: usize, x: f64) -> (f64, f64) {
    let (mut current, mut previous) = (1.0, 0.0);
    for m in 1..=n {
        let m = m as f64;
        let next = ((2.0 * m - 1.0) * x * current - (m - 1.0) * previous) / m;
        previous = current;
        current = next;
    }
    let derivative = n as f64 * (x * current - previous) / (x * x - 1.0);
    (current, derivative)
}

/// Returns the `n`-point Gauss-Legendre rule as `(weights, points)`, points in ascending order.
///
/// The rule integrates polynomials of degree up to `2n - 1` exactly.
pub fn try_gauss(n: usize) -> Result<(Vec<f64>, Vec<f64>), Error> {
    if n == 0 {
        return Err(Error::InvalidRuleSize);
    }

    let mut weights = vec![0.0; n];
    let mut points = vec![0.0; n];

    // Roots are symmetric about the origin, so only the upper half is computed
    for i in 0..(n + 1) / 2 {
        let mut x = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        for _ in 0..100 {
            let (p, dp) = legendre(n, x);
            let dx = -p / dp;
            x += dx;
            if dx.abs() <= 1e-15 {
                break;
            }
        }
        let (_, dp) = legendre(n, x);
        let w = 2.0 / ((1.0 - x * x) * dp * dp);

        points[n - 1 - i] = x;
        weights[n - 1 - i] = w;
        points[i] = -x;
        weights[i] = w;
    }

    Ok((weights, points))
}

/// Like [`try_gauss`], but returns a one-dimensional [`Rule`].
///
/// # Panics
///
/// Panics if zero points are requested.
pub fn gauss(n: usize) -> Rule {
    let (weights, points) = try_gauss(n).expect("number of points must be positive");
    Rule::from_weights_and_coords(1, weights, points)
}
