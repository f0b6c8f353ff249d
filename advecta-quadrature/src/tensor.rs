//! Gauss rules on the reference hypercube `[-1, 1]^d`, formed as tensor products.

use crate::univariate::try_gauss;
use crate::{Error, Rule};

/// Tensor-product Gauss rule with `num_points_per_dim` points along each of `dim` axes.
///
/// Points are ordered with the first coordinate varying fastest.
pub fn try_hypercube_gauss(dim: usize, num_points_per_dim: usize) -> Result<Rule, Error> {
    if dim == 0 {
        return Err(Error::InvalidRuleSize);
    }
    let (weights_1d, points_1d) = try_gauss(num_points_per_dim)?;
    let n = num_points_per_dim;
    let total = n.pow(dim as u32);

    let mut weights = Vec::with_capacity(total);
    let mut coords = Vec::with_capacity(total * dim);
    for flat in 0..total {
        let mut remainder = flat;
        let mut w = 1.0;
        for _ in 0..dim {
            let i = remainder % n;
            remainder /= n;
            w *= weights_1d[i];
            coords.push(points_1d[i]);
        }
        weights.push(w);
    }

    Ok(Rule::from_weights_and_coords(dim, weights, coords))
}

/// Like [`try_hypercube_gauss`], but panics on invalid sizes.
pub fn hypercube_gauss(dim: usize, num_points_per_dim: usize) -> Rule {
    try_hypercube_gauss(dim, num_points_per_dim).expect("dimension and number of points must be positive")
}
