//! Linear tensor-product Lagrange elements on the reference box `[-1, 1]^d`.
//!
//! Nodes are the vertices of the box, with the first coordinate varying fastest: node
//! `k = i_0 + 2 i_1 + 4 i_2` sits at `(2 i_0 - 1, 2 i_1 - 1, 2 i_2 - 1)`.
use crate::error::ReconstructionError;
use crate::reference::ReferenceMatrices;
use advecta_quadrature::univariate::gauss;
use nalgebra::{DMatrix, Matrix2};

fn phi(i: usize, x: f64) -> f64 {
    if i == 0 {
        0.5 * (1.0 - x)
    } else {
        0.5 * (1.0 + x)
    }
}

fn phi_derivative(i: usize) -> f64 {
    if i == 0 {
        -0.5
    } else {
        0.5
    }
}

/// Mass matrix of the 1D linear element, assembled with two-point Gauss quadrature.
fn segment_mass() -> DMatrix<f64> {
    let rule = gauss(2);
    let mass = Matrix2::from_fn(|i, j| rule.integrate(|x| phi(i, x[0]) * phi(j, x[0])));
    DMatrix::from_column_slice(2, 2, mass.as_slice())
}

/// Nodal differentiation matrix of the 1D linear element, `D_ij = φ_j'(x_i)`.
fn segment_diff() -> DMatrix<f64> {
    DMatrix::from_fn(2, 2, |_, j| phi_derivative(j))
}

/// Kronecker product of per-axis factors, ordered so that axis 0 varies fastest.
fn tensor_product(factors: &[DMatrix<f64>]) -> DMatrix<f64> {
    factors
        .iter()
        .fold(DMatrix::identity(1, 1), |acc, factor| factor.kronecker(&acc))
}

/// Reference matrices of the linear Lagrange element in `dimensions` dimensions.
///
/// Includes one differentiation matrix per axis and no filter.
pub fn linear_reference_matrices(dimensions: usize) -> Result<ReferenceMatrices, ReconstructionError> {
    if !(1..=3).contains(&dimensions) {
        return Err(ReconstructionError::InvalidConfig(format!(
            "linear Lagrange elements are only available in 1 to 3 dimensions, got {}",
            dimensions
        )));
    }
    let m1 = segment_mass();
    let d1 = segment_diff();
    let identity = DMatrix::<f64>::identity(2, 2);

    let mass = tensor_product(&vec![m1.clone(); dimensions]);
    let inverse_mass = mass.clone().try_inverse().ok_or_else(|| {
        ReconstructionError::InvalidConfig("singular reference mass matrix".to_string())
    })?;
    let face_mass = tensor_product(&vec![m1; dimensions - 1]);

    let mut matrices = ReferenceMatrices::new(mass, inverse_mass, face_mass);
    for axis in 0..dimensions {
        let factors: Vec<_> = (0..dimensions)
            .map(|i| if i == axis { d1.clone() } else { identity.clone() })
            .collect();
        matrices.add_local_diff_matrix(axis, tensor_product(&factors))?;
    }
    Ok(matrices)
}
