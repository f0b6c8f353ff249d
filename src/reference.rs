//! Matrices of the reference element shared by all mesh elements.
use crate::error::ReconstructionError;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

pub mod lagrange;

/// Reference-element operators in the nodal basis.
///
/// All matrices act on the coefficients of a single element. The differentiation matrices
/// are indexed by reference coordinate axis and must be registered in axis order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceMatrices {
    mass: DMatrix<f64>,
    inverse_mass: DMatrix<f64>,
    face_mass: DMatrix<f64>,
    filter: Option<DMatrix<f64>>,
    local_diff_matrices: Vec<DMatrix<f64>>,
}

impl ReferenceMatrices {
    pub fn new(mass: DMatrix<f64>, inverse_mass: DMatrix<f64>, face_mass: DMatrix<f64>) -> Self {
        Self {
            mass,
            inverse_mass,
            face_mass,
            filter: None,
            local_diff_matrices: Vec::new(),
        }
    }

    /// Sets the filter applied to right-hand sides. An empty matrix disables filtering.
    pub fn with_filter(self, filter: DMatrix<f64>) -> Self {
        let filter = (filter.nrows() > 0 && filter.ncols() > 0).then_some(filter);
        Self { filter, ..self }
    }

    /// Registers the differentiation matrix along the given reference axis.
    ///
    /// Axes must be registered in order `0, 1, ...`.
    pub fn add_local_diff_matrix(
        &mut self,
        coordinate: usize,
        matrix: DMatrix<f64>,
    ) -> Result<(), ReconstructionError> {
        if coordinate != self.local_diff_matrices.len() {
            return Err(ReconstructionError::DiffMatrixOutOfOrder {
                expected: self.local_diff_matrices.len(),
                actual: coordinate,
            });
        }
        if !self.mass.is_empty() && matrix.shape() != self.mass.shape() {
            return Err(ReconstructionError::DimensionMismatch {
                what: "local diff matrix",
                expected: self.mass.nrows(),
                actual: matrix.nrows(),
            });
        }
        self.local_diff_matrices.push(matrix);
        Ok(())
    }

    pub fn mass(&self) -> &DMatrix<f64> {
        &self.mass
    }

    pub fn inverse_mass(&self) -> &DMatrix<f64> {
        &self.inverse_mass
    }

    pub fn face_mass(&self) -> &DMatrix<f64> {
        &self.face_mass
    }

    pub fn filter(&self) -> Option<&DMatrix<f64>> {
        self.filter.as_ref()
    }

    pub fn local_diff_matrices(&self) -> &[DMatrix<f64>] {
        &self.local_diff_matrices
    }

    /// Quadrature weights of the nodal basis, `M * 1`.
    pub fn integral_weights(&self) -> DVector<f64> {
        &self.mass * DVector::repeat(self.mass.ncols(), 1.0)
    }

    /// Number of nodes on a single face.
    pub fn face_length(&self) -> usize {
        self.face_mass.nrows()
    }

    /// Checks that all matrices fit elements with `dofs_per_element` coefficients.
    pub fn validate(&self, dofs_per_element: usize) -> Result<(), ReconstructionError> {
        let square = |what, m: &DMatrix<f64>, n: usize| {
            if m.nrows() != n {
                Err(ReconstructionError::DimensionMismatch {
                    what,
                    expected: n,
                    actual: m.nrows(),
                })
            } else if m.ncols() != n {
                Err(ReconstructionError::DimensionMismatch {
                    what,
                    expected: n,
                    actual: m.ncols(),
                })
            } else {
                Ok(())
            }
        };
        square("mass matrix", &self.mass, dofs_per_element)?;
        square("inverse mass matrix", &self.inverse_mass, dofs_per_element)?;
        if let Some(filter) = &self.filter {
            square("filter matrix", filter, dofs_per_element)?;
        }
        for diff in &self.local_diff_matrices {
            square("local diff matrix", diff, dofs_per_element)?;
        }
        square("face mass matrix", &self.face_mass, self.face_mass.nrows())?;
        if self.face_mass.nrows() > dofs_per_element {
            return Err(ReconstructionError::DimensionMismatch {
                what: "face mass matrix",
                expected: dofs_per_element,
                actual: self.face_mass.nrows(),
            });
        }
        Ok(())
    }
}
