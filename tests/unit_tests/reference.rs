use advecta::error::ReconstructionError;
use advecta::reference::lagrange::linear_reference_matrices;
use advecta::reference::ReferenceMatrices;
use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{DMatrix, DVector};

#[test]
fn linear_matrices_are_consistent() {
    for dims in 1..=3 {
        let matrices = linear_reference_matrices(dims).unwrap();
        let dofs = 1 << dims;
        assert!(matrices.validate(dofs).is_ok());
        assert_eq!(matrices.local_diff_matrices().len(), dims);
        assert_eq!(matrices.face_length(), dofs / 2);
        assert!(matrices.filter().is_none());

        let product = matrices.mass() * matrices.inverse_mass();
        assert_matrix_eq!(product, DMatrix::identity(dofs, dofs), comp = abs, tol = 1e-12);

        // The reference box [-1, 1]^d has volume 2^d
        let volume = matrices.integral_weights().sum();
        assert_scalar_eq!(volume, (1 << dims) as f64, comp = abs, tol = 1e-12);
    }
}

#[test]
fn diff_matrices_differentiate_linear_functions() {
    let matrices = linear_reference_matrices(3).unwrap();
    // f(r, s, t) = r + 2s - 3t sampled on the vertices of [-1, 1]^3
    let f = DVector::from_fn(8, |k, _| {
        let coord = |axis: usize| if (k >> axis) & 1 == 1 { 1.0 } else { -1.0 };
        coord(0) + 2.0 * coord(1) - 3.0 * coord(2)
    });
    for (axis, expected) in [1.0, 2.0, -3.0].iter().enumerate() {
        let derivative = &matrices.local_diff_matrices()[axis] * &f;
        assert_matrix_eq!(derivative, DVector::repeat(8, *expected), comp = abs, tol = 1e-12);
    }
}

#[test]
fn unsupported_dimensions_are_rejected() {
    assert!(matches!(linear_reference_matrices(0), Err(ReconstructionError::InvalidConfig(_))));
    assert!(matches!(linear_reference_matrices(4), Err(ReconstructionError::InvalidConfig(_))));
}

#[test]
fn diff_matrices_must_be_registered_in_order() {
    let identity = DMatrix::<f64>::identity(2, 2);
    let mut matrices = ReferenceMatrices::new(identity.clone(), identity.clone(), DMatrix::identity(1, 1));

    assert_eq!(
        matrices.add_local_diff_matrix(1, identity.clone()),
        Err(ReconstructionError::DiffMatrixOutOfOrder { expected: 0, actual: 1 })
    );
    assert!(matrices.add_local_diff_matrix(0, identity).is_ok());
    assert_eq!(
        matrices.add_local_diff_matrix(1, DMatrix::identity(3, 3)),
        Err(ReconstructionError::DimensionMismatch {
            what: "local diff matrix",
            expected: 2,
            actual: 3
        })
    );
}

#[test]
fn validation_reports_the_offending_matrix() {
    let matrices = linear_reference_matrices(2).unwrap();
    assert_eq!(
        matrices.validate(8),
        Err(ReconstructionError::DimensionMismatch {
            what: "mass matrix",
            expected: 8,
            actual: 4
        })
    );

    let filtered = matrices.with_filter(DMatrix::identity(3, 3));
    assert_eq!(
        filtered.validate(4),
        Err(ReconstructionError::DimensionMismatch {
            what: "filter matrix",
            expected: 4,
            actual: 3
        })
    );
}

#[test]
fn matrices_survive_serialization() {
    let matrices = linear_reference_matrices(2)
        .unwrap()
        .with_filter(DMatrix::identity(4, 4));
    let json = serde_json::to_string(&matrices).unwrap();
    let restored: ReferenceMatrices = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, matrices);
}
