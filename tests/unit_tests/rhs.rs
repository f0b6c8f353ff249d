use super::{engine, inject, particle_integral, quad_config, quad_mesh};
use advecta::advective::AdvectiveReconstructor;
use advecta::error::ReconstructionError;
use advecta::mesh::MeshTopology;
use advecta::reference::lagrange::linear_reference_matrices;
use matrixcompare::assert_matrix_eq;
use nalgebra::{DMatrix, DVector, DVectorView};

#[test]
fn local_div_of_linear_density() {
    let mesh = quad_mesh(1);
    let engine = engine(&mesh, quad_config(0.1, 0.5));
    let (particles, mut state) = inject(&engine, 1.0, &[([0.5, 0.5], 1.0)]);
    // rho = x on the unit square, transported with v = (2, 0)
    state.element_dofs_mut(0, 0).unwrap().copy_from_slice(&[0.0, 1.0, 0.0, 1.0]);

    let local_div = engine.calculate_local_div(&particles, &state, &[2.0, 0.0]).unwrap();
    assert_matrix_eq!(local_div, DVector::repeat(4, -2.0), comp = abs, tol = 1e-12);

    let local_div = engine.calculate_local_div(&particles, &state, &[0.0, 0.0]).unwrap();
    assert_matrix_eq!(local_div, DVector::zeros(4), comp = abs, tol = 1e-12);
}

#[test]
fn local_div_requires_one_diff_matrix_per_axis() {
    let mesh = quad_mesh(1);
    let matrices = linear_reference_matrices(2).unwrap();
    let stripped = advecta::reference::ReferenceMatrices::new(
        matrices.mass().clone(),
        matrices.inverse_mass().clone(),
        matrices.face_mass().clone(),
    );
    let mut engine = AdvectiveReconstructor::new(&mesh, quad_config(0.1, 0.5), stripped).unwrap();
    let (particles, state) = inject(&engine, 1.0, &[([0.5, 0.5], 1.0)]);

    let result = engine.calculate_local_div(&particles, &state, &[1.0, 0.0]);
    assert_eq!(
        result,
        Err(ReconstructionError::DimensionMismatch {
            what: "local diff matrices",
            expected: 2,
            actual: 0
        })
    );

    for (axis, diff) in matrices.local_diff_matrices().iter().enumerate() {
        engine.add_local_diff_matrix(axis, diff.clone()).unwrap();
    }
    assert!(engine.calculate_local_div(&particles, &state, &[1.0, 0.0]).is_ok());
}

#[test]
fn inverse_mass_undoes_the_element_mass_matrix() {
    let mesh = quad_mesh(2);
    let engine = engine(&mesh, quad_config(0.1, 0.01));
    let (_, state) = inject(&engine, 0.5, &[([0.5, 0.5], 1.0)]);
    let mass = engine.reference_matrices().mass();

    let u = DVector::from_column_slice(state.rho());
    let mut operand = DVector::<f64>::zeros(u.len());
    for el in state.particle(0).unwrap().elements() {
        let jacobian = mesh.elements()[el.element_id()].jacobian;
        let range = el.start_index()..el.start_index() + 4;
        let mapped = jacobian * mass * u.rows(range.start, 4);
        operand.rows_mut(range.start, 4).copy_from(&mapped);
    }

    let result = engine
        .apply_elementwise_inverse_mass_matrix(&state, operand.as_slice())
        .unwrap();
    assert_matrix_eq!(result, u, comp = abs, tol = 1e-9);
}

#[test]
fn inverse_mass_zeroes_free_slots() {
    let mesh = quad_mesh(2);
    let engine = engine(&mesh, quad_config(0.1, 0.01));
    let (particles, mut state) = inject(&engine, 0.5, &[([0.5, 0.5], 1.0)]);
    state.element_dofs_mut(0, 1).unwrap().fill(0.0);
    engine.perform_reconstructor_upkeep(&particles, &mut state).unwrap();
    assert_eq!(state.slab().freelist(), &[1]);

    let ones = vec![1.0; state.rho().len()];
    let result = engine.apply_elementwise_inverse_mass_matrix(&state, &ones).unwrap();
    assert!(result.rows(4, 4).iter().all(|&x| x == 0.0));
    assert!(result.rows(0, 4).iter().all(|&x| x != 0.0));

    assert_eq!(
        engine.apply_elementwise_inverse_mass_matrix(&state, &ones[1..]),
        Err(ReconstructionError::DimensionMismatch {
            what: "inverse mass operand",
            expected: 16,
            actual: 15
        })
    );
}

#[test]
fn rhs_combines_local_div_and_fluxes() {
    let mesh = quad_mesh(3);
    let engine = engine(&mesh, quad_config(1e6, 0.01));
    let (particles, mut state) = inject(&engine, 0.3, &[([0.45, 0.5], 1.5), ([0.6, 0.55], -0.5)]);
    let velocities = [0.3, -0.2, -0.1, 0.4];

    let mut reference_state = state.clone();
    let fluxes = engine
        .calculate_fluxes(&particles, &mut reference_state, &velocities)
        .unwrap();
    let local_div = engine
        .calculate_local_div(&particles, &reference_state, &velocities)
        .unwrap();
    let minv_fluxes = engine
        .apply_elementwise_inverse_mass_matrix(&reference_state, fluxes.as_slice())
        .unwrap();

    let rhs = engine
        .get_advective_particle_rhs(&particles, &mut state, &velocities)
        .unwrap();
    assert_eq!(rhs.len(), state.rho().len());
    assert_matrix_eq!(rhs, local_div - minv_fluxes, comp = abs, tol = 1e-12);
}

#[test]
fn rhs_conserves_particle_charge() {
    let mesh = quad_mesh(5);
    let engine = engine(&mesh, quad_config(1e-9, 1e-6));
    let (particles, mut state) = inject(&engine, 0.15, &[([0.5, 0.5], 1.0)]);
    let velocities = [0.7, -0.4];

    let rhs = engine
        .get_advective_particle_rhs(&particles, &mut state, &velocities)
        .unwrap();
    let charge_rate = particle_integral(&engine, &state, rhs.as_slice(), 0);
    assert!(charge_rate.abs() < 1e-8, "charge changes at rate {}", charge_rate);
}

#[test]
fn rhs_is_added_to_coefficients() {
    let mesh = quad_mesh(2);
    let engine = engine(&mesh, quad_config(0.1, 0.01));
    let (_, mut state) = inject(&engine, 0.5, &[([0.5, 0.5], 1.0)]);
    let before = DVector::from_column_slice(state.rho());

    let rhs: Vec<f64> = (0..before.len()).map(|i| i as f64).collect();
    engine.apply_advective_particle_rhs(&mut state, &rhs).unwrap();
    let expected = &before + DVectorView::from_slice(&rhs, rhs.len());
    assert_matrix_eq!(DVector::from_column_slice(state.rho()), expected, comp = abs, tol = 1e-12);

    assert_eq!(
        engine.apply_advective_particle_rhs(&mut state, &rhs[..3]),
        Err(ReconstructionError::DimensionMismatch {
            what: "right-hand side",
            expected: 16,
            actual: 3
        })
    );
}

#[test]
fn rhs_is_filtered_before_it_is_added() {
    let mesh = quad_mesh(2);
    let matrices = linear_reference_matrices(2)
        .unwrap()
        .with_filter(DMatrix::identity(4, 4) * 0.5);
    let engine = AdvectiveReconstructor::new(&mesh, quad_config(0.1, 0.01), matrices).unwrap();
    let (_, mut state) = inject(&engine, 0.5, &[([0.5, 0.5], 1.0)]);
    let before = DVector::from_column_slice(state.rho());

    let rhs = vec![1.0; before.len()];
    engine.apply_advective_particle_rhs(&mut state, &rhs).unwrap();
    let expected = before.add_scalar(0.5);
    assert_matrix_eq!(DVector::from_column_slice(state.rho()), expected, comp = abs, tol = 1e-12);
}

#[test]
fn empty_filter_disables_filtering() {
    let matrices = linear_reference_matrices(2).unwrap().with_filter(DMatrix::zeros(0, 0));
    assert!(matrices.filter().is_none());
}
