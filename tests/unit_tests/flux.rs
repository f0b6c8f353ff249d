use super::{engine, inject, quad_config, quad_mesh};
use advecta::advective::{AdvectiveReconstructor, AdvectiveState};
use advecta::error::ReconstructionError;
use advecta::mesh::procedural::create_rectangular_uniform_quad_mesh_2d;
use advecta::mesh::MeshData;
use advecta::particles::ParticleState;

/// Particle covering all four elements of a 2x2 mesh, with element 1 retired and element 0's
/// density concentrated on its right face at `face_fraction` of the particle's peak value.
pub(super) fn prepare_outflow(
    engine: &AdvectiveReconstructor<MeshData>,
    face_fraction: f64,
) -> (ParticleState, AdvectiveState) {
    let (particles, mut state) = inject(engine, 0.5, &[([0.5, 0.5], 1.0)]);
    state.element_dofs_mut(0, 1).unwrap().fill(0.0);
    engine.perform_reconstructor_upkeep(&particles, &mut state).unwrap();
    assert!(state.particle(0).unwrap().find_element(1).is_none());
    assert_eq!(state.slab().freelist(), &[1]);

    let peak = state.particle(0).unwrap().shape_function().peak() * particles.charges[0];
    let face_value = face_fraction * peak;
    state
        .element_dofs_mut(0, 0)
        .unwrap()
        .copy_from_slice(&[0.0, face_value, 0.0, face_value]);
    (particles, state)
}

#[test]
fn zero_velocity_gives_zero_flux() {
    let mesh = quad_mesh(1);
    let engine = engine(&mesh, quad_config(0.1, 0.5));
    let (particles, mut state) = inject(&engine, 1.0, &[([0.5, 0.5], 2.0)]);

    let fluxes = engine.calculate_fluxes(&particles, &mut state, &[0.0, 0.0]).unwrap();
    assert_eq!(fluxes.len(), state.rho().len());
    assert!(fluxes.iter().all(|&f| f == 0.0));
}

#[test]
fn outflow_above_threshold_activates_exactly_one_neighbor() {
    let mesh = quad_mesh(2);
    let engine = engine(&mesh, quad_config(0.1, 0.01));
    let (particles, mut state) = prepare_outflow(&engine, 0.2);
    engine.activation_counter().pop();

    let fluxes = engine.calculate_fluxes(&particles, &mut state, &[1.0, 0.0]).unwrap();
    assert_eq!(engine.activation_counter().get(), 1);
    assert_eq!(fluxes.len(), state.rho().len());

    let particle = state.particle(0).unwrap();
    assert_eq!(particle.elements().len(), 4);
    let activated = particle.find_element(1).unwrap();
    assert_eq!(activated.min_life(), 10);
    // Faces are numbered bottom, right, top, left
    assert_eq!(activated.connections()[..4], [None, None, Some(3), Some(0)]);
    assert_eq!(particle.find_element(0).unwrap().connection(1), Some(1));
    assert_eq!(particle.find_element(3).unwrap().connection(0), Some(1));
    // The freed slot of the retired element is reused
    assert_eq!(activated.start_index(), 4);
    assert!(state.rho()[4..8].iter().all(|&x| x == 0.0));
    assert!(state.slab().freelist().is_empty());

    // The neighbor is connected now, so a second evaluation must not activate it again
    engine.calculate_fluxes(&particles, &mut state, &[1.0, 0.0]).unwrap();
    assert_eq!(engine.activation_counter().get(), 1);
}

#[test]
fn outflow_below_threshold_does_not_activate() {
    let mesh = quad_mesh(2);
    let engine = engine(&mesh, quad_config(0.1, 0.01));
    let (particles, mut state) = prepare_outflow(&engine, 0.05);
    engine.activation_counter().pop();

    engine.calculate_fluxes(&particles, &mut state, &[1.0, 0.0]).unwrap();
    assert_eq!(engine.activation_counter().get(), 0);
    assert!(state.particle(0).unwrap().find_element(1).is_none());
}

#[test]
fn inflow_faces_never_activate() {
    let mesh = quad_mesh(2);
    let engine = engine(&mesh, quad_config(0.1, 0.01));
    let (particles, mut state) = prepare_outflow(&engine, 0.2);
    engine.activation_counter().pop();

    // Flow to the left makes the right face of element 0 an inflow face
    engine.calculate_fluxes(&particles, &mut state, &[-1.0, 0.0]).unwrap();
    assert_eq!(engine.activation_counter().get(), 0);
}

#[test]
fn upwind_flux_through_inflow_face_without_neighbor() {
    // Single element, flow to the left: the right face is an inflow face with no active
    // neighbor, so only the interior term contributes there
    let mesh = quad_mesh(1);
    let engine = engine(&mesh, quad_config(0.1, 0.5));
    let (particles, mut state) = inject(&engine, 1.0, &[([0.5, 0.5], 1.0)]);
    state.element_dofs_mut(0, 0).unwrap().copy_from_slice(&[0.0, 3.0, 0.0, 3.0]);

    let fluxes = engine.calculate_fluxes(&particles, &mut state, &[-2.0, 0.0]).unwrap();
    // face jacobian 1/2, -n.v = 2, face mass (1/3) [[2, 1], [1, 2]], rho = 3 on both face nodes
    let expected = 0.5 * 2.0 * 3.0;
    assert!((fluxes[1] - expected).abs() < 1e-12);
    assert!((fluxes[3] - expected).abs() < 1e-12);
    // The left face is an outflow face of a boundary element and carries no flux
    assert_eq!(fluxes[0], 0.0);
    assert_eq!(fluxes[2], 0.0);
}

/// Fluxes of a particle spanning both elements of a 2x1 mesh of unit squares, with the
/// densities `[0, 3, 0, 6]` and `[1, 0, 2, 0]` meeting at the shared face, for flow to the right.
fn shared_face_fluxes(upwind_alpha: f64) -> (Vec<f64>, [usize; 2]) {
    let mesh = create_rectangular_uniform_quad_mesh_2d([0.0, 0.0], [2.0, 1.0], [2, 1]).unwrap();
    let engine = engine(&mesh, quad_config(0.1, 0.01).with_upwind_alpha(upwind_alpha));
    let (particles, mut state) = inject(&engine, 0.8, &[([1.0, 0.5], 1.0)]);
    let particle = state.particle(0).unwrap();
    assert_eq!(particle.find_element(0).unwrap().connection(1), Some(1));
    let starts = [0, 1].map(|en| particle.find_element(en).unwrap().start_index());
    state.element_dofs_mut(0, 0).unwrap().copy_from_slice(&[0.0, 3.0, 0.0, 6.0]);
    state.element_dofs_mut(0, 1).unwrap().copy_from_slice(&[1.0, 0.0, 2.0, 0.0]);

    let fluxes = engine.calculate_fluxes(&particles, &mut state, &[1.0, 0.0]).unwrap();
    assert_eq!(engine.activation_counter().get(), 0);
    (fluxes.as_slice().to_vec(), starts)
}

#[test]
fn shared_face_flux_blends_central_and_upwind_weights() {
    // Face jacobian 1/2 and |n.v| = 1. The jump across the face, right minus left, is
    // [-2, -4], which the face mass maps to [-8/3, -10/3]. The outflow side is weighted by
    // (1 - alpha) / 4 and the inflow side by (1 + alpha) / 4.
    let cases = [
        (0.0, [-2.0 / 3.0, -5.0 / 6.0], [-2.0 / 3.0, -5.0 / 6.0]),
        (0.5, [-1.0 / 3.0, -5.0 / 12.0], [-1.0, -1.25]),
        (1.0, [0.0, 0.0], [-4.0 / 3.0, -5.0 / 3.0]),
    ];
    for (alpha, left, right) in cases {
        let (fluxes, [left_start, right_start]) = shared_face_fluxes(alpha);
        let mut expected = vec![0.0; fluxes.len()];
        // Right face of the left element, then left face of the right element
        expected[left_start + 1] = left[0];
        expected[left_start + 3] = left[1];
        expected[right_start] = right[0];
        expected[right_start + 2] = right[1];
        for (f, e) in fluxes.iter().zip(&expected) {
            assert!((f - e).abs() < 1e-12, "alpha {}: fluxes {:?}, expected {:?}", alpha, fluxes, expected);
        }
    }
}

#[test]
fn inflow_face_without_neighbor_scales_with_upwind_weight() {
    for (alpha, expected) in [(0.0, 1.5), (0.5, 2.25), (1.0, 3.0)] {
        let mesh = quad_mesh(1);
        let engine = engine(&mesh, quad_config(0.1, 0.5).with_upwind_alpha(alpha));
        let (particles, mut state) = inject(&engine, 1.0, &[([0.5, 0.5], 1.0)]);
        state.element_dofs_mut(0, 0).unwrap().copy_from_slice(&[0.0, 3.0, 0.0, 3.0]);

        let fluxes = engine.calculate_fluxes(&particles, &mut state, &[-2.0, 0.0]).unwrap();
        assert!((fluxes[1] - expected).abs() < 1e-12, "alpha {}", alpha);
        assert!((fluxes[3] - expected).abs() < 1e-12, "alpha {}", alpha);
        assert_eq!(fluxes[0], 0.0);
        assert_eq!(fluxes[2], 0.0);
    }
}

#[test]
fn zero_activation_threshold_is_a_configuration_error() {
    let mesh = quad_mesh(1);
    let engine = engine(&mesh, quad_config(0.0, 0.5));
    let (particles, mut state) = inject(&engine, 1.0, &[([0.5, 0.5], 1.0)]);

    let result = engine.calculate_fluxes(&particles, &mut state, &[1.0, 0.0]);
    assert_eq!(result, Err(ReconstructionError::ZeroActivationThreshold));
}

#[test]
fn velocity_array_must_cover_all_particles() {
    let mesh = quad_mesh(1);
    let engine = engine(&mesh, quad_config(0.1, 0.5));
    let (particles, mut state) = inject(&engine, 1.0, &[([0.5, 0.5], 1.0)]);

    let result = engine.calculate_fluxes(&particles, &mut state, &[1.0]);
    assert_eq!(
        result,
        Err(ReconstructionError::DimensionMismatch {
            what: "velocities",
            expected: 2,
            actual: 1
        })
    );
}
