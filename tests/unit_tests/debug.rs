use super::{engine, inject, quad_config, quad_mesh};
use advecta::advective::DebugQuantity;
use advecta::error::ReconstructionError;
use advecta::mesh::MeshTopology;
use matrixcompare::assert_matrix_eq;
use nalgebra::DVector;

#[test]
fn quantity_names_parse_back() {
    for quantity in DebugQuantity::ALL {
        assert_eq!(quantity.to_string().parse::<DebugQuantity>(), Ok(quantity));
    }
    assert_eq!("minv_fluxes".parse::<DebugQuantity>(), Ok(DebugQuantity::MinvFluxes));
    assert_eq!(
        "bogus".parse::<DebugQuantity>(),
        Err(ReconstructionError::InvalidDebugQuantity("bogus".to_string()))
    );
}

#[test]
fn active_elements_count_particles_per_node() {
    let mesh = quad_mesh(2);
    let engine = engine(&mesh, quad_config(0.1, 0.01));
    let (particles, mut state) = inject(&engine, 0.15, &[([0.5, 0.5], 1.0), ([0.1, 0.1], 1.0)]);

    let active = engine
        .get_debug_quantity_on_mesh(&particles, &mut state, DebugQuantity::ActiveElements, &[0.0; 4])
        .unwrap();
    // The first particle covers all four elements, the second only the lower left one
    let mut expected = DVector::repeat(16, 1.0);
    expected.rows_mut(0, 4).fill(2.0);
    assert_eq!(active, expected);
}

#[test]
fn local_div_on_mesh_matches_mapped_local_div() {
    let mesh = quad_mesh(3);
    let engine = engine(&mesh, quad_config(0.1, 0.01));
    let (particles, mut state) = inject(&engine, 0.3, &[([0.5, 0.4], 1.0)]);
    let velocities = [0.4, 0.9];

    let local_div = engine.calculate_local_div(&particles, &state, &velocities).unwrap();
    let expected = engine
        .map_particle_space_to_mesh_space(&state, local_div.as_slice())
        .unwrap();
    let on_mesh = engine
        .get_debug_quantity_on_mesh(&particles, &mut state, DebugQuantity::LocalDiv, &velocities)
        .unwrap();
    assert_matrix_eq!(on_mesh, expected, comp = abs, tol = 1e-14);
}

#[test]
fn rhs_on_mesh_combines_fluxes_and_local_div() {
    let mesh = quad_mesh(3);
    let engine = engine(&mesh, quad_config(1e6, 0.01));
    let (particles, mut state) = inject(&engine, 0.3, &[([0.5, 0.4], 1.0)]);
    let velocities = [0.4, 0.9];

    let mut query = |quantity| {
        engine
            .get_debug_quantity_on_mesh(&particles, &mut state, quantity, &velocities)
            .unwrap()
    };
    let rhs = query(DebugQuantity::Rhs);
    let local_div = query(DebugQuantity::LocalDiv);
    let minv_fluxes = query(DebugQuantity::MinvFluxes);
    let fluxes = query(DebugQuantity::Fluxes);

    assert_eq!(fluxes.len(), mesh.node_count());
    assert_matrix_eq!(rhs, local_div - minv_fluxes, comp = abs, tol = 1e-10);
}

#[test]
fn particle_dump_lists_connections() {
    let single = quad_mesh(1);
    let reconstructor = engine(&single, quad_config(0.1, 0.5));
    let (_, state) = inject(&reconstructor, 1.0, &[([0.5, 0.5], 1.0)]);
    assert_eq!(
        reconstructor.dump_particle(state.particle(0).unwrap()),
        "particle, radius 1\n#0 cnx:(X,X,X,X,)\n"
    );

    let grid = quad_mesh(2);
    let reconstructor = engine(&grid, quad_config(0.1, 0.5));
    let (_, state) = inject(&reconstructor, 0.1, &[([0.5, 0.25], 1.0)]);
    assert_eq!(
        reconstructor.dump_particle(state.particle(0).unwrap()),
        "particle, radius 0.1\n#0 cnx:(X,1,X,X,)\n#1 cnx:(X,X,X,0,)\n"
    );
}
