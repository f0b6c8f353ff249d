use crate::advective::debug::DebugQuantity;
use crate::advective::element::{ActiveElement, AdvectedParticle};
use crate::advective::state::{AdvectiveState, SlabAllocator};
use crate::advective::target::{ChainedTarget, CurrentTarget, ReconstructionTarget, RhoTarget};
use crate::config::AdvectiveConfig;
use crate::error::{ElementId, FaceId, ReconstructionError};
use crate::listener::{EventCounter, WarningSink, LOG_WARNINGS};
use crate::mesh::{ElementFinder, ElementInfo, FaceSide, MeshTopology};
use crate::particles::ParticleState;
use crate::reference::ReferenceMatrices;
use crate::shape::ShapeFunction;
use itertools::izip;
use log::debug;
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::fmt::Write;
use std::ops::Range;

/// Position of a face-coupling record within the mesh's face groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FaceLocator {
    boundary: bool,
    pair: usize,
}

/// Both sides of a face as seen from one of its elements.
struct ResolvedFace<'m> {
    this: &'m FaceSide,
    index_list: &'m [usize],
    /// Opposite side and its index list, `None` on the domain boundary.
    opposite: Option<(&'m FaceSide, &'m [usize])>,
}

/// Reconstructs particle densities by advecting a local density blob per particle.
///
/// The reconstructor is stateless with respect to particles: all particle data lives in an
/// [`AdvectiveState`], which the reconstructor is the only writer of.
pub struct AdvectiveReconstructor<'a, M> {
    mesh: &'a M,
    config: AdvectiveConfig,
    matrices: ReferenceMatrices,
    integral_weights: DVector<f64>,
    face_locators: FxHashMap<(ElementId, FaceId), FaceLocator>,
    warnings: &'a dyn WarningSink,
    activation_counter: EventCounter,
    kill_counter: EventCounter,
}

impl<'a, M> AdvectiveReconstructor<'a, M>
where
    M: MeshTopology,
{
    pub fn new(
        mesh: &'a M,
        config: AdvectiveConfig,
        matrices: ReferenceMatrices,
    ) -> Result<Self, ReconstructionError> {
        config.validate()?;
        if config.dofs_per_element > 0 {
            matrices.validate(config.dofs_per_element)?;
        }
        let dofs = config.dofs_per_element;
        for element in mesh.elements() {
            if element.faces.len() > config.faces_per_element {
                return Err(ReconstructionError::DimensionMismatch {
                    what: "element faces",
                    expected: config.faces_per_element,
                    actual: element.faces.len(),
                });
            }
            if dofs > 0 && element.node_count() != dofs {
                return Err(ReconstructionError::DimensionMismatch {
                    what: "element nodes",
                    expected: dofs,
                    actual: element.node_count(),
                });
            }
        }

        let mut face_locators = FxHashMap::default();
        for (group, boundary) in [(mesh.interior_faces(), false), (mesh.boundary_faces(), true)] {
            for (pair_index, pair) in group.pairs.iter().enumerate() {
                let locator = FaceLocator {
                    boundary,
                    pair: pair_index,
                };
                if !boundary && pair.opp.is_none() {
                    return Err(ReconstructionError::CrossBoundaryLookup {
                        element: pair.loc.element,
                        face: pair.loc.face,
                    });
                }
                // Boundary records only couple their own side
                let sides = std::iter::once(&pair.loc).chain(pair.opp.as_ref().filter(|_| !boundary));
                for side in sides {
                    if dofs > 0 {
                        let index_list = group.index_lists.get(side.index_list).ok_or(
                            ReconstructionError::MissingFaceCoupling {
                                element: side.element,
                                face: side.face,
                            },
                        )?;
                        if index_list.len() != matrices.face_length() {
                            return Err(ReconstructionError::DimensionMismatch {
                                what: "face index list",
                                expected: matrices.face_length(),
                                actual: index_list.len(),
                            });
                        }
                    }
                    if face_locators.insert((side.element, side.face), locator).is_some() {
                        return Err(ReconstructionError::FaceLookupMismatch {
                            element: side.element,
                            face: side.face,
                        });
                    }
                }
            }
        }

        let integral_weights = matrices.integral_weights();
        Ok(Self {
            mesh,
            config,
            matrices,
            integral_weights,
            face_locators,
            warnings: &LOG_WARNINGS,
            activation_counter: EventCounter::default(),
            kill_counter: EventCounter::default(),
        })
    }

    /// Replaces the default sink, which forwards warnings to the `log` facade.
    pub fn with_warning_sink(self, warnings: &'a dyn WarningSink) -> Self {
        Self { warnings, ..self }
    }

    pub fn mesh(&self) -> &'a M {
        self.mesh
    }

    pub fn config(&self) -> &AdvectiveConfig {
        &self.config
    }

    pub fn reference_matrices(&self) -> &ReferenceMatrices {
        &self.matrices
    }

    pub fn dimensions_mesh(&self) -> usize {
        self.mesh.dimensions()
    }

    /// Counts slot allocations, i.e. element activations including those at injection.
    pub fn activation_counter(&self) -> &EventCounter {
        &self.activation_counter
    }

    /// Counts slot releases.
    pub fn kill_counter(&self) -> &EventCounter {
        &self.kill_counter
    }

    /// Registers the differentiation matrix along the given reference axis, in axis order.
    pub fn add_local_diff_matrix(
        &mut self,
        coordinate: usize,
        matrix: DMatrix<f64>,
    ) -> Result<(), ReconstructionError> {
        let dofs = self.config.dofs_per_element;
        if dofs > 0 && matrix.shape() != (dofs, dofs) {
            return Err(ReconstructionError::DimensionMismatch {
                what: "local diff matrix",
                expected: dofs,
                actual: matrix.nrows(),
            });
        }
        self.matrices.add_local_diff_matrix(coordinate, matrix)
    }

    fn dofs(&self) -> usize {
        self.config.dofs_per_element
    }

    fn element_info(&self, element: ElementId) -> Result<&'a ElementInfo, ReconstructionError> {
        let mesh: &'a M = self.mesh;
        mesh.elements()
            .get(element)
            .ok_or(ReconstructionError::UnknownElement(element))
    }

    fn slot_range(&self, el: &ActiveElement) -> Range<usize> {
        el.start_index..el.start_index + self.dofs()
    }

    /// Allocates coefficient storage for one element.
    pub fn allocate_element(&self, slab: &mut SlabAllocator) -> Result<usize, ReconstructionError> {
        let start = slab.allocate(self.dofs())?;
        self.activation_counter.tick();
        Ok(start)
    }

    /// Releases the coefficient storage of one element.
    pub fn deallocate_element(&self, slab: &mut SlabAllocator, start: usize) -> Result<(), ReconstructionError> {
        slab.deallocate(start, self.dofs())?;
        self.kill_counter.tick();
        Ok(())
    }

    /// Integral of an element's density.
    pub fn element_integral(&self, jacobian: f64, coefficients: &[f64]) -> f64 {
        jacobian * self.integral_weights.dot(&DVectorView::from_slice(coefficients, coefficients.len()))
    }

    /// Integral of the absolute value of an element's density, measured through its coefficients.
    pub fn element_l1(&self, jacobian: f64, coefficients: &[f64]) -> f64 {
        jacobian
            * self
                .integral_weights
                .iter()
                .zip(coefficients)
                .map(|(w, u)| w * u.abs())
                .sum::<f64>()
    }

    fn check_particles(
        &self,
        particles: &ParticleState,
        state: &AdvectiveState,
        velocities: Option<&[f64]>,
    ) -> Result<(), ReconstructionError> {
        if state.particles.len() > particles.particle_count() {
            return Err(ReconstructionError::DimensionMismatch {
                what: "particle count",
                expected: state.particles.len(),
                actual: particles.particle_count(),
            });
        }
        if let Some(velocities) = velocities {
            particles.check_velocities(velocities)?;
            if particles.dimensions_velocity < self.dimensions_mesh() {
                return Err(ReconstructionError::DimensionMismatch {
                    what: "velocity components",
                    expected: self.dimensions_mesh(),
                    actual: particles.dimensions_velocity,
                });
            }
        }
        Ok(())
    }

    fn check_len(&self, what: &'static str, state: &AdvectiveState, v: &[f64]) -> Result<(), ReconstructionError> {
        if v.len() != state.rho().len() {
            return Err(ReconstructionError::DimensionMismatch {
                what,
                expected: state.rho().len(),
                actual: v.len(),
            });
        }
        Ok(())
    }

    /// Velocity of particle `pn` restricted to the mesh dimensions.
    fn mesh_velocity<'v>(&self, particles: &ParticleState, velocities: &'v [f64], pn: usize) -> &'v [f64] {
        &particles.velocity(velocities, pn)[..self.dimensions_mesh()]
    }

    /// Multiplies `matrix` into every slot of `input`.
    fn batched_product(&self, matrix: &DMatrix<f64>, input: &[f64]) -> Vec<f64> {
        let dofs = self.dofs();
        let mut output = vec![0.0; input.len()];
        if dofs == 0 {
            return output;
        }
        output
            .par_chunks_mut(dofs)
            .zip(input.par_chunks(dofs))
            .for_each(|(out, x)| {
                let mut out = DVectorViewMut::from_slice(out, dofs);
                out.gemv(1.0, matrix, &DVectorView::from_slice(x, dofs), 0.0);
            });
        output
    }

    /// Injects the representation of particle `pn`.
    ///
    /// Particles must be injected in sequence. The shape function is sampled on every element
    /// its support touches, and the samples are scaled so that the density integrates to the
    /// particle's charge.
    pub fn add_advective_particle(
        &self,
        particles: &ParticleState,
        state: &mut AdvectiveState,
        shape_function: ShapeFunction,
        pn: usize,
    ) -> Result<(), ReconstructionError>
    where
        M: ElementFinder,
    {
        if pn != state.particles.len() {
            return Err(ReconstructionError::ParticleOutOfSequence {
                expected: state.particles.len(),
                actual: pn,
            });
        }
        if pn >= particles.particle_count() {
            return Err(ReconstructionError::DimensionMismatch {
                what: "particle count",
                expected: pn + 1,
                actual: particles.particle_count(),
            });
        }
        if particles.dimensions_pos != self.dimensions_mesh() {
            return Err(ReconstructionError::DimensionMismatch {
                what: "particle position",
                expected: self.dimensions_mesh(),
                actual: particles.dimensions_pos,
            });
        }

        let dofs = self.dofs();
        if dofs == 0 {
            return Err(ReconstructionError::UninitializedDofs);
        }
        let center = particles.position(pn);
        let mut particle = AdvectedParticle::new(shape_function);
        let mut offset = vec![0.0; center.len()];

        for element in self.mesh.find_covering_elements(center, shape_function.radius()) {
            if particle.find_element(element).is_some() {
                return Err(ReconstructionError::DuplicateElement { particle: pn, element });
            }
            let einfo = self.element_info(element)?;
            if einfo.node_count() != dofs {
                return Err(ReconstructionError::DimensionMismatch {
                    what: "element nodes",
                    expected: dofs,
                    actual: einfo.node_count(),
                });
            }

            let start = self.allocate_element(&mut state.slab)?;
            let rho = state.slab.rho_mut();
            for (i, node) in (einfo.node_start..einfo.node_end).enumerate() {
                for (o, x, c) in izip!(&mut offset, self.mesh.node(node), center) {
                    *o = x - c;
                }
                rho[start + i] = shape_function.evaluate(&offset);
            }
            particle.elements.push(ActiveElement::new(element, start, 0));
        }

        // Connect face neighbors within the particle
        let element_ids: Vec<ElementId> = particle.elements.iter().map(|el| el.element_id).collect();
        for el in &mut particle.elements {
            let einfo = self.element_info(el.element_id)?;
            for (face, info) in einfo.faces.iter().enumerate() {
                if let Some(neighbor) = info.neighbor {
                    if element_ids.contains(&neighbor) {
                        el.connections[face] = Some(neighbor);
                    }
                }
            }
        }

        // Scale so that the amount of charge is correct
        let rho = state.slab.rho_mut();
        let mut total_unscaled_mass = 0.0;
        for el in &particle.elements {
            let jacobian = self.element_info(el.element_id)?.jacobian;
            total_unscaled_mass += self.element_integral(jacobian, &rho[self.slot_range(el)]);
        }

        let charge = particles.charges[pn];
        let scale = if total_unscaled_mass == 0.0 {
            self.warnings.note_warning(&format!(
                "reconstructed initial particle mass is zero (particle {}, #elements={})",
                pn,
                particle.elements.len()
            ));
            charge
        } else {
            charge / total_unscaled_mass
        };

        for el in &particle.elements {
            for value in &mut rho[self.slot_range(el)] {
                *value *= scale;
            }
        }

        state.particles.push(particle);
        Ok(())
    }

    /// Looks up the face-coupling record of face `face` of `element` and orients it.
    fn resolve_face(&self, element: ElementId, face: FaceId) -> Result<ResolvedFace<'a>, ReconstructionError> {
        let locator = self
            .face_locators
            .get(&(element, face))
            .ok_or(ReconstructionError::MissingFaceCoupling { element, face })?;
        let mesh: &'a M = self.mesh;
        let group = if locator.boundary {
            mesh.boundary_faces()
        } else {
            mesh.interior_faces()
        };
        let pair = &group.pairs[locator.pair];

        let is_side_b = pair.loc.element != element || pair.loc.face != face;
        let (this, opposite) = match (&pair.opp, is_side_b) {
            (None, true) => return Err(ReconstructionError::CrossBoundaryLookup { element, face }),
            (None, false) => (&pair.loc, None),
            (Some(opp), true) => {
                if opp.element != element || opp.face != face {
                    return Err(ReconstructionError::FaceLookupMismatch { element, face });
                }
                (opp, Some(&pair.loc))
            }
            (Some(opp), false) => (&pair.loc, Some(opp)),
        };

        Ok(ResolvedFace {
            this,
            index_list: group.index_list(this.index_list),
            opposite: opposite.map(|side| (side, group.index_list(side.index_list))),
        })
    }

    /// Computes the face fluxes of all particles' densities.
    ///
    /// Elements whose outflow faces carry enough density activate their downstream neighbors,
    /// which may grow the coefficient vector. The returned vector matches its final size.
    pub fn calculate_fluxes(
        &self,
        particles: &ParticleState,
        state: &mut AdvectiveState,
        velocities: &[f64],
    ) -> Result<DVector<f64>, ReconstructionError> {
        if self.config.activation_threshold == 0.0 {
            return Err(ReconstructionError::ZeroActivationThreshold);
        }
        self.check_particles(particles, state, Some(velocities))?;

        let dofs = self.dofs();
        let alpha = self.config.upwind_alpha;
        let face_mass = self.matrices.face_mass();
        let face_length = self.matrices.face_length();
        let AdvectiveState {
            slab,
            particles: advected,
        } = state;
        let mut fluxes = vec![0.0; slab.rho().len()];

        for (pn, p) in advected.iter_mut().enumerate() {
            // Reference value for activation, fixed for the whole particle
            let shape_peak = p.shape_function.peak() * particles.charges[pn];
            let v = self.mesh_velocity(particles, velocities, pn);

            // Elements activated on the way are visited as well
            let mut i_el = 0;
            while i_el < p.elements.len() {
                for face in 0..self.config.faces_per_element {
                    let en = p.elements[i_el].element_id;
                    let resolved = self.resolve_face(en, face)?;
                    let this = resolved.this;
                    let idx_list = resolved.index_list;

                    let n_dot_v: f64 = v.iter().zip(&this.normal).map(|(a, b)| a * b).sum();
                    let inflow = n_dot_v <= 0.0;
                    let inflow_indicator = if inflow { 1.0 } else { 0.0 };
                    let mut active = p.elements[i_el].connections[face].is_some();

                    if resolved.opposite.is_none() && active {
                        return Err(ReconstructionError::BoundaryConnection { element: en, face });
                    }

                    let int_coeff =
                        this.face_jacobian * (-n_dot_v) * (alpha * inflow_indicator + (1.0 - alpha) * 0.5);
                    let ext_coeff =
                        this.face_jacobian * (-n_dot_v) * (alpha * -inflow_indicator + (1.0 - alpha) * -0.5);

                    let this_base = p.elements[i_el].start_index;

                    if let (Some((opposite, _)), false, false) = (resolved.opposite, active, inflow) {
                        let rho = slab.rho();
                        let max_density = idx_list[..face_length]
                            .iter()
                            .map(|&i| rho[this_base + i].abs())
                            .fold(0.0, f64::max);

                        if max_density > self.config.activation_threshold * shape_peak.abs() {
                            let opp_en = opposite.element;
                            self.activate_element(slab, p, opp_en, (en, face))?;
                            if slab.rho().len() != fluxes.len() {
                                fluxes.resize(slab.rho().len(), 0.0);
                            }
                            debug!(
                                "Activated element {} for particle {} across (el:{},face:{})",
                                opp_en, pn, en, face
                            );
                            active = true;
                        }
                    }

                    let rho = slab.rho();
                    if active {
                        let Some((opposite, opp_idx_list)) = resolved.opposite else {
                            return Err(ReconstructionError::BoundaryConnection { element: en, face });
                        };
                        let neighbor = p.elements[i_el].connections[face].unwrap_or(opposite.element);
                        let opp_el = p.find_element(neighbor).ok_or_else(|| {
                            debug!("{}", self.dump_particle(p));
                            ReconstructionError::MissingConnectedElement {
                                element: en,
                                face,
                                neighbor,
                            }
                        })?;
                        let opp_base = opp_el.start_index;

                        for i in 0..face_length {
                            let mut addition = 0.0;
                            for j in 0..face_length {
                                let fmm_entry = face_mass[(i, j)];
                                addition += rho[this_base + idx_list[j]] * int_coeff * fmm_entry
                                    + rho[opp_base + opp_idx_list[j]] * ext_coeff * fmm_entry;
                            }
                            fluxes[this_base + idx_list[i]] += addition;
                        }
                    } else if inflow {
                        // The missing neighbor carries no density
                        for i in 0..face_length {
                            let mut addition = 0.0;
                            for j in 0..face_length {
                                addition += rho[this_base + idx_list[j]] * int_coeff * face_mass[(i, j)];
                            }
                            fluxes[this_base + idx_list[i]] += addition;
                        }
                    }
                }
                i_el += 1;
            }
        }

        debug_assert!(fluxes.len() == slab.rho().len() && fluxes.len() % dofs.max(1) == 0);
        Ok(DVector::from_vec(fluxes))
    }

    /// Adds `opp_en` to the particle as a zero-density element and links it with its
    /// active face neighbors.
    fn activate_element(
        &self,
        slab: &mut SlabAllocator,
        p: &mut AdvectedParticle,
        opp_en: ElementId,
        (en, face): (ElementId, FaceId),
    ) -> Result<(), ReconstructionError> {
        if p.find_element(opp_en).is_some() {
            return Err(ReconstructionError::UnlinkedActiveNeighbor {
                element: en,
                face,
                neighbor: opp_en,
            });
        }
        let opp_einfo = self.element_info(opp_en)?;

        let start = self.allocate_element(slab)?;
        slab.rho_mut()[start..start + self.dofs()].fill(0.0);
        let mut opp_element = ActiveElement::new(opp_en, start, self.config.activation_min_life);

        for (opp_face, info) in opp_einfo.faces.iter().enumerate() {
            let Some(neighbor) = info.neighbor else {
                continue;
            };
            if p.find_element(neighbor).is_none() {
                continue;
            }
            // The coupling record names the face of the neighbor that points back, which
            // need not be the only face shared with it
            let neighbor_face = match self.resolve_face(opp_en, opp_face)?.opposite {
                Some((side, _)) if side.element == neighbor => side.face,
                _ => {
                    return Err(ReconstructionError::AsymmetricAdjacency {
                        element: opp_en,
                        neighbor,
                    })
                }
            };
            opp_element.connections[opp_face] = Some(neighbor);
            if let Some(neighbor_el) = p.find_element_mut(neighbor) {
                neighbor_el.connections[neighbor_face] = Some(opp_en);
            }
        }

        p.elements.push(opp_element);
        Ok(())
    }

    /// Computes the element-local part `-v · ∇rho` of the right-hand side.
    pub fn calculate_local_div(
        &self,
        particles: &ParticleState,
        state: &AdvectiveState,
        velocities: &[f64],
    ) -> Result<DVector<f64>, ReconstructionError> {
        self.check_particles(particles, state, Some(velocities))?;
        let dims = self.dimensions_mesh();
        let diff_matrices = self.matrices.local_diff_matrices();
        if diff_matrices.len() != dims {
            return Err(ReconstructionError::DimensionMismatch {
                what: "local diff matrices",
                expected: dims,
                actual: diff_matrices.len(),
            });
        }

        let rho = state.rho();
        let rst_derivatives: Vec<Vec<f64>> = diff_matrices
            .iter()
            .map(|matrix| self.batched_product(matrix, rho))
            .collect();

        let mut local_div = DVector::<f64>::zeros(rho.len());
        for (pn, p) in state.particles.iter().enumerate() {
            let v = self.mesh_velocity(particles, velocities, pn);
            for el in &p.elements {
                let inverse_map = &self.element_info(el.element_id)?.inverse_map;
                let range = self.slot_range(el);
                for (loc_axis, derivative) in rst_derivatives.iter().enumerate() {
                    let coeff: f64 = v
                        .iter()
                        .enumerate()
                        .map(|(glob_axis, v_glob)| -v_glob * inverse_map[(loc_axis, glob_axis)])
                        .sum();
                    let mut target = local_div.rows_mut(range.start, range.len());
                    for (t, d) in target.iter_mut().zip(&derivative[range.clone()]) {
                        *t += coeff * d;
                    }
                }
            }
        }
        Ok(local_div)
    }

    /// Applies the inverse mass matrix of every element to `operand`.
    ///
    /// Slots not held by any element are zero in the result.
    pub fn apply_elementwise_inverse_mass_matrix(
        &self,
        state: &AdvectiveState,
        operand: &[f64],
    ) -> Result<DVector<f64>, ReconstructionError> {
        self.check_len("inverse mass operand", state, operand)?;
        let mut result = self.batched_product(self.matrices.inverse_mass(), operand);

        for p in &state.particles {
            for el in &p.elements {
                let jacobian = self.element_info(el.element_id)?.jacobian;
                for value in &mut result[self.slot_range(el)] {
                    *value /= jacobian;
                }
            }
        }
        let dofs = self.dofs();
        for &slot in state.slab.freelist() {
            result[slot * dofs..(slot + 1) * dofs].fill(0.0);
        }
        Ok(DVector::from_vec(result))
    }

    /// Right-hand side of the density evolution, `local_div - M⁻¹ fluxes`.
    ///
    /// Flux evaluation runs first, since it may grow the coefficient vector.
    pub fn get_advective_particle_rhs(
        &self,
        particles: &ParticleState,
        state: &mut AdvectiveState,
        velocities: &[f64],
    ) -> Result<DVector<f64>, ReconstructionError> {
        let fluxes = self.calculate_fluxes(particles, state, velocities)?;
        let local_div = self.calculate_local_div(particles, state, velocities)?;
        let minv_fluxes = self.apply_elementwise_inverse_mass_matrix(state, fluxes.as_slice())?;
        Ok(local_div - minv_fluxes)
    }

    /// Adds a right-hand side increment to the coefficient vector, through the filter if
    /// one is configured.
    pub fn apply_advective_particle_rhs(
        &self,
        state: &mut AdvectiveState,
        rhs: &[f64],
    ) -> Result<(), ReconstructionError> {
        self.check_len("right-hand side", state, rhs)?;
        let dofs = self.dofs();
        let rho = state.slab.rho_mut();
        match self.matrices.filter() {
            Some(filter) if dofs > 0 => {
                rho.par_chunks_mut(dofs)
                    .zip(rhs.par_chunks(dofs))
                    .for_each(|(r, x)| {
                        let mut r = DVectorViewMut::from_slice(r, dofs);
                        r.gemv(1.0, filter, &DVectorView::from_slice(x, dofs), 1.0);
                    });
            }
            _ => {
                for (r, x) in rho.iter_mut().zip(rhs) {
                    *r += x;
                }
            }
        }
        Ok(())
    }

    /// Retires elements whose share of their particle's charge has become negligible.
    ///
    /// Elements still protected by their minimum lifetime are kept, and their remaining
    /// lifetime is decremented.
    pub fn perform_reconstructor_upkeep(
        &self,
        particles: &ParticleState,
        state: &mut AdvectiveState,
    ) -> Result<(), ReconstructionError> {
        if self.config.kill_threshold == 0.0 {
            return Err(ReconstructionError::ZeroKillThreshold);
        }
        self.check_particles(particles, state, None)?;

        let AdvectiveState {
            slab,
            particles: advected,
        } = state;

        for (pn, p) in advected.iter_mut().enumerate() {
            let particle_charge = particles.charges[pn].abs();
            let mut i_el = 0;
            while i_el < p.elements.len() {
                let el = &mut p.elements[i_el];
                el.min_life = el.min_life.saturating_sub(1);
                let jacobian = self.element_info(el.element_id)?.jacobian;
                let element_charge = self.element_l1(jacobian, &slab.rho()[self.slot_range(el)]);

                if el.min_life == 0 && element_charge < self.config.kill_threshold * particle_charge {
                    let retired = p.elements.remove(i_el);
                    for (face, connection) in retired.connections.iter().enumerate() {
                        let Some(neighbor) = *connection else {
                            continue;
                        };
                        let sibling = p.find_element_mut(neighbor).ok_or(
                            ReconstructionError::MissingConnectedElement {
                                element: retired.element_id,
                                face,
                                neighbor,
                            },
                        )?;
                        sibling.disconnect(retired.element_id);
                    }
                    self.deallocate_element(slab, retired.start_index)?;
                    debug!("Retired element {} of particle {}", retired.element_id, pn);
                } else {
                    i_el += 1;
                }
            }
        }
        Ok(())
    }

    /// Copies the representations of particles `from..from + size` over `to..to + size`,
    /// releasing the storage previously held by the destination particles.
    ///
    /// Source and destination share storage afterwards, so the source particles are expected
    /// to be dropped through [`note_change_size`](Self::note_change_size).
    pub fn note_move(
        &self,
        state: &mut AdvectiveState,
        from: usize,
        to: usize,
        size: usize,
    ) -> Result<(), ReconstructionError> {
        let count = state.particles.len();
        let end = from.max(to) + size;
        if end > count {
            return Err(ReconstructionError::InvalidParticleCount {
                current: count,
                requested: end,
            });
        }
        for i in 0..size {
            if from + i == to + i {
                continue;
            }
            for el in &state.particles[to + i].elements {
                self.deallocate_element(&mut state.slab, el.start_index)?;
            }
            state.particles[to + i] = state.particles[from + i].clone();
        }
        Ok(())
    }

    /// Shrinks the particle collection to `particle_count` particles.
    pub fn note_change_size(
        &self,
        state: &mut AdvectiveState,
        particle_count: usize,
    ) -> Result<(), ReconstructionError> {
        if particle_count > state.particles.len() {
            return Err(ReconstructionError::InvalidParticleCount {
                current: state.particles.len(),
                requested: particle_count,
            });
        }
        state.particles.truncate(particle_count);
        Ok(())
    }

    /// Feeds the element coefficients of the given particles to `target`.
    pub fn reconstruct_densities_on_target<T>(
        &self,
        state: &AdvectiveState,
        target: &mut T,
        particle_range: Range<usize>,
    ) -> Result<(), ReconstructionError>
    where
        T: ReconstructionTarget + ?Sized,
    {
        if particle_range.end > state.particles.len() {
            return Err(ReconstructionError::InvalidParticleCount {
                current: state.particles.len(),
                requested: particle_range.end,
            });
        }
        let rho = state.rho();
        for pn in particle_range {
            target.begin_particle(pn);
            for el in &state.particles[pn].elements {
                let einfo = self.element_info(el.element_id)?;
                target.add_shape_on_element(el.element_id, einfo.node_start, &rho[self.slot_range(el)]);
            }
            target.end_particle(pn);
        }
        Ok(())
    }

    /// Charge density of all particles on the mesh nodes.
    pub fn reconstruct_rho(&self, state: &AdvectiveState) -> Result<DVector<f64>, ReconstructionError> {
        let mut target = RhoTarget::new(self.mesh.node_count());
        self.reconstruct_densities_on_target(state, &mut target, 0..state.particles.len())?;
        Ok(target.into_result())
    }

    /// Current density of all particles on the mesh nodes, with interleaved components.
    pub fn reconstruct_j(
        &self,
        particles: &ParticleState,
        state: &AdvectiveState,
        velocities: &[f64],
    ) -> Result<DVector<f64>, ReconstructionError> {
        self.check_particles(particles, state, Some(velocities))?;
        let mut target = CurrentTarget::new(self.mesh.node_count(), particles.dimensions_velocity, velocities);
        self.reconstruct_densities_on_target(state, &mut target, 0..state.particles.len())?;
        Ok(target.into_result())
    }

    /// Charge and current density in a single pass.
    pub fn reconstruct_densities(
        &self,
        particles: &ParticleState,
        state: &AdvectiveState,
        velocities: &[f64],
    ) -> Result<(DVector<f64>, DVector<f64>), ReconstructionError> {
        self.check_particles(particles, state, Some(velocities))?;
        let node_count = self.mesh.node_count();
        let mut target = ChainedTarget::new(
            RhoTarget::new(node_count),
            CurrentTarget::new(node_count, particles.dimensions_velocity, velocities),
        );
        self.reconstruct_densities_on_target(state, &mut target, 0..state.particles.len())?;
        let (rho, j) = target.into_parts();
        Ok((rho.into_result(), j.into_result()))
    }

    /// Sums per-slot data of every active element onto the element's mesh nodes.
    pub fn map_particle_space_to_mesh_space(
        &self,
        state: &AdvectiveState,
        pspace: &[f64],
    ) -> Result<DVector<f64>, ReconstructionError> {
        self.check_len("particle space vector", state, pspace)?;
        let mut result = DVector::<f64>::zeros(self.mesh.node_count());
        for p in &state.particles {
            for el in &p.elements {
                let einfo = self.element_info(el.element_id)?;
                let mut target = result.rows_mut(einfo.node_start, einfo.node_count());
                for (t, x) in target.iter_mut().zip(&pspace[self.slot_range(el)]) {
                    *t += x;
                }
            }
        }
        Ok(result)
    }

    /// Number of particles holding each mesh node as part of an active element.
    pub fn get_active_elements(&self, state: &AdvectiveState) -> Result<DVector<f64>, ReconstructionError> {
        let mut result = DVector::<f64>::zeros(self.mesh.node_count());
        for p in &state.particles {
            for el in &p.elements {
                let einfo = self.element_info(el.element_id)?;
                result.rows_mut(einfo.node_start, einfo.node_count()).add_scalar_mut(1.0);
            }
        }
        Ok(result)
    }

    /// Evaluates an intermediate quantity of the right-hand side on the mesh nodes.
    ///
    /// Quantities involving fluxes may activate elements, just like a regular evaluation.
    pub fn get_debug_quantity_on_mesh(
        &self,
        particles: &ParticleState,
        state: &mut AdvectiveState,
        quantity: DebugQuantity,
        velocities: &[f64],
    ) -> Result<DVector<f64>, ReconstructionError> {
        match quantity {
            DebugQuantity::Rhs => {
                let rhs = self.get_advective_particle_rhs(particles, state, velocities)?;
                self.map_particle_space_to_mesh_space(state, rhs.as_slice())
            }
            DebugQuantity::ActiveElements => self.get_active_elements(state),
            DebugQuantity::Fluxes => {
                let fluxes = self.calculate_fluxes(particles, state, velocities)?;
                self.map_particle_space_to_mesh_space(state, fluxes.as_slice())
            }
            DebugQuantity::MinvFluxes => {
                let fluxes = self.calculate_fluxes(particles, state, velocities)?;
                let minv_fluxes = self.apply_elementwise_inverse_mass_matrix(state, fluxes.as_slice())?;
                self.map_particle_space_to_mesh_space(state, minv_fluxes.as_slice())
            }
            DebugQuantity::LocalDiv => {
                let local_div = self.calculate_local_div(particles, state, velocities)?;
                self.map_particle_space_to_mesh_space(state, local_div.as_slice())
            }
        }
    }

    /// Renders the element graph of a particle, one line per element with its
    /// connections (`X` for none).
    pub fn dump_particle(&self, particle: &AdvectedParticle) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "particle, radius {}", particle.shape_function.radius());
        for el in &particle.elements {
            let _ = write!(out, "#{} cnx:(", el.element_id);
            for connection in &el.connections[..self.config.faces_per_element] {
                match connection {
                    Some(neighbor) => {
                        let _ = write!(out, "{},", neighbor);
                    }
                    None => out.push_str("X,"),
                }
            }
            out.push_str(")\n");
        }
        out
    }
}
