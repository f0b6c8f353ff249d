//! Consumers of reconstructed particle densities.
use crate::error::ElementId;
use nalgebra::DVector;

/// Receives the per-element density contributions of particles, one particle at a time.
///
/// For every particle, [`begin_particle`](Self::begin_particle) is called first, then
/// [`add_shape_on_element`](Self::add_shape_on_element) once per active element, then
/// [`end_particle`](Self::end_particle).
pub trait ReconstructionTarget {
    fn begin_particle(&mut self, _pn: usize) {}

    /// Adds the coefficients of one element, whose nodes start at `node_start` in the mesh.
    fn add_shape_on_element(&mut self, element: ElementId, node_start: usize, coefficients: &[f64]);

    fn end_particle(&mut self, _pn: usize) {}
}

impl<T> ReconstructionTarget for &mut T
where
    T: ReconstructionTarget + ?Sized,
{
    fn begin_particle(&mut self, pn: usize) {
        (**self).begin_particle(pn)
    }

    fn add_shape_on_element(&mut self, element: ElementId, node_start: usize, coefficients: &[f64]) {
        (**self).add_shape_on_element(element, node_start, coefficients)
    }

    fn end_particle(&mut self, pn: usize) {
        (**self).end_particle(pn)
    }
}

/// Accumulates the charge density on the mesh nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct RhoTarget {
    rho: DVector<f64>,
}

impl RhoTarget {
    pub fn new(node_count: usize) -> Self {
        Self {
            rho: DVector::zeros(node_count),
        }
    }

    pub fn result(&self) -> &DVector<f64> {
        &self.rho
    }

    pub fn into_result(self) -> DVector<f64> {
        self.rho
    }
}

impl ReconstructionTarget for RhoTarget {
    fn add_shape_on_element(&mut self, _element: ElementId, node_start: usize, coefficients: &[f64]) {
        let mut rows = self.rho.rows_mut(node_start, coefficients.len());
        for (r, c) in rows.iter_mut().zip(coefficients) {
            *r += c;
        }
    }
}

/// Accumulates the current density `rho * v` on the mesh nodes.
///
/// The result holds `dimensions_velocity` interleaved components per node.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentTarget<'v> {
    j: DVector<f64>,
    velocities: &'v [f64],
    dimensions_velocity: usize,
    current_velocity: usize,
}

impl<'v> CurrentTarget<'v> {
    /// `velocities` holds `dimensions_velocity` components per particle.
    pub fn new(node_count: usize, dimensions_velocity: usize, velocities: &'v [f64]) -> Self {
        Self {
            j: DVector::zeros(node_count * dimensions_velocity),
            velocities,
            dimensions_velocity,
            current_velocity: 0,
        }
    }

    pub fn result(&self) -> &DVector<f64> {
        &self.j
    }

    pub fn into_result(self) -> DVector<f64> {
        self.j
    }
}

impl<'v> ReconstructionTarget for CurrentTarget<'v> {
    fn begin_particle(&mut self, pn: usize) {
        self.current_velocity = pn * self.dimensions_velocity;
    }

    fn add_shape_on_element(&mut self, _element: ElementId, node_start: usize, coefficients: &[f64]) {
        let vdim = self.dimensions_velocity;
        let v = &self.velocities[self.current_velocity..self.current_velocity + vdim];
        for (i, c) in coefficients.iter().enumerate() {
            let node = node_start + i;
            for (axis, v_axis) in v.iter().enumerate() {
                self.j[node * vdim + axis] += v_axis * c;
            }
        }
    }
}

/// Forwards every contribution to two targets.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainedTarget<A, B> {
    pub first: A,
    pub second: B,
}

impl<A, B> ChainedTarget<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }

    pub fn into_parts(self) -> (A, B) {
        (self.first, self.second)
    }
}

impl<A, B> ReconstructionTarget for ChainedTarget<A, B>
where
    A: ReconstructionTarget,
    B: ReconstructionTarget,
{
    fn begin_particle(&mut self, pn: usize) {
        self.first.begin_particle(pn);
        self.second.begin_particle(pn);
    }

    fn add_shape_on_element(&mut self, element: ElementId, node_start: usize, coefficients: &[f64]) {
        self.first.add_shape_on_element(element, node_start, coefficients);
        self.second.add_shape_on_element(element, node_start, coefficients);
    }

    fn end_particle(&mut self, pn: usize) {
        self.first.end_particle(pn);
        self.second.end_particle(pn);
    }
}
