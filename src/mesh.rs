//! Mesh topology consumed by the reconstruction engine.
//!
//! Meshes are discontinuous: every element owns a contiguous range of nodes, and the
//! coefficients of an element's local density representation correspond one-to-one to
//! these nodes. Flux coupling between elements is described by [`FaceGroup`]s, each
//! holding [`FacePair`]s that identify the two sides of a face.
use crate::error::{ElementId, FaceId};
use eyre::{bail, ensure};
use nalgebra::DMatrix;
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{RTree, AABB};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod procedural;

/// Dimension of the points stored in the spatial index. Lower-dimensional meshes pad with zeros.
const INDEX_DIM: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceInfo {
    /// Element on the other side of the face, or `None` on the domain boundary.
    pub neighbor: Option<ElementId>,
}

/// Immutable metadata of a mesh element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementInfo {
    pub id: ElementId,
    /// First node of the element.
    pub node_start: usize,
    /// One past the last node of the element.
    pub node_end: usize,
    /// Determinant of the affine map from the reference element.
    pub jacobian: f64,
    /// Inverse of the affine map, `∂r_i/∂x_j` at entry `(i, j)`.
    pub inverse_map: DMatrix<f64>,
    pub faces: Vec<FaceInfo>,
}

impl ElementInfo {
    pub fn node_count(&self) -> usize {
        self.node_end - self.node_start
    }
}

/// One side of a face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceSide {
    pub element: ElementId,
    pub face: FaceId,
    /// Outward unit normal as seen from `element`.
    pub normal: Vec<f64>,
    pub face_jacobian: f64,
    /// Index into [`FaceGroup::index_lists`] listing the element-local nodes on this face.
    pub index_list: usize,
}

/// Both sides of a face. Boundary faces have no opposite side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacePair {
    pub loc: FaceSide,
    pub opp: Option<FaceSide>,
}

impl FacePair {
    pub fn is_boundary(&self) -> bool {
        self.opp.is_none()
    }
}

/// A collection of face pairs sharing a pool of face-local node index lists.
///
/// The index lists of two sides of the same face are ordered so that entry `i` of both
/// lists refers to the same physical face node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceGroup {
    pub pairs: Vec<FacePair>,
    pub index_lists: Vec<Vec<usize>>,
}

impl FaceGroup {
    pub fn index_list(&self, number: usize) -> &[usize] {
        &self.index_lists[number]
    }
}

/// Element geometry, face adjacency and face-coupling records of a mesh.
pub trait MeshTopology {
    fn dimensions(&self) -> usize;

    /// All elements, indexed by their id.
    fn elements(&self) -> &[ElementInfo];

    fn node_count(&self) -> usize;

    /// Coordinates of the given node.
    fn node(&self, index: usize) -> &[f64];

    fn interior_faces(&self) -> &FaceGroup;

    fn boundary_faces(&self) -> &FaceGroup;
}

/// Locates mesh elements overlapping a ball.
pub trait ElementFinder {
    /// Returns the distinct ids of all elements intersecting the ball of the given radius
    /// around `center`, in ascending order.
    fn find_covering_elements(&self, center: &[f64], radius: f64) -> Vec<ElementId>;
}

type ElementBox = GeomWithData<Rectangle<[f64; INDEX_DIM]>, usize>;

/// Concrete mesh with a bounding-box tree for element lookup.
#[derive(Clone)]
pub struct MeshData {
    dimensions: usize,
    nodes: Vec<f64>,
    elements: Vec<ElementInfo>,
    interior_faces: FaceGroup,
    boundary_faces: FaceGroup,
    bounds: Vec<([f64; INDEX_DIM], [f64; INDEX_DIM])>,
    tree: RTree<ElementBox>,
}

impl fmt::Debug for MeshData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeshData")
            .field("dimensions", &self.dimensions)
            .field("node_count", &self.node_count())
            .field("element_count", &self.elements.len())
            .field("interior_faces", &self.interior_faces.pairs.len())
            .field("boundary_faces", &self.boundary_faces.pairs.len())
            .finish()
    }
}

impl MeshData {
    /// Assembles a mesh from flat interleaved node coordinates, element metadata and face
    /// groups, checking the data for consistency.
    pub fn try_new(
        dimensions: usize,
        nodes: Vec<f64>,
        elements: Vec<ElementInfo>,
        interior_faces: FaceGroup,
        boundary_faces: FaceGroup,
    ) -> eyre::Result<Self> {
        ensure!(
            (1..=INDEX_DIM).contains(&dimensions),
            "Mesh dimension must be in 1..={}, got {}",
            INDEX_DIM,
            dimensions
        );
        ensure!(
            nodes.len() % dimensions == 0,
            "Node coordinate array length {} is not a multiple of the dimension {}",
            nodes.len(),
            dimensions
        );
        let node_count = nodes.len() / dimensions;

        for (index, element) in elements.iter().enumerate() {
            ensure!(element.id == index, "Element at index {} has id {}", index, element.id);
            ensure!(
                element.node_start <= element.node_end && element.node_end <= node_count,
                "Element {} has invalid node range {}..{}",
                index,
                element.node_start,
                element.node_end
            );
            ensure!(
                element.inverse_map.shape() == (dimensions, dimensions),
                "Inverse map of element {} has shape {:?}",
                index,
                element.inverse_map.shape()
            );
            for face in &element.faces {
                if let Some(neighbor) = face.neighbor {
                    let symmetric = elements
                        .get(neighbor)
                        .map(|n| n.faces.iter().any(|f| f.neighbor == Some(index)))
                        .unwrap_or(false);
                    ensure!(
                        symmetric,
                        "Face adjacency between elements {} and {} is not symmetric",
                        index,
                        neighbor
                    );
                }
            }
        }

        for (group, name) in [(&interior_faces, "interior"), (&boundary_faces, "boundary")] {
            for pair in &group.pairs {
                for side in std::iter::once(&pair.loc).chain(pair.opp.as_ref()) {
                    ensure!(
                        side.element < elements.len(),
                        "{} face pair references unknown element {}",
                        name,
                        side.element
                    );
                    ensure!(
                        side.normal.len() == dimensions,
                        "{} face normal of element {} has {} components",
                        name,
                        side.element,
                        side.normal.len()
                    );
                    let Some(list) = group.index_lists.get(side.index_list) else {
                        bail!("{} face of element {} references missing index list {}", name, side.element, side.index_list);
                    };
                    let element = &elements[side.element];
                    ensure!(
                        list.iter().all(|&i| i < element.node_count()),
                        "{} face index list {} exceeds the nodes of element {}",
                        name,
                        side.index_list,
                        side.element
                    );
                }
            }
        }

        let bounds: Vec<_> = elements
            .iter()
            .map(|element| {
                let mut min = [0.0; INDEX_DIM];
                let mut max = [0.0; INDEX_DIM];
                for axis in 0..dimensions {
                    min[axis] = f64::INFINITY;
                    max[axis] = f64::NEG_INFINITY;
                }
                for node in element.node_start..element.node_end {
                    let x = &nodes[dimensions * node..dimensions * (node + 1)];
                    for (axis, &x_i) in x.iter().enumerate() {
                        min[axis] = min[axis].min(x_i);
                        max[axis] = max[axis].max(x_i);
                    }
                }
                (min, max)
            })
            .collect();

        let geometries = bounds
            .iter()
            .enumerate()
            .filter(|(_, (min, _))| min.iter().all(|x| x.is_finite()))
            .map(|(i, (min, max))| GeomWithData::new(Rectangle::from_corners(*min, *max), i))
            .collect();
        let tree = RTree::bulk_load(geometries);

        Ok(Self {
            dimensions,
            nodes,
            elements,
            interior_faces,
            boundary_faces,
            bounds,
            tree,
        })
    }

    pub fn nodes(&self) -> &[f64] {
        &self.nodes
    }
}

impl MeshTopology for MeshData {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn elements(&self) -> &[ElementInfo] {
        &self.elements
    }

    fn node_count(&self) -> usize {
        self.nodes.len() / self.dimensions
    }

    fn node(&self, index: usize) -> &[f64] {
        let d = self.dimensions;
        &self.nodes[d * index..d * (index + 1)]
    }

    fn interior_faces(&self) -> &FaceGroup {
        &self.interior_faces
    }

    fn boundary_faces(&self) -> &FaceGroup {
        &self.boundary_faces
    }
}

impl ElementFinder for MeshData {
    fn find_covering_elements(&self, center: &[f64], radius: f64) -> Vec<ElementId> {
        let mut lower = [0.0; INDEX_DIM];
        let mut upper = [0.0; INDEX_DIM];
        for (axis, &c) in center.iter().take(self.dimensions).enumerate() {
            lower[axis] = c - radius;
            upper[axis] = c + radius;
        }
        let query = AABB::from_corners(lower, upper);

        let radius_squared = radius * radius;
        let mut found: Vec<ElementId> = self
            .tree
            .locate_in_envelope_intersecting(&query)
            .map(|geom| geom.data)
            // The box query is only a coarse filter, keep elements whose box actually touches the ball
            .filter(|&i| {
                let (min, max) = &self.bounds[i];
                let dist2: f64 = center
                    .iter()
                    .take(self.dimensions)
                    .enumerate()
                    .map(|(axis, &c)| {
                        let d = (min[axis] - c).max(c - max[axis]).max(0.0);
                        d * d
                    })
                    .sum();
                dist2 <= radius_squared
            })
            .collect();
        found.sort_unstable();
        found.dedup();
        found
    }
}
