//! Basic procedural mesh generation routines.
//!
//! The generated meshes are discontinuous linear Lagrange meshes: every element carries its
//! own copy of its vertices as nodes, ordered to match [`reference::lagrange`](crate::reference::lagrange).
use crate::mesh::{ElementInfo, FaceGroup, FaceInfo, FacePair, FaceSide, MeshData};
use eyre::ensure;
use nalgebra::{DMatrix, DVector};

/// Generates a uniform mesh of `cells` segments covering `[x_min, x_max]`.
///
/// Face 0 of every segment is its left end point and face 1 its right end point.
pub fn create_uniform_segment_mesh_1d(x_min: f64, x_max: f64, cells: usize) -> eyre::Result<MeshData> {
    ensure!(cells > 0, "Segment mesh needs at least one cell");
    ensure!(x_max > x_min, "Segment mesh interval [{}, {}] is empty", x_min, x_max);
    let h = (x_max - x_min) / cells as f64;

    let mut nodes = Vec::with_capacity(2 * cells);
    let mut elements = Vec::with_capacity(cells);
    for i in 0..cells {
        nodes.push(x_min + i as f64 * h);
        nodes.push(x_min + (i + 1) as f64 * h);
        let left = i.checked_sub(1);
        let right = (i + 1 < cells).then(|| i + 1);
        elements.push(ElementInfo {
            id: i,
            node_start: 2 * i,
            node_end: 2 * i + 2,
            jacobian: h / 2.0,
            inverse_map: DMatrix::from_element(1, 1, 2.0 / h),
            faces: vec![FaceInfo { neighbor: left }, FaceInfo { neighbor: right }],
        });
    }

    let side = |element, face: usize| FaceSide {
        element,
        face,
        normal: vec![if face == 0 { -1.0 } else { 1.0 }],
        face_jacobian: 1.0,
        index_list: face,
    };
    let index_lists = vec![vec![0], vec![1]];

    let interior_faces = FaceGroup {
        pairs: (0..cells - 1)
            .map(|i| FacePair {
                loc: side(i, 1),
                opp: Some(side(i + 1, 0)),
            })
            .collect(),
        index_lists: index_lists.clone(),
    };
    let boundary_faces = FaceGroup {
        pairs: vec![
            FacePair {
                loc: side(0, 0),
                opp: None,
            },
            FacePair {
                loc: side(cells - 1, 1),
                opp: None,
            },
        ],
        index_lists,
    };

    MeshData::try_new(1, nodes, elements, interior_faces, boundary_faces)
}

/// Local node lists of the faces of a linear quadrilateral, in face order
/// bottom, right, top, left.
const QUAD_FACE_NODES: [[usize; 2]; 4] = [[0, 1], [1, 3], [2, 3], [0, 2]];

const QUAD_FACE_NORMALS: [[f64; 2]; 4] = [[0.0, -1.0], [1.0, 0.0], [0.0, 1.0], [-1.0, 0.0]];

/// Generates an axis-aligned rectangular uniform quadrilateral mesh.
///
/// The mesh covers the box with lower left corner `origin` and the given `extents`, with
/// `cells[0] x cells[1]` elements. Element `(i, j)` has id `i + cells[0] * j`. Its local node
/// `k = ix + 2 * iy` sits at the vertex `(i + ix, j + iy)`, and its faces are numbered
/// bottom, right, top, left.
pub fn create_rectangular_uniform_quad_mesh_2d(
    origin: [f64; 2],
    extents: [f64; 2],
    cells: [usize; 2],
) -> eyre::Result<MeshData> {
    let [nx, ny] = cells;
    ensure!(nx > 0 && ny > 0, "Quad mesh needs at least one cell per axis, got {:?}", cells);
    ensure!(
        extents.iter().all(|&e| e > 0.0),
        "Quad mesh extents must be positive, got {:?}",
        extents
    );
    let hx = extents[0] / nx as f64;
    let hy = extents[1] / ny as f64;
    let to_id = |i: usize, j: usize| i + nx * j;

    let mut nodes = Vec::with_capacity(8 * nx * ny);
    let mut elements = Vec::with_capacity(nx * ny);
    for j in 0..ny {
        for i in 0..nx {
            let id = to_id(i, j);
            for iy in 0..2 {
                for ix in 0..2 {
                    nodes.push(origin[0] + (i + ix) as f64 * hx);
                    nodes.push(origin[1] + (j + iy) as f64 * hy);
                }
            }
            let neighbors = [
                j.checked_sub(1).map(|j| to_id(i, j)),
                (i + 1 < nx).then(|| to_id(i + 1, j)),
                (j + 1 < ny).then(|| to_id(i, j + 1)),
                i.checked_sub(1).map(|i| to_id(i, j)),
            ];
            elements.push(ElementInfo {
                id,
                node_start: 4 * id,
                node_end: 4 * id + 4,
                jacobian: hx * hy / 4.0,
                inverse_map: DMatrix::from_diagonal(&DVector::from_vec(vec![2.0 / hx, 2.0 / hy])),
                faces: neighbors
                    .iter()
                    .map(|&neighbor| FaceInfo { neighbor })
                    .collect(),
            });
        }
    }

    let side = |element, face: usize| FaceSide {
        element,
        face,
        normal: QUAD_FACE_NORMALS[face].to_vec(),
        // Bottom and top faces span the x axis, left and right faces the y axis
        face_jacobian: if face % 2 == 0 { hx / 2.0 } else { hy / 2.0 },
        index_list: face,
    };
    let index_lists: Vec<Vec<usize>> = QUAD_FACE_NODES.iter().map(|f| f.to_vec()).collect();

    let mut interior_pairs = Vec::new();
    let mut boundary_pairs = Vec::new();
    for j in 0..ny {
        for i in 0..nx {
            let id = to_id(i, j);
            if i + 1 < nx {
                interior_pairs.push(FacePair {
                    loc: side(id, 1),
                    opp: Some(side(to_id(i + 1, j), 3)),
                });
            }
            if j + 1 < ny {
                interior_pairs.push(FacePair {
                    loc: side(id, 2),
                    opp: Some(side(to_id(i, j + 1), 0)),
                });
            }
            for (face, neighbor) in elements[id].faces.iter().enumerate() {
                if neighbor.neighbor.is_none() {
                    boundary_pairs.push(FacePair {
                        loc: side(id, face),
                        opp: None,
                    });
                }
            }
        }
    }

    let interior_faces = FaceGroup {
        pairs: interior_pairs,
        index_lists: index_lists.clone(),
    };
    let boundary_faces = FaceGroup {
        pairs: boundary_pairs,
        index_lists,
    };

    MeshData::try_new(2, nodes, elements, interior_faces, boundary_faces)
}

pub fn create_unit_square_uniform_quad_mesh_2d(cells_per_dim: usize) -> eyre::Result<MeshData> {
    create_rectangular_uniform_quad_mesh_2d([0.0, 0.0], [1.0, 1.0], [cells_per_dim, cells_per_dim])
}
