//! Error type for the advective reconstruction engine.
//!
//! Every variant is fatal for the operation that produced it. Degenerate numerical input is
//! reported through [`WarningSink`](crate::listener::WarningSink) instead and is not
//! represented here.
use thiserror::Error;

/// Mesh element number.
pub type ElementId = usize;

/// Local face number within an element.
pub type FaceId = usize;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReconstructionError {
    /// Slot allocation was attempted before the number of DOFs per element was configured.
    #[error("tried to allocate element on uninitialized advective reconstructor")]
    UninitializedDofs,
    /// A slot start offset was not a multiple of the number of DOFs per element.
    #[error("invalid advective element deallocation at offset {start} (dofs per element: {dofs_per_element})")]
    MisalignedDeallocation { start: usize, dofs_per_element: usize },
    /// A slot start offset does not refer to an allocated slot.
    #[error("deallocation of unallocated advective element slot at offset {start}")]
    UnallocatedSlot { start: usize },
    /// Particles must be injected with sequential indices.
    #[error("advected particle added out of sequence (expected {expected}, got {actual})")]
    ParticleOutOfSequence { expected: usize, actual: usize },
    /// Differentiation matrices must be registered in axis order.
    #[error("local diff matrices added out of order (expected axis {expected}, got {actual})")]
    DiffMatrixOutOfOrder { expected: usize, actual: usize },
    #[error("zero activation threshold")]
    ZeroActivationThreshold,
    #[error("zero kill threshold")]
    ZeroKillThreshold,
    /// A configuration value lies outside of its admissible range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A vector or matrix does not have the size the engine expects.
    #[error("dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch { what: &'static str, expected: usize, actual: usize },
    /// An element id is not part of the mesh.
    #[error("element {0} does not exist in the mesh")]
    UnknownElement(ElementId),
    /// No face-coupling record exists for the given element face.
    #[error("no face coupling record for (el:{element},face:{face})")]
    MissingFaceCoupling { element: ElementId, face: FaceId },
    /// An interior face record lacks its opposite side, or a boundary record was resolved
    /// from its non-existent opposite side.
    #[error("looking for non-existent cross-boundary element at (el:{element},face:{face})")]
    CrossBoundaryLookup { element: ElementId, face: FaceId },
    /// An element face is claimed by more than one face-coupling record, or by none of the
    /// sides of the record it was resolved to.
    #[error("el/face lookup failed for (el:{element},face:{face})")]
    FaceLookupMismatch { element: ElementId, face: FaceId },
    /// An element holds a connection across a domain boundary face.
    #[error("detected boundary non-connection as active at (el:{element},face:{face})")]
    BoundaryConnection { element: ElementId, face: FaceId },
    /// A connection references an element that is not active for the particle.
    #[error("opposite element {neighbor} of (el:{element},face:{face}) for active connection not found")]
    MissingConnectedElement { element: ElementId, face: FaceId, neighbor: ElementId },
    /// An element about to be activated is already active without being connected.
    #[error("element {neighbor} behind (el:{element},face:{face}) is active but not connected")]
    UnlinkedActiveNeighbor { element: ElementId, face: FaceId, neighbor: ElementId },
    /// Face adjacency of the mesh disagrees with its face-coupling records.
    #[error("element {element} not found among the face neighbors of element {neighbor}")]
    AsymmetricAdjacency { element: ElementId, neighbor: ElementId },
    /// The element finder reported the same element twice for one particle.
    #[error("element {element} reported twice for particle {particle}")]
    DuplicateElement { particle: usize, element: ElementId },
    #[error("invalid debug quantity `{0}`")]
    InvalidDebugQuantity(String),
    /// The particle collection can only shrink through bookkeeping notifications.
    #[error("cannot resize advected particle collection from {current} to {requested}")]
    InvalidParticleCount { current: usize, requested: usize },
}
