//! Advective particle density reconstruction.
//!
//! Every particle owns a small density blob spread over a handful of mesh elements. The blob
//! is advected with the particle's velocity by a discontinuous Galerkin scheme, growing onto
//! downstream elements when density reaches them and shrinking when elements become
//! negligible. The coefficients of all blobs live in a single vector managed by a
//! [`SlabAllocator`].
mod debug;
mod element;
mod reconstructor;
mod state;
mod target;

pub use debug::DebugQuantity;
pub use element::{ActiveElement, AdvectedParticle};
pub use reconstructor::AdvectiveReconstructor;
pub use state::{AdvectiveState, SlabAllocator};
pub use target::{ChainedTarget, CurrentTarget, ReconstructionTarget, RhoTarget};
