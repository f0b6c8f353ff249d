use crate::error::ReconstructionError;
use std::fmt;
use std::str::FromStr;

/// Intermediate quantities of the right-hand side that can be mapped onto the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DebugQuantity {
    Rhs,
    ActiveElements,
    Fluxes,
    MinvFluxes,
    LocalDiv,
}

impl DebugQuantity {
    pub const ALL: [DebugQuantity; 5] = [
        DebugQuantity::Rhs,
        DebugQuantity::ActiveElements,
        DebugQuantity::Fluxes,
        DebugQuantity::MinvFluxes,
        DebugQuantity::LocalDiv,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DebugQuantity::Rhs => "rhs",
            DebugQuantity::ActiveElements => "active_elements",
            DebugQuantity::Fluxes => "fluxes",
            DebugQuantity::MinvFluxes => "minv_fluxes",
            DebugQuantity::LocalDiv => "local_div",
        }
    }
}

impl fmt::Display for DebugQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DebugQuantity {
    type Err = ReconstructionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|q| q.name() == s)
            .ok_or_else(|| ReconstructionError::InvalidDebugQuantity(s.to_string()))
    }
}
