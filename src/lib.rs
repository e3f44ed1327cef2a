//! Core machinery for a smoothed-particle-hydrodynamics simulation of fluid
//! and soil continua: a fixed-capacity particle arena, a uniform background
//! grid for neighbor search, interpolation kernels, and domain-boundary
//! handling, orchestrated by a per-step solver pipeline.
//!
//! Rendering, color mapping, and the driver loop live outside this crate; the
//! [`output`] module is the data interface handed to them.

extern crate nalgebra as na;

pub mod boundary;
pub mod grid;
pub mod kernels;
pub mod output;
pub mod parameters;
pub mod particles;
pub mod solver;

pub use crate::parameters::{SimParameters, SolverConfig};
pub use crate::particles::{CubeRegion, Material, Particles};
pub use crate::solver::SphSolver;

pub mod math {
    use na::{SMatrix, SVector};

    pub type T = f64;

    /// A world-space vector, `D` = 2 or 3 for the whole simulation instance.
    pub type TV<const D: usize> = SVector<T, D>;
    /// An integer cell coordinate.
    pub type IV<const D: usize> = SVector<isize, D>;

    pub type Mat<const D: usize> = SMatrix<T, D, D>;
}

use std::fmt;

/// Failures the core can report. Everything else degrades with counters
/// rather than erroring (see the per-module diagnostics).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SphError {
    /// Inserting the requested particles would exceed the arena capacity.
    /// Raised before any particle state is mutated.
    ParticleCapacity { requested: usize, capacity: usize },
    /// More particles were scattered into a single grid cell than it can
    /// hold. `dropped` is the number of entries that did not fit.
    CellOverflow { dropped: u32 },
}

impl fmt::Display for SphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SphError::ParticleCapacity {
                requested,
                capacity,
            } => write!(
                f,
                "particle count {} would exceed the arena capacity {}",
                requested, capacity
            ),
            SphError::CellOverflow { dropped } => {
                write!(f, "{} particles did not fit their grid cell", dropped)
            }
        }
    }
}

impl std::error::Error for SphError {}

pub type Result<V> = std::result::Result<V, SphError>;
