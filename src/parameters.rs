use crate::kernels::KernelType;
use crate::math::{T, TV};
use crate::solver::TimeScheme;
use serde::{Deserialize, Serialize};

/// Hard capacity of the particle arena.
pub const MAX_PARTICLES: usize = 1 << 16;
/// Slots available in one background-grid cell.
pub const MAX_PARTICLES_PER_CELL: usize = 100;
/// Neighbor-list capacity of one particle.
pub const MAX_NEIGHBORS: usize = 100;

/// Geometric and discretisation parameters shared by every component.
///
/// The world spans `[0, world]` on each axis; the background grid pads it by
/// one cell on every side so that boundary-layer particles fall inside the
/// grid.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimParameters<const D: usize> {
    pub world: TV<D>,
    pub particle_radius: T,
    pub particle_diameter: T,
    /// Smoothing length over particle diameter.
    pub kh: T,
    /// Support radius over smoothing length.
    pub kappa: T,
    pub smoothing_length: T,
    pub support_radius: T,
    /// Volume of the cubic patch of continuum each particle represents.
    pub particle_volume: T,
    /// Edge length of one background-grid cell, sized so the 3^D cell
    /// stencil covers the full kernel support.
    pub cell_size: T,
}

impl<const D: usize> SimParameters<D> {
    pub fn new(world: TV<D>, particle_radius: T) -> Self {
        assert!(
            D == 2 || D == 3,
            "the particle system supports 2D and 3D worlds only"
        );

        let particle_diameter = 2. * particle_radius;
        let kh = 1.2;
        let kappa = 2.0;
        let smoothing_length = kh * particle_diameter;

        SimParameters {
            world,
            particle_radius,
            particle_diameter,
            kh,
            kappa,
            smoothing_length,
            support_radius: kappa * smoothing_length,
            particle_volume: particle_diameter.powi(D as i32),
            cell_size: (kappa * kh).ceil() * particle_diameter,
        }
    }

    /// Lower corner of the padded domain covered by the grid.
    pub fn domain_min(&self) -> TV<D> {
        TV::from_element(-self.cell_size)
    }

    /// Upper corner of the padded domain covered by the grid.
    pub fn domain_max(&self) -> TV<D> {
        self.world.add_scalar(self.cell_size)
    }
}

/// Construction-time solver configuration, immutable for the run.
///
/// `viscosity`, `stiffness` and `polytropic_exponent` are carried for the
/// force models layered on top of this crate; nothing in the core reads them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    pub scheme: TimeScheme,
    pub kernel: KernelType,
    pub sound_speed: T,
    pub viscosity: T,
    pub stiffness: T,
    pub polytropic_exponent: T,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            scheme: TimeScheme::SymplecticEuler,
            kernel: KernelType::CubicSpline,
            sound_speed: 60.,
            viscosity: 5e-5,
            stiffness: 5e4,
            polytropic_exponent: 7.,
        }
    }
}

impl SolverConfig {
    pub fn from_json_file(path: &std::path::Path) -> eyre::Result<Self> {
        use eyre::WrapErr;

        std::fs::read(path)
            .wrap_err_with(|| format!("Failed to read solver config: {:?}", path))
            .and_then(|json| {
                serde_json::from_slice(&json).wrap_err("Serde failed to deserialize JSON.")
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use na::Vector2;

    #[test]
    fn derived_quantities() {
        let params = SimParameters::new(Vector2::new(0.584, 0.8), 0.002);
        assert_eq!(params.particle_diameter, 0.004);
        assert!((params.smoothing_length - 0.0048).abs() < 1e-12);
        assert!((params.support_radius - 0.0096).abs() < 1e-12);
        // ceil(2.0 * 1.2) = 3 diameters per cell
        assert!((params.cell_size - 0.012).abs() < 1e-12);
        assert!((params.particle_volume - 1.6e-5).abs() < 1e-12);
        assert_eq!(params.domain_min(), Vector2::new(-0.012, -0.012));
    }

    #[test]
    fn config_json_round_trip() {
        let config = SolverConfig {
            kernel: KernelType::WendlandC2,
            ..SolverConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: SolverConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
