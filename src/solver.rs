use crate::boundary;
use crate::grid::Grid;
use crate::math::{Mat, T, TV};
use crate::parameters::{SimParameters, SolverConfig, MAX_NEIGHBORS};
use crate::particles::{CubeRegion, Material, Particles};
use crate::Result;
use na::{Const, DimMin};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, info, warn};

/// Gravitational acceleration, consumed by the force models layered on top.
pub const GRAVITY: T = -9.81;

/// Determinant magnitude below which the kernel-weighted moment matrix is
/// treated as singular and its inverse replaced by the identity.
const SINGULAR_DET_EPS: T = 1e-12;

/// Time-discretisation scheme selector. Only symplectic Euler is wired up;
/// the other identifiers are reserved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeScheme {
    SymplecticEuler,
    Leapfrog,
    RungeKutta4,
}

impl TimeScheme {
    pub fn id(self) -> i32 {
        match self {
            TimeScheme::SymplecticEuler => 1,
            TimeScheme::Leapfrog => 2,
            TimeScheme::RungeKutta4 => 4,
        }
    }

    pub fn from_id(id: i32) -> Option<TimeScheme> {
        match id {
            1 => Some(TimeScheme::SymplecticEuler),
            2 => Some(TimeScheme::Leapfrog),
            4 => Some(TimeScheme::RungeKutta4),
            _ => None,
        }
    }
}

/// A time-integration scheme advancing particle state by one substep.
///
/// Constitutive force models plug in through this seam; the structural
/// pipeline around it runs whether or not a substep does anything.
pub trait Integrator<const D: usize>: Send + Sync {
    fn substep(&self, particles: &mut Particles<D>, params: &SimParameters<D>, dt: T);
}

/// Symplectic Euler. Structurally present; the force evaluation and state
/// update are left to the models built on top of this crate.
pub struct SymplecticEuler;

impl<const D: usize> Integrator<D> for SymplecticEuler {
    fn substep(&self, _particles: &mut Particles<D>, _params: &SimParameters<D>, _dt: T) {}
}

/// Orchestrates the per-step pipeline over the particle arena and the
/// background grid:
///
/// 1. grid rebuild (clear + parallel scatter)
/// 2. neighbor search
/// 3. normalization matrices
/// 4. time-integration substep
/// 5. boundary enforcement
///
/// The solver itself holds no mutable state beyond the arena and grid; the
/// kernel, scheme and CFL timestep are fixed at construction.
pub struct SphSolver<const D: usize> {
    pub params: SimParameters<D>,
    pub config: SolverConfig,
    pub particles: Particles<D>,
    pub grid: Grid<D>,
    integrator: Option<Box<dyn Integrator<D>>>,
    dt: T,
}

impl<const D: usize> SphSolver<D>
where
    Const<D>: DimMin<Const<D>, Output = Const<D>>,
{
    pub fn new(world: TV<D>, particle_radius: T, config: SolverConfig) -> Self {
        let params = SimParameters::new(world, particle_radius);

        // CFL bound, fixed for the whole run
        let dt = T::max(1e-6, 0.2 * params.smoothing_length / config.sound_speed);

        let integrator: Option<Box<dyn Integrator<D>>> = match config.scheme {
            TimeScheme::SymplecticEuler => Some(Box::new(SymplecticEuler)),
            scheme => {
                warn!(?scheme, "time scheme is reserved and not implemented");
                None
            }
        };

        info!(dt, kernel = ?config.kernel, "solver ready");

        SphSolver {
            grid: Grid::new(&params),
            particles: Particles::new(),
            params,
            integrator,
            dt,
            config,
        }
    }

    /// The CFL-derived timestep.
    pub fn dt(&self) -> T {
        self.dt
    }

    /// Inserts a lattice of particles and immediately re-hashes the grid and
    /// neighbor lists so queries between steps see the new particles.
    pub fn add_cube(&mut self, cube: &CubeRegion<D>) -> Result<usize> {
        let added = self.particles.fill_cube(cube, &self.params)?;
        info!(added, total = self.particles.count(), "added particle block");
        self.reinitialize()?;
        Ok(added)
    }

    /// Rebuilds all derived state (grid cells, neighbor rows) from particle
    /// positions.
    pub fn reinitialize(&mut self) -> Result<()> {
        self.grid.rebuild(&self.particles)?;
        self.grid
            .search_neighbors(&mut self.particles, self.params.support_radius);
        Ok(())
    }

    /// Advances the simulation by one step. The pass order is fixed; each
    /// pass completes before the next begins.
    pub fn step(&mut self) -> Result<()> {
        self.grid.rebuild(&self.particles)?;
        self.grid
            .search_neighbors(&mut self.particles, self.params.support_radius);
        self.compute_normalization();
        if let Some(integrator) = &self.integrator {
            integrator.substep(&mut self.particles, &self.params, self.dt);
        }
        boundary::enforce_boundary(&mut self.particles, &self.params);
        Ok(())
    }

    /// Recomputes every particle's normalization matrix: the inverse of the
    /// kernel-weighted moment matrix
    /// `sum_j V (x_j - x_i) (grad W(x_i - x_j))^T`,
    /// which restores first-order consistency of kernel-gradient sums near
    /// boundaries and free surfaces.
    ///
    /// A moment matrix with near-zero determinant (isolated particle,
    /// collinear neighborhood) falls back to the identity instead of
    /// propagating non-finite values; occurrences are counted.
    pub fn compute_normalization(&mut self) {
        let kernel = self.config.kernel;
        let h = self.params.smoothing_length;
        let volume = self.params.particle_volume;
        let count = self.particles.count();
        let singular = AtomicU32::new(0);

        let Particles {
            position,
            neighbors,
            neighbor_counts,
            normalization,
            ..
        } = &mut self.particles;
        let position = &position[..count];
        let neighbors = &neighbors[..];
        let neighbor_counts = &neighbor_counts[..];

        normalization[..count]
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, matrix)| {
                let x_i = position[i];
                let row = &neighbors[i * MAX_NEIGHBORS..i * MAX_NEIGHBORS + MAX_NEIGHBORS];

                let mut moment = Mat::<D>::zeros();
                for &j in &row[..neighbor_counts[i] as usize] {
                    let x_j = position[j as usize];
                    let gradient = kernel.gradient(x_i - x_j, h);
                    moment += volume * (x_j - x_i) * gradient.transpose();
                }

                *matrix = if moment.determinant().abs() > SINGULAR_DET_EPS {
                    moment.try_inverse().unwrap_or_else(Mat::identity)
                } else {
                    singular.fetch_add(1, Ordering::Relaxed);
                    Mat::identity()
                };
            });

        let singular = singular.into_inner();
        if singular > 0 {
            debug!(
                singular,
                "degenerate neighborhoods fell back to the identity normalization"
            );
        }
    }

    /// Clears the visualization scalar on every physical particle.
    pub fn reset_scalar_values(&mut self) {
        let count = self.particles.count();
        for i in 0..count {
            if !self.particles.material[i].is_boundary() {
                self.particles.value[i] = 0.;
            }
        }
    }
}

impl SphSolver<2> {
    /// Surrounds the interior domain with four strips of dummy particles,
    /// one grid cell thick, filling the padding of the background grid.
    pub fn generate_boundary_particles(&mut self) -> Result<()> {
        const BOUNDARY_COLOR: [f32; 3] = [0.6, 0.6, 1.0];

        let cell = self.params.cell_size;
        let world = self.params.world;

        let strips: [(TV<2>, TV<2>); 4] = [
            // bottom, spanning the full padded width
            (
                TV::<2>::new(-cell, -cell),
                TV::<2>::new(world.x + cell, 0.),
            ),
            // top
            (
                TV::<2>::new(-cell, world.y),
                TV::<2>::new(world.x + cell, world.y + cell),
            ),
            // left
            (TV::<2>::new(-cell, 0.), TV::<2>::new(0., world.y)),
            // right
            (
                TV::<2>::new(world.x, 0.),
                TV::<2>::new(world.x + cell, world.y),
            ),
        ];

        let mut added = 0;
        for (lower, upper) in strips {
            let cube = CubeRegion {
                color: BOUNDARY_COLOR,
                ..CubeRegion::new(lower, upper - lower, Material::Dummy)
            };
            added += self.particles.fill_cube(&cube, &self.params)?;
        }
        info!(added, "generated boundary layer");

        self.reinitialize()
    }
}
