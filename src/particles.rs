use crate::math::{Mat, T, TV};
use crate::parameters::{SimParameters, MAX_NEIGHBORS, MAX_PARTICLES};
use crate::{Result, SphError};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Material tag of a particle. Ids `>= 10` denote non-physical boundary
/// proxies: they may appear as neighbors of fluid/soil particles but never
/// act as querying particles themselves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Material {
    Fluid,
    Soil,
    Dummy,
    Repulsive,
}

impl Material {
    pub fn id(self) -> i32 {
        match self {
            Material::Fluid => 1,
            Material::Soil => 2,
            Material::Dummy => 10,
            Material::Repulsive => 11,
        }
    }

    pub fn from_id(id: i32) -> Option<Material> {
        match id {
            1 => Some(Material::Fluid),
            2 => Some(Material::Soil),
            10 => Some(Material::Dummy),
            11 => Some(Material::Repulsive),
            _ => None,
        }
    }

    pub fn is_boundary(self) -> bool {
        matches!(self, Material::Dummy | Material::Repulsive)
    }
}

/// All per-particle attributes in structure-of-arrays form.
///
/// Every array is preallocated at [`MAX_PARTICLES`] so that insertion never
/// reallocates and bulk passes can index by particle handle; `count` is the
/// only growth state. The store is append-only: particles are neither
/// destroyed nor reordered for the lifetime of a simulation.
pub struct Particles<const D: usize> {
    count: usize,
    pub position: Vec<TV<D>>,
    pub velocity: Vec<TV<D>>,
    pub density: Vec<T>,
    /// Scalar carried for visualization coloring.
    pub value: Vec<T>,
    pub stress: Vec<Mat<D>>,
    pub strain: Vec<Mat<D>>,
    /// Inverse kernel-weighted moment matrix, recomputed every step.
    pub normalization: Vec<Mat<D>>,
    pub material: Vec<Material>,
    pub color: Vec<[f32; 3]>,
    /// Flattened neighbor rows, [`MAX_NEIGHBORS`] slots per particle.
    /// Only the `neighbor_counts[p]` prefix of a row is meaningful.
    pub neighbors: Vec<u32>,
    pub neighbor_counts: Vec<u32>,
}

impl<const D: usize> Default for Particles<D> {
    fn default() -> Self {
        Particles {
            count: 0,
            position: vec![TV::zeros(); MAX_PARTICLES],
            velocity: vec![TV::zeros(); MAX_PARTICLES],
            density: vec![0.; MAX_PARTICLES],
            value: vec![0.; MAX_PARTICLES],
            stress: vec![Mat::zeros(); MAX_PARTICLES],
            strain: vec![Mat::zeros(); MAX_PARTICLES],
            normalization: vec![Mat::identity(); MAX_PARTICLES],
            material: vec![Material::Fluid; MAX_PARTICLES],
            color: vec![[1., 1., 1.]; MAX_PARTICLES],
            neighbors: vec![0; MAX_PARTICLES * MAX_NEIGHBORS],
            neighbor_counts: vec![0; MAX_PARTICLES],
        }
    }
}

impl<const D: usize> Particles<D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live particles.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Claims `n` consecutive handles, failing before any mutation if the
    /// arena capacity would be exceeded.
    pub fn reserve(&mut self, n: usize) -> Result<Range<usize>> {
        let requested = self.count + n;
        if requested > MAX_PARTICLES {
            return Err(SphError::ParticleCapacity {
                requested,
                capacity: MAX_PARTICLES,
            });
        }
        let range = self.count..requested;
        self.count = requested;
        Ok(range)
    }

    /// Writes one particle's full attribute set at an already-reserved index.
    #[allow(clippy::too_many_arguments)]
    pub fn add_particle(
        &mut self,
        index: usize,
        value: T,
        position: TV<D>,
        velocity: TV<D>,
        density: T,
        stress: Mat<D>,
        strain: Mat<D>,
        material: Material,
        color: [f32; 3],
    ) {
        debug_assert!(index < self.count, "index {} has not been reserved", index);
        self.value[index] = value;
        self.position[index] = position;
        self.velocity[index] = velocity;
        self.density[index] = density;
        self.stress[index] = stress;
        self.strain[index] = strain;
        self.material[index] = material;
        self.color[index] = color;
    }

    /// The valid prefix of particle `p`'s neighbor row.
    pub fn neighbors_of(&self, p: usize) -> &[u32] {
        let start = p * MAX_NEIGHBORS;
        &self.neighbors[start..start + self.neighbor_counts[p] as usize]
    }

    /// Fills the box `[lower_corner, lower_corner + size]` with a particle
    /// lattice and returns the number of particles added.
    pub fn fill_cube(&mut self, cube: &CubeRegion<D>, params: &SimParameters<D>) -> Result<usize> {
        let spacing = cube.spacing.unwrap_or(params.particle_diameter);

        let samples: Vec<Vec<T>> = (0..D)
            .map(|d| {
                axis_samples(
                    cube.lower_corner[d],
                    cube.size[d],
                    params.particle_radius,
                    spacing,
                )
            })
            .collect();

        let total: usize = samples.iter().map(Vec::len).product();
        let range = self.reserve(total)?;

        for (handle, mut flat) in range.zip(0..total) {
            let mut position = TV::zeros();
            for d in (0..D).rev() {
                position[d] = samples[d][flat % samples[d].len()];
                flat /= samples[d].len();
            }
            self.add_particle(
                handle,
                cube.value,
                position,
                cube.velocity,
                cube.density,
                cube.stress,
                cube.strain,
                cube.material,
                cube.color,
            );
        }

        Ok(total)
    }
}

/// Lattice coordinates along one axis: starting one particle radius inside
/// the lower face, stepped by `spacing`. The tolerance keeps the far face
/// populated despite floating-point rounding of the box extent.
fn axis_samples(lower: T, size: T, radius: T, spacing: T) -> Vec<T> {
    (0u32..)
        .map(|k| lower + radius + T::from(k) * spacing)
        .take_while(|&x| x < lower + size + 1e-5)
        .collect()
}

/// An axis-aligned box of lattice particles, the only way particles enter
/// the system.
#[derive(Clone, Debug)]
pub struct CubeRegion<const D: usize> {
    pub lower_corner: TV<D>,
    pub size: TV<D>,
    pub material: Material,
    pub color: [f32; 3],
    pub velocity: TV<D>,
    pub density: T,
    pub stress: Mat<D>,
    pub strain: Mat<D>,
    pub value: T,
    /// Lattice spacing; `None` means one particle diameter.
    pub spacing: Option<T>,
}

impl<const D: usize> CubeRegion<D> {
    pub fn new(lower_corner: TV<D>, size: TV<D>, material: Material) -> Self {
        CubeRegion {
            lower_corner,
            size,
            material,
            color: [1., 1., 1.],
            velocity: TV::zeros(),
            density: 0.,
            stress: Mat::zeros(),
            strain: Mat::zeros(),
            value: 0.,
            spacing: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use na::Vector2;

    fn params() -> SimParameters<2> {
        SimParameters::new(Vector2::new(0.584, 0.8), 0.002)
    }

    #[test]
    fn single_particle_cube() {
        let mut particles = Particles::<2>::new();
        let cube = CubeRegion {
            spacing: Some(0.01),
            ..CubeRegion::new(Vector2::zeros(), Vector2::new(0.01, 0.01), Material::Fluid)
        };

        let added = particles.fill_cube(&cube, &params()).unwrap();
        assert_eq!(added, 1);
        assert_eq!(particles.count(), 1);
        assert_eq!(particles.position[0], Vector2::new(0.002, 0.002));
    }

    #[test]
    fn lattice_spacing_defaults_to_diameter() {
        let mut particles = Particles::<2>::new();
        let cube = CubeRegion::new(Vector2::zeros(), Vector2::new(0.02, 0.01), Material::Soil);

        // x: 0.002, 0.006, 0.010, 0.014, 0.018; y: 0.002, 0.006, 0.010
        let added = particles.fill_cube(&cube, &params()).unwrap();
        assert_eq!(added, 15);
        assert!(particles.position[..15]
            .iter()
            .all(|x| x.x < 0.02 && x.y < 0.0101));
        assert_eq!(particles.material[..15], [Material::Soil; 15]);
    }

    #[test]
    fn capacity_overflow_leaves_state_untouched() {
        let mut particles = Particles::<2>::new();
        let small = CubeRegion::new(Vector2::zeros(), Vector2::new(0.01, 0.01), Material::Fluid);
        particles.fill_cube(&small, &params()).unwrap();
        let before = particles.position[..particles.count()].to_vec();

        // 300 x 300 lattice points, beyond the 65536-particle arena
        let huge = CubeRegion::new(Vector2::zeros(), Vector2::new(1.2, 1.2), Material::Fluid);
        let err = particles.fill_cube(&huge, &params()).unwrap_err();
        assert!(matches!(err, SphError::ParticleCapacity { .. }));

        assert_eq!(particles.count(), before.len());
        assert_eq!(particles.position[..particles.count()], before[..]);
    }

    #[test]
    fn material_ids_round_trip() {
        for material in [
            Material::Fluid,
            Material::Soil,
            Material::Dummy,
            Material::Repulsive,
        ] {
            assert_eq!(Material::from_id(material.id()), Some(material));
        }
        assert_eq!(Material::from_id(3), None);
        assert!(Material::Dummy.is_boundary());
        assert!(Material::Repulsive.is_boundary());
        assert!(!Material::Soil.is_boundary());
    }
}
