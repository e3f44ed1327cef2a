//! Data handed to the external visualizer: screen-space particle vertices
//! and the scalar range its color mapping normalizes against.

use crate::math::T;
use crate::particles::Particles;
use itertools::izip;

/// One particle as the renderer sees it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vertex<const D: usize> {
    pub position: [f32; D],
    pub color: [f32; 3],
}

/// Builds a vertex per particle: the position shifted by the grid padding
/// (so the padded domain starts at the origin) and rescaled to pixel units.
pub fn vertices<const D: usize>(
    particles: &Particles<D>,
    cell_size: T,
    screen_to_world_ratio: T,
    max_resolution: u32,
) -> Vec<Vertex<D>> {
    let count = particles.count();
    let scale = screen_to_world_ratio / max_resolution as T;

    izip!(&particles.position[..count], &particles.color[..count])
        .map(|(x, &color)| {
            let mut position = [0f32; D];
            for d in 0..D {
                position[d] = ((x[d] + cell_size) * scale) as f32;
            }
            Vertex { position, color }
        })
        .collect()
}

/// `(min, max)` of the visualization scalar over all physical particles, or
/// `None` if only boundary particles exist. The external color map derives
/// per-particle colors from the scalar normalized into this range.
pub fn scalar_range<const D: usize>(particles: &Particles<D>) -> Option<(T, T)> {
    let count = particles.count();
    izip!(
        &particles.value[..count],
        &particles.material[..count]
    )
    .filter(|(_, material)| !material.is_boundary())
    .fold(None, |range, (&value, _)| match range {
        None => Some((value, value)),
        Some((min, max)) => Some((min.min(value), max.max(value))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::SimParameters;
    use crate::particles::{CubeRegion, Material};
    use na::Vector2;

    fn filled(material: Material, values: &[T]) -> Particles<2> {
        let params = SimParameters::new(Vector2::new(0.584, 0.8), 0.002);
        let mut particles = Particles::new();
        let cube = CubeRegion::new(
            Vector2::zeros(),
            Vector2::new(0.004 * values.len() as T, 0.004),
            material,
        );
        particles.fill_cube(&cube, &params).unwrap();
        assert_eq!(particles.count(), values.len());
        particles.value[..values.len()].copy_from_slice(values);
        particles
    }

    #[test]
    fn vertices_shift_and_rescale() {
        let particles = filled(Material::Fluid, &[0.]);
        let verts = vertices(&particles, 0.012, 800., 800);
        assert_eq!(verts.len(), 1);
        // (0.002 + 0.012) * 800 / 800
        assert!((verts[0].position[0] - 0.014).abs() < 1e-6);
        assert!((verts[0].position[1] - 0.014).abs() < 1e-6);
        assert_eq!(verts[0].color, [1., 1., 1.]);
    }

    #[test]
    fn scalar_range_spans_physical_particles() {
        let particles = filled(Material::Soil, &[0.5, -1.5, 3.]);
        assert_eq!(scalar_range(&particles), Some((-1.5, 3.)));
    }

    #[test]
    fn scalar_range_ignores_boundary_particles() {
        let particles = filled(Material::Dummy, &[0.5, -1.5, 3.]);
        assert_eq!(scalar_range(&particles), None);
    }
}
