//! Domain-boundary physics: elastic wall collisions for escaped particles
//! and the wall-distance ratio feeding boundary-velocity extrapolation.

use crate::math::{T, TV};
use crate::parameters::SimParameters;
use crate::particles::Particles;
use rayon::prelude::*;

/// Restitution factor: roughly a `1 - COLLISION_FACTOR` velocity loss per
/// wall collision.
pub const COLLISION_FACTOR: T = 0.7;

/// Pushes every physical particle that left `[0, world]` back inside with an
/// elastic correction. Axis violations are corrected independently, one axis
/// after the other.
pub fn enforce_boundary<const D: usize>(particles: &mut Particles<D>, params: &SimParameters<D>) {
    let count = particles.count();
    let world = params.world;
    let Particles {
        position,
        velocity,
        material,
        ..
    } = particles;

    position[..count]
        .par_iter_mut()
        .zip(velocity[..count].par_iter_mut())
        .zip(material[..count].par_iter())
        .for_each(|((x, u), mat)| {
            if mat.is_boundary() {
                return;
            }
            for d in 0..D {
                if x[d] < 0. {
                    collide(x, u, TV::ith(d, 1.), -x[d]);
                }
                if x[d] > world[d] {
                    collide(x, u, TV::ith(d, -1.), x[d] - world[d]);
                }
            }
        });
}

/// Elastic collision against a wall with inward normal `normal` and
/// penetration depth `depth`.
fn collide<const D: usize>(x: &mut TV<D>, u: &mut TV<D>, normal: TV<D>, depth: T) {
    *x += (1. + COLLISION_FACTOR) * normal * depth;
    *u -= (1. + COLLISION_FACTOR) * u.dot(&normal) * normal;
}

/// Ratio `d_B / d_A` of the boundary particle `p_j`'s perpendicular distance
/// to the wall plane separating it from the fluid particle `p_i`, over the
/// fluid particle's own distance to that plane.
///
/// The wall planes sit one grid cell inside the padded domain. When the
/// segment between the two particles crosses more than one plane (near a
/// corner), the plane farthest from `p_i` is discarded so the nearest
/// crossing wins. The caller guarantees `p_j` lies in the boundary layer
/// across a wall from `p_i`.
pub fn boundary_proxy_ratio(
    particles: &Particles<2>,
    params: &SimParameters<2>,
    p_i: usize,
    p_j: usize,
) -> T {
    let x_i = particles.position[p_i];
    let x_j = particles.position[p_j];

    // top, bottom, right, left: (axis, plane offset)
    let walls: [(usize, T); 4] = [
        (1, params.world[1]),
        (1, params.cell_size),
        (0, params.world[0]),
        (0, params.cell_size),
    ];

    let db_i = walls.map(|(axis, plane)| x_i[axis] - plane);
    let db_j = walls.map(|(axis, plane)| x_j[axis] - plane);

    let mut crossing = [false; 4];
    for k in 0..4 {
        crossing[k] = db_i[k] * db_j[k] < 0.;
    }

    if crossing.iter().filter(|&&c| c).count() > 1 {
        let farthest = (0..4)
            .filter(|&k| crossing[k])
            .map(|k| db_i[k].abs())
            .fold(0., T::max);
        for k in 0..4 {
            if crossing[k] && db_i[k].abs() == farthest {
                crossing[k] = false;
            }
        }
    }

    let dot = |db: &[T; 4]| -> T {
        (0..4)
            .filter(|&k| crossing[k])
            .map(|k| db[k])
            .sum::<T>()
            .abs()
    };

    dot(&db_j) / dot(&db_i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particles::Material;
    use na::Vector2;

    fn params() -> SimParameters<2> {
        // cell size 0.3: wall planes at x/y = 0.3 and x/y = 1.0
        SimParameters::new(Vector2::new(1., 1.), 0.05)
    }

    fn two_particles(x_i: Vector2<T>, x_j: Vector2<T>) -> Particles<2> {
        let mut particles = Particles::new();
        let range = particles.reserve(2).unwrap();
        for (p, (position, material)) in
            range.zip([(x_i, Material::Fluid), (x_j, Material::Dummy)])
        {
            particles.add_particle(
                p,
                0.,
                position,
                Vector2::zeros(),
                0.,
                na::Matrix2::zeros(),
                na::Matrix2::zeros(),
                material,
                [1., 1., 1.],
            );
        }
        particles
    }

    #[test]
    fn left_wall_collision() {
        let params = SimParameters::new(Vector2::new(0.584, 0.8), 0.002);
        let mut particles = Particles::new();
        let range = particles.reserve(1).unwrap();
        particles.add_particle(
            range.start,
            0.,
            Vector2::new(-0.001, 0.05),
            Vector2::new(-1., 0.),
            0.,
            na::Matrix2::zeros(),
            na::Matrix2::zeros(),
            Material::Fluid,
            [1., 1., 1.],
        );

        enforce_boundary(&mut particles, &params);

        // x += 1.7 * 0.001, u -= 1.7 * (u . n) n
        assert!((particles.position[0].x - 0.0007).abs() < 1e-12);
        assert_eq!(particles.position[0].y, 0.05);
        assert!((particles.velocity[0].x - 0.7).abs() < 1e-12);
        assert_eq!(particles.velocity[0].y, 0.);
    }

    #[test]
    fn interior_particles_are_untouched() {
        let params = params();
        let mut particles = two_particles(Vector2::new(0.5, 0.5), Vector2::new(0.2, 0.5));
        let before: Vec<_> = particles.position[..2].to_vec();

        enforce_boundary(&mut particles, &params);
        assert_eq!(particles.position[..2], before[..]);
    }

    #[test]
    fn dummy_particles_may_stay_outside() {
        let params = params();
        // the dummy sits outside the world, as the boundary layer does
        let mut particles = two_particles(Vector2::new(0.5, 0.5), Vector2::new(-0.1, 0.5));

        enforce_boundary(&mut particles, &params);
        assert_eq!(particles.position[1], Vector2::new(-0.1, 0.5));
    }

    #[test]
    fn corner_violations_are_corrected_per_axis() {
        let params = params();
        let mut particles = two_particles(Vector2::new(-0.01, 1.02), Vector2::new(0.5, 0.5));
        particles.velocity[0] = Vector2::new(-2., 1.);

        enforce_boundary(&mut particles, &params);

        assert!((particles.position[0].x - (-0.01 + 1.7 * 0.01)).abs() < 1e-12);
        assert!((particles.position[0].y - (1.02 - 1.7 * 0.02)).abs() < 1e-12);
        assert!((particles.velocity[0].x - 1.4).abs() < 1e-12);
        assert!((particles.velocity[0].y - (-0.7)).abs() < 1e-12);
    }

    #[test]
    fn proxy_ratio_single_wall() {
        let params = params();
        // both particles straddle the bottom plane y = 0.3
        let particles = two_particles(Vector2::new(0.5, 0.4), Vector2::new(0.5, 0.25));
        let ratio = boundary_proxy_ratio(&particles, &params, 0, 1);
        assert!((ratio - 0.05 / 0.1).abs() < 1e-12);
    }

    #[test]
    fn proxy_ratio_symmetric_pair() {
        let params = params();
        let particles = two_particles(Vector2::new(0.5, 0.35), Vector2::new(0.5, 0.25));
        let ratio = boundary_proxy_ratio(&particles, &params, 0, 1);
        assert!((ratio - 1.).abs() < 1e-12);
    }

    #[test]
    fn proxy_ratio_keeps_the_nearest_crossing() {
        let params = params();
        // crosses both the left (x = 0.3) and bottom (y = 0.3) planes;
        // p_i is farther from the left plane, so the bottom one is kept
        let particles = two_particles(Vector2::new(0.4, 0.35), Vector2::new(0.28, 0.28));
        let ratio = boundary_proxy_ratio(&particles, &params, 0, 1);
        assert!((ratio - 0.02 / 0.05).abs() < 1e-12);
    }
}
