use crate::math::{IV, T, TV};
use crate::parameters::{SimParameters, MAX_NEIGHBORS, MAX_PARTICLES_PER_CELL};
use crate::particles::Particles;
use crate::{Result, SphError};
use num::ToPrimitive;
use rayon::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, info, warn};

/// Uniform background grid hashing particle positions into axis-aligned
/// cells, rebuilt from scratch every step.
///
/// Cells are fixed-capacity slot rows claimed through an atomic
/// fetch-and-increment, the only shared mutable state in the per-step
/// pipeline. Cell contents carry no identity across steps.
pub struct Grid<const D: usize> {
    /// Lower corner of the padded domain the grid covers.
    origin: TV<D>,
    cell_size: T,
    /// Number of cells along each axis.
    extents: IV<D>,
    num_cells: usize,
    /// Per-cell particle counts, written concurrently during [`Grid::rebuild`].
    counts: Vec<AtomicU32>,
    /// Flattened slot rows, [`MAX_PARTICLES_PER_CELL`] entries per cell.
    slots: Vec<AtomicU32>,
    /// Particles whose position hashed outside the grid in the last rebuild.
    out_of_domain: AtomicU32,
    /// In-range candidates dropped by the neighbor cap in the last search.
    dropped_neighbors: AtomicU32,
}

impl<const D: usize> Grid<D> {
    pub fn new(params: &SimParameters<D>) -> Self {
        let range = params.domain_max() - params.domain_min();
        let extents = IV::<D>::from_fn(|d, _| (range[d] / params.cell_size).ceil() as isize);
        let num_cells = (0..D).map(|d| extents[d] as usize).product();

        info!(
            num_cells,
            cell_size = params.cell_size,
            "allocated background grid"
        );

        Grid {
            origin: params.domain_min(),
            cell_size: params.cell_size,
            extents,
            num_cells,
            counts: (0..num_cells).map(|_| AtomicU32::new(0)).collect(),
            slots: (0..num_cells * MAX_PARTICLES_PER_CELL)
                .map(|_| AtomicU32::new(0))
                .collect(),
            out_of_domain: AtomicU32::new(0),
            dropped_neighbors: AtomicU32::new(0),
        }
    }

    /// Maps a world position to integer cell coordinates. Non-finite
    /// components land on an invalid cell rather than panicking.
    pub fn position_to_cell(&self, position: TV<D>) -> IV<D> {
        IV::from_fn(|d, _| {
            ((position[d] - self.origin[d]) / self.cell_size)
                .floor()
                .to_isize()
                .unwrap_or(isize::MIN)
        })
    }

    /// True iff every axis coordinate lies within the grid extents.
    pub fn is_valid_cell(&self, cell: IV<D>) -> bool {
        (0..D).all(|d| 0 <= cell[d] && cell[d] < self.extents[d])
    }

    /// Flat index of a valid cell. The x coordinate varies fastest.
    fn cell_to_index(&self, cell: IV<D>) -> usize {
        let mut index = 0;
        for d in (0..D).rev() {
            index = index * self.extents[d] as usize + cell[d] as usize;
        }
        index
    }

    /// Clears every cell and scatters all live particles back in, in
    /// parallel. Claiming more slots than a cell holds is a hard error;
    /// particles hashing outside the grid are skipped and counted.
    pub fn rebuild(&mut self, particles: &Particles<D>) -> Result<()> {
        for count in self.counts.iter_mut() {
            *count.get_mut() = 0;
        }
        *self.out_of_domain.get_mut() = 0;

        let positions = &particles.position[..particles.count()];
        positions.par_iter().enumerate().for_each(|(p, &position)| {
            let cell = self.position_to_cell(position);
            if !self.is_valid_cell(cell) {
                self.out_of_domain.fetch_add(1, Ordering::Relaxed);
                return;
            }
            let index = self.cell_to_index(cell);
            let slot = self.counts[index].fetch_add(1, Ordering::Relaxed) as usize;
            if slot < MAX_PARTICLES_PER_CELL {
                self.slots[index * MAX_PARTICLES_PER_CELL + slot]
                    .store(p as u32, Ordering::Relaxed);
            }
        });

        let escaped = *self.out_of_domain.get_mut();
        if escaped > 0 {
            warn!(
                escaped,
                "particles outside the padded domain were not scattered"
            );
        }

        let mut dropped = 0;
        for count in self.counts.iter_mut() {
            let claimed = *count.get_mut();
            if claimed as usize > MAX_PARTICLES_PER_CELL {
                dropped += claimed - MAX_PARTICLES_PER_CELL as u32;
                *count.get_mut() = MAX_PARTICLES_PER_CELL as u32;
            }
        }
        if dropped > 0 {
            return Err(SphError::CellOverflow { dropped });
        }
        Ok(())
    }

    /// Rebuilds every non-boundary particle's neighbor row from the 3^D cell
    /// stencil around it. Rows are capped at [`MAX_NEIGHBORS`]; in-range
    /// candidates beyond the cap are dropped (and counted), not re-sorted by
    /// distance. Enumeration order within a row follows scatter order and is
    /// not deterministic across runs.
    pub fn search_neighbors(&self, particles: &mut Particles<D>, support_radius: T) {
        self.dropped_neighbors.store(0, Ordering::Relaxed);

        let count = particles.count();
        let Particles {
            position,
            material,
            neighbors,
            neighbor_counts,
            ..
        } = particles;
        let position = &position[..count];
        let material = &material[..count];

        neighbors[..count * MAX_NEIGHBORS]
            .par_chunks_mut(MAX_NEIGHBORS)
            .zip(neighbor_counts[..count].par_iter_mut())
            .enumerate()
            .for_each(|(i, (row, row_count))| {
                if material[i].is_boundary() {
                    *row_count = 0;
                    return;
                }

                let x_i = position[i];
                let center = self.position_to_cell(x_i);
                let mut found = 0usize;
                let mut dropped = 0u32;

                for offset in stencil::<D>() {
                    let cell = center + offset;
                    if !self.is_valid_cell(cell) {
                        continue;
                    }
                    let index = self.cell_to_index(cell);
                    let in_cell = self.counts[index].load(Ordering::Relaxed) as usize;
                    for slot in 0..in_cell {
                        let j = self.slots[index * MAX_PARTICLES_PER_CELL + slot]
                            .load(Ordering::Relaxed);
                        if j as usize == i {
                            continue;
                        }
                        if (x_i - position[j as usize]).norm() < support_radius {
                            if found < MAX_NEIGHBORS {
                                row[found] = j;
                                found += 1;
                            } else {
                                dropped += 1;
                            }
                        }
                    }
                }

                *row_count = found as u32;
                if dropped > 0 {
                    self.dropped_neighbors.fetch_add(dropped, Ordering::Relaxed);
                }
            });

        let dropped = self.dropped_neighbors.load(Ordering::Relaxed);
        if dropped > 0 {
            debug!(dropped, "neighbor rows truncated at capacity");
        }
    }

    /// Particle handles currently scattered into `cell`.
    pub fn cell_particles(&self, cell: IV<D>) -> Vec<u32> {
        if !self.is_valid_cell(cell) {
            return Vec::new();
        }
        let index = self.cell_to_index(cell);
        let len = (self.counts[index].load(Ordering::Relaxed) as usize).min(MAX_PARTICLES_PER_CELL);
        (0..len)
            .map(|slot| self.slots[index * MAX_PARTICLES_PER_CELL + slot].load(Ordering::Relaxed))
            .collect()
    }

    /// Sum of all per-cell counts.
    pub fn occupancy(&self) -> usize {
        self.counts
            .iter()
            .map(|count| count.load(Ordering::Relaxed) as usize)
            .sum()
    }

    pub fn extents(&self) -> IV<D> {
        self.extents
    }

    pub fn num_cells(&self) -> usize {
        self.num_cells
    }

    /// Candidates dropped by the per-particle neighbor cap in the last search.
    pub fn dropped_neighbors(&self) -> u32 {
        self.dropped_neighbors.load(Ordering::Relaxed)
    }

    /// Particles that hashed outside the grid in the last rebuild.
    pub fn out_of_domain(&self) -> u32 {
        self.out_of_domain.load(Ordering::Relaxed)
    }
}

/// Offsets of the 3^D stencil covering a cell and all its adjacent cells.
fn stencil<const D: usize>() -> impl Iterator<Item = IV<D>> {
    (0..3usize.pow(D as u32)).map(|mut flat| {
        let mut offset = IV::zeros();
        for d in 0..D {
            offset[d] = (flat % 3) as isize - 1;
            flat /= 3;
        }
        offset
    })
}
