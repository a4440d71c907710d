//! Bucketed spatial hash over the narrow-band cells, plus the derived
//! per-vertex neighbor lists and the springl distance splat.
//!
//! Buckets are keyed by active-list slot, so the table is rebuilt every
//! step after the band is patched. Bucket capacity is fixed; candidates
//! beyond it are dropped but counted, so dense clustering is observable
//! instead of silent.

use crate::context::{SimulationContext, NOT_IN_BAND};
use crate::math::{Vector, DIM, VERTS_PER_SPRINGL};
use crate::params::SimulationParams;
use rayon::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};

/// Fixed bucket capacity, in particle indices per narrow-band cell.
pub const MAX_BIN_SIZE: usize = 64;

/// Padding marker in bins and neighbor lists.
pub const NO_NEIGHBOR: u32 = u32::MAX;

/// Cell radius each particle splats over. Must cover both the unsigned
/// distance stencil and `nearest_neighbor_distance`, so every query reads
/// only its own bucket.
const SPLAT_RADIUS: i32 = 2;

/// One nearest-neighbor record: a vertex of another springl.
#[derive(Copy, Clone, Debug)]
pub struct Neighbor {
    pub particle: u32,
    pub vertex: u32,
    /// Distance in grid units.
    pub distance: f32,
}

impl Neighbor {
    fn none() -> Self {
        Self {
            particle: NO_NEIGHBOR,
            vertex: 0,
            distance: f32::INFINITY,
        }
    }

    pub fn is_set(&self) -> bool {
        self.particle != NO_NEIGHBOR
    }
}

/// Fixed-capacity neighbor lists, one stride per (particle, vertex).
#[derive(Default)]
pub struct NeighborList {
    entries: Vec<Neighbor>,
    stride: usize,
}

impl NeighborList {
    /// Live neighbors of one springl vertex.
    pub fn of(&self, particle: usize, vertex: usize) -> &[Neighbor] {
        let start = (particle * VERTS_PER_SPRINGL + vertex) * self.stride;
        let chunk = &self.entries[start..start + self.stride];
        let live = chunk.iter().take_while(|n| n.is_set()).count();
        &chunk[..live]
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct SpatialHash {
    /// Per-bucket fill counts; may exceed `MAX_BIN_SIZE`, the excess is the
    /// overflow.
    counts: Vec<AtomicU32>,
    /// `capacity * MAX_BIN_SIZE` particle indices.
    bins: Vec<AtomicU32>,
    overflow: AtomicU32,
}

impl Default for SpatialHash {
    fn default() -> Self {
        Self::new()
    }
}

impl SpatialHash {
    pub fn new() -> Self {
        Self {
            counts: Vec::new(),
            bins: Vec::new(),
            overflow: AtomicU32::new(0),
        }
    }

    /// Candidates dropped by full buckets since the last rebuild.
    pub fn overflow_count(&self) -> u32 {
        self.overflow.load(Ordering::Relaxed)
    }

    /// Live particle indices bucketed onto one active-list slot.
    pub fn bucket(&self, slot: usize) -> impl Iterator<Item = u32> + '_ {
        let len = (self.counts[slot].load(Ordering::Relaxed) as usize).min(MAX_BIN_SIZE);
        self.bins[slot * MAX_BIN_SIZE..slot * MAX_BIN_SIZE + len]
            .iter()
            .map(|v| v.load(Ordering::Relaxed))
    }

    /// Rebuilds the bucket table from the current active list and particle
    /// array. Each particle scatters into every band cell within
    /// `SPLAT_RADIUS` of its bounding box.
    pub fn update_spatial_hash(&mut self, ctx: &SimulationContext) {
        let buckets = ctx.active_list.capacity.max(ctx.active_list.len());
        self.counts.clear();
        self.counts.resize_with(buckets, || AtomicU32::new(0));
        self.bins.clear();
        self.bins
            .resize_with(buckets * MAX_BIN_SIZE, || AtomicU32::new(NO_NEIGHBOR));
        self.overflow.store(0, Ordering::Relaxed);

        let counts = &self.counts;
        let bins = &self.bins;
        let overflow = &self.overflow;
        let grid = &ctx.signed.current;
        let band_slot = &ctx.band_slot;

        ctx.live().par_iter().enumerate().for_each(|(id, springl)| {
            let (lo, hi) = splat_bounds(ctx, springl);
            for_each_cell(lo, hi, |cell| {
                if !grid.in_bounds(cell) {
                    return;
                }
                let slot = band_slot[grid.index(cell)];
                if slot == NOT_IN_BAND {
                    return;
                }
                let k = counts[slot as usize].fetch_add(1, Ordering::Relaxed) as usize;
                if k < MAX_BIN_SIZE {
                    bins[slot as usize * MAX_BIN_SIZE + k].store(id as u32, Ordering::Relaxed);
                } else {
                    overflow.fetch_add(1, Ordering::Relaxed);
                }
            });
        });
    }

    /// Re-splats the springl distance onto the grid: every band cell
    /// gathers the minimum distance to the particles in its own bucket,
    /// signed by which side of the nearest element the cell lies on, so
    /// the evolver can relax the zero crossing onto the explicit surface.
    /// Cells without a nearby particle are plugged keeping the sign of
    /// the signed field. Pure gather, so the whole grid updates in one
    /// race-free pass.
    pub fn update_unsigned_level_set(&self, ctx: &mut SimulationContext) {
        let sentinel = SimulationContext::BAND_SENTINEL;
        let springls = &ctx.springls;
        let band_slot = &ctx.band_slot;
        let grid = &ctx.signed.current;
        let scale_down = ctx.scale_down;
        let scale_up = ctx.scale_up;
        let hash = self;

        ctx.unsigned
            .as_mut_slice()
            .par_iter_mut()
            .enumerate()
            .for_each(|(idx, out)| {
                let slot = band_slot[idx];
                if slot == NOT_IN_BAND {
                    *out = sentinel.copysign(grid.get_index(idx));
                    return;
                }
                let cell = grid.cell_of(idx);
                let mut p = Vector::zeros();
                for axis in 0..DIM {
                    p[axis] = cell[axis] as f32 * scale_down;
                }
                let mut best = sentinel;
                let mut side = 1.0f32;
                for id in hash.bucket(slot as usize) {
                    let springl = &springls[id as usize];
                    let d = springl.distance_to_point(&p) * scale_up;
                    if d < best {
                        best = d;
                        side = (p - springl.particle).dot(&springl.raw_normal());
                    }
                }
                *out = if best < sentinel {
                    best.copysign(side)
                } else {
                    sentinel.copysign(grid.get_index(idx))
                };
            });
    }

    /// Derives, for every particle vertex, the nearest other-particle
    /// vertices within `nearest_neighbor_distance` (grid units):
    /// map each vertex onto its bucket's candidates, sort by distance,
    /// keep the top `max_neighbors`.
    pub fn update_nearest_neighbors(
        &self,
        ctx: &SimulationContext,
        params: &SimulationParams,
        out: &mut NeighborList,
    ) {
        let stride = params.max_neighbors.max(1);
        out.stride = stride;
        out.entries.clear();
        out.entries
            .resize(ctx.elements * VERTS_PER_SPRINGL * stride, Neighbor::none());

        let springls = ctx.live();
        let grid = &ctx.signed.current;
        let band_slot = &ctx.band_slot;
        let scale_up = ctx.scale_up;
        let cutoff = params.nearest_neighbor_distance;
        let hash = self;

        out.entries
            .par_chunks_mut(stride)
            .enumerate()
            .for_each(|(list_id, chunk)| {
                let particle = list_id / VERTS_PER_SPRINGL;
                let vertex = list_id % VERTS_PER_SPRINGL;
                let p = springls[particle].vertexes[vertex];

                let mut cell = [0i32; DIM];
                for axis in 0..DIM {
                    cell[axis] = (p[axis] * scale_up).floor() as i32;
                }
                if !grid.in_bounds(cell) {
                    return;
                }
                let slot = band_slot[grid.index(cell)];
                if slot == NOT_IN_BAND {
                    return;
                }

                let mut candidates: Vec<Neighbor> = Vec::with_capacity(MAX_BIN_SIZE);
                for id in hash.bucket(slot as usize) {
                    if id as usize == particle {
                        continue;
                    }
                    for (v, q) in springls[id as usize].vertexes.iter().enumerate() {
                        let d = (p - q).norm() * scale_up;
                        if d <= cutoff {
                            candidates.push(Neighbor {
                                particle: id,
                                vertex: v as u32,
                                distance: d,
                            });
                        }
                    }
                }
                candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance));
                for (dst, src) in chunk.iter_mut().zip(candidates.into_iter()) {
                    *dst = src;
                }
            });
    }
}

/// Inclusive cell bounds of a particle's splat footprint, in grid units.
fn splat_bounds(ctx: &SimulationContext, springl: &crate::springl::Springl) -> ([i32; DIM], [i32; DIM]) {
    let mut lo = [i32::MAX; DIM];
    let mut hi = [i32::MIN; DIM];
    for v in springl.vertexes.iter().chain(std::iter::once(&springl.particle)) {
        let g = ctx.to_grid(v);
        for axis in 0..DIM {
            lo[axis] = lo[axis].min(g[axis].floor() as i32 - SPLAT_RADIUS);
            hi[axis] = hi[axis].max(g[axis].ceil() as i32 + SPLAT_RADIUS);
        }
    }
    (lo, hi)
}

/// Visits every cell of an inclusive box.
fn for_each_cell(lo: [i32; DIM], hi: [i32; DIM], mut f: impl FnMut([i32; DIM])) {
    #[cfg(feature = "dim2")]
    for y in lo[1]..=hi[1] {
        for x in lo[0]..=hi[0] {
            f([x, y]);
        }
    }
    #[cfg(feature = "dim3")]
    for z in lo[2]..=hi[2] {
        for y in lo[1]..=hi[1] {
            for x in lo[0]..=hi[0] {
                f([x, y, z]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levelset::{LevelSet, NarrowBandEvolver};
    use crate::math::vector_from;
    use crate::springl::Springl;

    fn flat_interface_context(n: usize) -> SimulationContext {
        // Zero crossing on the plane x = n/2.
        let mut grid = LevelSet::new([n; DIM], 0.0);
        for idx in 0..grid.len() {
            let cell = grid.cell_of(idx);
            grid.set_index(idx, cell[0] as f32 - n as f32 / 2.0);
        }
        let mut ctx = SimulationContext::new(grid);
        NarrowBandEvolver::new().rebuild_narrow_band(&mut ctx);
        ctx
    }

    fn springl_at(x: f32, y: f32, id: u32) -> Springl {
        #[cfg(feature = "dim2")]
        return Springl::from_vertexes(
            [vector_from([x, y - 0.01]), vector_from([x, y + 0.01])],
            id,
        );
        #[cfg(feature = "dim3")]
        return Springl::from_vertexes(
            [
                vector_from([x, y - 0.01, 0.5]),
                vector_from([x, y + 0.01, 0.5]),
                vector_from([x, y, 0.51]),
            ],
            id,
        );
    }

    #[test]
    fn bucket_contains_splatted_particle() {
        let mut ctx = flat_interface_context(16);
        // One springl sitting on the interface.
        ctx.adopt_particles(vec![springl_at(0.5, 0.5, 0)], vec![0]);

        let mut hash = SpatialHash::new();
        hash.update_spatial_hash(&ctx);
        assert_eq!(hash.overflow_count(), 0);

        // The cell right at the particle must see it.
        let cell = [8i32; DIM];
        let slot = ctx.band_slot[ctx.signed.current.index(cell)];
        assert_ne!(slot, NOT_IN_BAND);
        assert!(hash.bucket(slot as usize).any(|id| id == 0));
    }

    #[test]
    fn unsigned_splat_tracks_particle_distance() {
        let mut ctx = flat_interface_context(16);
        ctx.adopt_particles(vec![springl_at(0.5, 0.5, 0)], vec![0]);

        let mut hash = SpatialHash::new();
        hash.update_spatial_hash(&ctx);
        hash.update_unsigned_level_set(&mut ctx);

        let cell = [8i32; DIM];
        let d = ctx.unsigned.get(cell);
        // The particle passes within a fraction of a cell of this point.
        assert!(d.abs() < 1.0, "springl distance too large: {d}");

        // The sign tells the sides of the element apart: the springl
        // normal points along +x, so cells left of it read negative.
        let mut behind = [8i32; DIM];
        behind[0] = 7;
        let mut ahead = [8i32; DIM];
        ahead[0] = 9;
        assert!(ctx.unsigned.get(behind) < 0.0);
        assert!(ctx.unsigned.get(ahead) > 0.0);

        // An out-of-band cell stays plugged.
        let far = [1i32; DIM];
        let idx = ctx.signed.current.index(far);
        if ctx.band_slot[idx] == NOT_IN_BAND {
            assert_eq!(
                ctx.unsigned.get(far).abs(),
                SimulationContext::BAND_SENTINEL
            );
        }
    }

    #[test]
    fn neighbor_lists_rank_by_distance() {
        let mut ctx = flat_interface_context(16);
        ctx.adopt_particles(
            vec![
                springl_at(0.5, 0.50, 0),
                springl_at(0.5, 0.53, 1),
                springl_at(0.5, 0.58, 2),
            ],
            vec![0, 0, 0],
        );

        let mut hash = SpatialHash::new();
        hash.update_spatial_hash(&ctx);

        let params = SimulationParams::default();
        let mut neighbors = NeighborList::default();
        hash.update_nearest_neighbors(&ctx, &params, &mut neighbors);

        let list = neighbors.of(0, 0);
        assert!(!list.is_empty());
        // Sorted ascending, no self references.
        for pair in list.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
        assert!(list.iter().all(|n| n.particle != 0));
        assert_eq!(list[0].particle, 1);
    }

    #[test]
    fn full_bucket_counts_overflow() {
        let mut ctx = flat_interface_context(16);
        let crowd: Vec<Springl> = (0..(MAX_BIN_SIZE as u32 + 16))
            .map(|id| springl_at(0.5, 0.5, id))
            .collect();
        let labels = vec![0u32; crowd.len()];
        ctx.adopt_particles(crowd, labels);

        let mut hash = SpatialHash::new();
        hash.update_spatial_hash(&ctx);
        assert!(hash.overflow_count() > 0);
    }
}
