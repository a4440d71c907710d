//! Gap filling: synthesizes new springls in narrow-band cells the surface
//! passes through but no particle covers, then repairs the labels of the
//! newcomers from their surviving neighbors.

use crate::context::SimulationContext;
use crate::hash::SpatialHash;
use crate::math::DIM;
use crate::sampling::springls_in_cell;
use crate::solver::compaction::CompactionPass;
use crate::springl::{Springl, UNLABELED};
use rayon::prelude::*;

/// A band cell with no particle within this distance (grid units) is a
/// gap. Must exceed the cell diagonal: the splat samples distance at the
/// cell's base corner, which sits up to `sqrt(DIM)` from a surface point
/// inside the cell.
#[cfg(feature = "dim2")]
const UNCOVERED_DISTANCE: f32 = 1.5;
#[cfg(feature = "dim3")]
const UNCOVERED_DISTANCE: f32 = 1.8;

/// Upper bound on label-propagation sweeps; gaps are local, so labels
/// arrive within a few hops.
const MAX_LABEL_SWEEPS: usize = 8;

#[derive(Default)]
pub struct GapFiller {
    pass: CompactionPass,
    /// Per-active-cell synthesized candidates, reused across calls.
    synthesized: Vec<Vec<Springl>>,
}

impl GapFiller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts new springls into uncovered surface cells; returns how many
    /// were added. Newcomers carry [`UNLABELED`] until `fill_labels` runs.
    pub fn fill_gaps(&mut self, ctx: &mut SimulationContext) -> usize {
        let n = ctx.active_list.len();
        if n == 0 {
            return 0;
        }

        self.synthesized.clear();
        self.synthesized.resize(n, Vec::new());
        {
            let signed = &ctx.signed.current;
            let unsigned = &ctx.unsigned;
            let cells = &ctx.active_list.cells;
            let scale_down = ctx.scale_down;
            self.synthesized
                .par_iter_mut()
                .enumerate()
                .for_each(|(slot, out)| {
                    out.clear();
                    let idx = cells[slot] as usize;
                    if unsigned.get_index(idx).abs() > UNCOVERED_DISTANCE {
                        springls_in_cell(signed, signed.cell_of(idx), scale_down, out);
                    }
                });
        }

        {
            let counts = self.pass.counts_mut(n);
            let synthesized = &self.synthesized;
            counts.par_iter_mut().enumerate().for_each(|(slot, count)| {
                *count = synthesized[slot].len() as u32;
            });
        }
        let added = self.pass.scan();
        if added == 0 {
            return 0;
        }

        // Scatter in offset order; ids continue past the existing range.
        let base = ctx.elements as u32;
        let mut extra = Vec::with_capacity(added);
        for candidates in &self.synthesized {
            for &candidate in candidates {
                let mut springl = candidate;
                springl.reference_id = base + extra.len() as u32;
                extra.push((springl, UNLABELED));
            }
        }
        debug_assert_eq!(extra.len(), added);
        ctx.append_particles(&extra);
        added
    }

    /// Propagates connectivity labels from labeled neighbors into every
    /// unlabeled particle, nearest neighbor first. Particles that stay
    /// unreachable after the sweeps fall back to label 0.
    pub fn fill_labels(&mut self, ctx: &mut SimulationContext, hash: &SpatialHash) {
        let n = ctx.elements;
        for _ in 0..MAX_LABEL_SWEEPS {
            let resolved: Vec<(usize, u32)> = {
                let springls = ctx.live();
                let labels = ctx.live_labels();
                let grid = &ctx.signed.current;
                let band_slot = &ctx.band_slot;
                let scale_up = ctx.scale_up;
                (0..n)
                    .into_par_iter()
                    .filter_map(|i| {
                        if labels[i] != UNLABELED {
                            return None;
                        }
                        let p = springls[i].particle;
                        let mut cell = [0i32; DIM];
                        for axis in 0..DIM {
                            cell[axis] = (p[axis] * scale_up).floor() as i32;
                        }
                        if !grid.in_bounds(cell) {
                            return None;
                        }
                        let slot = band_slot[grid.index(cell)];
                        if slot == crate::context::NOT_IN_BAND {
                            return None;
                        }

                        let mut best = f32::INFINITY;
                        let mut label = None;
                        for id in hash.bucket(slot as usize) {
                            let id = id as usize;
                            if id == i || labels[id] == UNLABELED {
                                continue;
                            }
                            let d = (springls[id].particle - p).norm();
                            if d < best {
                                best = d;
                                label = Some(labels[id]);
                            }
                        }
                        label.map(|l| (i, l))
                    })
                    .collect()
            };

            if resolved.is_empty() {
                break;
            }
            for (i, label) in resolved {
                ctx.labels[i] = label;
            }
        }

        for label in &mut ctx.labels[..n] {
            if *label == UNLABELED {
                *label = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levelset::{LevelSet, NarrowBandEvolver};

    fn sphere_context(n: usize, radius: f32) -> SimulationContext {
        let mut grid = LevelSet::new([n; DIM], 0.0);
        for idx in 0..grid.len() {
            let cell = grid.cell_of(idx);
            let mut d2 = 0.0f32;
            for axis in 0..DIM {
                let x = cell[axis] as f32 - n as f32 / 2.0;
                d2 += x * x;
            }
            grid.set_index(idx, d2.sqrt() - radius);
        }
        let mut ctx = SimulationContext::new(grid);
        NarrowBandEvolver::new().rebuild_narrow_band(&mut ctx);
        ctx
    }

    #[test]
    fn bare_surface_is_fully_repopulated() {
        // No particles at all: every surface cell is a gap.
        let mut ctx = sphere_context(32, 8.0);
        let mut hash = SpatialHash::new();
        hash.update_spatial_hash(&ctx);
        hash.update_unsigned_level_set(&mut ctx);

        let added = GapFiller::new().fill_gaps(&mut ctx);
        assert!(added > 0);
        assert_eq!(ctx.elements, added);
        assert!(ctx.elements <= ctx.springls.len());
        assert!(ctx.live_labels().iter().all(|&l| l == UNLABELED));
    }

    #[test]
    fn covered_surface_gets_no_insertions() {
        let mut ctx = sphere_context(32, 8.0);
        let springls = crate::sampling::extract_springls(&ctx.signed.current, ctx.scale_down);
        let labels = vec![1u32; springls.len()];
        ctx.adopt_particles(springls, labels);

        let mut hash = SpatialHash::new();
        hash.update_spatial_hash(&ctx);
        hash.update_unsigned_level_set(&mut ctx);

        assert_eq!(GapFiller::new().fill_gaps(&mut ctx), 0);
    }

    #[test]
    fn labels_propagate_to_newcomers() {
        let mut ctx = sphere_context(32, 8.0);
        let springls = crate::sampling::extract_springls(&ctx.signed.current, ctx.scale_down);
        let labels = vec![7u32; springls.len()];
        ctx.adopt_particles(springls, labels);

        // Orphan a chunk of the surface.
        let orphaned = ctx.elements / 4;
        for label in &mut ctx.labels[..orphaned] {
            *label = UNLABELED;
        }

        let mut hash = SpatialHash::new();
        hash.update_spatial_hash(&ctx);
        let mut filler = GapFiller::new();
        filler.fill_labels(&mut ctx, &hash);

        assert!(ctx.live_labels().iter().all(|&l| l == 7));
    }
}
