//! Contraction: stream-compacts out degenerate springls and outliers that
//! drifted away from the zero crossing.

use crate::context::SimulationContext;
use crate::error::SpringlsError;
use crate::levelset::ScalarField;
use crate::params::SimulationParams;
use crate::solver::compaction::CompactionPass;
use rayon::prelude::*;

/// Particles farther than this (grid units) from the zero crossing are
/// outliers.
const OUTLIER_DISTANCE: f32 = 1.5;

/// Smallest useful element measure, in normalized units.
const MIN_MEASURE: f32 = 1.0e-6;

#[derive(Default)]
pub struct Contractor {
    pass: CompactionPass,
    /// Optional per-position weight image; springls sampling below
    /// `atlas_threshold` are culled with the degenerate elements.
    atlas: Option<Box<dyn ScalarField>>,
}

impl Contractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// A contractor whose survivor predicate is additionally biased by an
    /// external atlas weight image.
    pub fn with_atlas(atlas: Box<dyn ScalarField>) -> Self {
        Self {
            pass: CompactionPass::new(),
            atlas: Some(atlas),
        }
    }

    /// Removes non-surviving springls and returns how many were dropped.
    ///
    /// With `outliers_only` the geometry and atlas tests are skipped and
    /// only the distance-to-surface test applies. Removing 90% or more of
    /// the set in one pass is a catastrophic topology failure and aborts
    /// the solve.
    pub fn contract(
        &mut self,
        ctx: &mut SimulationContext,
        params: &SimulationParams,
        outliers_only: bool,
    ) -> Result<usize, SpringlsError> {
        let before = ctx.elements;
        if before == 0 {
            return Ok(0);
        }

        {
            let Self { pass, atlas } = self;
            let counts = pass.counts_mut(before);
            let atlas = atlas.as_deref();
            let springls = ctx.live();
            let signed = &ctx.signed.current;
            let scale_up = ctx.scale_up;
            counts.par_iter_mut().enumerate().for_each(|(i, count)| {
                let springl = &springls[i];
                let phi = signed.sample(&(springl.particle * scale_up));
                let mut survives = phi.abs() <= OUTLIER_DISTANCE;
                if !outliers_only {
                    survives &= !springl.is_degenerate(MIN_MEASURE);
                    if let Some(atlas) = atlas {
                        let weight = atlas.sample(&(springl.particle * scale_up));
                        survives &= weight >= params.atlas_threshold;
                    }
                }
                *count = u32::from(survives);
            });
        }

        let survivors = self.pass.scan();
        let removed = before - survivors;
        if removed * 10 >= before * 9 {
            return Err(SpringlsError::CatastrophicContraction {
                removed,
                total: before,
            });
        }
        if removed == 0 {
            return Ok(0);
        }

        let springls = self.pass.compact(ctx.live());
        let labels = self.pass.compact(ctx.live_labels());
        ctx.adopt_particles(springls, labels);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::levelset::{LevelSet, NarrowBandEvolver};
    use crate::math::{vector_from, DIM};
    use crate::springl::Springl;

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
        let springls = crate::sampling::extract_springls(&ctx.signed.current, ctx.scale_down);
        let labels: Vec<u32> = (0..springls.len() as u32).collect();
        ctx.adopt_particles(springls, labels);
        ctx
    }

    fn far_springl(id: u32) -> Springl {
        // Sits at the domain corner, far from the sphere surface.
        #[cfg(feature = "dim2")]
        return Springl::from_vertexes(
            [vector_from([0.02, 0.02]), vector_from([0.04, 0.02])],
            id,
        );
        #[cfg(feature = "dim3")]
        return Springl::from_vertexes(
            [
                vector_from([0.02, 0.02, 0.02]),
                vector_from([0.04, 0.02, 0.02]),
                vector_from([0.03, 0.04, 0.02]),
            ],
            id,
        );
    }

    #[test]
    fn healthy_surface_is_conserved() {
        let mut ctx = sphere_context(32, 8.0);
        let before = ctx.elements;
        let payload_before: Vec<Springl> = ctx.live().to_vec();

        let params = SimulationParams::default();
        let removed = Contractor::new().contract(&mut ctx, &params, false).unwrap();
        assert_eq!(removed, 0);
        assert_eq!(ctx.elements, before);
        assert_eq!(payload_before, ctx.live());
    }

    #[test]
    fn outliers_are_compacted_out() {
        let mut ctx = sphere_context(32, 8.0);
        let before = ctx.elements;
        // Ids from the top of the range cannot collide with the
        // extraction-assigned ids of the sphere surface.
        let outlier_a = u32::MAX - 2;
        let outlier_b = u32::MAX - 1;
        ctx.append_particles(&[(far_springl(outlier_a), 5), (far_springl(outlier_b), 5)]);

        let params = SimulationParams::default();
        let removed = Contractor::new().contract(&mut ctx, &params, false).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(ctx.elements, before);
        assert!(ctx.elements <= ctx.springls.len());
        // Survivor payloads are untouched.
        assert!(ctx.live().iter().all(|s| s.reference_id < outlier_a));
        assert!(ctx.live_labels().iter().all(|&l| l != 5));
    }

    #[test]
    fn catastrophic_contraction_is_fatal() {
        let mut ctx = sphere_context(32, 8.0);
        // Replace almost everything with far outliers.
        let bad: Vec<(Springl, u32)> = (0..ctx.elements * 20)
            .map(|i| (far_springl(i as u32), 0))
            .collect();
        ctx.append_particles(&bad);

        let params = SimulationParams::default();
        let result = Contractor::new().contract(&mut ctx, &params, false);
        assert!(matches!(
            result,
            Err(SpringlsError::CatastrophicContraction { .. })
        ));
    }

    /// Weight 0 on the low-x half of the domain, 1 elsewhere.
    struct HalfAtlas {
        split: f32,
    }

    impl ScalarField for HalfAtlas {
        fn dimensions(&self) -> [usize; DIM] {
            [32; DIM]
        }
        fn sample(&self, p: &crate::math::Vector) -> f32 {
            if p[0] < self.split {
                0.0
            } else {
                1.0
            }
        }
    }

    #[test]
    fn atlas_weight_biases_the_survivor_predicate() {
        let mut ctx = sphere_context(32, 8.0);
        let before = ctx.elements;

        let params = SimulationParams {
            atlas_threshold: 0.5,
            ..Default::default()
        };
        let mut contractor = Contractor::with_atlas(Box::new(HalfAtlas { split: 16.0 }));
        let removed = contractor.contract(&mut ctx, &params, false).unwrap();

        // Roughly half the sphere sits in the zero-weight region.
        assert!(removed > 0);
        assert_eq!(ctx.elements + removed, before);
        // Every survivor samples at or above the threshold.
        assert!(ctx
            .live()
            .iter()
            .all(|s| s.particle[0] * ctx.scale_up >= 16.0));

        // The same pass in outlier-only mode ignores the atlas.
        let mut ctx = sphere_context(32, 8.0);
        let removed = contractor.contract(&mut ctx, &params, true).unwrap();
        assert_eq!(removed, 0);
    }
}
