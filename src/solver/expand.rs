//! Expansion: stream-expands springls whose primitive has grown too
//! large, replacing each with its two longest-edge halves.

use crate::context::SimulationContext;
use crate::solver::compaction::CompactionPass;
use crate::springl::Springl;
use rayon::prelude::*;

/// Edge length (grid units) above which an element is split.
const SPLIT_EDGE_LENGTH: f32 = 1.5;

#[derive(Default)]
pub struct Expander {
    pass: CompactionPass,
}

impl Expander {
    pub fn new() -> Self {
        Self::default()
    }

    /// Splits oversized springls in place; returns how many elements were
    /// added. The backing arrays grow when the new count exceeds the
    /// padded capacity.
    pub fn expand(&mut self, ctx: &mut SimulationContext) -> usize {
        let before = ctx.elements;
        if before == 0 {
            return 0;
        }

        {
            let counts = self.pass.counts_mut(before);
            let springls = ctx.live();
            let scale_up = ctx.scale_up;
            counts.par_iter_mut().enumerate().for_each(|(i, count)| {
                let oversized = springls[i].max_edge_length() * scale_up > SPLIT_EDGE_LENGTH;
                *count = if oversized { 2 } else { 1 };
            });
        }

        let total = self.pass.scan();
        if total == before {
            return 0;
        }

        let mut springls = vec![Springl::zeroed_slot(); total];
        let mut labels = vec![0u32; total];
        let (counts, offsets) = (self.pass.counts(), self.pass.offsets());
        for i in 0..before {
            let dst = offsets[i] as usize;
            let label = ctx.labels[i];
            if counts[i] == 1 {
                springls[dst] = ctx.springls[i];
                labels[dst] = label;
            } else {
                let (a, b) = ctx.springls[i].split();
                springls[dst] = a;
                springls[dst + 1] = b;
                labels[dst] = label;
                labels[dst + 1] = label;
            }
        }

        ctx.adopt_particles(springls, labels);
        total - before
    }
}
