//! Spring relaxation: evens out particle spacing by pulling each vertex
//! toward a rest distance from its recorded neighbors.

use crate::context::SimulationContext;
use crate::hash::NeighborList;
use crate::math::{Vector, VERTS_PER_SPRINGL};
use crate::params::SimulationParams;
use rayon::prelude::*;

/// Fraction of the correction applied per iteration.
const RELAX_WEIGHT: f32 = 0.1;

/// Rest distance between neighboring vertices, in grid units.
const REST_DISTANCE: f32 = 1.0;

#[derive(Default)]
pub struct Relaxer {
    /// New vertex positions (compute pass output, apply pass input).
    updates: Vec<Vector>,
}

impl Relaxer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `relax_iterations` spring iterations, each as a compute pass
    /// followed by an apply pass so neighbor reads never race with vertex
    /// writes.
    pub fn relax(
        &mut self,
        ctx: &mut SimulationContext,
        params: &SimulationParams,
        neighbors: &NeighborList,
    ) {
        if neighbors.is_empty() || ctx.elements == 0 {
            return;
        }
        let n = ctx.elements * VERTS_PER_SPRINGL;

        for _ in 0..params.relax_iterations {
            self.updates.clear();
            self.updates.resize(n, Vector::zeros());

            {
                let springls = ctx.live();
                let scale_up = ctx.scale_up;
                let scale_down = ctx.scale_down;
                self.updates
                    .par_iter_mut()
                    .enumerate()
                    .for_each(|(list_id, out)| {
                        let particle = list_id / VERTS_PER_SPRINGL;
                        let vertex = list_id % VERTS_PER_SPRINGL;
                        let p = springls[particle].vertexes[vertex];

                        let mut correction = Vector::zeros();
                        for neighbor in neighbors.of(particle, vertex) {
                            let q = springls[neighbor.particle as usize].vertexes
                                [neighbor.vertex as usize];
                            let d = (p - q).norm() * scale_up;
                            if d > 1.0e-6 {
                                // Positive when too close, pushing apart.
                                let stretch = (REST_DISTANCE - d) * scale_down;
                                correction += (p - q) * (stretch / (d * scale_down));
                            }
                        }
                        *out = p + correction * RELAX_WEIGHT;
                    });
            }

            {
                let updates = &self.updates;
                ctx.live_mut()
                    .par_iter_mut()
                    .enumerate()
                    .for_each(|(i, springl)| {
                        for v in 0..VERTS_PER_SPRINGL {
                            springl.vertexes[v] = updates[i * VERTS_PER_SPRINGL + v];
                        }
                        springl.recenter_particle();
                    });
            }
        }
    }
}
