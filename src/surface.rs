//! Geometry interchange: the particle set re-expressed as a vertex list,
//! a primitive index list, and a fixed-width per-primitive payload.
//!
//! Coordinates here are in grid units; the payload layout
//! `{particle, reference_point, label}` is the contract shared with
//! external mesh consumers.

use crate::context::SimulationContext;
use crate::math::{vector_from, DIM, VERTS_PER_SPRINGL};
use crate::springl::Springl;
use serde::{Deserialize, Serialize};

/// Fixed-width auxiliary record carried per primitive.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpringlPayload {
    pub particle: [f32; DIM],
    pub reference_point: [f32; DIM],
    pub label: u32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SpringlsSurface {
    /// Vertex positions in grid units, `VERTS_PER_SPRINGL` per primitive.
    pub vertices: Vec<[f32; DIM]>,
    /// Per-primitive vertex indices.
    pub indices: Vec<u32>,
    pub payload: Vec<SpringlPayload>,
}

impl SpringlsSurface {
    pub fn num_primitives(&self) -> usize {
        self.payload.len()
    }

    /// Snapshots the live particle set, rescaling out of the normalized
    /// space. Vertices are not deduplicated across primitives.
    pub fn from_context(ctx: &SimulationContext) -> Self {
        let mut surface = Self {
            vertices: Vec::with_capacity(ctx.elements * VERTS_PER_SPRINGL),
            indices: Vec::with_capacity(ctx.elements * VERTS_PER_SPRINGL),
            payload: Vec::with_capacity(ctx.elements),
        };
        for (springl, &label) in ctx.live().iter().zip(ctx.live_labels()) {
            for v in &springl.vertexes {
                surface.indices.push(surface.vertices.len() as u32);
                surface.vertices.push(to_array(&ctx.to_grid(v)));
            }
            surface.payload.push(SpringlPayload {
                particle: to_array(&ctx.to_grid(&springl.particle)),
                reference_point: to_array(&ctx.to_grid(&springl.reference_point)),
                label,
            });
        }
        surface
    }

    /// Rebuilds a particle set from the interchange form, rescaling into
    /// the normalized space.
    pub fn to_springls(&self, scale_down: f32) -> (Vec<Springl>, Vec<u32>) {
        let mut springls = Vec::with_capacity(self.num_primitives());
        let mut labels = Vec::with_capacity(self.num_primitives());
        for (prim, payload) in self.payload.iter().enumerate() {
            let mut vertexes = [crate::math::Vector::zeros(); VERTS_PER_SPRINGL];
            for (slot, v) in vertexes.iter_mut().enumerate() {
                let idx = self.indices[prim * VERTS_PER_SPRINGL + slot] as usize;
                *v = vector_from(self.vertices[idx]) * scale_down;
            }
            let mut springl = Springl::from_vertexes(vertexes, prim as u32);
            springl.particle = vector_from(payload.particle) * scale_down;
            springl.reference_point = vector_from(payload.reference_point) * scale_down;
            springls.push(springl);
            labels.push(payload.label);
        }
        (springls, labels)
    }
}

fn to_array(v: &crate::math::Vector) -> [f32; DIM] {
    let mut out = [0.0f32; DIM];
    for axis in 0..DIM {
        out[axis] = v[axis];
    }
    out
}
