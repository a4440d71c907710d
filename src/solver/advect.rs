//! Particle advection: per-vertex forces from pressure/vector fields or an
//! analytic test velocity, a global max-force reduction for the stability
//! bound, then the displacement pass.

use crate::context::SimulationContext;
use crate::levelset::{ScalarField, VectorField};
use crate::math::{Vector, DIM, VERTS_PER_SPRINGL};
use crate::params::SimulationParams;
use rayon::prelude::*;
use std::f32::consts::PI;

/// Below this force magnitude the step is a converged no-op.
const FORCE_EPSILON: f32 = 1.0e-3;

/// Force source, fixed at construction; there is no per-call branching on
/// which fields exist.
pub enum ForceMode {
    /// Scalar pressure image; the force acts along the springl normal.
    Pressure(Box<dyn ScalarField>),
    /// Sampled velocity image, in grid units per unit time.
    Vector(Box<dyn VectorField>),
    /// Both of the above, summed.
    PressureVector(Box<dyn ScalarField>, Box<dyn VectorField>),
    /// Analytic deformation test velocity over the unit cube.
    Enright,
    /// Analytic rigid rotation about the domain center, one revolution per
    /// `period` time units.
    Zalesak { period: f32 },
}

#[derive(Copy, Clone)]
struct VertexForces {
    vertexes: [Vector; VERTS_PER_SPRINGL],
}

pub struct Advector {
    mode: ForceMode,
    /// Simulated time accumulated so far; the Enright field reverses over
    /// its period through this.
    elapsed: f32,
    forces: Vec<VertexForces>,
}

impl Advector {
    pub fn new(mode: ForceMode) -> Self {
        Self {
            mode,
            elapsed: 0.0,
            forces: Vec::new(),
        }
    }

    pub fn mode(&self) -> &ForceMode {
        &self.mode
    }

    /// Simulated time accumulated over all advection steps.
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// Advances every particle vertex by one force step.
    ///
    /// Returns the maximum vertex displacement actually applied, in
    /// normalized units; zero when the maximum force is below
    /// [`FORCE_EPSILON`] and the step was skipped. No vertex ever moves
    /// farther than half the cell extent.
    pub fn advect(
        &mut self,
        ctx: &mut SimulationContext,
        params: &SimulationParams,
        time_step: f32,
    ) -> f32 {
        let n = ctx.elements;
        if n == 0 {
            return 0.0;
        }
        self.forces.clear();
        self.forces.resize(
            n,
            VertexForces {
                vertexes: [Vector::zeros(); VERTS_PER_SPRINGL],
            },
        );

        // Force pass.
        {
            let mode = &self.mode;
            let elapsed = self.elapsed;
            let springls = ctx.live();
            let scale_up = ctx.scale_up;
            let scale_down = ctx.scale_down;
            self.forces.par_iter_mut().enumerate().for_each(|(i, out)| {
                let springl = &springls[i];
                let normal = springl.normal().unwrap_or_else(Vector::zeros);
                for (v, p) in springl.vertexes.iter().enumerate() {
                    out.vertexes[v] = match mode {
                        ForceMode::Pressure(pressure) => {
                            pressure_force(pressure.as_ref(), params, p, &normal, scale_up)
                        }
                        ForceMode::Vector(velocity) => {
                            vector_force(velocity.as_ref(), params, p, scale_up, scale_down)
                        }
                        ForceMode::PressureVector(pressure, velocity) => {
                            pressure_force(pressure.as_ref(), params, p, &normal, scale_up)
                                + vector_force(
                                    velocity.as_ref(),
                                    params,
                                    p,
                                    scale_up,
                                    scale_down,
                                )
                        }
                        ForceMode::Enright => {
                            enright_velocity(p, elapsed) * params.advection_weight
                        }
                        ForceMode::Zalesak { period } => {
                            zalesak_velocity(p, *period) * params.advection_weight
                        }
                    };
                }
            });
        }

        // Global stability bound: the largest force fixes the step scale.
        let max_force = self
            .forces
            .par_iter()
            .map(|f| {
                f.vertexes
                    .iter()
                    .map(|v| v.norm())
                    .fold(0.0f32, f32::max)
            })
            .reduce(|| 0.0, f32::max);
        if max_force < FORCE_EPSILON {
            // Time still passes: the analytic fields are time-dependent
            // and can vanish momentarily at their reversal point.
            self.elapsed += time_step;
            return 0.0;
        }
        let step = time_step.min(0.5 * ctx.v_extent() / max_force);

        // Displacement pass.
        {
            let forces = &self.forces;
            let preserve_topology = params.preserve_topology;
            ctx.live_mut().par_iter_mut().enumerate().for_each(|(i, springl)| {
                let before = *springl;
                for (v, p) in springl.vertexes.iter_mut().enumerate() {
                    *p += forces[i].vertexes[v] * step;
                    for axis in 0..DIM {
                        p[axis] = p[axis].clamp(0.0, 1.0);
                    }
                }
                // A move that inverts the element is rejected wholesale.
                if preserve_topology
                    && springl.raw_normal().dot(&before.raw_normal()) <= 0.0
                {
                    *springl = before;
                    return;
                }
                springl.recenter_particle();
            });
        }

        self.elapsed += step;
        max_force * step
    }
}

fn pressure_force(
    pressure: &dyn ScalarField,
    params: &SimulationParams,
    p: &Vector,
    normal: &Vector,
    scale_up: f32,
) -> Vector {
    let sampled = pressure.sample(&(p * scale_up));
    normal * (params.pressure_weight * (params.target_pressure - sampled))
}

fn vector_force(
    velocity: &dyn VectorField,
    params: &SimulationParams,
    p: &Vector,
    scale_up: f32,
    scale_down: f32,
) -> Vector {
    velocity.sample(&(p * scale_up)) * (params.advection_weight * scale_down)
}

/// Rigid rotation about the domain center (the z axis in 3D).
fn zalesak_velocity(p: &Vector, period: f32) -> Vector {
    let omega = 2.0 * PI / period;
    let mut v = Vector::zeros();
    v[0] = -omega * (p[1] - 0.5);
    v[1] = omega * (p[0] - 0.5);
    v
}

/// The standard deformation test field; time-reversing so the surface
/// returns to its start after one period.
#[cfg(feature = "dim2")]
fn enright_velocity(p: &Vector, time: f32) -> Vector {
    let reverse = (PI * time / ENRIGHT_PERIOD).cos();
    let (sx, cx) = (PI * p[0]).sin_cos();
    let (sy, cy) = (PI * p[1]).sin_cos();
    Vector::new(
        -2.0 * sx * sx * sy * cy * reverse,
        2.0 * sy * sy * sx * cx * reverse,
    )
}

/// The standard deformation test field; time-reversing so the surface
/// returns to its start after one period.
#[cfg(feature = "dim3")]
fn enright_velocity(p: &Vector, time: f32) -> Vector {
    let reverse = (PI * time / ENRIGHT_PERIOD).cos();
    let sx = (PI * p[0]).sin();
    let sy = (PI * p[1]).sin();
    let sz = (PI * p[2]).sin();
    let s2x = (2.0 * PI * p[0]).sin();
    let s2y = (2.0 * PI * p[1]).sin();
    let s2z = (2.0 * PI * p[2]).sin();
    Vector::new(
        2.0 * sx * sx * s2y * s2z * reverse,
        -s2x * sy * sy * s2z * reverse,
        -s2x * s2y * sz * sz * reverse,
    )
}

/// Period of the time-reversed Enright deformation, in simulated time.
pub const ENRIGHT_PERIOD: f32 = 3.0;
