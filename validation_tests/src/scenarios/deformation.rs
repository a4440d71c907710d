//! A sphere carried through one period of the time-reversing deformation
//! flow; the field undoes itself, so after a full period the surface must
//! return to its start. Runs with resampling on, since the flow stretches
//! elements far past the split threshold.

use crate::harness::Scenario;
use springls3d::solver::ForceMode;
use springls3d::SimulationParams;

/// Sphere center in normalized units; off-center so the flow is strong
/// over the whole surface.
pub const DEFORMATION_CENTER: [f32; 3] = [0.35, 0.35, 0.35];

/// Sphere radius, in normalized units.
pub const DEFORMATION_RADIUS: f32 = 0.15;

/// Fraction of the full deformation speed. The full-strength flow thins
/// the surface below grid resolution at small grids; a third of it still
/// stretches the sphere by several cells.
pub const DEFORMATION_STRENGTH: f32 = 0.3;

pub fn deformation_scenario(grid: usize, max_steps: usize) -> Scenario {
    Scenario {
        name: "deformation",
        grid,
        center: DEFORMATION_CENTER,
        radius: DEFORMATION_RADIUS,
        params: SimulationParams {
            advection_weight: DEFORMATION_STRENGTH,
            curvature_weight: 0.01,
            pressure_weight: 0.0,
            max_iterations: max_steps,
            resampling_interval: 4,
            relax_iterations: 2,
            ..Default::default()
        },
        mode: ForceMode::Enright,
        sample_interval: max_steps,
    }
}
