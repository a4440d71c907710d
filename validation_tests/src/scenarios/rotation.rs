//! An off-center sphere carried through one full rigid rotation; after a
//! whole period the surface must return to its initial position.

use crate::harness::Scenario;
use springls3d::solver::ForceMode;
use springls3d::SimulationParams;

/// Center offset from the rotation axis, in normalized units.
pub const ROTATION_OFFSET: f32 = 0.15;

/// Sphere radius, in normalized units.
pub const ROTATION_RADIUS: f32 = 0.12;

pub fn rotation_scenario(grid: usize, period_steps: usize) -> Scenario {
    Scenario {
        name: "rotation",
        grid,
        center: [0.5 + ROTATION_OFFSET, 0.5, 0.5],
        radius: ROTATION_RADIUS,
        params: SimulationParams {
            advection_weight: 1.0,
            // Mild smoothing only; strong curvature flow would shrink the
            // sphere over a full revolution.
            curvature_weight: 0.02,
            pressure_weight: 0.0,
            max_iterations: period_steps,
            resampling_interval: 8,
            relax_iterations: 2,
            ..Default::default()
        },
        mode: ForceMode::Zalesak {
            period: period_steps as f32,
        },
        sample_interval: period_steps / 4,
    }
}
