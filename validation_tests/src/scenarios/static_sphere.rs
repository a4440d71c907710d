//! A sphere with every force weight zeroed: the surface must not move.

use crate::harness::Scenario;
use springls3d::solver::ForceMode;
use springls3d::SimulationParams;

pub fn static_sphere_scenario(grid: usize, steps: usize) -> Scenario {
    Scenario {
        name: "static_sphere",
        grid,
        center: [0.5, 0.5, 0.5],
        radius: 0.3,
        params: SimulationParams {
            advection_weight: 0.0,
            curvature_weight: 0.0,
            pressure_weight: 0.0,
            max_iterations: steps,
            resampling_interval: 0,
            relax_iterations: 0,
            ..Default::default()
        },
        mode: ForceMode::Zalesak { period: f32::MAX },
        sample_interval: steps,
    }
}
