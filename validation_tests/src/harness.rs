//! Headless scenario harness: runs a springls simulation without any
//! rendering and records surface snapshots for metric comparison.

use serde::{Deserialize, Serialize};
use springls3d::levelset::LevelSet;
use springls3d::pipeline::SolveStats;
use springls3d::solver::ForceMode;
use springls3d::{SimulationContext, SimulationParams, SpringlsError, SpringlsPipeline};
use std::path::Path;

/// One recorded state of the explicit surface.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SurfaceSnapshot {
    pub step: usize,
    pub num_springls: usize,
    /// Surface vertex positions, in grid units.
    pub vertices: Vec<[f32; 3]>,
}

/// Complete recording of one scenario run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScenarioRun {
    pub name: String,
    pub grid: usize,
    pub steps_taken: usize,
    pub snapshots: Vec<SurfaceSnapshot>,
}

impl ScenarioRun {
    pub fn initial(&self) -> &SurfaceSnapshot {
        &self.snapshots[0]
    }

    pub fn last(&self) -> &SurfaceSnapshot {
        self.snapshots.last().unwrap()
    }

    /// Exports the recording for offline comparison.
    pub fn export_json(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// A headless scenario: an initial sphere plus the driver configuration.
pub struct Scenario {
    pub name: &'static str,
    pub grid: usize,
    /// Sphere center in normalized unit-cube coordinates.
    pub center: [f32; 3],
    /// Sphere radius in normalized units.
    pub radius: f32,
    pub params: SimulationParams,
    pub mode: ForceMode,
    /// Record a snapshot every this many steps (the initial and final
    /// states are always recorded).
    pub sample_interval: usize,
}

/// Signed distance to a sphere, sampled on an `n`-cubed grid, in grid
/// units.
pub fn sphere_signed_field(n: usize, center: [f32; 3], radius: f32) -> LevelSet {
    let mut grid = LevelSet::new([n; 3], 0.0);
    let scale = n as f32;
    for idx in 0..grid.len() {
        let cell = grid.cell_of(idx);
        let mut d2 = 0.0f32;
        for axis in 0..3 {
            let x = cell[axis] as f32 - center[axis] * scale;
            d2 += x * x;
        }
        grid.set_index(idx, d2.sqrt() - radius * scale);
    }
    grid
}

fn snapshot(step: usize, pipeline: &SpringlsPipeline, ctx: &SimulationContext) -> SurfaceSnapshot {
    let surface = pipeline.springls_surface(ctx);
    SurfaceSnapshot {
        step,
        num_springls: surface.num_primitives(),
        vertices: surface.vertices,
    }
}

/// Runs a scenario to completion, recording surface snapshots.
pub fn run_scenario(scenario: Scenario) -> Result<(ScenarioRun, SolveStats), SpringlsError> {
    let field = sphere_signed_field(scenario.grid, scenario.center, scenario.radius);
    let mut ctx = SimulationContext::new(field);
    let mut pipeline = SpringlsPipeline::new(scenario.params, scenario.mode)?;
    pipeline.init(&mut ctx)?;

    let mut snapshots = vec![snapshot(0, &pipeline, &ctx)];
    let started = std::time::Instant::now();
    let interval = scenario.sample_interval.max(1);
    loop {
        let more = pipeline.step(&mut ctx)?;
        if pipeline.time() % interval == 0 || !more {
            snapshots.push(snapshot(pipeline.time(), &pipeline, &ctx));
        }
        if !more {
            break;
        }
    }
    let elapsed = started.elapsed().as_secs_f64();
    let steps = pipeline.time();

    let run = ScenarioRun {
        name: scenario.name.to_string(),
        grid: scenario.grid,
        steps_taken: steps,
        snapshots,
    };
    let stats = SolveStats {
        steps,
        elapsed_seconds: elapsed,
        steps_per_second: if elapsed > 0.0 {
            steps as f64 / elapsed
        } else {
            0.0
        },
    };
    Ok((run, stats))
}
