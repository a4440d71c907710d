//! The active-contour driver: owns the phase objects and runs them in
//! their fixed order over the shared context, one step at a time.

use crate::context::SimulationContext;
use crate::error::SpringlsError;
use crate::hash::{NeighborList, SpatialHash};
use crate::levelset::{LevelSet, NarrowBandEvolver};
use crate::params::{SimulationParams, MAX_LAYERS};
use crate::solver::{Advector, Contractor, Expander, ForceMode, GapFiller, Relaxer};
use crate::surface::SpringlsSurface;
use std::time::Instant;

/// Driver lifecycle. Stepping is only legal from `Initialized` or
/// `Stepping`; `Terminated` is terminal.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Uninitialized,
    Initialized,
    Stepping,
    Terminated,
}

/// Fired after every visible step with `(time_index, frames_per_second)`.
pub type FrameListener = Box<dyn FnMut(usize, f64)>;

/// Band evolution iterations per driver step (forced even by the evolver).
const EVOLVE_ITERATIONS: usize = 4;

/// Mean Dice overlap above which adaptive convergence stops the solve.
const CONVERGENCE_DICE: f32 = 0.9995;

/// Advection step passed to the force phase; the stability bound inside
/// the advector shortens it as needed.
const ADVECT_TIME_STEP: f32 = 1.0;

/// Extra extrapolated layers kept around the band when resampling is off.
const EXTENSION_LAYERS: i32 = 2;

pub struct SpringlsPipeline {
    params: SimulationParams,
    advector: Advector,
    relaxer: Relaxer,
    contractor: Contractor,
    expander: Expander,
    gap_filler: GapFiller,
    evolver: NarrowBandEvolver,
    hash: SpatialHash,
    neighbors: NeighborList,
    listeners: Vec<FrameListener>,
    state: PipelineState,
    time: usize,
}

/// Wall-time report of a completed solve.
#[derive(Copy, Clone, Debug)]
pub struct SolveStats {
    pub steps: usize,
    pub elapsed_seconds: f64,
    pub steps_per_second: f64,
}

impl SpringlsPipeline {
    /// Builds the driver, rejecting unsupported configurations up front:
    /// the analytic deformation mode tears the surface apart and is
    /// meaningless without the resampling operators.
    pub fn new(params: SimulationParams, mode: ForceMode) -> Result<Self, SpringlsError> {
        if matches!(mode, ForceMode::Enright) && !params.resampling_enabled() {
            return Err(SpringlsError::UnsupportedConfiguration(
                "deformation test advection requires resampling to be enabled".into(),
            ));
        }
        Ok(Self {
            params,
            advector: Advector::new(mode),
            relaxer: Relaxer::new(),
            contractor: Contractor::new(),
            expander: Expander::new(),
            gap_filler: GapFiller::new(),
            evolver: NarrowBandEvolver::new(),
            hash: SpatialHash::new(),
            neighbors: NeighborList::default(),
            listeners: Vec::new(),
            state: PipelineState::Uninitialized,
            time: 0,
        })
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn time(&self) -> usize {
        self.time
    }

    /// Simulated time accumulated by the advector; the analytic test
    /// fields are periodic in this, not in driver steps.
    pub fn simulated_time(&self) -> f32 {
        self.advector.elapsed()
    }

    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    pub fn add_frame_listener(&mut self, listener: FrameListener) {
        self.listeners.push(listener);
    }

    /// Dropped spatial-hash candidates in the last hash rebuild.
    pub fn hash_overflow_count(&self) -> u32 {
        self.hash.overflow_count()
    }

    /// Builds the initial particle set and all derived structures.
    ///
    /// The context arrives holding the initial signed distance field; when
    /// its particle set is empty, the zero crossing is extracted into
    /// springls. Ends with one warm-up evolve/hash cycle so the first
    /// `step` starts from a consistent state.
    pub fn init(&mut self, ctx: &mut SimulationContext) -> Result<(), SpringlsError> {
        if self.state != PipelineState::Uninitialized {
            return Err(SpringlsError::InvalidState(
                "the driver is already initialized",
            ));
        }

        self.evolver.rebuild_narrow_band(ctx);
        if ctx.elements == 0 {
            let springls = crate::sampling::extract_springls(&ctx.signed.current, ctx.scale_down);
            let labels = vec![1u32; springls.len()];
            ctx.adopt_particles(springls, labels);
        }
        if ctx.elements == 0 || ctx.active_list.is_empty() {
            return Err(SpringlsError::ContourVanished);
        }

        self.hash.update_spatial_hash(ctx);
        self.hash.update_unsigned_level_set(ctx);
        self.evolver
            .extend_unsigned_distance_field(ctx, MAX_LAYERS as usize);
        self.hash.update_nearest_neighbors(ctx, &self.params, &mut self.neighbors);
        self.evolver.evolve(ctx, &self.params, 2, false);

        self.time = 0;
        self.state = PipelineState::Initialized;
        Ok(())
    }

    /// Runs one simulation step; returns `false` once the driver has
    /// terminated (iteration budget spent, convergence reached, or the
    /// contour vanished).
    pub fn step(&mut self, ctx: &mut SimulationContext) -> Result<bool, SpringlsError> {
        match self.state {
            PipelineState::Initialized | PipelineState::Stepping => {}
            PipelineState::Terminated => return Ok(false),
            PipelineState::Uninitialized => {
                return Err(SpringlsError::InvalidState("stepping before init"));
            }
        }
        let started = Instant::now();

        self.advector.advect(ctx, &self.params, ADVECT_TIME_STEP);
        self.hash.update_spatial_hash(ctx);
        self.hash.update_nearest_neighbors(ctx, &self.params, &mut self.neighbors);
        self.relaxer.relax(ctx, &self.params, &self.neighbors);

        let check_convergence = self.params.adaptive_convergence
            && self.params.convergence_sampling_interval > 0
            && (self.time + 1) % self.params.convergence_sampling_interval == 0;
        let resample = self.params.resampling_enabled()
            && (self.time + 1) % self.params.resampling_interval == 0;

        let dice;
        if resample {
            self.contractor.contract(ctx, &self.params, false)?;
            self.expander.expand(ctx);

            // The particle set changed shape; refresh the hash and the
            // springl distance field the evolve target reads, extrapolated
            // so every zero-layer cell sees a signed target.
            self.hash.update_spatial_hash(ctx);
            self.hash.update_unsigned_level_set(ctx);
            self.evolver
                .extend_unsigned_distance_field(ctx, MAX_LAYERS as usize);
            dice = self
                .evolver
                .evolve(ctx, &self.params, EVOLVE_ITERATIONS, check_convergence);

            self.gap_filler.fill_gaps(ctx);
            self.hash.update_spatial_hash(ctx);
            self.hash.update_unsigned_level_set(ctx);
            self.hash.update_nearest_neighbors(ctx, &self.params, &mut self.neighbors);
            self.gap_filler.fill_labels(ctx, &self.hash);
        } else {
            self.hash.update_unsigned_level_set(ctx);
            let mut passes = MAX_LAYERS as usize;
            if !self.params.resampling_enabled() {
                // Cover the extrapolated extension layers as well.
                passes += EXTENSION_LAYERS as usize;
            }
            self.evolver.extend_unsigned_distance_field(ctx, passes);
            dice = self
                .evolver
                .evolve(ctx, &self.params, EVOLVE_ITERATIONS, check_convergence);
            if !self.params.resampling_enabled() {
                self.evolver.extend_signed_distance_field(ctx, EXTENSION_LAYERS);
            }
        }

        self.time += 1;
        let elapsed = started.elapsed().as_secs_f64();
        let fps = if elapsed > 0.0 { 1.0 / elapsed } else { 0.0 };
        for listener in &mut self.listeners {
            listener(self.time, fps);
        }

        if ctx.active_list.is_empty() || ctx.elements == 0 {
            self.state = PipelineState::Terminated;
            return Err(SpringlsError::ContourVanished);
        }
        if check_convergence && dice >= CONVERGENCE_DICE {
            self.state = PipelineState::Terminated;
            return Ok(false);
        }
        if self.time >= self.params.max_iterations {
            self.state = PipelineState::Terminated;
            return Ok(false);
        }
        self.state = PipelineState::Stepping;
        Ok(true)
    }

    /// Drives `step` to completion and reports throughput.
    pub fn solve(&mut self, ctx: &mut SimulationContext) -> Result<SolveStats, SpringlsError> {
        if self.state == PipelineState::Uninitialized {
            self.init(ctx)?;
        }
        let started = Instant::now();
        let t0 = self.time;
        while self.step(ctx)? {}
        let elapsed = started.elapsed().as_secs_f64();
        let steps = self.time - t0;
        Ok(SolveStats {
            steps,
            elapsed_seconds: elapsed,
            steps_per_second: if elapsed > 0.0 {
                steps as f64 / elapsed
            } else {
                0.0
            },
        })
    }

    /// Releases every buffer and moves to the terminal state. Idempotent.
    pub fn dispose(&mut self, ctx: &mut SimulationContext) {
        ctx.release();
        self.neighbors = NeighborList::default();
        self.state = PipelineState::Terminated;
    }

    pub fn signed_level_set<'a>(&self, ctx: &'a SimulationContext) -> &'a LevelSet {
        &ctx.signed.current
    }

    pub fn unsigned_level_set<'a>(&self, ctx: &'a SimulationContext) -> &'a LevelSet {
        &ctx.unsigned
    }

    /// The particle set in the geometry interchange format.
    pub fn springls_surface(&self, ctx: &SimulationContext) -> SpringlsSurface {
        SpringlsSurface::from_context(ctx)
    }
}
