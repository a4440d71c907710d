//! Tunable simulation parameters.

use serde::{Deserialize, Serialize};

/// Over-provisioning ratio applied when (re)allocating the particle array
/// and the active list. Padding the arrays above the live element count
/// lets several growth steps happen without reallocation; growth past the
/// padded capacity falls back to a full rebuild.
pub const CAPACITY_MARGIN: f32 = 1.25;

/// Number of narrow-band layers maintained on each side of the zero
/// crossing. Cells farther than `MAX_LAYERS + 0.5` are plugged to the
/// band sentinel distance.
pub const MAX_LAYERS: i32 = 3;

/// Parameters recognized by the active-contour driver.
///
/// Weights blend the force contributions in the advection phase; the
/// remaining fields control the solve loop and the resampling cadence.
#[derive(Copy, Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct SimulationParams {
    /// Weight of the sampled vector field (or analytic velocity) term.
    pub advection_weight: f32,
    /// Weight of the mean-curvature smoothing term in the level-set update.
    pub curvature_weight: f32,
    /// Weight of the scalar pressure term.
    pub pressure_weight: f32,
    /// Pressure value the contour is attracted towards.
    pub target_pressure: f32,
    /// Atlas weight below which a springl is culled during contraction.
    /// Only consulted when the contractor carries an atlas image.
    pub atlas_threshold: f32,
    /// Total number of driver steps before termination.
    pub max_iterations: usize,
    /// Contract/expand/fill-gaps every this many steps. `0` disables
    /// resampling entirely (the band is widened by extrapolation instead).
    pub resampling_interval: usize,
    /// Enables the stricter per-move connectivity check in the advector.
    pub preserve_topology: bool,
    /// Stop the solve early once the Dice overlap metric stabilizes.
    pub adaptive_convergence: bool,
    /// How often (in driver steps) the convergence metric is sampled.
    pub convergence_sampling_interval: usize,
    /// Spring relaxation sweeps per relax phase.
    pub relax_iterations: usize,
    /// Neighbor list capacity per springl vertex.
    pub max_neighbors: usize,
    /// Neighbor search radius, in grid units (cells).
    pub nearest_neighbor_distance: f32,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            advection_weight: 1.0,
            curvature_weight: 0.1,
            pressure_weight: 0.0,
            target_pressure: 0.5,
            atlas_threshold: 0.5,
            max_iterations: 100,
            resampling_interval: 8,
            preserve_topology: false,
            adaptive_convergence: false,
            convergence_sampling_interval: 4,
            relax_iterations: 5,
            max_neighbors: 8,
            nearest_neighbor_distance: 2.0,
        }
    }
}

impl SimulationParams {
    /// True when the resampling operators (contract/expand/fill-gaps) run.
    pub fn resampling_enabled(&self) -> bool {
        self.resampling_interval > 0
    }
}
