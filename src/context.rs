//! The shared simulation context: every buffer the phases operate on, the
//! active list, and the scale transform between grid units and the
//! normalized particle space.
//!
//! Phases receive this context by reference and only touch the buffers
//! they own for the duration of their dispatch; there is no global
//! mutable state besides it.

use crate::levelset::{LevelSet, PingPong};
use crate::math::Vector;
use crate::params::{CAPACITY_MARGIN, MAX_LAYERS};
use crate::springl::Springl;

/// Slot marker for grid cells outside the narrow band.
pub const NOT_IN_BAND: u32 = u32::MAX;

/// Compacted index set of narrow-band grid cells.
///
/// `cells.len() <= capacity` is the over-provisioning invariant; when an
/// add pass would exceed `capacity` the whole band is rebuilt instead.
#[derive(Clone, Debug, Default)]
pub struct ActiveList {
    pub cells: Vec<u32>,
    pub capacity: usize,
}

impl ActiveList {
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Recomputes the over-provisioned capacity from the current size.
    pub fn reprovision(&mut self) {
        self.capacity = provisioned(self.cells.len());
    }
}

/// Over-provisioned backing length for `live` elements.
pub fn provisioned(live: usize) -> usize {
    ((live as f32 * CAPACITY_MARGIN).ceil() as usize).max(live + 8)
}

/// Owns all simulation buffers.
pub struct SimulationContext {
    /// Packed capsule buffer; slots `0..elements` are live, the tail is
    /// padding absorbed by growth.
    pub springls: Vec<Springl>,
    /// Connectivity/object label per particle slot, resized in lock-step
    /// with the capsule buffer.
    pub labels: Vec<u32>,
    /// Live element count, `elements <= springls.len()`.
    pub elements: usize,

    /// Signed distance field (double-buffered; correct sign only inside
    /// the narrow band, clamped to the sentinel outside).
    pub signed: PingPong<LevelSet>,
    /// Distance to the springl cloud, re-splatted from the particles.
    /// The magnitude is the unsigned distance; the sign records which
    /// side of the nearest element the cell lies on, so the evolver can
    /// move the zero crossing towards the explicit surface.
    pub unsigned: LevelSet,
    /// Narrow-band cell indices.
    pub active_list: ActiveList,
    /// Full-grid map from cell index to active-list slot (`NOT_IN_BAND`
    /// outside the band); kept consistent with `active_list` by the
    /// evolver and read by the spatial hash.
    pub band_slot: Vec<u32>,

    /// Current band half-width, in cells. Starts at
    /// [`Self::BAND_SENTINEL`] and grows when the signed field is
    /// extended past the core layers; out-of-band cells are plugged to
    /// this value.
    pub band_limit: f32,

    /// Grid units per normalized unit.
    pub scale_up: f32,
    /// Normalized units per grid unit.
    pub scale_down: f32,
}

impl SimulationContext {
    /// Sentinel distance cells are plugged to outside the band.
    pub const BAND_SENTINEL: f32 = MAX_LAYERS as f32 + 0.5;

    /// Builds the context around an initial signed distance field. The
    /// particle set starts empty; initialization extracts it afterwards.
    pub fn new(signed: LevelSet) -> Self {
        let scale_up = signed.max_dim() as f32;
        let len = signed.len();
        let unsigned = LevelSet::new(signed.dims(), Self::BAND_SENTINEL);
        Self {
            springls: Vec::new(),
            labels: Vec::new(),
            elements: 0,
            signed: PingPong::duplicated(signed),
            unsigned,
            active_list: ActiveList::default(),
            band_slot: vec![NOT_IN_BAND; len],
            band_limit: Self::BAND_SENTINEL,
            scale_up,
            scale_down: 1.0 / scale_up,
        }
    }

    /// Cell extent in normalized units; the advection step bound is half
    /// of this.
    pub fn v_extent(&self) -> f32 {
        self.scale_down
    }

    /// Live springls.
    pub fn live(&self) -> &[Springl] {
        &self.springls[..self.elements]
    }

    /// Live springls, mutable.
    pub fn live_mut(&mut self) -> &mut [Springl] {
        &mut self.springls[..self.elements]
    }

    /// Live labels.
    pub fn live_labels(&self) -> &[u32] {
        &self.labels[..self.elements]
    }

    /// Converts a normalized-space position to grid units.
    #[inline]
    pub fn to_grid(&self, p: &Vector) -> Vector {
        p * self.scale_up
    }

    /// Converts a grid-space position to normalized units.
    #[inline]
    pub fn to_normalized(&self, p: &Vector) -> Vector {
        p * self.scale_down
    }

    /// Replaces the particle set wholesale, re-provisioning the padded
    /// backing arrays. This is the serialized reallocation path used by
    /// the compaction operators; it never runs concurrently with a
    /// per-element phase.
    pub fn adopt_particles(&mut self, mut springls: Vec<Springl>, mut labels: Vec<u32>) {
        debug_assert_eq!(springls.len(), labels.len());
        let live = springls.len();
        let padded = provisioned(live);
        springls.resize(padded, Springl::zeroed_slot());
        labels.resize(padded, 0);
        self.springls = springls;
        self.labels = labels;
        self.elements = live;
    }

    /// Appends particles, growing the padded arrays only when the live
    /// count would exceed the current backing length.
    pub fn append_particles(&mut self, extra: &[(Springl, u32)]) {
        let new_live = self.elements + extra.len();
        if new_live > self.springls.len() {
            let padded = provisioned(new_live);
            self.springls.resize(padded, Springl::zeroed_slot());
            self.labels.resize(padded, 0);
        }
        for (offset, (s, label)) in extra.iter().enumerate() {
            self.springls[self.elements + offset] = *s;
            self.labels[self.elements + offset] = *label;
        }
        self.elements = new_live;
    }

    /// Releases every buffer. Safe to call more than once.
    pub fn release(&mut self) {
        self.springls = Vec::new();
        self.labels = Vec::new();
        self.elements = 0;
        self.active_list = ActiveList::default();
        self.band_slot = Vec::new();
    }
}

impl Springl {
    /// An all-zero padding slot.
    pub(crate) fn zeroed_slot() -> Self {
        bytemuck::Zeroable::zeroed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::DIM;

    fn small_field() -> LevelSet {
        LevelSet::new([16; DIM], SimulationContext::BAND_SENTINEL)
    }

    #[test]
    fn scale_transform_is_inverse() {
        let ctx = SimulationContext::new(small_field());
        let mut p = Vector::zeros();
        p[0] = 0.37;
        let back = ctx.to_normalized(&ctx.to_grid(&p));
        assert!((back - p).norm() < 1.0e-6);
        assert!((ctx.scale_up * ctx.scale_down - 1.0).abs() < 1.0e-6);
    }

    #[test]
    fn adopt_pads_above_live_count() {
        let mut ctx = SimulationContext::new(small_field());
        let springls = vec![Springl::zeroed_slot(); 100];
        let labels = vec![1u32; 100];
        ctx.adopt_particles(springls, labels);

        assert_eq!(ctx.elements, 100);
        assert!(ctx.springls.len() >= ctx.elements);
        assert!(ctx.springls.len() >= 108.min(provisioned(100)));
        assert_eq!(ctx.springls.len(), ctx.labels.len());
    }

    #[test]
    fn append_grows_when_padding_runs_out() {
        let mut ctx = SimulationContext::new(small_field());
        ctx.adopt_particles(vec![Springl::zeroed_slot(); 10], vec![0; 10]);
        let backing = ctx.springls.len();

        // Small append fits in the padding.
        ctx.append_particles(&[(Springl::zeroed_slot(), 3)]);
        assert_eq!(ctx.springls.len(), backing);
        assert_eq!(ctx.elements, 11);

        // Large append forces growth, preserving the invariant.
        let extra: Vec<_> = (0..backing).map(|_| (Springl::zeroed_slot(), 9)).collect();
        ctx.append_particles(&extra);
        assert!(ctx.elements <= ctx.springls.len());
        assert_eq!(ctx.labels.len(), ctx.springls.len());
    }
}
