//! Quantitative comparison between recorded surfaces.

use crate::harness::SurfaceSnapshot;
use rstar::{PointDistance, RTree, RTreeObject, AABB};

/// A surface vertex indexed for nearest-neighbor queries.
#[derive(Clone, Copy)]
struct IndexedPoint {
    position: [f32; 3],
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f32; 3]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

impl PointDistance for IndexedPoint {
    fn distance_2(&self, point: &[f32; 3]) -> f32 {
        let dx = self.position[0] - point[0];
        let dy = self.position[1] - point[1];
        let dz = self.position[2] - point[2];
        dx * dx + dy * dy + dz * dz
    }
}

fn tree_of(points: &[[f32; 3]]) -> RTree<IndexedPoint> {
    RTree::bulk_load(
        points
            .iter()
            .map(|&position| IndexedPoint { position })
            .collect(),
    )
}

fn directed_distances(from: &[[f32; 3]], to: &RTree<IndexedPoint>) -> (f32, f32) {
    let mut max = 0.0f32;
    let mut sum = 0.0f64;
    for p in from {
        if let Some(nearest) = to.nearest_neighbor(p) {
            let d = nearest.distance_2(p).sqrt();
            max = max.max(d);
            sum += f64::from(d);
        }
    }
    (max, (sum / from.len().max(1) as f64) as f32)
}

/// Symmetric Hausdorff distance between two vertex clouds, in the units
/// the clouds are expressed in (grid units for harness snapshots).
pub fn hausdorff_distance(a: &[[f32; 3]], b: &[[f32; 3]]) -> f32 {
    let (ab, _) = directed_distances(a, &tree_of(b));
    let (ba, _) = directed_distances(b, &tree_of(a));
    ab.max(ba)
}

/// Symmetric mean nearest-neighbor distance between two vertex clouds.
pub fn mean_surface_distance(a: &[[f32; 3]], b: &[[f32; 3]]) -> f32 {
    let (_, ab) = directed_distances(a, &tree_of(b));
    let (_, ba) = directed_distances(b, &tree_of(a));
    0.5 * (ab + ba)
}

/// Largest deviation of a snapshot's vertices from an analytic sphere, in
/// grid units.
pub fn max_sphere_deviation(
    snapshot: &SurfaceSnapshot,
    center: [f32; 3],
    radius: f32,
    grid: usize,
) -> f32 {
    let scale = grid as f32;
    snapshot
        .vertices
        .iter()
        .map(|v| {
            let mut d2 = 0.0f32;
            for axis in 0..3 {
                let x = v[axis] - center[axis] * scale;
                d2 += x * x;
            }
            (d2.sqrt() - radius * scale).abs()
        })
        .fold(0.0, f32::max)
}
