//! The springl primitive: a small oriented surface element (a segment in
//! 2D, a triangle in 3D) carrying a centroid particle and a fixed
//! reference anchor.

use crate::math::{Vector, VERTS_PER_SPRINGL};
use bytemuck::{Pod, Zeroable};

/// Label value for a springl that has not been assigned provenance yet
/// (freshly synthesized by the gap filler, before `fill_labels` runs).
pub const UNLABELED: u32 = u32::MAX;

/// One surface element, stored exactly in its serialized capsule layout.
///
/// The field order is the wire contract shared with external mesh
/// consumers: vertexes, then the mutable centroid particle, then the fixed
/// reference point, then the provenance id. All coordinates live in the
/// normalized unit-cube space; conversion to grid units happens only at
/// the interchange boundary.
#[repr(C)]
#[derive(Copy, Clone, PartialEq, Debug, Pod, Zeroable)]
pub struct Springl {
    /// Segment endpoints (2D) or triangle corners (3D), counter-clockwise
    /// with respect to the outward normal.
    pub vertexes: [Vector; VERTS_PER_SPRINGL],
    /// Centroid particle, mutated by advection and relaxation.
    pub particle: Vector,
    /// Anchor from initialization; never moved after creation.
    pub reference_point: Vector,
    /// Provenance/connectivity label.
    pub reference_id: u32,
}

/// Size in bytes of one serialized capsule record.
pub const CAPSULE_SIZE: usize = std::mem::size_of::<Springl>();

impl Springl {
    /// Builds a springl from its vertices; the particle starts at the
    /// centroid and the reference point records that initial centroid.
    pub fn from_vertexes(vertexes: [Vector; VERTS_PER_SPRINGL], reference_id: u32) -> Self {
        let centroid = centroid(&vertexes);
        Self {
            vertexes,
            particle: centroid,
            reference_point: centroid,
            reference_id,
        }
    }

    /// Centroid of the current vertex positions.
    pub fn centroid(&self) -> Vector {
        centroid(&self.vertexes)
    }

    /// Snaps the particle back onto the vertex centroid.
    pub fn recenter_particle(&mut self) {
        self.particle = self.centroid();
    }

    /// Outward normal (unnormalized; zero for degenerate elements).
    #[cfg(feature = "dim2")]
    pub fn raw_normal(&self) -> Vector {
        let t = self.vertexes[1] - self.vertexes[0];
        Vector::new(t.y, -t.x)
    }

    /// Outward normal (unnormalized; zero for degenerate elements).
    #[cfg(feature = "dim3")]
    pub fn raw_normal(&self) -> Vector {
        let ab = self.vertexes[1] - self.vertexes[0];
        let ac = self.vertexes[2] - self.vertexes[0];
        ab.cross(&ac)
    }

    /// Unit outward normal, or `None` for a degenerate element.
    pub fn normal(&self) -> Option<Vector> {
        let n = self.raw_normal();
        let len = n.norm();
        (len > 1.0e-12).then(|| n / len)
    }

    /// Length of the segment (2D) or area of the triangle (3D).
    #[cfg(feature = "dim2")]
    pub fn measure(&self) -> f32 {
        (self.vertexes[1] - self.vertexes[0]).norm()
    }

    /// Length of the segment (2D) or area of the triangle (3D).
    #[cfg(feature = "dim3")]
    pub fn measure(&self) -> f32 {
        self.raw_normal().norm() * 0.5
    }

    /// Length of the longest edge.
    pub fn max_edge_length(&self) -> f32 {
        let mut max = 0.0f32;
        for i in 0..VERTS_PER_SPRINGL {
            let j = (i + 1) % VERTS_PER_SPRINGL;
            max = max.max((self.vertexes[j] - self.vertexes[i]).norm());
        }
        max
    }

    /// True when the element is too small or too thin to carry a normal.
    pub fn is_degenerate(&self, min_measure: f32) -> bool {
        self.measure() < min_measure || self.normal().is_none()
    }

    /// Splits this springl in two across its longest edge, preserving the
    /// reference anchor and label on both halves.
    #[cfg(feature = "dim2")]
    pub fn split(&self) -> (Springl, Springl) {
        let mid = (self.vertexes[0] + self.vertexes[1]) * 0.5;
        let mut a = Springl::from_vertexes([self.vertexes[0], mid], self.reference_id);
        let mut b = Springl::from_vertexes([mid, self.vertexes[1]], self.reference_id);
        a.reference_point = self.reference_point;
        b.reference_point = self.reference_point;
        (a, b)
    }

    /// Splits this springl in two across its longest edge, preserving the
    /// reference anchor and label on both halves.
    #[cfg(feature = "dim3")]
    pub fn split(&self) -> (Springl, Springl) {
        // Find the longest edge (i, i+1); the opposite vertex stays shared.
        let mut longest = 0;
        let mut longest_len = 0.0f32;
        for i in 0..3 {
            let len = (self.vertexes[(i + 1) % 3] - self.vertexes[i]).norm();
            if len > longest_len {
                longest_len = len;
                longest = i;
            }
        }
        let i0 = longest;
        let i1 = (longest + 1) % 3;
        let i2 = (longest + 2) % 3;
        let mid = (self.vertexes[i0] + self.vertexes[i1]) * 0.5;

        let mut a =
            Springl::from_vertexes([self.vertexes[i0], mid, self.vertexes[i2]], self.reference_id);
        let mut b =
            Springl::from_vertexes([mid, self.vertexes[i1], self.vertexes[i2]], self.reference_id);
        a.reference_point = self.reference_point;
        b.reference_point = self.reference_point;
        (a, b)
    }

    /// Distance from `p` to the segment (2D) or triangle (3D).
    #[cfg(feature = "dim2")]
    pub fn distance_to_point(&self, p: &Vector) -> f32 {
        distance_point_segment(p, &self.vertexes[0], &self.vertexes[1])
    }

    /// Distance from `p` to the segment (2D) or triangle (3D).
    #[cfg(feature = "dim3")]
    pub fn distance_to_point(&self, p: &Vector) -> f32 {
        distance_point_triangle(p, &self.vertexes[0], &self.vertexes[1], &self.vertexes[2])
    }

    /// Serialized capsule record.
    pub fn as_capsule_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    /// Deserializes one capsule record.
    pub fn from_capsule_bytes(bytes: &[u8]) -> Self {
        *bytemuck::from_bytes(bytes)
    }
}

fn centroid(vertexes: &[Vector; VERTS_PER_SPRINGL]) -> Vector {
    let mut sum = Vector::zeros();
    for v in vertexes {
        sum += *v;
    }
    sum / VERTS_PER_SPRINGL as f32
}

/// Distance from a point to a segment.
pub fn distance_point_segment(p: &Vector, a: &Vector, b: &Vector) -> f32 {
    let ab = b - a;
    let len2 = ab.norm_squared();
    if len2 < 1.0e-20 {
        return (p - a).norm();
    }
    let t = ((p - a).dot(&ab) / len2).clamp(0.0, 1.0);
    (p - (a + ab * t)).norm()
}

/// Distance from a point to a triangle (closest-feature walk).
#[cfg(feature = "dim3")]
pub fn distance_point_triangle(p: &Vector, a: &Vector, b: &Vector, c: &Vector) -> f32 {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;

    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return ap.norm();
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return bp.norm();
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let t = d1 / (d1 - d3);
        return (p - (a + ab * t)).norm();
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return cp.norm();
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let t = d2 / (d2 - d6);
        return (p - (a + ac * t)).norm();
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let t = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return (p - (b + (c - b) * t)).norm();
    }

    // Interior: project onto the triangle plane.
    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    (p - (a + ab * v + ac * w)).norm()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::vector_from;

    #[test]
    fn capsule_roundtrip_is_bit_exact() {
        #[cfg(feature = "dim2")]
        let s = Springl::from_vertexes([vector_from([0.1, 0.2]), vector_from([0.3, 0.25])], 42);
        #[cfg(feature = "dim3")]
        let s = Springl::from_vertexes(
            [
                vector_from([0.1, 0.2, 0.3]),
                vector_from([0.3, 0.25, 0.31]),
                vector_from([0.2, 0.4, 0.29]),
            ],
            42,
        );

        let bytes = s.as_capsule_bytes().to_vec();
        assert_eq!(bytes.len(), CAPSULE_SIZE);
        let back = Springl::from_capsule_bytes(&bytes);
        assert_eq!(back, s);
        assert_eq!(back.as_capsule_bytes(), &bytes[..]);
    }

    #[test]
    fn split_preserves_reference_and_total_measure() {
        #[cfg(feature = "dim2")]
        let s = Springl::from_vertexes([vector_from([0.0, 0.0]), vector_from([1.0, 0.0])], 7);
        #[cfg(feature = "dim3")]
        let s = Springl::from_vertexes(
            [
                vector_from([0.0, 0.0, 0.0]),
                vector_from([1.0, 0.0, 0.0]),
                vector_from([0.0, 1.0, 0.0]),
            ],
            7,
        );

        let (a, b) = s.split();
        assert_eq!(a.reference_id, 7);
        assert_eq!(b.reference_id, 7);
        assert_eq!(a.reference_point, s.reference_point);
        assert!((a.measure() + b.measure() - s.measure()).abs() < 1.0e-6);
        assert!(a.max_edge_length() < s.max_edge_length() + 1.0e-6);
    }

    #[cfg(feature = "dim3")]
    #[test]
    fn point_triangle_distance_regions() {
        let a = vector_from([0.0, 0.0, 0.0]);
        let b = vector_from([1.0, 0.0, 0.0]);
        let c = vector_from([0.0, 1.0, 0.0]);

        // Above the interior.
        let p = vector_from([0.25, 0.25, 2.0]);
        assert!((distance_point_triangle(&p, &a, &b, &c) - 2.0).abs() < 1.0e-6);
        // Closest to vertex a.
        let p = vector_from([-1.0, -1.0, 0.0]);
        assert!((distance_point_triangle(&p, &a, &b, &c) - 2.0f32.sqrt()).abs() < 1.0e-6);
        // Closest to edge bc.
        let p = vector_from([1.0, 1.0, 0.0]);
        assert!((distance_point_triangle(&p, &a, &b, &c) - 0.5f32.sqrt()).abs() < 1.0e-6);
    }

    #[test]
    fn degenerate_detection() {
        #[cfg(feature = "dim2")]
        let s = Springl::from_vertexes([vector_from([0.5, 0.5]), vector_from([0.5, 0.5])], 0);
        #[cfg(feature = "dim3")]
        let s = Springl::from_vertexes(
            [
                vector_from([0.5, 0.5, 0.5]),
                vector_from([0.5, 0.5, 0.5]),
                vector_from([0.6, 0.5, 0.5]),
            ],
            0,
        );
        assert!(s.is_degenerate(1.0e-8));
    }
}
