//! Dimension-generic math aliases.
//!
//! The whole engine is written once against these aliases and compiled
//! twice, as `springls2d` (segments on a 2D grid) and `springls3d`
//! (triangles on a 3D grid).

/// Number of spatial dimensions.
#[cfg(feature = "dim2")]
pub const DIM: usize = 2;
/// Number of spatial dimensions.
#[cfg(feature = "dim3")]
pub const DIM: usize = 3;

/// Vertices carried by one springl (segment endpoints or triangle corners).
pub const VERTS_PER_SPRINGL: usize = DIM;

/// Face-neighbor directions on the grid (used by the band add/delete passes).
pub const NUM_NEIGHBORS: usize = 2 * DIM;

#[cfg(feature = "dim2")]
pub type Vector = nalgebra::Vector2<f32>;
#[cfg(feature = "dim3")]
pub type Vector = nalgebra::Vector3<f32>;

#[cfg(feature = "dim2")]
pub type Point = nalgebra::Point2<f32>;
#[cfg(feature = "dim3")]
pub type Point = nalgebra::Point3<f32>;

/// Integer cell coordinates.
pub type Cell = [i32; DIM];

/// Face-neighbor offsets, one per band maintenance pass.
#[cfg(feature = "dim2")]
pub const NEIGHBOR_OFFSETS: [Cell; NUM_NEIGHBORS] = [[-1, 0], [1, 0], [0, -1], [0, 1]];
/// Face-neighbor offsets, one per band maintenance pass.
#[cfg(feature = "dim3")]
pub const NEIGHBOR_OFFSETS: [Cell; NUM_NEIGHBORS] = [
    [-1, 0, 0],
    [1, 0, 0],
    [0, -1, 0],
    [0, 1, 0],
    [0, 0, -1],
    [0, 0, 1],
];

/// Builds a vector from a coordinate array.
#[inline]
pub fn vector_from(coords: [f32; DIM]) -> Vector {
    #[cfg(feature = "dim2")]
    return Vector::new(coords[0], coords[1]);
    #[cfg(feature = "dim3")]
    return Vector::new(coords[0], coords[1], coords[2]);
}

/// Component-wise minimum.
#[inline]
pub fn vector_min(a: &Vector, b: &Vector) -> Vector {
    a.zip_map(b, f32::min)
}

/// Component-wise maximum.
#[inline]
pub fn vector_max(a: &Vector, b: &Vector) -> Vector {
    a.zip_map(b, f32::max)
}
