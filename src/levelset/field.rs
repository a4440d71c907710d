//! Dense scalar grids and the double-buffered pair used by the evolver.

use crate::math::{Cell, Vector, DIM};

/// Sampling interface implemented by the image layer for pressure images
/// and by [`LevelSet`] itself.
pub trait ScalarField: Sync {
    /// Grid dimensions `(rows, cols[, slices])`.
    fn dimensions(&self) -> [usize; DIM];
    /// Multilinear sample at a position expressed in grid units.
    fn sample(&self, p: &Vector) -> f32;
}

/// Sampling interface for vector-valued images (advection fields).
pub trait VectorField: Sync {
    fn dimensions(&self) -> [usize; DIM];
    /// Multilinear sample at a position expressed in grid units.
    fn sample(&self, p: &Vector) -> Vector;
}

/// Dense float grid over the image domain.
///
/// Storage is x-fastest row-major; all random access clamps to the domain
/// so boundary stencils never branch.
#[derive(Clone, Debug)]
pub struct LevelSet {
    dims: [usize; DIM],
    data: Vec<f32>,
}

impl LevelSet {
    pub fn new(dims: [usize; DIM], fill: f32) -> Self {
        let len = dims.iter().product();
        Self {
            dims,
            data: vec![fill; len],
        }
    }

    pub fn from_data(dims: [usize; DIM], data: Vec<f32>) -> Self {
        assert_eq!(data.len(), dims.iter().product::<usize>());
        Self { dims, data }
    }

    pub fn dims(&self) -> [usize; DIM] {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Largest grid dimension; the normalization scale of the coordinate
    /// transform is derived from this.
    pub fn max_dim(&self) -> usize {
        self.dims.iter().copied().max().unwrap_or(0)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn fill(&mut self, value: f32) {
        self.data.fill(value);
    }

    #[inline]
    fn clamp_cell(&self, cell: Cell) -> Cell {
        let mut c = cell;
        for (axis, v) in c.iter_mut().enumerate() {
            *v = (*v).clamp(0, self.dims[axis] as i32 - 1);
        }
        c
    }

    /// Flat index of a (clamped) cell.
    #[inline]
    pub fn index(&self, cell: Cell) -> usize {
        let c = self.clamp_cell(cell);
        #[cfg(feature = "dim2")]
        {
            c[0] as usize + self.dims[0] * c[1] as usize
        }
        #[cfg(feature = "dim3")]
        {
            c[0] as usize + self.dims[0] * (c[1] as usize + self.dims[1] * c[2] as usize)
        }
    }

    /// Cell coordinates of a flat index.
    #[inline]
    pub fn cell_of(&self, index: usize) -> Cell {
        #[cfg(feature = "dim2")]
        {
            [(index % self.dims[0]) as i32, (index / self.dims[0]) as i32]
        }
        #[cfg(feature = "dim3")]
        {
            let xy = self.dims[0] * self.dims[1];
            [
                (index % self.dims[0]) as i32,
                ((index / self.dims[0]) % self.dims[1]) as i32,
                (index / xy) as i32,
            ]
        }
    }

    #[inline]
    pub fn in_bounds(&self, cell: Cell) -> bool {
        cell.iter()
            .zip(self.dims.iter())
            .all(|(&c, &d)| c >= 0 && (c as usize) < d)
    }

    #[inline]
    pub fn get(&self, cell: Cell) -> f32 {
        self.data[self.index(cell)]
    }

    #[inline]
    pub fn set(&mut self, cell: Cell, value: f32) {
        let idx = self.index(cell);
        self.data[idx] = value;
    }

    #[inline]
    pub fn get_index(&self, index: usize) -> f32 {
        self.data[index]
    }

    #[inline]
    pub fn set_index(&mut self, index: usize, value: f32) {
        self.data[index] = value;
    }

    /// Central-difference gradient at a cell.
    pub fn gradient(&self, cell: Cell) -> Vector {
        let mut g = Vector::zeros();
        for axis in 0..DIM {
            let mut lo = cell;
            let mut hi = cell;
            lo[axis] -= 1;
            hi[axis] += 1;
            g[axis] = (self.get(hi) - self.get(lo)) * 0.5;
        }
        g
    }

    /// Mean curvature times |∇φ| at a cell, from second-order central
    /// differences, clamped to one grid unit for stability.
    pub fn curvature(&self, cell: Cell) -> f32 {
        let d = |offsets: Cell| {
            let mut c = cell;
            for axis in 0..DIM {
                c[axis] += offsets[axis];
            }
            self.get(c)
        };

        let center = self.get(cell);
        let mut first = [0.0f32; DIM];
        let mut second = [0.0f32; DIM];
        for axis in 0..DIM {
            let mut plus = [0; DIM];
            let mut minus = [0; DIM];
            plus[axis] = 1;
            minus[axis] = -1;
            let hi = d(plus);
            let lo = d(minus);
            first[axis] = (hi - lo) * 0.5;
            second[axis] = hi - 2.0 * center + lo;
        }

        let mixed = |a: usize, b: usize| {
            let mut pp = [0; DIM];
            let mut pm = [0; DIM];
            let mut mp = [0; DIM];
            let mut mm = [0; DIM];
            pp[a] = 1;
            pp[b] += 1;
            pm[a] = 1;
            pm[b] -= 1;
            mp[a] = -1;
            mp[b] += 1;
            mm[a] = -1;
            mm[b] -= 1;
            (d(pp) - d(pm) - d(mp) + d(mm)) * 0.25
        };

        let grad2: f32 = first.iter().map(|v| v * v).sum();
        if grad2 < 1.0e-10 {
            return 0.0;
        }

        #[cfg(feature = "dim2")]
        let numer = second[0] * first[1] * first[1] - 2.0 * first[0] * first[1] * mixed(0, 1)
            + second[1] * first[0] * first[0];
        #[cfg(feature = "dim3")]
        let numer = second[0] * (first[1] * first[1] + first[2] * first[2])
            + second[1] * (first[0] * first[0] + first[2] * first[2])
            + second[2] * (first[0] * first[0] + first[1] * first[1])
            - 2.0
                * (first[0] * first[1] * mixed(0, 1)
                    + first[0] * first[2] * mixed(0, 2)
                    + first[1] * first[2] * mixed(1, 2));

        (numer / grad2).clamp(-1.0, 1.0)
    }
}

impl ScalarField for LevelSet {
    fn dimensions(&self) -> [usize; DIM] {
        self.dims
    }

    fn sample(&self, p: &Vector) -> f32 {
        let mut base = [0i32; DIM];
        let mut frac = [0.0f32; DIM];
        for axis in 0..DIM {
            let v = p[axis].clamp(0.0, (self.dims[axis] - 1) as f32);
            let f = v.floor();
            base[axis] = f as i32;
            frac[axis] = v - f;
        }

        // Multilinear blend over the 2^DIM surrounding corners.
        let mut result = 0.0;
        for corner in 0..(1usize << DIM) {
            let mut cell = base;
            let mut weight = 1.0;
            for axis in 0..DIM {
                if corner & (1 << axis) != 0 {
                    cell[axis] += 1;
                    weight *= frac[axis];
                } else {
                    weight *= 1.0 - frac[axis];
                }
            }
            if weight > 0.0 {
                result += weight * self.get(cell);
            }
        }
        result
    }
}

/// Dense vector-valued grid (one vector per cell).
#[derive(Clone, Debug)]
pub struct DenseVectorField {
    dims: [usize; DIM],
    scalars: Vec<LevelSet>,
}

impl DenseVectorField {
    /// Builds the field from one scalar component grid per axis.
    pub fn from_components(components: Vec<LevelSet>) -> Self {
        assert_eq!(components.len(), DIM);
        let dims = components[0].dims();
        assert!(components.iter().all(|c| c.dims() == dims));
        Self {
            dims,
            scalars: components,
        }
    }
}

impl VectorField for DenseVectorField {
    fn dimensions(&self) -> [usize; DIM] {
        self.dims
    }

    fn sample(&self, p: &Vector) -> Vector {
        let mut v = Vector::zeros();
        for axis in 0..DIM {
            v[axis] = self.scalars[axis].sample(p);
        }
        v
    }
}

/// Explicit double buffer: phases read `current` and write `next`, then the
/// pair is swapped at a phase boundary. Readers of the old buffer are never
/// invalidated mid-phase.
#[derive(Clone, Debug)]
pub struct PingPong<T> {
    pub current: T,
    pub next: T,
}

impl<T> PingPong<T> {
    pub fn new(current: T, next: T) -> Self {
        Self { current, next }
    }

    pub fn swap(&mut self) {
        std::mem::swap(&mut self.current, &mut self.next);
    }
}

impl<T: Clone> PingPong<T> {
    /// Both buffers start as clones of the same state.
    pub fn duplicated(value: T) -> Self {
        Self {
            next: value.clone(),
            current: value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims() -> [usize; DIM] {
        #[cfg(feature = "dim2")]
        return [8, 6];
        #[cfg(feature = "dim3")]
        return [8, 6, 5];
    }

    #[test]
    fn index_roundtrip() {
        let grid = LevelSet::new(dims(), 0.0);
        for idx in 0..grid.len() {
            let cell = grid.cell_of(idx);
            assert!(grid.in_bounds(cell));
            assert_eq!(grid.index(cell), idx);
        }
    }

    #[test]
    fn sample_is_exact_on_lattice_points() {
        let mut grid = LevelSet::new(dims(), 0.0);
        for idx in 0..grid.len() {
            grid.set_index(idx, idx as f32);
        }
        for idx in (0..grid.len()).step_by(3) {
            let cell = grid.cell_of(idx);
            let mut p = Vector::zeros();
            for axis in 0..DIM {
                p[axis] = cell[axis] as f32;
            }
            assert!((grid.sample(&p) - idx as f32).abs() < 1.0e-4);
        }
    }

    #[test]
    fn sample_interpolates_linearly() {
        let mut grid = LevelSet::new(dims(), 0.0);
        // A linear ramp along x is reproduced exactly by multilinear blending.
        for idx in 0..grid.len() {
            let cell = grid.cell_of(idx);
            grid.set_index(idx, cell[0] as f32 * 2.0);
        }
        let mut p = Vector::zeros();
        p[0] = 2.5;
        assert!((grid.sample(&p) - 5.0).abs() < 1.0e-5);
    }

    #[test]
    fn ping_pong_swap() {
        let mut pair = PingPong::new(1, 2);
        pair.swap();
        assert_eq!((pair.current, pair.next), (2, 1));
    }

    #[test]
    fn curvature_is_zero_on_planes() {
        let mut grid = LevelSet::new(dims(), 0.0);
        for idx in 0..grid.len() {
            let cell = grid.cell_of(idx);
            grid.set_index(idx, cell[0] as f32 - 3.0);
        }
        // Interior cell of a planar field has no curvature.
        #[cfg(feature = "dim2")]
        let cell = [3, 3];
        #[cfg(feature = "dim3")]
        let cell = [3, 3, 2];
        assert!(grid.curvature(cell).abs() < 1.0e-5);
    }
}
