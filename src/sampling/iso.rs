//! Iso-contour/iso-surface extraction: turns the zero crossing of a
//! distance field into an explicit springl set.

use crate::levelset::LevelSet;
use crate::math::{vector_from, Cell, Vector, DIM, VERTS_PER_SPRINGL};
use crate::solver::tables;
use crate::springl::{Springl, UNLABELED};
use rayon::prelude::*;

/// Case index of a cell from its corner signs (negative = inside).
pub(crate) fn cell_case(field: &LevelSet, cell: Cell) -> usize {
    let mut case = 0usize;
    for (i, offset) in tables::CELL_CORNERS.iter().enumerate() {
        let mut corner = cell;
        for axis in 0..DIM {
            corner[axis] += offset[axis];
        }
        if field.get(corner) < 0.0 {
            case |= 1 << i;
        }
    }
    case
}

/// Interpolated zero crossing on one cell edge, in grid units.
fn edge_vertex(field: &LevelSet, cell: Cell, edge: usize) -> Vector {
    let [ca, cb] = tables::EDGE_CORNERS[edge];
    let mut a = [0.0f32; DIM];
    let mut b = [0.0f32; DIM];
    let mut cell_a = cell;
    let mut cell_b = cell;
    for axis in 0..DIM {
        cell_a[axis] += tables::CELL_CORNERS[ca][axis];
        cell_b[axis] += tables::CELL_CORNERS[cb][axis];
        a[axis] = cell_a[axis] as f32;
        b[axis] = cell_b[axis] as f32;
    }
    let va = field.get(cell_a);
    let vb = field.get(cell_b);
    let denom = va - vb;
    // Degenerate edges fall back to the midpoint.
    let t = if denom.abs() > 1.0e-12 {
        (va / denom).clamp(0.0, 1.0)
    } else {
        0.5
    };
    let mut out = [0.0f32; DIM];
    for axis in 0..DIM {
        out[axis] = a[axis] + t * (b[axis] - a[axis]);
    }
    vector_from(out)
}

/// Appends the springls tessellating the surface inside one cell.
///
/// Vertices are interpolated on the crossing edges, converted to the
/// normalized particle space, and oriented so the element normal agrees
/// with the outward field gradient. Labels start as [`UNLABELED`].
pub fn springls_in_cell(field: &LevelSet, cell: Cell, scale_down: f32, out: &mut Vec<Springl>) {
    for axis in 0..DIM {
        if cell[axis] < 0 || cell[axis] as usize + 1 >= field.dims()[axis] {
            return;
        }
    }
    let case = cell_case(field, cell);
    let outward = field.gradient(cell);

    for group in tables::primitives(case) {
        let mut vertexes = [Vector::zeros(); VERTS_PER_SPRINGL];
        for (slot, &edge) in group.iter().enumerate() {
            vertexes[slot] = edge_vertex(field, cell, edge as usize) * scale_down;
        }
        let mut springl = Springl::from_vertexes(vertexes, UNLABELED);
        if springl.raw_normal().dot(&outward) < 0.0 {
            springl.vertexes.swap(0, 1);
            springl = Springl::from_vertexes(springl.vertexes, UNLABELED);
        }
        if !springl.is_degenerate(1.0e-12) {
            out.push(springl);
        }
    }
}

/// Extracts the full zero crossing of a distance field as a springl set,
/// with sequential reference ids.
pub fn extract_springls(field: &LevelSet, scale_down: f32) -> Vec<Springl> {
    let mut springls: Vec<Springl> = (0..field.len())
        .into_par_iter()
        .fold(Vec::new, |mut acc, idx| {
            springls_in_cell(field, field.cell_of(idx), scale_down, &mut acc);
            acc
        })
        .reduce(Vec::new, |mut a, mut b| {
            a.append(&mut b);
            a
        });

    for (id, springl) in springls.iter_mut().enumerate() {
        springl.reference_id = id as u32;
    }
    springls
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sphere_field(n: usize, radius: f32) -> LevelSet {
        let mut grid = LevelSet::new([n; DIM], 0.0);
        for idx in 0..grid.len() {
            let cell = grid.cell_of(idx);
            let mut d2 = 0.0f32;
            for axis in 0..DIM {
                let x = cell[axis] as f32 - n as f32 / 2.0;
                d2 += x * x;
            }
            grid.set_index(idx, d2.sqrt() - radius);
        }
        grid
    }

    #[test]
    fn extracted_vertices_sit_on_the_zero_crossing() {
        let n = 32usize;
        let radius = 8.0f32;
        let field = sphere_field(n, radius);
        let scale_down = 1.0 / n as f32;

        let springls = extract_springls(&field, scale_down);
        assert!(!springls.is_empty());

        let center = n as f32 / 2.0;
        for s in &springls {
            for v in &s.vertexes {
                let g = v / scale_down;
                let mut d2 = 0.0f32;
                for axis in 0..DIM {
                    d2 += (g[axis] - center) * (g[axis] - center);
                }
                // Linear interpolation of a curved field: within a cell.
                assert!(
                    (d2.sqrt() - radius).abs() < 0.75,
                    "vertex off the crossing: {}",
                    d2.sqrt() - radius
                );
            }
        }
    }

    #[test]
    fn normals_point_outward() {
        let n = 32usize;
        let field = sphere_field(n, 8.0);
        let springls = extract_springls(&field, 1.0 / n as f32);

        let center = 0.5f32;
        let mut outward = 0usize;
        for s in &springls {
            if let Some(normal) = s.normal() {
                let mut radial = s.particle;
                for axis in 0..DIM {
                    radial[axis] -= center;
                }
                if normal.dot(&radial) > 0.0 {
                    outward += 1;
                }
            }
        }
        assert!(outward as f32 > 0.95 * springls.len() as f32);
    }

    #[test]
    fn ids_are_sequential() {
        let field = sphere_field(24, 6.0);
        let springls = extract_springls(&field, 1.0 / 24.0);
        for (i, s) in springls.iter().enumerate() {
            assert_eq!(s.reference_id, i as u32);
        }
    }
}
