use anyhow::{Result, ensure};
use rand::Rng;
use rand::rngs::StdRng;

use crate::sim::grid::{PathSegment, SpatialGrid};
use crate::{Point, Vector};

/// Relative tolerance for detecting simultaneous crossings of cell walls.
const WALL_TOLERANCE: f64 = 1e-12;

/// Axis-aligned box split into `nx * ny * nz` equal cells.
///
/// Cell `(i, j, k)` has index `i + nx * (j + ny * k)`.
#[derive(Debug, Clone)]
pub struct CartesianGrid {
    min: Point,
    max: Point,
    n: [usize; 3],
    step: [f64; 3],
}

impl CartesianGrid {
    pub fn new(min: Point, max: Point, nx: usize, ny: usize, nz: usize) -> Result<Self> {
        ensure!(
            nx > 0 && ny > 0 && nz > 0,
            "grid needs at least one cell per axis, got {nx}x{ny}x{nz}"
        );
        ensure!(
            max.x > min.x && max.y > min.y && max.z > min.z,
            "grid box is empty: min={min}, max={max}"
        );
        let n = [nx, ny, nz];
        let step = [
            (max.x - min.x) / nx as f64,
            (max.y - min.y) / ny as f64,
            (max.z - min.z) / nz as f64,
        ];
        Ok(Self { min, max, n, step })
    }

    /// Cube centered on the origin with half-size `half` and `n` cells per axis.
    pub fn cube(half: f64, n: usize) -> Result<Self> {
        Self::new(
            Point::new(-half, -half, -half),
            Point::new(half, half, half),
            n,
            n,
            n,
        )
    }

    fn index(&self, ijk: [usize; 3]) -> usize {
        ijk[0] + self.n[0] * (ijk[1] + self.n[1] * ijk[2])
    }

    fn ijk(&self, m: usize) -> [usize; 3] {
        assert!(
            m < self.num_cells(),
            "cell index {m} out of range [0, {})",
            self.num_cells()
        );
        let i = m % self.n[0];
        let j = (m / self.n[0]) % self.n[1];
        let k = m / (self.n[0] * self.n[1]);
        [i, j, k]
    }

    fn cell_min(&self, m: usize) -> Point {
        let [i, j, k] = self.ijk(m);
        Point::new(
            self.min.x + i as f64 * self.step[0],
            self.min.y + j as f64 * self.step[1],
            self.min.z + k as f64 * self.step[2],
        )
    }

    /// Parametric distances at which the ray enters and leaves the box.
    fn clip(&self, origin: Point, dir: Vector) -> Option<(f64, f64)> {
        let mut t_enter = f64::NEG_INFINITY;
        let mut t_exit = f64::INFINITY;
        for axis in 0..3 {
            let o = origin.coord(axis);
            let d = dir.component(axis);
            let lo = self.min.coord(axis);
            let hi = self.max.coord(axis);
            if d == 0.0 {
                if o < lo || o > hi {
                    return None;
                }
                continue;
            }
            let t1 = (lo - o) / d;
            let t2 = (hi - o) / d;
            t_enter = t_enter.max(t1.min(t2));
            t_exit = t_exit.min(t1.max(t2));
        }
        let t_start = t_enter.max(0.0);
        if t_exit <= t_start {
            None
        } else {
            Some((t_start, t_exit))
        }
    }
}

impl SpatialGrid for CartesianGrid {
    fn dimension(&self) -> usize {
        3
    }

    fn num_cells(&self) -> usize {
        self.n[0] * self.n[1] * self.n[2]
    }

    fn volume(&self, m: usize) -> f64 {
        assert!(
            m < self.num_cells(),
            "cell index {m} out of range [0, {})",
            self.num_cells()
        );
        self.step[0] * self.step[1] * self.step[2]
    }

    fn centroid(&self, m: usize) -> Point {
        let p = self.cell_min(m);
        Point::new(
            p.x + 0.5 * self.step[0],
            p.y + 0.5 * self.step[1],
            p.z + 0.5 * self.step[2],
        )
    }

    fn random_position_in_cell(&self, m: usize, rng: &mut StdRng) -> Point {
        let p = self.cell_min(m);
        Point::new(
            p.x + rng.gen_range(0.0..1.0) * self.step[0],
            p.y + rng.gen_range(0.0..1.0) * self.step[1],
            p.z + rng.gen_range(0.0..1.0) * self.step[2],
        )
    }

    fn cell_index(&self, pos: Point) -> Option<usize> {
        let mut ijk = [0; 3];
        for (axis, slot) in ijk.iter_mut().enumerate() {
            let c = pos.coord(axis);
            if c < self.min.coord(axis) || c > self.max.coord(axis) {
                return None;
            }
            let i = ((c - self.min.coord(axis)) / self.step[axis]).floor() as usize;
            *slot = i.min(self.n[axis] - 1);
        }
        Some(self.index(ijk))
    }

    /// Walks the ray through the cells with a 3D-DDA.
    fn path(&self, origin: Point, direction: Vector) -> Vec<PathSegment> {
        let Some(dir) = direction.normalize() else {
            return Vec::new();
        };
        let Some((t_start, t_exit)) = self.clip(origin, dir) else {
            return Vec::new();
        };

        let entry = origin + dir * t_start;
        let mut idx = [0_i64; 3];
        let mut step = [0_i64; 3];
        let mut t_next = [f64::INFINITY; 3];
        let mut t_delta = [f64::INFINITY; 3];
        for axis in 0..3 {
            let d = dir.component(axis);
            let lo = self.min.coord(axis);
            let rel = (entry.coord(axis) - lo) / self.step[axis];
            let mut i = rel.floor() as i64;
            // On an interior wall while moving backwards, the ray is in the lower cell
            if d < 0.0 && rel == rel.floor() {
                i -= 1;
            }
            i = i.clamp(0, self.n[axis] as i64 - 1);
            idx[axis] = i;
            if d > 0.0 {
                step[axis] = 1;
                t_next[axis] = (lo + (i + 1) as f64 * self.step[axis] - origin.coord(axis)) / d;
                t_delta[axis] = self.step[axis] / d;
            } else if d < 0.0 {
                step[axis] = -1;
                t_next[axis] = (lo + i as f64 * self.step[axis] - origin.coord(axis)) / d;
                t_delta[axis] = -self.step[axis] / d;
            }
        }

        let mut segments = Vec::new();
        let mut t = t_start;
        loop {
            let t_wall = t_next.iter().copied().fold(f64::INFINITY, f64::min);
            let t_end = t_wall.min(t_exit);
            let ds = t_end - t;
            if ds > 0.0 {
                let cell = self.index([idx[0] as usize, idx[1] as usize, idx[2] as usize]);
                segments.push(PathSegment { cell, ds, s: t_end });
            }
            if t_end >= t_exit {
                break;
            }
            t = t_end;

            let tolerance = WALL_TOLERANCE * (1.0 + t_wall.abs());
            for axis in 0..3 {
                if t_next[axis] <= t_wall + tolerance {
                    idx[axis] += step[axis];
                    t_next[axis] += t_delta[axis];
                    if idx[axis] < 0 || idx[axis] >= self.n[axis] as i64 {
                        return segments;
                    }
                }
            }
        }
        segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn row_grid() -> CartesianGrid {
        CartesianGrid::new(Point::new(0., 0., 0.), Point::new(10., 1., 1.), 10, 1, 1).unwrap()
    }

    #[test]
    fn test_volume_and_centroid() {
        let grid = CartesianGrid::cube(1.0, 2).unwrap();
        assert_eq!(grid.num_cells(), 8);
        assert!((grid.volume(3) - 1.0).abs() < 1e-15);
        assert!(grid.centroid(0).is_close(&Point::new(-0.5, -0.5, -0.5)));
        assert!(grid.centroid(7).is_close(&Point::new(0.5, 0.5, 0.5)));
    }

    #[test]
    fn test_cell_index_roundtrip() {
        let grid = CartesianGrid::cube(1.0, 3).unwrap();
        for m in 0..grid.num_cells() {
            assert_eq!(grid.cell_index(grid.centroid(m)), Some(m));
        }
        assert_eq!(grid.cell_index(Point::new(2., 0., 0.)), None);
    }

    #[test]
    fn test_random_position_stays_in_cell() {
        let grid = CartesianGrid::cube(1.0, 4).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for m in [0, 17, 63] {
            for _ in 0..20 {
                let p = grid.random_position_in_cell(m, &mut rng);
                assert_eq!(grid.cell_index(p), Some(m));
            }
        }
    }

    #[test]
    fn test_path_along_row() {
        let grid = row_grid();
        let path = grid.path(Point::new(0., 0.5, 0.5), Vector::new(1., 0., 0.));
        assert_eq!(path.len(), 10);
        for (i, seg) in path.iter().enumerate() {
            assert_eq!(seg.cell, i);
            assert!((seg.ds - 1.0).abs() < 1e-12);
            assert!((seg.s - (i + 1) as f64).abs() < 1e-12);
        }
    }

    #[test]
    fn test_path_backwards_from_outside() {
        let grid = row_grid();
        let path = grid.path(Point::new(12., 0.5, 0.5), Vector::new(-1., 0., 0.));
        assert_eq!(path.len(), 10);
        assert_eq!(path[0].cell, 9);
        assert_eq!(path[9].cell, 0);
        // Distances are measured from the ray origin
        assert!((path[0].s - 3.0).abs() < 1e-12);
        assert!((path[9].s - 12.0).abs() < 1e-12);
    }

    #[test]
    fn test_path_starting_inside() {
        let grid = row_grid();
        let path = grid.path(Point::new(4.5, 0.5, 0.5), Vector::new(1., 0., 0.));
        assert_eq!(path.len(), 6);
        assert_eq!(path[0].cell, 4);
        assert!((path[0].ds - 0.5).abs() < 1e-12);
        let total: f64 = path.iter().map(|s| s.ds).sum();
        assert!((total - 5.5).abs() < 1e-12);
    }

    #[test]
    fn test_diagonal_path_length() {
        let grid = CartesianGrid::cube(1.0, 5).unwrap();
        let origin = Point::new(-1., -1., -1.);
        let path = grid.path(origin, Vector::new(1., 1., 1.));
        let total: f64 = path.iter().map(|s| s.ds).sum();
        assert!((total - 12f64.sqrt()).abs() < 1e-9);
        // Cumulative distances increase monotonically
        assert!(path.windows(2).all(|w| w[1].s > w[0].s));
    }

    #[test]
    fn test_path_missing_the_grid() {
        let grid = row_grid();
        assert!(grid.path(Point::new(0., 5., 0.5), Vector::new(1., 0., 0.)).is_empty());
        assert!(grid.path(Point::new(-1., 0.5, 0.5), Vector::new(-1., 0., 0.)).is_empty());
        assert!(grid.path(Point::new(1., 0.5, 0.5), Vector::zero()).is_empty());
    }
}
