//! Spatial grids tessellating the simulation domain into cells.

pub mod cartesian;

pub use cartesian::CartesianGrid;

use rand::rngs::StdRng;

use crate::{Point, Vector};

/// One cell crossed by a ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathSegment {
    /// Index of the crossed cell.
    pub cell: usize,
    /// Path length covered inside the cell [m].
    pub ds: f64,
    /// Path length from the ray origin to the exit boundary of the cell [m].
    pub s: f64,
}

/// Tessellation of the spatial domain.
///
/// Cells are numbered `0..num_cells()`. All functions may be called concurrently.
pub trait SpatialGrid: Send + Sync {
    /// 1 for spherical symmetry, 2 for axial symmetry, 3 for none.
    fn dimension(&self) -> usize;

    fn num_cells(&self) -> usize;

    /// Volume of cell `m` [m^3].
    fn volume(&self, m: usize) -> f64;

    fn centroid(&self, m: usize) -> Point;

    /// Uniformly distributed random position inside cell `m`.
    fn random_position_in_cell(&self, m: usize, rng: &mut StdRng) -> Point;

    /// Index of the cell containing `pos`, or `None` outside the domain.
    fn cell_index(&self, pos: Point) -> Option<usize>;

    /// Cells crossed by the ray starting at `origin` along `direction`, in order.
    ///
    /// Returns an empty path if the ray never enters the domain.
    fn path(&self, origin: Point, direction: Vector) -> Vec<PathSegment>;
}
