//! Transfer media and the medium system built on top of them.
//!
//! A medium is an input model: a spatial density distribution plus a reference
//! to the material mix (or family of mixes) describing its optical properties.
//! The [`MediumSystem`] samples all media on the spatial grid and keeps the
//! resulting per-cell state.

pub mod particles;
pub mod state;
pub mod system;

pub use particles::{SmoothedParticle, SmoothedParticleMedium};
pub use state::{CellState, StateStore};
pub use system::{MediumSystem, OpacityStrategy};

use crate::{Point, Vector};

/// Density input model for one medium component.
pub trait Medium: Send + Sync {
    fn name(&self) -> &str;

    /// 1 for spherical symmetry, 2 for axial symmetry, 3 for none.
    fn dimension(&self) -> usize {
        3
    }

    /// Number density at `pos` [1/m^3]. Never negative.
    fn number_density(&self, pos: Point) -> f64;

    /// Bulk velocity at `pos` [m/s].
    fn bulk_velocity(&self, _pos: Point) -> Vector {
        Vector::zero()
    }

    /// Registry index of the mix at `pos`.
    fn mix_index(&self, pos: Point) -> usize;

    /// Registry indices of every mix this medium may return from [`Medium::mix_index`].
    fn mix_indices(&self) -> Vec<usize>;

    /// True if different positions may use different mixes.
    fn has_variable_mix(&self) -> bool {
        self.mix_indices().len() > 1
    }

    fn has_magnetic_field(&self) -> bool {
        false
    }

    /// Magnetic field at `pos` [T].
    fn magnetic_field(&self, _pos: Point) -> Vector {
        Vector::zero()
    }
}

/// Medium with constant density and velocity filling the whole domain.
#[derive(Debug, Clone)]
pub struct UniformMedium {
    pub name: String,
    pub number_density: f64,
    pub velocity: Vector,
    pub mix: usize,
    pub magnetic_field: Option<Vector>,
}

impl UniformMedium {
    pub fn new(name: &str, number_density: f64, mix: usize) -> Self {
        Self {
            name: name.to_string(),
            number_density: number_density.max(0.0),
            velocity: Vector::zero(),
            mix,
            magnetic_field: None,
        }
    }

    pub fn with_velocity(mut self, velocity: Vector) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_magnetic_field(mut self, field: Vector) -> Self {
        self.magnetic_field = Some(field);
        self
    }
}

impl Medium for UniformMedium {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        if self.velocity.is_zero() && self.magnetic_field.is_none() {
            1
        } else {
            3
        }
    }

    fn number_density(&self, _pos: Point) -> f64 {
        self.number_density
    }

    fn bulk_velocity(&self, _pos: Point) -> Vector {
        self.velocity
    }

    fn mix_index(&self, _pos: Point) -> usize {
        self.mix
    }

    fn mix_indices(&self) -> Vec<usize> {
        vec![self.mix]
    }

    fn has_magnetic_field(&self) -> bool {
        self.magnetic_field.is_some()
    }

    fn magnetic_field(&self, _pos: Point) -> Vector {
        self.magnetic_field.unwrap_or_default()
    }
}

type ScalarField = Box<dyn Fn(Point) -> f64 + Send + Sync>;
type VectorField = Box<dyn Fn(Point) -> Vector + Send + Sync>;
type MixSelector = Box<dyn Fn(Point) -> usize + Send + Sync>;

/// Medium defined by closures for density, velocity and (optionally) the mix.
pub struct FunctionMedium {
    name: String,
    density: ScalarField,
    velocity: Option<VectorField>,
    mixes: Vec<usize>,
    selector: Option<MixSelector>,
}

impl FunctionMedium {
    pub fn new<F>(name: &str, mix: usize, density: F) -> Self
    where
        F: Fn(Point) -> f64 + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            density: Box::new(density),
            velocity: None,
            mixes: vec![mix],
            selector: None,
        }
    }

    pub fn with_velocity<F>(mut self, velocity: F) -> Self
    where
        F: Fn(Point) -> Vector + Send + Sync + 'static,
    {
        self.velocity = Some(Box::new(velocity));
        self
    }

    /// Makes the mix position dependent. `selector` must only return indices
    /// listed in `mixes`.
    pub fn with_variable_mix<F>(mut self, mixes: Vec<usize>, selector: F) -> Self
    where
        F: Fn(Point) -> usize + Send + Sync + 'static,
    {
        self.mixes = mixes;
        self.selector = Some(Box::new(selector));
        self
    }
}

impl Medium for FunctionMedium {
    fn name(&self) -> &str {
        &self.name
    }

    fn number_density(&self, pos: Point) -> f64 {
        (self.density)(pos).max(0.0)
    }

    fn bulk_velocity(&self, pos: Point) -> Vector {
        match &self.velocity {
            Some(v) => v(pos),
            None => Vector::zero(),
        }
    }

    fn mix_index(&self, pos: Point) -> usize {
        match &self.selector {
            Some(select) => select(pos),
            None => self.mixes[0],
        }
    }

    fn mix_indices(&self) -> Vec<usize> {
        self.mixes.clone()
    }
}
