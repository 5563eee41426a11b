//! Dynamic medium state: iterative, self-consistent coupling of medium state
//! variables with the radiation field.
//!
//! Each iteration step launches photon packets to sample the radiation field
//! and then lets every configured [`DynamicStateRecipe`] adjust the material
//! states of the cells, until all recipes report convergence.

pub mod destruction;
pub mod driver;
pub mod sampler;
pub mod temperature;

pub use destruction::DustDestructionRecipe;
pub use driver::{DynamicStateDriver, IterationOutcome, IterationPhase, StepReport, Termination};
pub use sampler::{PointSourceSampler, RadiationFieldSampler};
pub use temperature::EquilibriumTemperatureRecipe;

use std::sync::Arc;

use crate::sim::comm::ProcessComm;
use crate::sim::materials::{MaterialMix, MaterialState, MixRegistry};
use crate::sim::medium::MediumSystem;
use crate::sim::wavelength::WavelengthGrid;

/// Simulation-wide facts handed to recipes at the start of each update.
#[derive(Clone)]
pub struct RecipeContext {
    pub num_cells: usize,
    pub num_media: usize,
    /// Grid on which the `Jv` passed to [`DynamicStateRecipe::update`] is discretized.
    pub wavelength_grid: Arc<WavelengthGrid>,
    pub comm: Arc<dyn ProcessComm>,
    pub mixes: MixRegistry,
}

impl RecipeContext {
    pub fn new(system: &MediumSystem, wavelength_grid: Arc<WavelengthGrid>) -> Self {
        Self {
            num_cells: system.num_cells(),
            num_media: system.num_media(),
            wavelength_grid,
            comm: Arc::clone(system.comm()),
            mixes: system.mixes().clone(),
        }
    }
}

/// Update rule for the material state of one kind of medium component.
///
/// Per iteration step the driver calls, for every recipe in configuration
/// order:
///
/// 1. [`begin_update`](Self::begin_update) once, before any state is touched;
/// 2. [`update`](Self::update) once per relevant `(cell, component)` pair, from
///    many worker threads at the same time;
/// 3. [`end_update`](Self::end_update) once, after all updates completed on all
///    processes.
///
/// `update` only receives shared access to the recipe, so any counter it
/// maintains must be atomic. Within one cell, recipe B always sees the state
/// already updated by recipe A if A comes first in the configuration.
pub trait DynamicStateRecipe: Send + Sync {
    fn name(&self) -> &'static str;

    /// True if components with this mix are updated by the recipe.
    fn applies_to(&self, _mix: &dyn MaterialMix) -> bool {
        true
    }

    /// Caches simulation-wide facts and resets the convergence accumulators.
    fn begin_update(&mut self, ctx: &RecipeContext);

    /// Updates one material state from the mean intensity `jv` in its cell.
    /// Returns true if the state changed.
    fn update(&self, state: &mut MaterialState, jv: &[f64]) -> bool;

    /// Aggregates the accumulators over all processes and returns true if the
    /// recipe has converged. `num_updated` counts the cells (over all processes)
    /// in which at least one state was changed by this recipe.
    fn end_update(&mut self, num_cells: usize, num_updated: usize) -> bool;
}
