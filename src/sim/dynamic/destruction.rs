use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::info;

use crate::sim::comm::ProcessComm;
use crate::sim::dynamic::{DynamicStateRecipe, RecipeContext};
use crate::sim::materials::{MaterialMix, MaterialState, MaterialType, MixRegistry, StateVariable};
use crate::sim::radiation;
use crate::sim::wavelength::WavelengthGrid;

/// Destroys dust where the radiation field is strong.
///
/// The surviving fraction drops linearly from 1 at `lower_energy_density` to 0
/// at `upper_energy_density` (radiation energy density in J/m^3). Applies to
/// dust mixes with a [`StateVariable::SurvivingFraction`] variable.
pub struct DustDestructionRecipe {
    pub lower_energy_density: f64,
    pub upper_energy_density: f64,
    /// Smaller changes of the surviving fraction are ignored.
    pub fraction_tolerance: f64,
    /// The recipe converges once at most this many cells changed in a step.
    pub max_not_converged_cells: usize,
    wavelength_grid: Option<Arc<WavelengthGrid>>,
    mixes: MixRegistry,
    comm: Option<Arc<dyn ProcessComm>>,
    num_destroyed: AtomicUsize,
    total_destroyed: usize,
}

impl DustDestructionRecipe {
    pub fn new(lower_energy_density: f64, upper_energy_density: f64) -> Self {
        Self {
            lower_energy_density,
            upper_energy_density,
            fraction_tolerance: 1e-3,
            max_not_converged_cells: 0,
            wavelength_grid: None,
            mixes: MixRegistry::new(),
            comm: None,
            num_destroyed: AtomicUsize::new(0),
            total_destroyed: 0,
        }
    }

    pub fn with_fraction_tolerance(mut self, tolerance: f64) -> Self {
        self.fraction_tolerance = tolerance;
        self
    }

    pub fn with_max_not_converged_cells(mut self, cells: usize) -> Self {
        self.max_not_converged_cells = cells;
        self
    }

    /// Cells (over all processes) in which the dust was fully destroyed during
    /// the last completed update.
    pub fn num_destroyed(&self) -> usize {
        self.total_destroyed
    }

    /// Surviving fraction for radiation energy density `u`.
    pub fn surviving_fraction(&self, u: f64) -> f64 {
        if u <= self.lower_energy_density {
            1.0
        } else if u >= self.upper_energy_density {
            0.0
        } else {
            (self.upper_energy_density - u) / (self.upper_energy_density - self.lower_energy_density)
        }
    }
}

impl DynamicStateRecipe for DustDestructionRecipe {
    fn name(&self) -> &'static str {
        "dust-destruction"
    }

    fn applies_to(&self, mix: &dyn MaterialMix) -> bool {
        mix.material_type() == MaterialType::Dust
            && mix
                .state_variable_index(StateVariable::SurvivingFraction)
                .is_some()
    }

    fn begin_update(&mut self, ctx: &RecipeContext) {
        self.wavelength_grid = Some(Arc::clone(&ctx.wavelength_grid));
        self.mixes = ctx.mixes.clone();
        self.comm = Some(Arc::clone(&ctx.comm));
        self.num_destroyed.store(0, Ordering::Relaxed);
    }

    fn update(&self, state: &mut MaterialState, jv: &[f64]) -> bool {
        let Some(wlg) = &self.wavelength_grid else {
            return false;
        };
        let Some(i) = self
            .mixes
            .get(state.mix_index())
            .state_variable_index(StateVariable::SurvivingFraction)
        else {
            return false;
        };

        let old = state.value(i);
        let new = self.surviving_fraction(radiation::energy_density(jv, wlg));
        if (new - old).abs() <= self.fraction_tolerance {
            return false;
        }
        state.set_value(i, new);
        if new == 0.0 {
            self.num_destroyed.fetch_add(1, Ordering::Relaxed);
        }
        true
    }

    fn end_update(&mut self, num_cells: usize, num_updated: usize) -> bool {
        let local = self.num_destroyed.load(Ordering::Relaxed);
        let destroyed = match &self.comm {
            Some(comm) => comm.sum_count(local),
            None => local,
        };
        self.total_destroyed = destroyed;
        let converged = num_updated <= self.max_not_converged_cells;
        info!(
            recipe = self.name(),
            num_updated,
            num_cells,
            newly_destroyed = destroyed,
            converged,
            "dust destruction update finished"
        );
        converged
    }
}
