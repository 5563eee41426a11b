use std::f64::consts::PI;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;

use crate::sim::comm::ProcessComm;
use crate::sim::constants::STEFAN_BOLTZMANN;
use crate::sim::dynamic::{DynamicStateRecipe, RecipeContext};
use crate::sim::materials::{MaterialMix, MaterialState, MixRegistry, StateVariable};
use crate::sim::wavelength::WavelengthGrid;

/// Stores the radiative equilibrium temperature of grey emitters.
///
/// Absorbed power follows from the absorption cross section on the radiation
/// field grid; emission uses the bin-width weighted mean of that cross section.
/// Converges once the largest relative temperature change in a step is at
/// most `tolerance`.
pub struct EquilibriumTemperatureRecipe {
    pub tolerance: f64,
    wavelength_grid: Option<Arc<WavelengthGrid>>,
    mixes: MixRegistry,
    comm: Option<Arc<dyn ProcessComm>>,
    /// Bit pattern of the largest relative change seen in this step.
    ///
    /// Non-negative floats order like their bit patterns.
    max_change: AtomicU64,
}

impl EquilibriumTemperatureRecipe {
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            wavelength_grid: None,
            mixes: MixRegistry::new(),
            comm: None,
            max_change: AtomicU64::new(0.0_f64.to_bits()),
        }
    }

    /// Equilibrium temperature for mean intensity `jv`, or `None` if the mix
    /// does not absorb on the grid.
    pub fn equilibrium_temperature(
        mix: &dyn MaterialMix,
        state: &MaterialState,
        jv: &[f64],
        wlg: &WavelengthGrid,
    ) -> Option<f64> {
        let mut absorbed = 0.0;
        let mut grey = 0.0;
        let mut width = 0.0;
        for (ell, j) in jv.iter().enumerate() {
            let sigma = mix.section_abs(wlg.wavelength(ell), state);
            let dl = wlg.bin_width(ell);
            absorbed += sigma * j * dl;
            grey += sigma * dl;
            width += dl;
        }
        if grey <= 0.0 || width <= 0.0 {
            return None;
        }
        let grey = grey / width;
        Some((PI * absorbed / (grey * STEFAN_BOLTZMANN)).max(0.0).powf(0.25))
    }

    fn record_change(&self, change: f64) {
        self.max_change.fetch_max(change.to_bits(), Ordering::Relaxed);
    }
}

impl DynamicStateRecipe for EquilibriumTemperatureRecipe {
    fn name(&self) -> &'static str {
        "equilibrium-temperature"
    }

    fn applies_to(&self, mix: &dyn MaterialMix) -> bool {
        mix.state_variable_index(StateVariable::Temperature).is_some()
    }

    fn begin_update(&mut self, ctx: &RecipeContext) {
        self.wavelength_grid = Some(Arc::clone(&ctx.wavelength_grid));
        self.mixes = ctx.mixes.clone();
        self.comm = Some(Arc::clone(&ctx.comm));
        self.max_change.store(0.0_f64.to_bits(), Ordering::Relaxed);
    }

    fn update(&self, state: &mut MaterialState, jv: &[f64]) -> bool {
        let Some(wlg) = &self.wavelength_grid else {
            return false;
        };
        let mix = self.mixes.get(state.mix_index());
        let Some(i) = mix.state_variable_index(StateVariable::Temperature) else {
            return false;
        };
        let Some(new) = Self::equilibrium_temperature(mix, state, jv, wlg) else {
            return false;
        };

        let old = state.value(i);
        if new == old {
            return false;
        }
        if new > 0.0 {
            self.record_change((new - old).abs() / new);
        }
        state.set_value(i, new);
        true
    }

    fn end_update(&mut self, num_cells: usize, num_updated: usize) -> bool {
        let mut max_change = [f64::from_bits(self.max_change.load(Ordering::Relaxed))];
        if let Some(comm) = &self.comm {
            comm.max_all(&mut max_change);
        }
        let converged = max_change[0] <= self.tolerance;
        info!(
            recipe = self.name(),
            num_updated,
            num_cells,
            max_relative_change = max_change[0],
            converged,
            "equilibrium temperature update finished"
        );
        converged
    }
}
