use std::sync::Arc;

use anyhow::{Context, Result};
use rayon::prelude::*;
use tracing::{info, instrument, trace, warn};

use crate::sim::dynamic::{DynamicStateRecipe, RadiationFieldSampler, RecipeContext};
use crate::sim::medium::MediumSystem;
use crate::sim::radiation::RadiationField;
use crate::sim::wavelength::WavelengthGrid;

/// Phase of the dynamic medium state iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationPhase {
    Launching,
    Accumulating,
    Updating,
    ConvergenceCheck,
    Terminated,
}

/// Why the iteration stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// All recipes reported convergence after at least the minimum number of steps.
    Converged,
    /// The maximum number of steps was reached without convergence.
    MaxIterations,
}

/// Outcome of the update phase of one iteration step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    /// 1-based step number.
    pub iteration: usize,
    /// Per recipe, the number of cells (over all processes) with an updated state.
    pub num_updated: Vec<usize>,
    /// Per recipe, the convergence verdict of `end_update`.
    pub converged: Vec<bool>,
}

impl StepReport {
    /// True if every recipe converged. Trivially true without recipes.
    pub fn all_converged(&self) -> bool {
        self.converged.iter().all(|&c| c)
    }
}

#[derive(Debug, Clone)]
pub struct IterationOutcome {
    pub iterations: usize,
    pub termination: Termination,
    pub history: Vec<StepReport>,
}

/// Iterates radiation field sampling and medium state updates until the
/// configured recipes converge.
pub struct DynamicStateDriver {
    recipes: Vec<Box<dyn DynamicStateRecipe>>,
    phase: IterationPhase,
}

impl DynamicStateDriver {
    pub fn new() -> Self {
        Self {
            recipes: vec![],
            phase: IterationPhase::Terminated,
        }
    }

    /// Appends a recipe. Recipes run in the order they were added.
    pub fn with_recipe<R: DynamicStateRecipe + 'static>(mut self, recipe: R) -> Self {
        self.recipes.push(Box::new(recipe));
        self
    }

    pub fn num_recipes(&self) -> usize {
        self.recipes.len()
    }

    pub fn recipe_names(&self) -> Vec<&'static str> {
        self.recipes.iter().map(|r| r.name()).collect()
    }

    pub fn phase(&self) -> IterationPhase {
        self.phase
    }

    fn enter(&mut self, phase: IterationPhase, iteration: usize) {
        trace!(iteration, ?phase, "dynamic state phase");
        self.phase = phase;
    }

    /// Runs the iteration to completion.
    ///
    /// Stops as soon as all recipes converged, but never before
    /// `min_dynamic_state_iterations` steps, and always after
    /// `max_dynamic_state_iterations` steps. Not converging is not an error.
    #[instrument(skip_all, fields(num_recipes = self.recipes.len()))]
    pub fn run(
        &mut self,
        system: &mut MediumSystem,
        sampler: &mut dyn RadiationFieldSampler,
    ) -> Result<IterationOutcome> {
        system
            .config()
            .validate()
            .context("Invalid dynamic medium state configuration")?;
        let min = system.config().min_dynamic_state_iterations;
        let max = system.config().max_dynamic_state_iterations;
        let wlg = Arc::new(system.config().radiation_field_wlg()?);
        let mut field = RadiationField::new(system.num_cells(), wlg.num_bins());
        info!(
            min_iterations = min,
            max_iterations = max,
            recipes = ?self.recipe_names(),
            "starting dynamic medium state iteration"
        );

        let mut history = Vec::new();
        let mut iteration = 0;
        let termination = loop {
            iteration += 1;
            info!(iteration, "dynamic medium state iteration step");

            self.enter(IterationPhase::Launching, iteration);
            field.clear();
            sampler
                .launch(system, &mut field, iteration)
                .with_context(|| format!("Failed to launch photon packets in step {iteration}"))?;

            self.enter(IterationPhase::Accumulating, iteration);
            sampler
                .accumulate(system, &mut field)
                .with_context(|| format!("Failed to accumulate radiation field in step {iteration}"))?;

            self.enter(IterationPhase::Updating, iteration);
            let report = self.update_step(system, &field, Arc::clone(&wlg), iteration);

            self.enter(IterationPhase::ConvergenceCheck, iteration);
            let converged = report.all_converged();
            history.push(report);
            if converged && iteration >= min {
                info!(iteration, "dynamic medium state converged");
                break Termination::Converged;
            }
            if iteration >= max {
                warn!(
                    iteration,
                    "dynamic medium state did not converge; stopping at the maximum number of iterations"
                );
                break Termination::MaxIterations;
            }
        };
        self.enter(IterationPhase::Terminated, iteration);

        Ok(IterationOutcome {
            iterations: iteration,
            termination,
            history,
        })
    }

    /// Performs the update phase of one step: all recipes update the material
    /// states of the cells owned by this process, after which the states are
    /// merged across processes and every recipe reports its convergence.
    pub fn update_step(
        &mut self,
        system: &mut MediumSystem,
        field: &RadiationField,
        wavelength_grid: Arc<WavelengthGrid>,
        iteration: usize,
    ) -> StepReport {
        let ctx = RecipeContext::new(system, wavelength_grid);
        for recipe in self.recipes.iter_mut() {
            recipe.begin_update(&ctx);
        }

        let num_recipes = self.recipes.len();
        let recipes = &self.recipes;
        let mixes = ctx.mixes.clone();
        let own = system.own_cells();
        let local_counts = system
            .par_cell_states_mut(own)
            .map(|(m, states)| {
                let jv = field.jv(m);
                recipes
                    .iter()
                    .map(|recipe| {
                        let mut updated = false;
                        for state in states.iter_mut() {
                            if recipe.applies_to(mixes.get(state.mix_index())) {
                                updated |= recipe.update(state, jv);
                            }
                        }
                        usize::from(updated)
                    })
                    .collect::<Vec<usize>>()
            })
            .reduce(
                || vec![0; num_recipes],
                |a, b| a.iter().zip(&b).map(|(x, y)| x + y).collect(),
            );

        let comm = Arc::clone(system.comm());
        let num_updated: Vec<usize> = if comm.is_multi_process() {
            system.communicate_states();
            local_counts.into_iter().map(|c| comm.sum_count(c)).collect()
        } else {
            local_counts
        };

        let num_cells = system.num_cells();
        let converged = self
            .recipes
            .iter_mut()
            .zip(&num_updated)
            .map(|(recipe, &n)| recipe.end_update(num_cells, n))
            .collect();

        StepReport {
            iteration,
            num_updated,
            converged,
        }
    }
}

impl Default for DynamicStateDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::materials::MaterialState;

    struct Fixed(bool);

    impl DynamicStateRecipe for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn begin_update(&mut self, _ctx: &RecipeContext) {}

        fn update(&self, _state: &mut MaterialState, _jv: &[f64]) -> bool {
            false
        }

        fn end_update(&mut self, _num_cells: usize, _num_updated: usize) -> bool {
            self.0
        }
    }

    #[test]
    fn test_builder_keeps_order() {
        let driver = DynamicStateDriver::new()
            .with_recipe(Fixed(true))
            .with_recipe(Fixed(false));
        assert_eq!(driver.num_recipes(), 2);
        assert_eq!(driver.recipe_names(), vec!["fixed", "fixed"]);
        assert_eq!(driver.phase(), IterationPhase::Terminated);
    }

    #[test]
    fn test_empty_report_is_converged() {
        let report = StepReport {
            iteration: 1,
            num_updated: vec![],
            converged: vec![],
        };
        assert!(report.all_converged());
        let report = StepReport {
            iteration: 1,
            num_updated: vec![0, 3],
            converged: vec![true, false],
        };
        assert!(!report.all_converged());
    }
}
