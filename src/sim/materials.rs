//! Material mixes and the per-cell material state they are evaluated on.
//!
//! A material mix describes the optical properties (cross sections per entity)
//! of a medium component. Mixes are immutable and shared: they live in a
//! simulation-wide [`MixRegistry`] and material states refer to them by index.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::sim::constants::{ELECTRON_MASS, PROTON_MASS, THOMSON_SECTION};

/// Fundamental material type of a medium component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaterialType {
    Dust,
    Electrons,
    Gas,
}

/// Extra medium state variables that a mix may request per cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateVariable {
    /// Fraction of the original material that survived destruction [0, 1].
    SurvivingFraction,
    /// Equilibrium temperature [K].
    Temperature,
}

/// Medium state of one medium component in one spatial cell.
///
/// The number density and the mix are fixed at setup. The extra state variables
/// (as declared by the mix through [`MaterialMix::state_variables`]) may be
/// adjusted by dynamic medium state recipes.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialState {
    cell: usize,
    component: usize,
    number_density: f64,
    mix_index: usize,
    values: Vec<f64>,
}

impl MaterialState {
    pub fn new(
        cell: usize,
        component: usize,
        number_density: f64,
        mix_index: usize,
        values: Vec<f64>,
    ) -> Self {
        Self {
            cell,
            component,
            number_density,
            mix_index,
            values,
        }
    }

    pub fn cell(&self) -> usize {
        self.cell
    }

    pub fn component(&self) -> usize {
        self.component
    }

    /// Number density [1/m^3].
    pub fn number_density(&self) -> f64 {
        self.number_density
    }

    /// Index of the mix in the simulation's [`MixRegistry`].
    pub fn mix_index(&self) -> usize {
        self.mix_index
    }

    pub fn num_values(&self) -> usize {
        self.values.len()
    }

    pub fn value(&self, i: usize) -> f64 {
        assert!(
            i < self.values.len(),
            "state variable index {i} out of range [0, {})",
            self.values.len()
        );
        self.values[i]
    }

    pub fn set_value(&mut self, i: usize, value: f64) {
        assert!(
            i < self.values.len(),
            "state variable index {i} out of range [0, {})",
            self.values.len()
        );
        self.values[i] = value;
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// Optical properties of a medium component.
///
/// Cross sections are per entity (dust grain ensemble per hydrogen atom,
/// electron, gas atom) in m^2. Implementations must be thread-safe: they are
/// evaluated concurrently from photon transport and state update workers.
pub trait MaterialMix: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn material_type(&self) -> MaterialType;

    /// Absorption cross section at wavelength `lambda` [m].
    fn section_abs(&self, lambda: f64, state: &MaterialState) -> f64;

    /// Scattering cross section at wavelength `lambda` [m].
    fn section_sca(&self, lambda: f64, state: &MaterialState) -> f64;

    /// Extinction cross section at wavelength `lambda` [m].
    fn section_ext(&self, lambda: f64, state: &MaterialState) -> f64 {
        self.section_abs(lambda, state) + self.section_sca(lambda, state)
    }

    /// Mass per entity [kg].
    fn mass(&self) -> f64;

    fn has_polarization(&self) -> bool {
        false
    }

    /// Extra state variables this mix needs per cell, in storage order.
    fn state_variables(&self) -> &[StateVariable] {
        &[]
    }

    fn num_state_variables(&self) -> usize {
        self.state_variables().len()
    }

    /// Position of `variable` in the state values, if this mix uses it.
    fn state_variable_index(&self, variable: StateVariable) -> Option<usize> {
        self.state_variables().iter().position(|&v| v == variable)
    }

    /// True if the cross sections depend on the extra state variables.
    fn has_state_dependent_sections(&self) -> bool {
        false
    }

    /// Sets the initial values of the extra state variables.
    fn initialize_state(&self, values: &mut [f64]) {
        values.fill(0.0);
    }
}

/// Mix with wavelength-independent cross sections.
#[derive(Debug, Clone)]
pub struct ConstantSectionMix {
    pub name: String,
    pub material_type: MaterialType,
    pub section_abs: f64,
    pub section_sca: f64,
    pub mass: f64,
}

impl ConstantSectionMix {
    pub fn new(
        name: &str,
        material_type: MaterialType,
        section_abs: f64,
        section_sca: f64,
        mass: f64,
    ) -> Self {
        Self {
            name: name.to_string(),
            material_type,
            section_abs,
            section_sca,
            mass,
        }
    }
}

impl MaterialMix for ConstantSectionMix {
    fn name(&self) -> &str {
        &self.name
    }

    fn material_type(&self) -> MaterialType {
        self.material_type
    }

    fn section_abs(&self, _lambda: f64, _state: &MaterialState) -> f64 {
        self.section_abs
    }

    fn section_sca(&self, _lambda: f64, _state: &MaterialState) -> f64 {
        self.section_sca
    }

    fn mass(&self) -> f64 {
        self.mass
    }
}

/// Free electrons: wavelength-independent Thomson scattering, no absorption.
#[derive(Debug, Clone, Default)]
pub struct ElectronMix;

impl MaterialMix for ElectronMix {
    fn name(&self) -> &str {
        "electrons"
    }

    fn material_type(&self) -> MaterialType {
        MaterialType::Electrons
    }

    fn section_abs(&self, _lambda: f64, _state: &MaterialState) -> f64 {
        0.0
    }

    fn section_sca(&self, _lambda: f64, _state: &MaterialState) -> f64 {
        THOMSON_SECTION
    }

    fn mass(&self) -> f64 {
        ELECTRON_MASS
    }
}

/// Dust with power-law cross sections, `sigma(lambda) = sigma0 (lambda/lambda0)^-beta`.
///
/// Keeps an equilibrium temperature per cell that does not affect the sections.
#[derive(Debug, Clone)]
pub struct PowerLawDustMix {
    pub name: String,
    /// Reference wavelength [m].
    pub lambda0: f64,
    /// Absorption cross section per hydrogen atom at `lambda0` [m^2].
    pub section_abs0: f64,
    /// Scattering cross section per hydrogen atom at `lambda0` [m^2].
    pub section_sca0: f64,
    pub beta: f64,
    /// Dust mass per hydrogen atom [kg].
    pub mass: f64,
}

impl PowerLawDustMix {
    /// Typical interstellar dust: per hydrogen atom, V-band extinction of about
    /// 5e-26 m^2 and a dust-to-gas mass ratio of 1%.
    pub fn interstellar(name: &str) -> Self {
        Self {
            name: name.to_string(),
            lambda0: 0.55e-6,
            section_abs0: 2.3e-26,
            section_sca0: 2.7e-26,
            beta: 1.5,
            mass: 0.01 * PROTON_MASS,
        }
    }

    fn scale(&self, lambda: f64) -> f64 {
        (lambda / self.lambda0).powf(-self.beta)
    }
}

const DUST_TEMPERATURE_VARIABLES: [StateVariable; 1] = [StateVariable::Temperature];

impl MaterialMix for PowerLawDustMix {
    fn name(&self) -> &str {
        &self.name
    }

    fn material_type(&self) -> MaterialType {
        MaterialType::Dust
    }

    fn section_abs(&self, lambda: f64, _state: &MaterialState) -> f64 {
        self.section_abs0 * self.scale(lambda)
    }

    fn section_sca(&self, lambda: f64, _state: &MaterialState) -> f64 {
        self.section_sca0 * self.scale(lambda)
    }

    fn mass(&self) -> f64 {
        self.mass
    }

    fn state_variables(&self) -> &[StateVariable] {
        &DUST_TEMPERATURE_VARIABLES
    }
}

/// Dust that can be (partially) destroyed by the local radiation field.
///
/// The cross sections of the underlying dust are multiplied by the surviving
/// fraction stored in the material state.
#[derive(Debug, Clone)]
pub struct DestructibleDustMix {
    pub dust: PowerLawDustMix,
}

const DESTRUCTIBLE_DUST_VARIABLES: [StateVariable; 2] =
    [StateVariable::SurvivingFraction, StateVariable::Temperature];

impl DestructibleDustMix {
    pub fn new(dust: PowerLawDustMix) -> Self {
        Self { dust }
    }

    fn surviving_fraction(state: &MaterialState) -> f64 {
        // Not yet initialized states behave as pristine dust
        state.values().first().copied().unwrap_or(1.0)
    }
}

impl MaterialMix for DestructibleDustMix {
    fn name(&self) -> &str {
        &self.dust.name
    }

    fn material_type(&self) -> MaterialType {
        MaterialType::Dust
    }

    fn section_abs(&self, lambda: f64, state: &MaterialState) -> f64 {
        Self::surviving_fraction(state) * self.dust.section_abs(lambda, state)
    }

    fn section_sca(&self, lambda: f64, state: &MaterialState) -> f64 {
        Self::surviving_fraction(state) * self.dust.section_sca(lambda, state)
    }

    fn mass(&self) -> f64 {
        self.dust.mass
    }

    fn state_variables(&self) -> &[StateVariable] {
        &DESTRUCTIBLE_DUST_VARIABLES
    }

    fn has_state_dependent_sections(&self) -> bool {
        true
    }

    fn initialize_state(&self, values: &mut [f64]) {
        values[0] = 1.0;
        values[1] = 0.0;
    }
}

/// Simulation-wide owner of all material mixes.
///
/// Cloning a registry clones the handles, not the mixes.
#[derive(Debug, Clone, Default)]
pub struct MixRegistry {
    mixes: Vec<Arc<dyn MaterialMix>>,
}

impl MixRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a mix and returns its index.
    pub fn register<M: MaterialMix + 'static>(&mut self, mix: M) -> usize {
        self.register_shared(Arc::new(mix))
    }

    pub fn register_shared(&mut self, mix: Arc<dyn MaterialMix>) -> usize {
        self.mixes.push(mix);
        self.mixes.len() - 1
    }

    pub fn len(&self) -> usize {
        self.mixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mixes.is_empty()
    }

    pub fn get(&self, index: usize) -> &dyn MaterialMix {
        assert!(
            index < self.mixes.len(),
            "mix index {index} out of range [0, {})",
            self.mixes.len()
        );
        self.mixes[index].as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_state() -> MaterialState {
        MaterialState::new(0, 0, 1.0, 0, vec![])
    }

    #[test]
    fn test_constant_mix_extinction() {
        let mix = ConstantSectionMix::new("c", MaterialType::Gas, 0.5, 1.5, 1.0);
        assert!((mix.section_ext(1e-6, &empty_state()) - 2.0).abs() < 1e-15);
        assert!(!mix.has_state_dependent_sections());
        assert_eq!(mix.num_state_variables(), 0);
    }

    #[test]
    fn test_electrons_only_scatter() {
        let mix = ElectronMix;
        assert_eq!(mix.section_abs(1e-6, &empty_state()), 0.0);
        assert_eq!(mix.section_sca(1e-3, &empty_state()), THOMSON_SECTION);
        assert_eq!(mix.material_type(), MaterialType::Electrons);
    }

    #[test]
    fn test_power_law_dust() {
        let mix = PowerLawDustMix::interstellar("ism");
        let state = MaterialState::new(0, 0, 1.0, 0, vec![0.0]);
        let k0 = mix.section_ext(mix.lambda0, &state);
        let k1 = mix.section_ext(4.0 * mix.lambda0, &state);
        assert!((k0 - 5.0e-26).abs() < 1e-35);
        assert!((k1 / k0 - 0.125).abs() < 1e-12);
        assert_eq!(mix.state_variable_index(StateVariable::Temperature), Some(0));
        assert_eq!(mix.state_variable_index(StateVariable::SurvivingFraction), None);
    }

    #[test]
    fn test_destructible_dust_scales_with_fraction() {
        let mix = DestructibleDustMix::new(PowerLawDustMix::interstellar("d"));
        let mut values = vec![0.0; mix.num_state_variables()];
        mix.initialize_state(&mut values);
        assert_eq!(values, vec![1.0, 0.0]);

        let pristine = MaterialState::new(0, 0, 1.0, 0, values);
        let halved = MaterialState::new(0, 0, 1.0, 0, vec![0.5, 0.0]);
        let lambda = 1e-6;
        let ratio = mix.section_abs(lambda, &halved) / mix.section_abs(lambda, &pristine);
        assert!((ratio - 0.5).abs() < 1e-12);
        assert!(mix.has_state_dependent_sections());
    }

    #[test]
    fn test_registry_shares_mixes() {
        let mut registry = MixRegistry::new();
        let a = registry.register(ElectronMix);
        let b = registry.register(PowerLawDustMix::interstellar("ism"));
        assert_eq!((a, b), (0, 1));
        let copy = registry.clone();
        assert_eq!(copy.len(), 2);
        assert_eq!(copy.get(b).material_type(), MaterialType::Dust);
    }
}
