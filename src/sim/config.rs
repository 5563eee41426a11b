use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::sim::error::MediumError;
use crate::sim::wavelength::{WavelengthGrid, WavelengthGridConfig};

/// Simulation-wide settings consumed by the medium system and the dynamic
/// medium state iteration.
///
/// The medium system never derives these facts itself; whatever is decided here
/// (e.g. whether the perceived wavelength can be held constant along a path) is
/// taken as given.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    // Dynamic medium state iteration
    /// Minimum number of iteration steps, even if all recipes report convergence.
    pub min_dynamic_state_iterations: usize,
    /// Hard upper bound on the number of iteration steps.
    pub max_dynamic_state_iterations: usize,
    /// Photon packets launched per iteration step.
    pub num_dynamic_state_packets: usize,
    /// Wavelength grid on which the radiation field is discretized.
    pub radiation_field_wlg: WavelengthGridConfig,

    // Kinematics
    /// True if some medium may have a nonzero bulk velocity in some cell.
    pub has_moving_media: bool,
    /// Relative expansion rate of the universe per unit of path length [1/m].
    /// Zero disables the Hubble flow.
    pub hubble_expansion_rate: f64,

    // Medium setup
    /// Number of random density samples per cell (1 = sample at the cell centroid).
    pub num_density_samples: usize,
    /// Seed for the per-cell random generators used during setup.
    pub seed: u64,
}

impl SimulationConfig {
    pub fn new() -> Self {
        Self {
            min_dynamic_state_iterations: 1,
            max_dynamic_state_iterations: 10,
            num_dynamic_state_packets: 10_000,
            radiation_field_wlg: WavelengthGridConfig::new(),
            has_moving_media: false,
            hubble_expansion_rate: 0.0,
            num_density_samples: 1,
            seed: 0x5eed,
        }
    }

    /// Returns true if the wavelength perceived by the medium equals the photon
    /// packet wavelength everywhere along any path.
    ///
    /// This is the case unless media may move or the Hubble flow is enabled.
    pub fn has_constant_perceived_wavelength(&self) -> bool {
        !self.has_moving_media && self.hubble_expansion_rate == 0.0
    }

    /// Builds the radiation field wavelength grid.
    pub fn radiation_field_wlg(&self) -> crate::sim::error::Result<WavelengthGrid> {
        WavelengthGrid::from_config(&self.radiation_field_wlg)
    }

    /// Checks internal consistency of the settings.
    pub fn validate(&self) -> crate::sim::error::Result<()> {
        let min = self.min_dynamic_state_iterations;
        let max = self.max_dynamic_state_iterations;
        if min < 1 || max < min {
            return Err(MediumError::InvalidIterationBounds { min, max });
        }
        self.radiation_field_wlg()?;
        Ok(())
    }

    /// Parses a configuration from a JSON string and validates it.
    ///
    /// Missing fields take their default values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).context("Failed to deserialize simulation config")?;
        config.validate().context("Invalid simulation config")?;
        Ok(config)
    }

    /// Reads a configuration from a JSON file and validates it.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open file: {}", path.display()))?;
        let reader = BufReader::new(file);
        let config: Self = serde_json::from_reader(reader)
            .with_context(|| format!("Failed to deserialize config from: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid simulation config in: {}", path.display()))?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize simulation config")
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = SimulationConfig::new();
        assert_eq!(config.min_dynamic_state_iterations, 1);
        assert_eq!(config.max_dynamic_state_iterations, 10);
        assert!(config.has_constant_perceived_wavelength());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_perceived_wavelength_flags() {
        let mut config = SimulationConfig::new();
        config.has_moving_media = true;
        assert!(!config.has_constant_perceived_wavelength());
        config.has_moving_media = false;
        config.hubble_expansion_rate = 1e-26;
        assert!(!config.has_constant_perceived_wavelength());
    }

    #[test]
    fn test_invalid_iteration_bounds() {
        let mut config = SimulationConfig::new();
        config.min_dynamic_state_iterations = 5;
        config.max_dynamic_state_iterations = 3;
        assert!(matches!(
            config.validate(),
            Err(MediumError::InvalidIterationBounds { min: 5, max: 3 })
        ));
        config.min_dynamic_state_iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            SimulationConfig::from_json_str(r#"{ "max_dynamic_state_iterations": 4 }"#).unwrap();
        assert_eq!(config.max_dynamic_state_iterations, 4);
        assert_eq!(config.num_density_samples, 1);
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        let json = r#"{ "min_dynamic_state_iterations": 3, "max_dynamic_state_iterations": 2 }"#;
        assert!(SimulationConfig::from_json_str(json).is_err());
    }
}
