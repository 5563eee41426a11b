use serde::{Deserialize, Serialize};

use crate::sim::error::{MediumError, Result};

/// Spacing of the bins of a [`WavelengthGrid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridSpacing {
    Linear,
    Logarithmic,
}

/// Configuration of a wavelength grid, as found in a simulation configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WavelengthGridConfig {
    /// Shortest wavelength [m].
    pub min_wavelength: f64,
    /// Longest wavelength [m].
    pub max_wavelength: f64,
    pub num_bins: usize,
    pub spacing: GridSpacing,
}

impl WavelengthGridConfig {
    pub fn new() -> Self {
        Self {
            min_wavelength: 0.09e-6,
            max_wavelength: 100e-6,
            num_bins: 25,
            spacing: GridSpacing::Logarithmic,
        }
    }
}

impl Default for WavelengthGridConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Wavelength grid made of adjacent, non-overlapping bins.
///
/// Radiation field arrays (`Jv`) are discretized on such a grid: element `ell`
/// holds the mean intensity in bin `ell`.
#[derive(Debug, Clone, PartialEq)]
pub struct WavelengthGrid {
    borders: Vec<f64>,
    characteristic: Vec<f64>,
}

impl WavelengthGrid {
    /// Creates a grid from explicit bin borders (strictly increasing, positive).
    pub fn from_borders(borders: Vec<f64>) -> Result<Self> {
        if borders.len() < 2 {
            return Err(MediumError::InvalidWavelengthGrid(
                "at least one bin (two borders) is required".to_string(),
            ));
        }
        if borders[0] <= 0.0 {
            return Err(MediumError::InvalidWavelengthGrid(
                "wavelengths must be positive".to_string(),
            ));
        }
        if borders.windows(2).any(|w| w[1] <= w[0]) {
            return Err(MediumError::InvalidWavelengthGrid(
                "bin borders must be strictly increasing".to_string(),
            ));
        }
        // Geometric bin centers
        let characteristic = borders.windows(2).map(|w| (w[0] * w[1]).sqrt()).collect();
        Ok(Self {
            borders,
            characteristic,
        })
    }

    pub fn from_config(config: &WavelengthGridConfig) -> Result<Self> {
        let WavelengthGridConfig {
            min_wavelength: min,
            max_wavelength: max,
            num_bins: n,
            spacing,
        } = *config;
        if n == 0 || !(min > 0.0) || !(max > min) {
            return Err(MediumError::InvalidWavelengthGrid(format!(
                "need num_bins > 0 and 0 < min < max, got num_bins={n}, min={min}, max={max}"
            )));
        }
        let borders = (0..=n)
            .map(|i| {
                let f = i as f64 / n as f64;
                match spacing {
                    GridSpacing::Linear => min + f * (max - min),
                    GridSpacing::Logarithmic => min * (max / min).powf(f),
                }
            })
            .collect();
        Self::from_borders(borders)
    }

    pub fn num_bins(&self) -> usize {
        self.characteristic.len()
    }

    /// Characteristic wavelength of bin `ell`.
    pub fn wavelength(&self, ell: usize) -> f64 {
        self.characteristic[ell]
    }

    pub fn left_border(&self, ell: usize) -> f64 {
        self.borders[ell]
    }

    pub fn right_border(&self, ell: usize) -> f64 {
        self.borders[ell + 1]
    }

    pub fn bin_width(&self, ell: usize) -> f64 {
        self.borders[ell + 1] - self.borders[ell]
    }

    /// Returns the index of the bin containing `lambda`, or `None` outside the grid.
    ///
    /// The right border of the last bin is considered part of that bin.
    pub fn bin(&self, lambda: f64) -> Option<usize> {
        let n = self.num_bins();
        if lambda < self.borders[0] || lambda > self.borders[n] {
            return None;
        }
        let upper = self.borders.partition_point(|&b| b <= lambda);
        Some(upper.saturating_sub(1).min(n - 1))
    }
}
