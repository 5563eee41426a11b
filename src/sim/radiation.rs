//! Radiation field accumulated per spatial cell.

use std::f64::consts::PI;

use crate::sim::comm::ProcessComm;
use crate::sim::constants::SPEED_OF_LIGHT;
use crate::sim::wavelength::WavelengthGrid;

/// Mean intensity `Jv` per cell, discretized on a wavelength grid
/// [W/(m^2 m sr)].
#[derive(Debug, Clone)]
pub struct RadiationField {
    num_cells: usize,
    num_bins: usize,
    values: Vec<f64>,
}

impl RadiationField {
    pub fn new(num_cells: usize, num_bins: usize) -> Self {
        Self {
            num_cells,
            num_bins,
            values: vec![0.0; num_cells * num_bins],
        }
    }

    pub fn num_cells(&self) -> usize {
        self.num_cells
    }

    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    fn offset(&self, m: usize) -> usize {
        assert!(
            m < self.num_cells,
            "cell index {m} out of range [0, {})",
            self.num_cells
        );
        m * self.num_bins
    }

    /// Mean intensity per wavelength bin in cell `m`.
    pub fn jv(&self, m: usize) -> &[f64] {
        let i = self.offset(m);
        &self.values[i..i + self.num_bins]
    }

    pub fn jv_mut(&mut self, m: usize) -> &mut [f64] {
        let i = self.offset(m);
        &mut self.values[i..i + self.num_bins]
    }

    pub fn set(&mut self, m: usize, jv: &[f64]) {
        self.jv_mut(m).copy_from_slice(jv);
    }

    pub fn add(&mut self, m: usize, ell: usize, value: f64) {
        assert!(
            ell < self.num_bins,
            "wavelength bin {ell} out of range [0, {})",
            self.num_bins
        );
        let i = self.offset(m);
        self.values[i + ell] += value;
    }

    pub fn clear(&mut self) {
        self.values.fill(0.0);
    }

    /// Sums the contributions of all processes.
    pub fn communicate(&mut self, comm: &dyn ProcessComm) {
        comm.sum_all(&mut self.values);
    }

    /// Radiation energy density in cell `m` [J/m^3].
    pub fn energy_density(&self, m: usize, wlg: &WavelengthGrid) -> f64 {
        energy_density(self.jv(m), wlg)
    }
}

/// Energy density `4π/c Σ Jv Δλ` of a discretized mean intensity [J/m^3].
pub fn energy_density(jv: &[f64], wlg: &WavelengthGrid) -> f64 {
    let sum: f64 = jv
        .iter()
        .enumerate()
        .map(|(ell, j)| j * wlg.bin_width(ell))
        .sum();
    4.0 * PI / SPEED_OF_LIGHT * sum
}
