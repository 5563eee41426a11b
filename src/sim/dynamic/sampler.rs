use std::f64::consts::PI;

use anyhow::{Result, ensure};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::debug;

use crate::sim::comm::ProcessPartition;
use crate::sim::medium::MediumSystem;
use crate::sim::photon::PhotonPacket;
use crate::sim::radiation::RadiationField;
use crate::sim::stream_seed;
use crate::sim::wavelength::WavelengthGrid;
use crate::{Point, Vector};

/// Source of the radiation field used by the dynamic state iteration.
///
/// Photon transport itself lives outside the medium system; the driver only
/// needs a way to fill the radiation field for the current medium state.
pub trait RadiationFieldSampler {
    /// Launches photon packets and records their contributions in `field`,
    /// which is cleared beforehand. Each process only adds its own share.
    fn launch(
        &mut self,
        system: &MediumSystem,
        field: &mut RadiationField,
        iteration: usize,
    ) -> Result<()>;

    /// Completes the radiation field after all processes launched their packets.
    fn accumulate(&mut self, system: &MediumSystem, field: &mut RadiationField) -> Result<()> {
        field.communicate(system.comm().as_ref());
        Ok(())
    }
}

/// Isotropic point source with a flat spectrum (equal luminosity per
/// wavelength bin), attenuated by extinction along straight paths.
///
/// Scattered radiation is not followed.
pub struct PointSourceSampler {
    pub position: Point,
    /// Bolometric luminosity [W].
    pub luminosity: f64,
    wavelength_grid: WavelengthGrid,
}

impl PointSourceSampler {
    pub fn new(position: Point, luminosity: f64, wavelength_grid: WavelengthGrid) -> Self {
        Self {
            position,
            luminosity,
            wavelength_grid,
        }
    }

    fn random_direction(rng: &mut StdRng) -> Vector {
        let cos_theta = 2.0 * rng.gen_range(0.0_f64..1.0) - 1.0;
        let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
        let phi = 2.0 * PI * rng.gen_range(0.0..1.0);
        Vector::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta)
    }

    /// Adds the contribution of one packet to `jv` (flattened per cell).
    fn deposit(&self, system: &MediumSystem, pp: &PhotonPacket, ell: usize, jv: &mut [f64]) {
        let num_bins = self.wavelength_grid.num_bins();
        let dl = self.wavelength_grid.bin_width(ell);
        for seg in pp.optical_depth_path() {
            let attenuation = (-(seg.tau_near + 0.5 * seg.dtau)).exp();
            let volume = system.volume(seg.cell);
            jv[seg.cell * num_bins + ell] +=
                pp.luminosity() * seg.ds * attenuation / (4.0 * PI * volume * dl);
        }
    }
}

impl RadiationFieldSampler for PointSourceSampler {
    fn launch(
        &mut self,
        system: &MediumSystem,
        field: &mut RadiationField,
        iteration: usize,
    ) -> Result<()> {
        let num_bins = self.wavelength_grid.num_bins();
        ensure!(
            num_bins == field.num_bins(),
            "sampler has {num_bins} wavelength bins, radiation field has {}",
            field.num_bins()
        );
        let num_packets = system.config().num_dynamic_state_packets;
        if num_packets == 0 {
            return Ok(());
        }

        let comm = system.comm();
        let own = ProcessPartition::new(num_packets, comm.size()).range(comm.rank());
        let packet_luminosity = self.luminosity / num_packets as f64;
        let iteration_seed = stream_seed(system.config().seed, iteration as u64);
        let size = field.num_cells() * num_bins;

        let this = &*self;
        let jv = own
            .clone()
            .into_par_iter()
            .fold(
                || vec![0.0; size],
                |mut jv, i| {
                    let mut rng = StdRng::seed_from_u64(stream_seed(iteration_seed, i as u64));
                    let ell = rng.gen_range(0..num_bins);
                    let lambda = this.wavelength_grid.wavelength(ell);
                    let direction = Self::random_direction(&mut rng);
                    if let Some(mut pp) =
                        PhotonPacket::new(this.position, direction, lambda, packet_luminosity)
                    {
                        system.fill_optical_depth(&mut pp);
                        this.deposit(system, &pp, ell, &mut jv);
                    }
                    jv
                },
            )
            .reduce(
                || vec![0.0; size],
                |mut a, b| {
                    a.iter_mut().zip(&b).for_each(|(x, y)| *x += y);
                    a
                },
            );

        for m in 0..field.num_cells() {
            field.set(m, &jv[m * num_bins..(m + 1) * num_bins]);
        }
        debug!(
            iteration,
            num_packets = own.len(),
            "launched dynamic state photon packets"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::sim::comm::LocalComm;
    use crate::sim::config::SimulationConfig;
    use crate::sim::grid::CartesianGrid;
    use crate::sim::materials::{ConstantSectionMix, MaterialType, MixRegistry};
    use crate::sim::medium::{Medium, UniformMedium};

    fn system(number_density: f64) -> MediumSystem {
        let mut config = SimulationConfig::new();
        config.num_dynamic_state_packets = 2000;
        let mut mixes = MixRegistry::new();
        mixes.register(ConstantSectionMix::new("gas", MaterialType::Gas, 1.0, 0.0, 1.0));
        let media: Vec<Box<dyn Medium>> =
            vec![Box::new(UniformMedium::new("gas", number_density, 0))];
        MediumSystem::new(
            config,
            Arc::new(CartesianGrid::cube(1.0, 4).unwrap()),
            media,
            mixes,
            Arc::new(LocalComm),
        )
        .unwrap()
    }

    fn collected_power(system: &MediumSystem, field: &RadiationField, wlg: &WavelengthGrid) -> f64 {
        (0..field.num_cells())
            .map(|m| {
                field
                    .jv(m)
                    .iter()
                    .enumerate()
                    .map(|(ell, j)| 4.0 * PI * system.volume(m) * j * wlg.bin_width(ell))
                    .sum::<f64>()
            })
            .sum()
    }

    #[test]
    fn test_transparent_medium_collects_path_lengths() {
        let ms = system(0.0);
        let wlg = ms.config().radiation_field_wlg().unwrap();
        let mut field = RadiationField::new(ms.num_cells(), wlg.num_bins());
        let mut sampler = PointSourceSampler::new(Point::origin(), 1.0, wlg.clone());
        sampler.launch(&ms, &mut field, 1).unwrap();
        sampler.accumulate(&ms, &mut field).unwrap();

        // Every packet travels between 1 and sqrt(3) through the cube
        let power = collected_power(&ms, &field, &wlg);
        assert!(power > 1.0 && power < 3.0_f64.sqrt(), "power={power}");
    }

    #[test]
    fn test_extinction_attenuates_field() {
        let wlg = SimulationConfig::new().radiation_field_wlg().unwrap();
        let thin = system(0.0);
        let thick = system(2.0);
        let mut thin_field = RadiationField::new(thin.num_cells(), wlg.num_bins());
        let mut thick_field = RadiationField::new(thick.num_cells(), wlg.num_bins());
        let mut sampler = PointSourceSampler::new(Point::origin(), 1.0, wlg.clone());
        sampler.launch(&thin, &mut thin_field, 1).unwrap();
        sampler.launch(&thick, &mut thick_field, 1).unwrap();
        assert!(collected_power(&thick, &thick_field, &wlg) < collected_power(&thin, &thin_field, &wlg));
    }

    #[test]
    fn test_bin_mismatch_is_rejected() {
        let ms = system(0.0);
        let wlg = WavelengthGrid::from_borders(vec![1e-6, 2e-6]).unwrap();
        let mut field = RadiationField::new(ms.num_cells(), 3);
        let mut sampler = PointSourceSampler::new(Point::origin(), 1.0, wlg);
        assert!(sampler.launch(&ms, &mut field, 1).is_err());
    }
}
