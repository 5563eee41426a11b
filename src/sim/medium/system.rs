use std::ops::Range;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::sim::comm::{ProcessComm, ProcessPartition};
use crate::sim::config::SimulationConfig;
use crate::sim::error::{MediumError, Result};
use crate::sim::grid::{PathSegment, SpatialGrid};
use crate::sim::materials::{MaterialMix, MaterialState, MaterialType, MixRegistry};
use crate::sim::medium::Medium;
use crate::sim::medium::state::{CellState, StateStore};
use crate::sim::photon::{OpticalDepthSegment, PhotonPacket};
use crate::sim::stream_seed;
use crate::vecutils;
use crate::{Point, Vector};

/// How extinction opacities are evaluated along a photon packet path.
///
/// Resolved once at setup from the configuration and the media.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpacityStrategy {
    /// The perceived wavelength differs between cells; cross sections are
    /// evaluated per crossed cell at the Doppler-shifted wavelength.
    Shifted,
    /// Constant perceived wavelength, but cross sections vary between cells.
    ConstantWavelength,
    /// Constant perceived wavelength and a single medium with the same cross
    /// section in every cell.
    SingleConstantSection,
    /// Constant perceived wavelength and several media, each with the same cross
    /// section in every cell.
    MultipleConstantSections,
}

/// The per-cell state of all transfer media sampled on a spatial grid.
///
/// Cells are indexed by `m` in `[0, num_cells)`, medium components by `h` in
/// `[0, num_media)`. Out-of-range indices are programming errors and panic.
pub struct MediumSystem {
    config: SimulationConfig,
    grid: Arc<dyn SpatialGrid>,
    media: Vec<Box<dyn Medium>>,
    mixes: MixRegistry,
    comm: Arc<dyn ProcessComm>,
    partition: ProcessPartition,
    state: StateStore,
    strategy: OpacityStrategy,
    magnetic_field_medium: Option<usize>,
}

impl MediumSystem {
    /// Samples `media` on `grid` and validates the resulting configuration.
    ///
    /// Each process initializes the cells it owns, after which the states are
    /// merged so that every process holds the complete state.
    pub fn new(
        config: SimulationConfig,
        grid: Arc<dyn SpatialGrid>,
        media: Vec<Box<dyn Medium>>,
        mixes: MixRegistry,
        comm: Arc<dyn ProcessComm>,
    ) -> Result<Self> {
        if media.is_empty() {
            return Err(MediumError::NoMedia);
        }
        for (h, medium) in media.iter().enumerate() {
            if medium.mix_indices().is_empty() {
                return Err(MediumError::NoMixes { medium: h });
            }
            if let Some(&index) = medium.mix_indices().iter().find(|&&i| i >= mixes.len()) {
                return Err(MediumError::UnknownMix {
                    medium: h,
                    index,
                    available: mixes.len(),
                });
            }
        }

        // All media must agree on polarization support
        let polarized = mixes.get(media[0].mix_indices()[0]).has_polarization();
        for (h, medium) in media.iter().enumerate() {
            if medium
                .mix_indices()
                .iter()
                .any(|&i| mixes.get(i).has_polarization() != polarized)
            {
                return Err(MediumError::MixedPolarization { component: h });
            }
        }

        let mut with_field = media
            .iter()
            .enumerate()
            .filter(|(_, medium)| medium.has_magnetic_field())
            .map(|(h, _)| h);
        let magnetic_field_medium = with_field.next();
        if let (Some(first), Some(second)) = (magnetic_field_medium, with_field.next()) {
            return Err(MediumError::MultipleMagneticFields { first, second });
        }

        let medium_dimension = media.iter().map(|m| m.dimension()).max().unwrap_or(1);
        if medium_dimension > grid.dimension() {
            return Err(MediumError::DimensionMismatch {
                expected: grid.dimension(),
                found: medium_dimension,
            });
        }

        let num_cells = grid.num_cells();
        let widths = media
            .iter()
            .map(|medium| {
                medium
                    .mix_indices()
                    .iter()
                    .map(|&i| mixes.get(i).num_state_variables())
                    .max()
                    .unwrap_or(0)
            })
            .collect();
        let partition = ProcessPartition::for_comm(num_cells, comm.as_ref());

        let mut system = Self {
            config,
            grid,
            media,
            mixes,
            comm,
            partition,
            state: StateStore::new(num_cells, widths),
            strategy: OpacityStrategy::ConstantWavelength,
            magnetic_field_medium,
        };
        system.check_mix_selection()?;
        system.populate_own_cells();
        system.communicate_states();
        system.check_material_types()?;
        system.strategy = system.resolve_strategy();

        info!(
            num_cells,
            num_media = system.num_media(),
            num_procs = system.comm.size(),
            strategy = ?system.strategy,
            "medium system ready"
        );
        for h in 0..system.num_media() {
            debug!(
                medium = system.media[h].name(),
                total_mass = system.total_mass(h),
                "medium component"
            );
        }
        Ok(system)
    }

    /// Verifies that every medium selects one of its declared mixes at every
    /// cell centroid. Runs over all cells so that every process reaches the
    /// same verdict before the first collective.
    fn check_mix_selection(&self) -> Result<()> {
        let declared: Vec<Vec<usize>> = self.media.iter().map(|m| m.mix_indices()).collect();
        let undeclared = (0..self.grid.num_cells()).into_par_iter().find_map_first(|m| {
            let centroid = self.grid.centroid(m);
            self.media.iter().enumerate().find_map(|(h, medium)| {
                let index = medium.mix_index(centroid);
                (!declared[h].contains(&index)).then_some(MediumError::UndeclaredMix {
                    medium: h,
                    cell: m,
                    index,
                })
            })
        });
        match undeclared {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn populate_own_cells(&mut self) {
        let own = self.own_cells();
        let cells: Vec<(usize, CellState, Vec<MaterialState>)> = own
            .into_par_iter()
            .map(|m| {
                let (cell, states) = self.sample_cell(m);
                (m, cell, states)
            })
            .collect();
        for (m, cell, states) in cells {
            self.state.set_cell(m, cell, states);
        }
    }

    fn sample_positions(&self, m: usize) -> Vec<Point> {
        let n = self.config.num_density_samples;
        if n <= 1 {
            return vec![self.grid.centroid(m)];
        }
        let mut rng = StdRng::seed_from_u64(stream_seed(self.config.seed, m as u64));
        (0..n)
            .map(|_| self.grid.random_position_in_cell(m, &mut rng))
            .collect()
    }

    fn sample_cell(&self, m: usize) -> (CellState, Vec<MaterialState>) {
        let positions = self.sample_positions(m);
        let centroid = self.grid.centroid(m);
        let count = positions.len() as f64;

        let mut total_density = 0.0;
        let mut weighted_velocity = Vector::zero();
        let mut states = Vec::with_capacity(self.media.len());
        for (h, medium) in self.media.iter().enumerate() {
            let mut n = 0.0;
            let mut v = Vector::zero();
            for &pos in &positions {
                n += medium.number_density(pos);
                v = v + medium.bulk_velocity(pos);
            }
            let n = (n / count).max(0.0);
            let v = v * (1.0 / count);
            total_density += n;
            weighted_velocity = weighted_velocity + v * n;

            let mix_index = medium.mix_index(centroid);
            let mix = self.mixes.get(mix_index);
            let mut values = vec![0.0; mix.num_state_variables()];
            mix.initialize_state(&mut values);
            states.push(MaterialState::new(m, h, n, mix_index, values));
        }

        let velocity = if total_density > 0.0 {
            weighted_velocity * (1.0 / total_density)
        } else {
            Vector::zero()
        };
        let cell = CellState {
            volume: self.grid.volume(m),
            velocity,
        };
        (cell, states)
    }

    fn check_material_types(&self) -> Result<()> {
        if self.num_cells() == 0 {
            return Ok(());
        }
        for h in 0..self.num_media() {
            let expected = self.mix(0, h).material_type();
            for m in 1..self.num_cells() {
                let found = self.mix(m, h).material_type();
                if found != expected {
                    return Err(MediumError::MixedMaterialTypes {
                        component: h,
                        cell: m,
                        expected,
                        found,
                    });
                }
            }
        }
        Ok(())
    }

    fn resolve_strategy(&self) -> OpacityStrategy {
        if !self.config.has_constant_perceived_wavelength() {
            return OpacityStrategy::Shifted;
        }
        let varying = self.media.iter().any(|medium| {
            medium.has_variable_mix()
                || medium
                    .mix_indices()
                    .iter()
                    .any(|&i| self.mixes.get(i).has_state_dependent_sections())
        });
        if varying {
            OpacityStrategy::ConstantWavelength
        } else if self.num_media() == 1 {
            OpacityStrategy::SingleConstantSection
        } else {
            OpacityStrategy::MultipleConstantSections
        }
    }

    /// Merges the process-local cell states into the complete state store.
    ///
    /// Every process contributes exactly the cells it owns, so the result does
    /// not depend on the partition. Does nothing for a single process.
    pub fn communicate_states(&mut self) {
        if !self.comm.is_multi_process() {
            return;
        }
        let mut buffer = self.state.pack(self.own_cells());
        self.comm.sum_all(&mut buffer);
        self.state.unpack(&buffer, &self.mixes);
    }

    // ---- Configuration and collaborators ----

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn grid(&self) -> &dyn SpatialGrid {
        self.grid.as_ref()
    }

    pub fn mixes(&self) -> &MixRegistry {
        &self.mixes
    }

    pub fn comm(&self) -> &Arc<dyn ProcessComm> {
        &self.comm
    }

    /// Cells initialized and updated by this process.
    pub fn own_cells(&self) -> Range<usize> {
        self.partition.range(self.comm.rank())
    }

    pub fn opacity_strategy(&self) -> OpacityStrategy {
        self.strategy
    }

    // ---- State store ----

    /// Spatial symmetry of the media: the highest dimension over all media.
    pub fn dimension(&self) -> usize {
        self.media.iter().map(|m| m.dimension()).max().unwrap_or(1)
    }

    pub fn grid_dimension(&self) -> usize {
        self.grid.dimension()
    }

    pub fn num_media(&self) -> usize {
        self.state.num_media()
    }

    pub fn num_cells(&self) -> usize {
        self.state.num_cells()
    }

    pub fn volume(&self, m: usize) -> f64 {
        self.state.cell(m).volume
    }

    /// Density-weighted bulk velocity in cell `m`; zero if the cell is empty.
    pub fn bulk_velocity(&self, m: usize) -> Vector {
        self.state.cell(m).velocity
    }

    /// Index of the medium providing the magnetic field, if any.
    pub fn magnetic_field_medium(&self) -> Option<usize> {
        self.magnetic_field_medium
    }

    pub fn number_density(&self, m: usize, h: usize) -> f64 {
        self.state.component(m, h).number_density()
    }

    /// Mass density [kg/m^3].
    pub fn mass_density(&self, m: usize, h: usize) -> f64 {
        self.number_density(m, h) * self.mix(m, h).mass()
    }

    /// Total mass of medium component `h` over all cells [kg].
    pub fn total_mass(&self, h: usize) -> f64 {
        (0..self.num_cells())
            .map(|m| self.mass_density(m, h) * self.volume(m))
            .sum()
    }

    pub fn mix(&self, m: usize, h: usize) -> &dyn MaterialMix {
        self.mixes.get(self.mix_index(m, h))
    }

    pub fn mix_index(&self, m: usize, h: usize) -> usize {
        self.state.component(m, h).mix_index()
    }

    pub fn material_state(&self, m: usize, h: usize) -> &MaterialState {
        self.state.component(m, h)
    }

    /// Parallel mutable access to the material states of the cells in `cells`.
    pub fn par_cell_states_mut(
        &mut self,
        cells: Range<usize>,
    ) -> impl IndexedParallelIterator<Item = (usize, &mut [MaterialState])> + '_ {
        self.state.par_cell_components_mut(cells)
    }

    pub fn has_material_type(&self, kind: MaterialType) -> bool {
        (0..self.num_media()).any(|h| self.is_material_type(kind, h))
    }

    pub fn has_dust(&self) -> bool {
        self.has_material_type(MaterialType::Dust)
    }

    pub fn has_electrons(&self) -> bool {
        self.has_material_type(MaterialType::Electrons)
    }

    pub fn has_gas(&self) -> bool {
        self.has_material_type(MaterialType::Gas)
    }

    /// Returns true if medium component `h` has the given material type.
    ///
    /// The type is the same in every cell, so a grid without cells reports false.
    pub fn is_material_type(&self, kind: MaterialType, h: usize) -> bool {
        assert!(
            h < self.num_media(),
            "medium index {h} out of range [0, {})",
            self.num_media()
        );
        self.num_cells() > 0 && self.mix(0, h).material_type() == kind
    }

    pub fn is_dust(&self, h: usize) -> bool {
        self.is_material_type(MaterialType::Dust, h)
    }

    pub fn is_electrons(&self, h: usize) -> bool {
        self.is_material_type(MaterialType::Electrons, h)
    }

    pub fn is_gas(&self, h: usize) -> bool {
        self.is_material_type(MaterialType::Gas, h)
    }

    // ---- Opacities ----

    /// Absorption opacity of component `h` in cell `m` at wavelength `lambda` [1/m].
    pub fn opacity_abs(&self, lambda: f64, m: usize, h: usize) -> f64 {
        let state = self.material_state(m, h);
        state.number_density() * self.mix(m, h).section_abs(lambda, state)
    }

    /// Scattering opacity of component `h` in cell `m` [1/m].
    pub fn opacity_sca(&self, lambda: f64, m: usize, h: usize) -> f64 {
        let state = self.material_state(m, h);
        state.number_density() * self.mix(m, h).section_sca(lambda, state)
    }

    /// Extinction opacity of component `h` in cell `m` [1/m].
    pub fn opacity_ext(&self, lambda: f64, m: usize, h: usize) -> f64 {
        let state = self.material_state(m, h);
        state.number_density() * self.mix(m, h).section_ext(lambda, state)
    }

    /// Absorption opacity summed over all components.
    pub fn opacity_abs_total(&self, lambda: f64, m: usize) -> f64 {
        (0..self.num_media()).map(|h| self.opacity_abs(lambda, m, h)).sum()
    }

    /// Scattering opacity summed over all components.
    pub fn opacity_sca_total(&self, lambda: f64, m: usize) -> f64 {
        (0..self.num_media()).map(|h| self.opacity_sca(lambda, m, h)).sum()
    }

    /// Extinction opacity summed over all components.
    pub fn opacity_ext_total(&self, lambda: f64, m: usize) -> f64 {
        (0..self.num_media()).map(|h| self.opacity_ext(lambda, m, h)).sum()
    }

    /// Scattering opacity summed over the components of the given material type.
    pub fn opacity_sca_of_type(&self, lambda: f64, m: usize, kind: MaterialType) -> f64 {
        (0..self.num_media())
            .filter(|&h| self.is_material_type(kind, h))
            .map(|h| self.opacity_sca(lambda, m, h))
            .sum()
    }

    /// Extinction opacity summed over the components of the given material type.
    pub fn opacity_ext_of_type(&self, lambda: f64, m: usize, kind: MaterialType) -> f64 {
        (0..self.num_media())
            .filter(|&h| self.is_material_type(kind, h))
            .map(|h| self.opacity_ext(lambda, m, h))
            .sum()
    }

    /// Scattering albedo of component `h` in cell `m`, or 0 without extinction.
    pub fn albedo(&self, lambda: f64, m: usize, h: usize) -> f64 {
        let ext = self.opacity_ext(lambda, m, h);
        if ext > 0.0 {
            self.opacity_sca(lambda, m, h) / ext
        } else {
            0.0
        }
    }

    /// Scattering albedo of all components together in cell `m`, or 0 without
    /// extinction.
    pub fn albedo_total(&self, lambda: f64, m: usize) -> f64 {
        let ext = self.opacity_ext_total(lambda, m);
        if ext > 0.0 {
            self.opacity_sca_total(lambda, m) / ext
        } else {
            0.0
        }
    }

    // ---- Random scattering component ----

    /// Draws a medium component for a scattering event in cell `m`, with
    /// probability proportional to the component's scattering opacity.
    ///
    /// # Panics
    ///
    /// With more than one component, the total scattering opacity in cell `m`
    /// must be positive. Debug builds panic otherwise; release builds return
    /// an unspecified component.
    pub fn random_component_for_scattering<R: Rng>(
        &self,
        rng: &mut R,
        lambda: f64,
        m: usize,
    ) -> usize {
        let num_media = self.num_media();
        if num_media == 1 {
            return 0;
        }
        let (cumulative, total) = vecutils::cdf(num_media, |h| self.opacity_sca(lambda, m, h));
        debug_assert!(
            total > 0.0,
            "no scattering opacity in cell {m} at wavelength {lambda}"
        );
        vecutils::locate_clip(&cumulative, rng.gen_range(0.0..1.0))
    }

    /// Mix of a component drawn by [`MediumSystem::random_component_for_scattering`].
    pub fn random_mix_for_scattering<R: Rng>(
        &self,
        rng: &mut R,
        lambda: f64,
        m: usize,
    ) -> &dyn MaterialMix {
        let h = self.random_component_for_scattering(rng, lambda, m);
        self.mix(m, h)
    }

    // ---- Optical depth ----

    /// Extinction cross sections per component when they are identical in every
    /// cell, evaluated on the state of the first crossed cell.
    fn constant_sections(&self, lambda: f64, first: &PathSegment) -> Option<Vec<f64>> {
        match self.strategy {
            OpacityStrategy::SingleConstantSection | OpacityStrategy::MultipleConstantSections => {
                let m = first.cell;
                Some(
                    (0..self.num_media())
                        .map(|h| self.mix(m, h).section_ext(lambda, self.material_state(m, h)))
                        .collect(),
                )
            }
            OpacityStrategy::Shifted | OpacityStrategy::ConstantWavelength => None,
        }
    }

    /// Total extinction opacity in the cell of `seg` as perceived by `pp`.
    fn segment_opacity(
        &self,
        pp: &PhotonPacket,
        seg: &PathSegment,
        sections: Option<&[f64]>,
    ) -> f64 {
        let m = seg.cell;
        match (self.strategy, sections) {
            (_, Some(sections)) => sections
                .iter()
                .enumerate()
                .map(|(h, sigma)| self.number_density(m, h) * sigma)
                .sum(),
            (OpacityStrategy::Shifted, None) => {
                let expansion = self.config.hubble_expansion_rate * seg.s;
                let lambda = pp.perceived_wavelength(self.bulk_velocity(m), expansion);
                self.opacity_ext_total(lambda, m)
            }
            (_, None) => self.opacity_ext_total(pp.wavelength(), m),
        }
    }

    /// Optical depth along the path of `pp` from its position up to `distance`.
    ///
    /// Returns 0 if the path never enters the domain.
    pub fn optical_depth(&self, pp: &PhotonPacket, distance: f64) -> f64 {
        let path = self.grid.path(pp.position(), pp.direction());
        let Some(first) = path.first() else {
            return 0.0;
        };
        let sections = self.constant_sections(pp.wavelength(), first);

        let mut tau = 0.0;
        for seg in &path {
            let ds = if seg.s <= distance {
                seg.ds
            } else {
                seg.ds - (seg.s - distance)
            };
            if ds > 0.0 {
                tau += self.segment_opacity(pp, seg, sections.as_deref()) * ds;
            }
            if seg.s >= distance {
                break;
            }
        }
        tau
    }

    /// Records the optical depth of every cell along the complete path of `pp`
    /// in the packet, together with the cumulative optical depth at each cell's
    /// entry boundary.
    pub fn fill_optical_depth(&self, pp: &mut PhotonPacket) {
        let path = self.grid.path(pp.position(), pp.direction());
        let sections = path
            .first()
            .and_then(|first| self.constant_sections(pp.wavelength(), first));

        let mut tau = 0.0;
        let mut segments = Vec::with_capacity(path.len());
        for seg in &path {
            let dtau = self.segment_opacity(pp, seg, sections.as_deref()) * seg.ds;
            segments.push(OpticalDepthSegment {
                cell: seg.cell,
                ds: seg.ds,
                s: seg.s,
                dtau,
                tau_near: tau,
            });
            tau += dtau;
        }
        pp.set_optical_depth_path(segments);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::comm::LocalComm;
    use crate::sim::grid::CartesianGrid;
    use crate::sim::materials::{ConstantSectionMix, DestructibleDustMix, PowerLawDustMix};
    use crate::sim::medium::{FunctionMedium, UniformMedium};

    fn row_grid() -> Arc<dyn SpatialGrid> {
        Arc::new(
            CartesianGrid::new(Point::new(0., 0., 0.), Point::new(10., 1., 1.), 10, 1, 1).unwrap(),
        )
    }

    fn system_with(
        config: SimulationConfig,
        media: Vec<Box<dyn Medium>>,
        mixes: MixRegistry,
    ) -> Result<MediumSystem> {
        MediumSystem::new(config, row_grid(), media, mixes, Arc::new(LocalComm))
    }

    fn gas_mixes() -> MixRegistry {
        let mut mixes = MixRegistry::new();
        mixes.register(ConstantSectionMix::new("a", MaterialType::Gas, 0.5, 1.5, 2.0));
        mixes.register(ConstantSectionMix::new("b", MaterialType::Gas, 1.0, 0.0, 1.0));
        mixes
    }

    #[test]
    fn test_stream_seed_differs_per_cell() {
        assert_ne!(stream_seed(1, 0), stream_seed(1, 1));
        assert_eq!(stream_seed(7, 3), stream_seed(7, 3));
    }

    #[test]
    fn test_opacities_and_albedo() {
        let media: Vec<Box<dyn Medium>> = vec![
            Box::new(UniformMedium::new("a", 2.0, 0)),
            Box::new(UniformMedium::new("b", 1.0, 1)),
        ];
        let ms = system_with(SimulationConfig::new(), media, gas_mixes()).unwrap();
        assert_eq!(ms.num_cells(), 10);
        assert_eq!(ms.num_media(), 2);
        assert!((ms.opacity_ext(1e-6, 3, 0) - 4.0).abs() < 1e-12);
        assert!((ms.opacity_ext_total(1e-6, 3) - 5.0).abs() < 1e-12);
        assert!((ms.opacity_sca_total(1e-6, 3) - 3.0).abs() < 1e-12);
        assert!((ms.opacity_abs_total(1e-6, 3) - 2.0).abs() < 1e-12);
        assert!((ms.albedo(1e-6, 3, 0) - 0.75).abs() < 1e-12);
        assert!((ms.albedo_total(1e-6, 3) - 0.6).abs() < 1e-12);
        assert!((ms.mass_density(0, 0) - 4.0).abs() < 1e-12);
        assert!((ms.total_mass(0) - 40.0).abs() < 1e-9);
        assert!(ms.has_gas());
        assert!(!ms.has_dust());
        assert_eq!(
            ms.opacity_strategy(),
            OpacityStrategy::MultipleConstantSections
        );
    }

    #[test]
    fn test_strategy_resolution() {
        let single = system_with(
            SimulationConfig::new(),
            vec![Box::new(UniformMedium::new("a", 1.0, 0))],
            gas_mixes(),
        )
        .unwrap();
        assert_eq!(single.opacity_strategy(), OpacityStrategy::SingleConstantSection);

        let mut config = SimulationConfig::new();
        config.hubble_expansion_rate = 1e-20;
        let shifted = system_with(
            config,
            vec![Box::new(UniformMedium::new("a", 1.0, 0))],
            gas_mixes(),
        )
        .unwrap();
        assert_eq!(shifted.opacity_strategy(), OpacityStrategy::Shifted);

        let mut mixes = MixRegistry::new();
        mixes.register(DestructibleDustMix::new(PowerLawDustMix::interstellar("d")));
        let dusty = system_with(
            SimulationConfig::new(),
            vec![Box::new(UniformMedium::new("d", 1.0, 0))],
            mixes,
        )
        .unwrap();
        assert_eq!(dusty.opacity_strategy(), OpacityStrategy::ConstantWavelength);
        assert_eq!(dusty.material_state(4, 0).values(), &[1.0, 0.0]);
    }

    #[test]
    fn test_bulk_velocity_is_density_weighted() {
        let mut config = SimulationConfig::new();
        config.has_moving_media = true;
        let media: Vec<Box<dyn Medium>> = vec![
            Box::new(UniformMedium::new("a", 3.0, 0).with_velocity(Vector::new(4., 0., 0.))),
            Box::new(UniformMedium::new("b", 1.0, 1)),
        ];
        let ms = system_with(config, media, gas_mixes()).unwrap();
        assert!(ms.bulk_velocity(5).is_close(&Vector::new(3., 0., 0.)));
    }

    #[test]
    fn test_unknown_mix_is_rejected() {
        let result = system_with(
            SimulationConfig::new(),
            vec![Box::new(UniformMedium::new("a", 1.0, 7))],
            gas_mixes(),
        );
        assert!(matches!(result, Err(MediumError::UnknownMix { index: 7, .. })));
    }

    #[test]
    fn test_no_media_is_rejected() {
        let result = system_with(SimulationConfig::new(), Vec::new(), gas_mixes());
        assert!(matches!(result, Err(MediumError::NoMedia)));
    }

    #[test]
    fn test_sampled_density_is_averaged() {
        let mut config = SimulationConfig::new();
        config.num_density_samples = 200;
        // Density rises linearly along x; the cell average equals the centroid value
        let media: Vec<Box<dyn Medium>> =
            vec![Box::new(FunctionMedium::new("ramp", 0, |p: Point| p.x))];
        let ms = system_with(config, media, gas_mixes()).unwrap();
        assert!((ms.number_density(2, 0) - 2.5).abs() < 0.1);
    }

    #[test]
    fn test_shifted_optical_depth_uses_perceived_wavelength() {
        let mut mixes = MixRegistry::new();
        mixes.register(PowerLawDustMix::interstellar("dust"));
        let mut config = SimulationConfig::new();
        config.hubble_expansion_rate = 0.1;
        let media: Vec<Box<dyn Medium>> = vec![Box::new(UniformMedium::new("d", 1e20, 0))];
        let ms = system_with(config, media, mixes).unwrap();

        let pp = PhotonPacket::new(Point::new(0., 0.5, 0.5), Vector::new(1., 0., 0.), 0.55e-6, 1.0)
            .unwrap();
        let expected: f64 = (1..=10)
            .map(|i| ms.opacity_ext_total(0.55e-6 * (1.0 + 0.1 * i as f64), i - 1))
            .sum();
        assert!((ms.optical_depth(&pp, 10.0) - expected).abs() < 1e-9 * expected);
    }
}
