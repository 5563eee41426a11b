//! Arena of per-cell and per-cell-per-component medium state.

use std::ops::Range;

use rayon::prelude::*;

use crate::Vector;
use crate::sim::materials::{MaterialState, MixRegistry};

/// State maintained per spatial cell.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CellState {
    /// Cell volume [m^3].
    pub volume: f64,
    /// Density-weighted aggregate bulk velocity [m/s].
    pub velocity: Vector,
}

/// Fixed-size arrays of cell states and material states, indexed on `m` and `(m, h)`.
///
/// Never resized after construction. Material states of cell `m` are stored
/// contiguously, so that a worker can own all components of one cell at once.
#[derive(Debug, Clone)]
pub struct StateStore {
    num_cells: usize,
    num_media: usize,
    /// Maximum number of extra state variables per component, over all mixes
    /// the component may use.
    widths: Vec<usize>,
    cells: Vec<CellState>,
    components: Vec<MaterialState>,
}

impl StateStore {
    /// Allocates a store with zeroed placeholder states.
    pub fn new(num_cells: usize, widths: Vec<usize>) -> Self {
        let num_media = widths.len();
        let components = (0..num_cells * num_media)
            .map(|i| MaterialState::new(i / num_media, i % num_media, 0.0, 0, Vec::new()))
            .collect();
        Self {
            num_cells,
            num_media,
            widths,
            cells: vec![CellState::default(); num_cells],
            components,
        }
    }

    pub fn num_cells(&self) -> usize {
        self.num_cells
    }

    pub fn num_media(&self) -> usize {
        self.num_media
    }

    fn check(&self, m: usize, h: usize) {
        assert!(
            m < self.num_cells,
            "cell index {m} out of range [0, {})",
            self.num_cells
        );
        assert!(
            h < self.num_media,
            "medium index {h} out of range [0, {})",
            self.num_media
        );
    }

    pub fn cell(&self, m: usize) -> &CellState {
        assert!(
            m < self.num_cells,
            "cell index {m} out of range [0, {})",
            self.num_cells
        );
        &self.cells[m]
    }

    pub fn component(&self, m: usize, h: usize) -> &MaterialState {
        self.check(m, h);
        &self.components[m * self.num_media + h]
    }

    /// All material states of cell `m`, ordered on component index.
    pub fn cell_components(&self, m: usize) -> &[MaterialState] {
        assert!(
            m < self.num_cells,
            "cell index {m} out of range [0, {})",
            self.num_cells
        );
        &self.components[m * self.num_media..(m + 1) * self.num_media]
    }

    /// Stores the complete state of cell `m`.
    pub fn set_cell(&mut self, m: usize, cell: CellState, components: Vec<MaterialState>) {
        assert_eq!(
            components.len(),
            self.num_media,
            "cell {m} needs exactly one state per medium"
        );
        self.check(m, 0);
        self.cells[m] = cell;
        for (h, state) in components.into_iter().enumerate() {
            self.components[m * self.num_media + h] = state;
        }
    }

    /// Parallel iterator over `(m, states of cell m)` for the cells in `cells`.
    pub fn par_cell_components_mut(
        &mut self,
        cells: Range<usize>,
    ) -> impl IndexedParallelIterator<Item = (usize, &mut [MaterialState])> + '_ {
        assert!(
            cells.end <= self.num_cells,
            "cell range {cells:?} exceeds [0, {})",
            self.num_cells
        );
        let begin = cells.start;
        let h = self.num_media.max(1);
        self.components[cells.start * self.num_media..cells.end * self.num_media]
            .par_chunks_mut(h)
            .enumerate()
            .map(move |(i, states)| (begin + i, states))
    }

    fn stride(&self) -> usize {
        4 + self.widths.iter().map(|w| 2 + w).sum::<usize>()
    }

    /// Serializes the states of `owned` cells into a buffer covering all cells.
    ///
    /// Entries for other cells are zero, so that summing the buffers of processes
    /// owning disjoint cell ranges yields every value exactly once.
    pub fn pack(&self, owned: Range<usize>) -> Vec<f64> {
        let stride = self.stride();
        let mut buffer = vec![0.0; self.num_cells * stride];
        for m in owned {
            let out = &mut buffer[m * stride..(m + 1) * stride];
            let cell = &self.cells[m];
            out[0] = cell.volume;
            out[1] = cell.velocity.dx;
            out[2] = cell.velocity.dy;
            out[3] = cell.velocity.dz;
            let mut offset = 4;
            for h in 0..self.num_media {
                let state = &self.components[m * self.num_media + h];
                out[offset] = state.number_density();
                out[offset + 1] = state.mix_index() as f64;
                let values = state.values();
                out[offset + 2..offset + 2 + values.len()].copy_from_slice(values);
                offset += 2 + self.widths[h];
            }
        }
        buffer
    }

    /// Restores all cell states from a buffer produced by [`StateStore::pack`]
    /// (possibly summed over processes).
    pub fn unpack(&mut self, buffer: &[f64], mixes: &MixRegistry) {
        let stride = self.stride();
        assert_eq!(
            buffer.len(),
            self.num_cells * stride,
            "state buffer has the wrong size"
        );
        for m in 0..self.num_cells {
            let src = &buffer[m * stride..(m + 1) * stride];
            self.cells[m] = CellState {
                volume: src[0],
                velocity: Vector::new(src[1], src[2], src[3]),
            };
            let mut offset = 4;
            for h in 0..self.num_media {
                let mix_index = src[offset + 1].round() as usize;
                let num_values = mixes.get(mix_index).num_state_variables();
                let values = src[offset + 2..offset + 2 + num_values].to_vec();
                self.components[m * self.num_media + h] =
                    MaterialState::new(m, h, src[offset], mix_index, values);
                offset += 2 + self.widths[h];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::materials::{ConstantSectionMix, MaterialType, PowerLawDustMix};

    fn registry() -> MixRegistry {
        let mut mixes = MixRegistry::new();
        mixes.register(ConstantSectionMix::new("gas", MaterialType::Gas, 1.0, 1.0, 1.0));
        mixes.register(PowerLawDustMix::interstellar("dust"));
        mixes
    }

    fn filled_store() -> StateStore {
        let mut store = StateStore::new(3, vec![0, 1]);
        for m in 0..3 {
            let cell = CellState {
                volume: 1.0 + m as f64,
                velocity: Vector::new(m as f64, 0., -1.),
            };
            let states = vec![
                MaterialState::new(m, 0, 10.0 * m as f64, 0, vec![]),
                MaterialState::new(m, 1, 0.5, 1, vec![20.0 + m as f64]),
            ];
            store.set_cell(m, cell, states);
        }
        store
    }

    #[test]
    fn test_accessors() {
        let store = filled_store();
        assert_eq!(store.num_cells(), 3);
        assert_eq!(store.num_media(), 2);
        assert_eq!(store.component(2, 0).number_density(), 20.0);
        assert_eq!(store.cell_components(1)[1].value(0), 21.0);
        assert_eq!(store.cell(2).volume, 3.0);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_out_of_range_component_panics() {
        let store = filled_store();
        store.component(0, 2);
    }

    #[test]
    fn test_pack_unpack_partitioned_sum() {
        let full = filled_store();
        let mixes = registry();
        let mut a = full.pack(0..1);
        let b = full.pack(1..3);
        for (x, y) in a.iter_mut().zip(&b) {
            *x += y;
        }
        let mut merged = StateStore::new(3, vec![0, 1]);
        merged.unpack(&a, &mixes);
        for m in 0..3 {
            assert_eq!(merged.cell(m), full.cell(m));
            assert_eq!(merged.cell_components(m), full.cell_components(m));
        }
    }

    #[test]
    fn test_parallel_mutation_touches_requested_cells() {
        let mut store = filled_store();
        store
            .par_cell_components_mut(1..3)
            .for_each(|(_, states)| states[1].set_value(0, -1.0));
        assert_eq!(store.component(0, 1).value(0), 20.0);
        assert_eq!(store.component(1, 1).value(0), -1.0);
        assert_eq!(store.component(2, 1).value(0), -1.0);
    }
}
