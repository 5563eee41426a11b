//! Communication between cooperating processes.
//!
//! Each process owns a contiguous block of spatial cells (see [`ProcessPartition`]).
//! Process-local partial results are combined with collective reductions. All
//! reductions combine contributions in rank order, so the outcome does not depend
//! on timing.

use std::ops::Range;
use std::sync::{Arc, Barrier, Mutex};

/// Collective operations across all processes participating in a simulation.
///
/// Every process must call the same sequence of collective operations with
/// buffers of the same length.
pub trait ProcessComm: Send + Sync {
    /// Index of this process in `[0, size)`.
    fn rank(&self) -> usize;

    /// Number of participating processes.
    fn size(&self) -> usize;

    /// Replaces each element by its sum over all processes.
    fn sum_all(&self, data: &mut [f64]);

    /// Replaces each element by its maximum over all processes.
    fn max_all(&self, data: &mut [f64]);

    fn is_multi_process(&self) -> bool {
        self.size() > 1
    }

    /// Sums a single counter over all processes.
    fn sum_count(&self, count: usize) -> usize {
        let mut buf = [count as f64];
        self.sum_all(&mut buf);
        buf[0].round() as usize
    }
}

/// Communicator for a single process. All collectives are no-ops.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalComm;

impl ProcessComm for LocalComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn sum_all(&self, _data: &mut [f64]) {}

    fn max_all(&self, _data: &mut [f64]) {}
}

struct GroupShared {
    barrier: Barrier,
    slots: Mutex<Vec<Vec<f64>>>,
}

/// Communicator for a group of ranks running as threads of one process.
///
/// Behaves like a set of separate processes with their own memory: ranks only
/// exchange data through the collectives. Each rank must run on its own thread.
pub struct ThreadGroupComm {
    rank: usize,
    size: usize,
    shared: Arc<GroupShared>,
}

impl ThreadGroupComm {
    /// Creates `size` connected communicators, one per rank.
    pub fn group(size: usize) -> Vec<ThreadGroupComm> {
        assert!(size > 0, "a process group needs at least one rank");
        let shared = Arc::new(GroupShared {
            barrier: Barrier::new(size),
            slots: Mutex::new(vec![Vec::new(); size]),
        });
        (0..size)
            .map(|rank| ThreadGroupComm {
                rank,
                size,
                shared: Arc::clone(&shared),
            })
            .collect()
    }

    fn reduce(&self, data: &mut [f64], op: fn(f64, f64) -> f64) {
        {
            let mut slots = self.shared.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots[self.rank].clear();
            slots[self.rank].extend_from_slice(data);
        }
        self.shared.barrier.wait();
        {
            let slots = self.shared.slots.lock().unwrap_or_else(|e| e.into_inner());
            debug_assert!(
                slots.iter().all(|slot| slot.len() == data.len()),
                "rank {} reduces {} values, but the group passed buffers of lengths {:?}",
                self.rank,
                data.len(),
                slots.iter().map(Vec::len).collect::<Vec<_>>()
            );
            for (i, value) in data.iter_mut().enumerate() {
                let mut acc = slots[0][i];
                for slot in slots.iter().skip(1) {
                    acc = op(acc, slot[i]);
                }
                *value = acc;
            }
        }
        // Nobody may overwrite a slot before every rank has read all slots
        self.shared.barrier.wait();
    }
}

impl ProcessComm for ThreadGroupComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn sum_all(&self, data: &mut [f64]) {
        if self.size > 1 {
            self.reduce(data, |a, b| a + b);
        }
    }

    fn max_all(&self, data: &mut [f64]) {
        if self.size > 1 {
            self.reduce(data, f64::max);
        }
    }
}

/// Assignment of contiguous blocks of cells to processes.
#[derive(Debug, Clone)]
pub struct ProcessPartition {
    num_cells: usize,
    num_procs: usize,
}

impl ProcessPartition {
    pub fn new(num_cells: usize, num_procs: usize) -> Self {
        assert!(num_procs > 0, "a partition needs at least one process");
        Self {
            num_cells,
            num_procs,
        }
    }

    pub fn for_comm(num_cells: usize, comm: &dyn ProcessComm) -> Self {
        Self::new(num_cells, comm.size())
    }

    /// Range of cells owned by process `rank`. Earlier ranks get one extra cell
    /// when the cells do not divide evenly.
    pub fn range(&self, rank: usize) -> Range<usize> {
        assert!(
            rank < self.num_procs,
            "rank {rank} out of range [0, {})",
            self.num_procs
        );
        let base = self.num_cells / self.num_procs;
        let extra = self.num_cells % self.num_procs;
        let begin = rank * base + rank.min(extra);
        let len = base + usize::from(rank < extra);
        begin..begin + len
    }

    /// Rank of the process owning cell `m`.
    pub fn owner(&self, m: usize) -> usize {
        assert!(m < self.num_cells, "cell index {m} out of range [0, {})", self.num_cells);
        (0..self.num_procs)
            .find(|&rank| self.range(rank).contains(&m))
            .unwrap_or(self.num_procs - 1)
    }
}
