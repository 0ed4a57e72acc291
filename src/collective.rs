//! Collective operations over the processes participating in a reduction.
//!
//! The library itself runs on a single process. The [`Communicator`] trait abstracts the two
//! collective concerns the offline phase has: deciding which process performs file I/O, and
//! merging the partial DOF-to-cell maps computed while building reduced meshes.
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub trait Communicator {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// The rank responsible for writing persisted artifacts.
    fn io_rank(&self) -> usize {
        0
    }

    fn is_io_process(&self) -> bool {
        self.rank() == self.io_rank()
    }

    /// Merges the DOF maps computed by each process into a map that is identical on all processes.
    fn all_reduce_dof_mapping(&self, local: DofMapping) -> DofMapping;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SerialCommunicator;

impl Communicator for SerialCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_reduce_dof_mapping(&self, local: DofMapping) -> DofMapping {
        local
    }
}

/// Map from global DOF indices to the set of cells whose closure contains the DOF.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DofMapping(BTreeMap<usize, BTreeSet<usize>>);

impl DofMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, dof: usize, cell: usize) {
        self.0.entry(dof).or_default().insert(cell);
    }

    /// Union of two maps. The operation is commutative and associative.
    pub fn union(mut self, other: Self) -> Self {
        for (dof, cells) in other.0 {
            self.0.entry(dof).or_default().extend(cells);
        }
        self
    }

    pub fn cells_of(&self, dof: usize) -> Option<&BTreeSet<usize>> {
        self.0.get(&dof)
    }

    /// All cells referenced by any DOF, in increasing order.
    pub fn all_cells(&self) -> BTreeSet<usize> {
        self.0.values().flatten().copied().collect()
    }

    pub fn dofs(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Reduces per-partition DOF maps into a single map with a parallel tree reduction.
pub fn reduce_partitions(partitions: Vec<DofMapping>) -> DofMapping {
    partitions
        .into_par_iter()
        .reduce(DofMapping::default, DofMapping::union)
}
