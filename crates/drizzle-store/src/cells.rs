//! Lazily rebuilt mapping from cell id to a contiguous index range.

use std::ops::Range;

use drizzle_core::{Backend, ParticleError};

use crate::index::IndexArray;

/// Prefix-sum table over an index sorted by cell id.
///
/// After a rebuild, working positions `[cell_start[c], cell_start[c+1])`
/// hold exactly the particles of cell `c` and `cell_start[n_cells]` equals
/// the working length. Any reorder or removal of index entries must call
/// [`invalidate`](Self::invalidate); the next read then re-sorts.
#[derive(Clone, Debug)]
pub struct CellPartition {
    cell_start: Vec<usize>,
    sorted: bool,
    rebuilds: u64,
}

impl CellPartition {
    /// An unsorted partition over `n_cells` cells.
    pub fn new(n_cells: usize) -> Self {
        Self {
            cell_start: vec![0; n_cells + 1],
            sorted: false,
            rebuilds: 0,
        }
    }

    /// Number of cells.
    pub fn n_cells(&self) -> usize {
        self.cell_start.len() - 1
    }

    /// Whether the cached table matches the current index.
    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    /// Mark the cached table stale.
    pub fn invalidate(&mut self) {
        self.sorted = false;
    }

    /// How many times the table has been rebuilt.
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }

    /// Stable-sort the working range of `index` by cell id and recompute
    /// the prefix sums.
    pub fn rebuild(
        &mut self,
        backend: &dyn Backend,
        cell_id: &[usize],
        index: &mut IndexArray,
    ) -> Result<(), ParticleError> {
        let (idx, scratch) = index.sort_buffers();
        backend.sort_by_cell_id(idx, cell_id, &mut self.cell_start, scratch)?;
        self.sorted = true;
        self.rebuilds += 1;
        tracing::trace!(
            n_cells = self.n_cells(),
            working = idx.len(),
            "cell partition rebuilt"
        );
        Ok(())
    }

    /// The table, rebuilding first if it is stale.
    pub fn cell_start(
        &mut self,
        backend: &dyn Backend,
        cell_id: &[usize],
        index: &mut IndexArray,
    ) -> Result<&[usize], ParticleError> {
        if !self.sorted {
            self.rebuild(backend, cell_id, index)?;
        }
        Ok(&self.cell_start)
    }

    /// The table if it is current.
    pub fn cached(&self) -> Option<&[usize]> {
        self.sorted.then_some(self.cell_start.as_slice())
    }

    /// Working positions of cell `c`, if the table is current.
    pub fn range(&self, c: usize) -> Option<Range<usize>> {
        let table = self.cached()?;
        (c + 1 < table.len()).then(|| table[c]..table[c + 1])
    }
}
