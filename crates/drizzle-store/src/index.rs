//! Mutable permutation over particle slots.
//!
//! [`IndexArray`] holds slot indices in the order kernels visit them. Two
//! lengths restrict the view: the *valid* length counts entries that have
//! not been compacted away, and the *working* length, never larger, is
//! what kernels see. Shrinking the working length never reorders entries.

use drizzle_core::{Backend, ParticleError, SortKey};

/// Which ranges a shuffle permutes.
#[derive(Clone, Copy, Debug)]
pub enum ShuffleScope<'a> {
    /// The whole working range. Destroys any cell ordering.
    Global,
    /// Each `[cell_start[c], cell_start[c+1])` independently.
    PerCell(&'a [usize]),
}

/// Permutation of particle slots with a working and a valid length.
#[derive(Clone, Debug)]
pub struct IndexArray {
    data: Vec<usize>,
    valid_len: usize,
    working_len: usize,
    scratch: Vec<usize>,
}

impl IndexArray {
    /// The identity permutation over `capacity` slots, fully valid.
    pub fn identity(capacity: usize) -> Self {
        Self {
            data: (0..capacity).collect(),
            valid_len: capacity,
            working_len: capacity,
            scratch: Vec::with_capacity(capacity),
        }
    }

    /// Physical number of slots. Never changes.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Entries that survived the last compaction.
    pub fn valid_len(&self) -> usize {
        self.valid_len
    }

    /// Entries visible to kernels.
    pub fn len(&self) -> usize {
        self.working_len
    }

    /// Whether the working range is empty.
    pub fn is_empty(&self) -> bool {
        self.working_len == 0
    }

    /// The working range.
    pub fn as_slice(&self) -> &[usize] {
        &self.data[..self.working_len]
    }

    /// The valid range, including entries past the working length.
    pub fn valid_slice(&self) -> &[usize] {
        &self.data[..self.valid_len]
    }

    /// Restrict subsequent operations to the first `k` entries.
    ///
    /// # Errors
    ///
    /// [`ParticleError::Range`] if `k` exceeds the valid length.
    pub fn set_working_length(&mut self, k: usize) -> Result<(), ParticleError> {
        if k > self.valid_len {
            return Err(ParticleError::Range {
                requested: k,
                valid: self.valid_len,
            });
        }
        self.working_len = k;
        Ok(())
    }

    /// Widen the working range back to the valid length.
    pub fn reset_working_length(&mut self) {
        self.working_len = self.valid_len;
    }

    /// Apply a Fisher–Yates permutation within `scope`.
    ///
    /// `u01` supplies one value in `[0, 1)` per working position.
    pub fn shuffle(
        &mut self,
        backend: &dyn Backend,
        u01: &[f64],
        scope: ShuffleScope<'_>,
    ) -> Result<(), ParticleError> {
        let idx = &mut self.data[..self.working_len];
        match scope {
            ShuffleScope::Global => backend.shuffle_global(idx, u01),
            ShuffleScope::PerCell(cell_start) => {
                if cell_start.last().copied() != Some(idx.len()) {
                    return Err(ParticleError::invariant(
                        "shuffle",
                        format!(
                            "cell partition covers {:?} entries, working length is {}",
                            cell_start.last(),
                            idx.len()
                        ),
                    ));
                }
                backend.shuffle_local(idx, u01, cell_start)
            }
        }
    }

    /// Drop every entry whose multiplicity is zero, keeping survivor order.
    ///
    /// Operates on the full valid range; afterwards the valid and working
    /// lengths both equal the survivor count. Returns how many entries
    /// were removed.
    pub fn compact_remove_zero_weight(&mut self, backend: &dyn Backend, n: &[u64]) -> usize {
        let before = self.valid_len;
        let kept = backend.remove_zeros(&mut self.data[..before], n, &mut self.scratch);
        self.valid_len = kept;
        self.working_len = kept;
        before - kept
    }

    /// Order each pair so its first member ranks highest by `key`.
    pub fn sort_within_pairs(
        &mut self,
        backend: &dyn Backend,
        is_first_in_pair: &[bool],
        key: SortKey<'_>,
    ) -> Result<(), ParticleError> {
        backend.sort_within_pairs(&mut self.data[..self.working_len], is_first_in_pair, key)
    }

    /// Working range plus scratch space, for sorting kernels.
    pub(crate) fn sort_buffers(&mut self) -> (&mut [usize], &mut Vec<usize>) {
        (&mut self.data[..self.working_len], &mut self.scratch)
    }
}
