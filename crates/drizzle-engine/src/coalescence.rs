//! Pairwise coalescence over the working range.

use drizzle_core::{CoalescenceOutcome, ParticleError};

use crate::particles::ParticleSet;

impl ParticleSet {
    /// Merge every marked pair.
    ///
    /// Position `p` with `is_first_in_pair[p]` pairs with `p + 1`; the
    /// first member must have the larger multiplicity (see
    /// [`sort_within_pair_by_attr`](Self::sort_within_pair_by_attr)).
    /// `gamma[p]` caps how many times the first member's attributes are
    /// folded into the second. Derived attributes are recomputed
    /// afterwards and the partition is invalidated.
    ///
    /// # Errors
    ///
    /// [`ParticleError::InvariantViolation`] for an unhealthy set, a
    /// malformed mask, short or invalid gamma, or an unordered pair. No
    /// buffer is modified on error.
    pub fn coalescence(
        &mut self,
        gamma: &[f64],
        is_first_in_pair: &[bool],
    ) -> Result<CoalescenceOutcome, ParticleError> {
        self.require_healthy("coalescence")?;
        let args = self
            .store
            .coalescence_args(self.index.as_slice(), gamma, is_first_in_pair);
        let outcome = self.backend.coalesce(args)?;

        self.cells.invalidate();
        if outcome.pairs_merged > 0 {
            self.store.mark_merged();
            self.store.recompute_derived(self.index.as_slice());
        }
        if outcome.zeroed > 0 {
            self.healthy = false;
        }
        self.metrics.coalescence_calls += 1;
        self.metrics.pairs_merged += outcome.pairs_merged as u64;
        tracing::debug!(
            pairs_merged = outcome.pairs_merged,
            zeroed = outcome.zeroed,
            working = self.index.len(),
            "coalescence"
        );
        Ok(outcome)
    }
}
