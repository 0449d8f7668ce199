//! The backend capability trait and its argument/outcome types.
//!
//! A [`Backend`] executes every bulk operation the engine needs over flat
//! buffers. The engine owns all buffers, the index, the cell partition
//! and the healthy flag; kernels only read and write the slices handed to
//! them and report what happened through outcome values. Between two
//! kernel calls every buffer is fully materialised, so an implementation
//! is free to parallelise a kernel body however it likes.
//!
//! All index slices passed to kernels are already restricted to the
//! current working range.

use crate::attribute::{AttrGroup, SlotRule};
use crate::error::ParticleError;
use crate::stack::Stack;

/// Value written to every moment of a cell whose zeroth moment is zero.
pub const EMPTY_CELL_MOMENT: f64 = 0.0;

/// Key used to order the two members of each pair.
#[derive(Clone, Copy, Debug)]
pub enum SortKey<'a> {
    /// Order by multiplicity.
    Multiplicity(&'a [u64]),
    /// Order by a scalar attribute.
    Values(&'a [f64]),
}

impl SortKey<'_> {
    /// Whether slot `a` ranks strictly below slot `b`.
    pub fn less(&self, a: usize, b: usize) -> bool {
        match self {
            Self::Multiplicity(n) => n[a] < n[b],
            Self::Values(v) => v[a] < v[b],
        }
    }
}

/// One requested moment: attribute row, its group, and the rank.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MomentTerm {
    /// Stack the attribute lives in.
    pub group: AttrGroup,
    /// Row within that stack.
    pub row: usize,
    /// Power the attribute is raised to.
    pub rank: i32,
}

/// Inputs to [`Backend::moments`].
#[derive(Clone, Copy, Debug)]
pub struct MomentArgs<'a> {
    /// Multiplicities, indexed by slot.
    pub n: &'a [u64],
    /// Extensive stack.
    pub extensive: &'a Stack<f64>,
    /// Intensive stack.
    pub intensive: &'a Stack<f64>,
    /// Working-range index, sorted by cell id.
    pub idx: &'a [usize],
    /// Cell partition matching `idx`.
    pub cell_start: &'a [usize],
    /// Requested moments; output row `k` corresponds to `terms[k]`.
    pub terms: &'a [MomentTerm],
    /// Half-open filter range `[lo, hi)` on `weighting`.
    pub range: (f64, f64),
    /// Attribute values the range filter is applied to.
    pub weighting: &'a [f64],
}

/// Inputs to [`Backend::coalesce`].
#[derive(Debug)]
pub struct CoalescenceArgs<'a> {
    /// Multiplicities, indexed by slot.
    pub n: &'a mut [u64],
    /// Extensive stack.
    pub extensive: &'a mut Stack<f64>,
    /// Intensive stack.
    pub intensive: &'a mut Stack<f64>,
    /// Resolved merge rule of each intensive row.
    pub intensive_rules: &'a [SlotRule],
    /// Working-range index.
    pub idx: &'a [usize],
    /// Multiplicity draw per pair, read at the first-in-pair position.
    pub gamma: &'a [f64],
    /// Pair structure over working positions.
    pub is_first_in_pair: &'a [bool],
}

/// What a coalescence kernel did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[must_use]
pub struct CoalescenceOutcome {
    /// Pairs with `gamma_eff > 0`.
    pub pairs_merged: usize,
    /// Particles whose multiplicity reached zero.
    pub zeroed: usize,
}

/// Inputs to [`Backend::flag_precipitated`].
#[derive(Debug)]
pub struct PrecipitationArgs<'a> {
    /// Integer cell origin, one row per dimension; the last row is vertical.
    pub cell_origin: &'a Stack<i64>,
    /// Position within the cell, same layout as `cell_origin`.
    pub position_in_cell: &'a Stack<f64>,
    /// Per-droplet volume.
    pub volume: &'a [f64],
    /// Multiplicities, zeroed for removed particles.
    pub n: &'a mut [u64],
    /// Working-range index.
    pub idx: &'a [usize],
}

/// What a precipitation kernel did.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[must_use]
pub struct PrecipitationOutcome {
    /// `Σ n · volume` over removed particles.
    pub flux: f64,
    /// Number of super-particles flagged dead.
    pub removed: usize,
}

/// Bulk operations over particle buffers.
///
/// Implementations must be deterministic: the same inputs produce the
/// same outputs. Contract violations are reported as
/// [`ParticleError::InvariantViolation`] before any buffer is modified.
pub trait Backend: Send + Sync {
    /// Short human-readable name for diagnostics.
    fn name(&self) -> &str;

    /// Stable sort of `idx` by `cell_id[idx[k]]` and recompute
    /// `cell_start` (length `n_cells + 1`). `scratch` is reusable storage.
    fn sort_by_cell_id(
        &self,
        idx: &mut [usize],
        cell_id: &[usize],
        cell_start: &mut [usize],
        scratch: &mut Vec<usize>,
    ) -> Result<(), ParticleError>;

    /// Fisher–Yates over the whole of `idx`, one `u01` value per position.
    fn shuffle_global(&self, idx: &mut [usize], u01: &[f64]) -> Result<(), ParticleError>;

    /// Fisher–Yates independently within each cell range of `cell_start`.
    fn shuffle_local(
        &self,
        idx: &mut [usize],
        u01: &[f64],
        cell_start: &[usize],
    ) -> Result<(), ParticleError>;

    /// Stable removal of entries whose multiplicity is zero. Survivors are
    /// moved to the front and their count returned.
    fn remove_zeros(&self, idx: &mut [usize], n: &[u64], scratch: &mut Vec<usize>) -> usize;

    /// Mark positions at even offsets within a cell that have a successor
    /// in the same cell. Positions past the working range are cleared.
    fn find_pairs(
        &self,
        is_first_in_pair: &mut [bool],
        cell_start: &[usize],
    ) -> Result<(), ParticleError>;

    /// Swap the members of each pair so the first ranks highest by `key`.
    fn sort_within_pairs(
        &self,
        idx: &mut [usize],
        is_first_in_pair: &[bool],
        key: SortKey<'_>,
    ) -> Result<(), ParticleError>;

    /// Pairwise coalescence over the working range.
    fn coalesce(&self, args: CoalescenceArgs<'_>) -> Result<CoalescenceOutcome, ParticleError>;

    /// Fill `moment_0` (one entry per cell) and `moments` (one row per
    /// term, one column per cell).
    fn moments(
        &self,
        args: MomentArgs<'_>,
        moment_0: &mut [f64],
        moments: &mut Stack<f64>,
    ) -> Result<(), ParticleError>;

    /// Zero the multiplicity of particles below the domain floor.
    fn flag_precipitated(
        &self,
        args: PrecipitationArgs<'_>,
    ) -> Result<PrecipitationOutcome, ParticleError>;

    /// Recompute `cell_id[slot]` as `Σ origin[d] · strides[d]` for every
    /// slot listed in `idx`; other slots are left alone. Origins outside
    /// `grid` are a contract violation.
    fn cell_id(
        &self,
        cell_id: &mut [usize],
        idx: &[usize],
        cell_origin: &Stack<i64>,
        strides: &[usize],
        grid: &[usize],
    ) -> Result<(), ParticleError>;

    /// End of the working range for adaptive time-stepping:
    /// `cell_start[c + 1]` for the last cell `c` whose `dt_left[c]` is
    /// non-zero, or 0 when every cell is done. `dt_left` holds one entry
    /// per cell.
    fn adaptive_sdm_end(
        &self,
        dt_left: &[f64],
        cell_start: &[usize],
    ) -> Result<usize, ParticleError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_key_compares_by_slot() {
        let n = [3u64, 7, 7];
        let key = SortKey::Multiplicity(&n);
        assert!(key.less(0, 1));
        assert!(!key.less(1, 2));

        let v = [0.5, -1.0];
        assert!(SortKey::Values(&v).less(1, 0));
    }
}
