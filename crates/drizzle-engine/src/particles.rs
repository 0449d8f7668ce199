//! The particle set: buffers, index, partition, and health state.
//!
//! [`ParticleSet`] owns one [`AttributeStore`], one [`IndexArray`], one
//! [`CellPartition`] and the backend chosen at construction. Operations
//! are split by concern across this module and the `coalescence`,
//! `moments` and `lifecycle` modules; all of them go through the same
//! health gate.
//!
//! # Health
//!
//! A set is *healthy* when no entry in its valid range has zero
//! multiplicity, including entries past a cut working length. Coalescence, precipitation, and external writes to
//! `"n"` can clear the flag; only [`sanitize`](ParticleSet::sanitize)
//! sets it again. Length-sensitive operations on an unhealthy set fail
//! with [`ParticleError::InvariantViolation`].

use std::fmt;

use drizzle_core::attribute::{CELL_ID, MULTIPLICITY};
use drizzle_core::{Backend, ParticleError, SortKey};
use drizzle_store::{AttributeStore, CellPartition, IndexArray, ShuffleScope, Spatial};

use crate::config::ParticlesBuilder;
use crate::metrics::EngineMetrics;

/// A population of super-particles.
pub struct ParticleSet {
    pub(crate) backend: Box<dyn Backend>,
    pub(crate) store: AttributeStore,
    pub(crate) index: IndexArray,
    pub(crate) cells: CellPartition,
    pub(crate) healthy: bool,
    pub(crate) metrics: EngineMetrics,
}

impl fmt::Debug for ParticleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParticleSet")
            .field("backend", &self.backend.name())
            .field("n_sd", &self.store.n_sd())
            .field("valid", &self.index.valid_len())
            .field("working", &self.index.len())
            .field("n_cells", &self.cells.n_cells())
            .field("healthy", &self.healthy)
            .finish()
    }
}

impl ParticleSet {
    /// Start building a particle set.
    pub fn builder() -> ParticlesBuilder {
        ParticlesBuilder::new()
    }

    pub(crate) fn from_parts(
        backend: Box<dyn Backend>,
        mut store: AttributeStore,
        n_cells: usize,
    ) -> Self {
        let index = IndexArray::identity(store.n_sd());
        store.recompute_derived(index.as_slice());
        let healthy = !store.multiplicity().contains(&0);
        tracing::info!(
            n_sd = store.n_sd(),
            n_cells,
            extensive = store.extensive_keys().len(),
            intensive = store.intensive_keys().len(),
            spatial = store.spatial().is_some(),
            backend = backend.name(),
            "particle set built"
        );
        Self {
            backend,
            store,
            index,
            cells: CellPartition::new(n_cells),
            healthy,
            metrics: EngineMetrics::default(),
        }
    }

    pub(crate) fn require_healthy(&self, operation: &'static str) -> Result<(), ParticleError> {
        if self.healthy {
            Ok(())
        } else {
            Err(ParticleError::invariant(
                operation,
                "particle set holds zero-multiplicity entries; call sanitize first",
            ))
        }
    }

    // ── Shape ──────────────────────────────────────────────────

    /// Name of the backend executing kernels.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Number of particle slots allocated.
    pub fn n_sd(&self) -> usize {
        self.store.n_sd()
    }

    /// Number of cells.
    pub fn n_cells(&self) -> usize {
        self.cells.n_cells()
    }

    /// Whether the valid range is free of zero multiplicities.
    pub fn is_healthy(&self) -> bool {
        self.healthy
    }

    /// Number of live particles in the working range.
    ///
    /// # Errors
    ///
    /// [`ParticleError::InvariantViolation`] if the set is unhealthy.
    pub fn sd_num(&self) -> Result<usize, ParticleError> {
        self.require_healthy("sd_num")?;
        Ok(self.index.len())
    }

    /// Length of the valid index range.
    pub fn valid_length(&self) -> usize {
        self.index.valid_len()
    }

    /// Working range of the index permutation.
    pub fn index(&self) -> &[usize] {
        self.index.as_slice()
    }

    /// Restrict subsequent operations to the first `k` index entries.
    ///
    /// # Errors
    ///
    /// [`ParticleError::Range`] if `k` exceeds the valid length.
    pub fn set_working_length(&mut self, k: usize) -> Result<(), ParticleError> {
        self.index.set_working_length(k)?;
        self.cells.invalidate();
        Ok(())
    }

    /// Widen the working range back to the valid length.
    pub fn reset_working_length(&mut self) {
        self.index.reset_working_length();
        self.cells.invalidate();
    }

    /// Snapshot of the cumulative counters.
    pub fn metrics(&self) -> EngineMetrics {
        EngineMetrics {
            partition_rebuilds: self.cells.rebuild_count(),
            ..self.metrics.clone()
        }
    }

    // ── Attributes ─────────────────────────────────────────────

    /// The attribute store.
    pub fn attributes(&self) -> &AttributeStore {
        &self.store
    }

    /// Current values of a scalar attribute, one per slot.
    ///
    /// # Errors
    ///
    /// [`ParticleError::UnknownAttribute`] for unregistered names.
    pub fn get(&self, name: &str) -> Result<&[f64], ParticleError> {
        self.store.get(name)
    }

    /// Mutable values of a scalar attribute. Call
    /// [`mark_updated`](Self::mark_updated) after writing.
    ///
    /// # Errors
    ///
    /// [`ParticleError::UnknownAttribute`] for unregistered names.
    pub fn get_mut(&mut self, name: &str) -> Result<&mut [f64], ParticleError> {
        self.store.get_mut(name)
    }

    /// Multiplicities, one per slot.
    pub fn multiplicity(&self) -> &[u64] {
        self.store.multiplicity()
    }

    /// Mutable multiplicities. Call `mark_updated("n")` after writing.
    pub fn multiplicity_mut(&mut self) -> &mut [u64] {
        self.store.multiplicity_mut()
    }

    /// Mesh and per-particle location, if the set is spatial.
    pub fn spatial(&self) -> Option<&Spatial> {
        self.store.spatial()
    }

    /// Mutable spatial attributes. Mark `"cell origin"` or
    /// `"position in cell"` updated after writing, and call
    /// [`recalculate_cell_id`](Self::recalculate_cell_id) once origins
    /// have moved.
    pub fn spatial_mut(&mut self) -> Option<&mut Spatial> {
        self.store.spatial_mut()
    }

    /// Cell id of every slot.
    pub fn cell_id(&self) -> &[usize] {
        self.store.cell_id()
    }

    /// Whether `name` is registered, reserved names included.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.store.has_attribute(name)
    }

    /// Record an external write to `name`.
    ///
    /// Writing `"n"` re-checks the valid range for zero multiplicities;
    /// writing `"cell id"` invalidates the partition.
    ///
    /// # Errors
    ///
    /// [`ParticleError::UnknownAttribute`] for unregistered names.
    pub fn mark_updated(&mut self, name: &str) -> Result<(), ParticleError> {
        self.store.mark_updated(name)?;
        match name {
            MULTIPLICITY => {
                let n = self.store.multiplicity();
                if self.index.valid_slice().iter().any(|&i| n[i] == 0) {
                    self.healthy = false;
                }
            }
            CELL_ID => self.cells.invalidate(),
            _ => {}
        }
        Ok(())
    }

    /// Version counter of `name`.
    ///
    /// # Errors
    ///
    /// [`ParticleError::UnknownAttribute`] for unregistered names.
    pub fn version(&self, name: &str) -> Result<u64, ParticleError> {
        self.store.version(name)
    }

    /// Whether a derived attribute lags its inputs.
    ///
    /// # Errors
    ///
    /// [`ParticleError::UnknownAttribute`] for unregistered names.
    pub fn is_stale(&self, name: &str) -> Result<bool, ParticleError> {
        self.store.is_stale(name)
    }

    /// Re-evaluate derived attributes over the working range.
    pub fn recompute_derived(&mut self) -> usize {
        self.store.recompute_derived(self.index.as_slice())
    }

    // ── Ordering ───────────────────────────────────────────────

    /// The cell partition of the working range, rebuilt if stale.
    ///
    /// # Errors
    ///
    /// [`ParticleError::InvariantViolation`] if the set is unhealthy or a
    /// cell id is out of range.
    pub fn cell_start(&mut self) -> Result<&[usize], ParticleError> {
        self.require_healthy("cell_start")?;
        self.cells
            .cell_start(self.backend.as_ref(), self.store.cell_id(), &mut self.index)
    }

    /// Shuffle the working range with one `u01` value per position.
    ///
    /// With `local` the shuffle stays within each cell and the partition
    /// survives; otherwise it is invalidated.
    ///
    /// # Errors
    ///
    /// [`ParticleError::InvariantViolation`] if the set is unhealthy or
    /// `u01` is too short.
    pub fn permutation(&mut self, u01: &[f64], local: bool) -> Result<(), ParticleError> {
        self.require_healthy("permutation")?;
        let backend = self.backend.as_ref();
        if local {
            let cell_start =
                self.cells
                    .cell_start(backend, self.store.cell_id(), &mut self.index)?;
            self.index
                .shuffle(backend, u01, ShuffleScope::PerCell(cell_start))
        } else {
            self.index.shuffle(backend, u01, ShuffleScope::Global)?;
            self.cells.invalidate();
            Ok(())
        }
    }

    /// Mark the first position of every pair in the sorted partition.
    ///
    /// # Errors
    ///
    /// [`ParticleError::InvariantViolation`] if the set is unhealthy or
    /// the mask is shorter than the working range.
    pub fn find_pairs(&mut self, is_first_in_pair: &mut [bool]) -> Result<(), ParticleError> {
        self.require_healthy("find_pairs")?;
        let backend = self.backend.as_ref();
        let cell_start = self
            .cells
            .cell_start(backend, self.store.cell_id(), &mut self.index)?;
        backend.find_pairs(is_first_in_pair, cell_start)
    }

    /// End of the working range for adaptive time-stepping.
    ///
    /// `dt_left` holds the time each cell still has to integrate. Returns
    /// `cell_start[c + 1]` of the last cell with time left, or 0 once
    /// every cell is done; pass it to
    /// [`set_working_length`](Self::set_working_length) to restrict the
    /// next collision step to cells still in progress.
    ///
    /// # Errors
    ///
    /// [`ParticleError::InvariantViolation`] if the set is unhealthy or
    /// `dt_left` does not hold one value per cell.
    pub fn adaptive_sdm_end(&mut self, dt_left: &[f64]) -> Result<usize, ParticleError> {
        self.require_healthy("adaptive_sdm_end")?;
        let backend = self.backend.as_ref();
        let cell_start = self
            .cells
            .cell_start(backend, self.store.cell_id(), &mut self.index)?;
        backend.adaptive_sdm_end(dt_left, cell_start)
    }

    /// Order each pair so its first member has the larger `name`;
    /// `"n"` selects multiplicity.
    ///
    /// # Errors
    ///
    /// [`ParticleError::UnknownAttribute`] for unregistered names;
    /// [`ParticleError::InvariantViolation`] for a malformed mask or an
    /// unhealthy set.
    pub fn sort_within_pair_by_attr(
        &mut self,
        is_first_in_pair: &[bool],
        name: &str,
    ) -> Result<(), ParticleError> {
        self.require_healthy("sort_within_pair_by_attr")?;
        let key = if name == MULTIPLICITY {
            SortKey::Multiplicity(self.store.multiplicity())
        } else {
            SortKey::Values(self.store.get(name)?)
        };
        self.index
            .sort_within_pairs(self.backend.as_ref(), is_first_in_pair, key)
    }

    /// Recompute cell ids of every live slot in the valid range from the
    /// spatial attributes, past a cut working length too. Slots with zero
    /// multiplicity keep their ids, so precipitated origins below the
    /// mesh are never checked.
    ///
    /// Returns `false` without touching anything when the set has no
    /// spatial attributes.
    ///
    /// # Errors
    ///
    /// [`ParticleError::InvariantViolation`] if an origin lies outside
    /// the mesh.
    pub fn recalculate_cell_id(&mut self) -> Result<bool, ParticleError> {
        let n = self.store.multiplicity();
        let live: Vec<usize> = self
            .index
            .valid_slice()
            .iter()
            .copied()
            .filter(|&i| n[i] > 0)
            .collect();
        let (cell_id, spatial) = self.store.cell_id_and_spatial();
        let Some(spatial) = spatial else {
            return Ok(false);
        };
        self.backend.cell_id(
            cell_id,
            &live,
            &spatial.cell_origin,
            &spatial.mesh().strides(),
            spatial.mesh().grid(),
        )?;
        self.store.mark_updated(CELL_ID)?;
        self.cells.invalidate();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drizzle_backend::SerialBackend;
    use drizzle_core::attribute::{CELL_ORIGIN, POSITION_IN_CELL};
    use drizzle_core::MergeRule;
    use drizzle_store::Mesh;

    fn set(n: Vec<u64>, cell_id: Vec<usize>, n_cells: usize) -> ParticleSet {
        let len = n.len();
        ParticleSet::builder()
            .multiplicity(n)
            .cell_id(cell_id)
            .n_cells(n_cells)
            .extensive("volume", (1..=len).map(|v| v as f64).collect())
            .backend(Box::new(SerialBackend::new()))
            .build()
            .unwrap()
    }

    #[test]
    fn attribute_contract() {
        let mut p = set(vec![1, 1], vec![0, 0], 1);
        assert!(p.has_attribute("volume"));
        assert!(p.has_attribute("n"));
        assert!(!p.has_attribute("radius"));
        assert_eq!(p.get("volume").unwrap(), &[1.0, 2.0]);
        assert_eq!(
            p.get("radius").unwrap_err(),
            ParticleError::unknown("radius")
        );
        p.get_mut("volume").unwrap()[0] = 5.0;
        p.mark_updated("volume").unwrap();
        assert_eq!(p.version("volume").unwrap(), 1);
        assert!(!p.get("radius").unwrap_err().is_fatal());
    }

    #[test]
    fn working_length_is_bounded_by_valid_length() {
        let mut p = set(vec![1; 4], vec![0; 4], 1);
        p.set_working_length(2).unwrap();
        assert_eq!(p.sd_num().unwrap(), 2);
        assert_eq!(p.index(), &[0, 1]);
        assert_eq!(
            p.set_working_length(5).unwrap_err(),
            ParticleError::Range {
                requested: 5,
                valid: 4
            }
        );
        p.reset_working_length();
        assert_eq!(p.sd_num().unwrap(), 4);
    }

    #[test]
    fn cell_start_is_cached_until_invalidated() {
        let mut p = set(vec![1; 5], vec![2, 0, 1, 0, 2], 3);
        assert_eq!(p.cell_start().unwrap(), &[0, 2, 3, 5]);
        assert_eq!(p.index(), &[1, 3, 2, 0, 4]);
        p.cell_start().unwrap();
        assert_eq!(p.metrics().partition_rebuilds, 1);
        p.set_working_length(5).unwrap();
        p.cell_start().unwrap();
        assert_eq!(p.metrics().partition_rebuilds, 2);
    }

    #[test]
    fn local_permutation_keeps_partition() {
        let mut p = set(vec![1; 6], vec![1, 0, 1, 0, 1, 0], 2);
        let before = p.cell_start().unwrap().to_vec();
        p.permutation(&[0.9, 0.1, 0.5, 0.3, 0.7, 0.2], true).unwrap();
        assert_eq!(p.cells.cached(), Some(before.as_slice()));
        for k in 0..3 {
            assert_eq!(p.cell_id()[p.index()[k]], 0);
        }
        for k in 3..6 {
            assert_eq!(p.cell_id()[p.index()[k]], 1);
        }
    }

    #[test]
    fn global_permutation_invalidates_partition() {
        let mut p = set(vec![1; 4], vec![0, 1, 0, 1], 2);
        p.cell_start().unwrap();
        p.permutation(&[0.5; 4], false).unwrap();
        assert!(!p.cells.is_sorted());
        let mut seen = p.index().to_vec();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[test]
    fn short_u01_is_fatal() {
        let mut p = set(vec![1; 4], vec![0; 4], 1);
        let err = p.permutation(&[0.5; 3], false).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn pairs_follow_the_partition() {
        let mut p = set(vec![1; 5], vec![0, 0, 0, 1, 1], 2);
        let mut mask = vec![true; 5];
        p.find_pairs(&mut mask).unwrap();
        assert_eq!(mask, vec![true, false, false, true, false]);
    }

    #[test]
    fn sort_within_pair_by_multiplicity_and_attribute() {
        let mut p = set(vec![1, 9, 4, 2], vec![0; 4], 1);
        let mask = [true, false, true, false];
        p.sort_within_pair_by_attr(&mask, "n").unwrap();
        assert_eq!(p.index(), &[1, 0, 2, 3]);
        p.sort_within_pair_by_attr(&mask, "volume").unwrap();
        assert_eq!(p.index(), &[1, 0, 3, 2]);
        assert!(matches!(
            p.sort_within_pair_by_attr(&mask, "radius"),
            Err(ParticleError::UnknownAttribute { .. })
        ));
    }

    #[test]
    fn zero_multiplicity_write_makes_set_unhealthy() {
        let mut p = set(vec![2, 3], vec![0, 0], 1);
        p.multiplicity_mut()[1] = 0;
        p.mark_updated("n").unwrap();
        assert!(!p.is_healthy());
        let err = p.sd_num().unwrap_err();
        assert!(matches!(
            err,
            ParticleError::InvariantViolation {
                operation: "sd_num",
                ..
            }
        ));
        assert!(p.cell_start().is_err());
        assert!(p.permutation(&[0.0; 2], false).is_err());
    }

    #[test]
    fn cell_ids_follow_cell_origin() {
        let mut p = ParticleSet::builder()
            .multiplicity(vec![1, 1, 1])
            .extensive("volume", vec![1.0; 3])
            .intensive("t", MergeRule::weighted_mean("volume"), vec![0.0; 3])
            .mesh(
                Mesh::new(&[2, 2]).unwrap(),
                vec![vec![0, 1, 1], vec![0, 0, 1]],
                vec![vec![0.5; 3], vec![0.5; 3]],
            )
            .backend(Box::new(SerialBackend::new()))
            .build()
            .unwrap();
        assert!(p.has_attribute(CELL_ORIGIN));
        assert!(p.has_attribute(POSITION_IN_CELL));
        assert_eq!(p.cell_id(), &[0, 2, 3]);
        p.cell_start().unwrap();

        p.spatial_mut().unwrap().cell_origin.set(0, 0, 1);
        p.mark_updated(CELL_ORIGIN).unwrap();
        assert!(p.recalculate_cell_id().unwrap());
        assert_eq!(p.cell_id(), &[2, 2, 3]);
        assert!(!p.cells.is_sorted());
        assert_eq!(p.version("cell id").unwrap(), 1);
    }

    #[test]
    fn zero_past_working_length_makes_set_unhealthy() {
        let mut p = set(vec![4, 2, 3], vec![0; 3], 1);
        p.set_working_length(1).unwrap();
        p.multiplicity_mut()[2] = 0;
        p.mark_updated("n").unwrap();
        assert!(!p.is_healthy());
        p.reset_working_length();
        assert!(p.sd_num().is_err());
        assert_eq!(p.sanitize(), 1);
        assert_eq!(p.index(), &[0, 1]);
    }

    fn column(origin: Vec<i64>) -> ParticleSet {
        let len = origin.len();
        ParticleSet::builder()
            .multiplicity(vec![1; len])
            .extensive("volume", vec![1.0; len])
            .mesh(Mesh::new(&[2]).unwrap(), vec![origin], vec![vec![0.5; len]])
            .backend(Box::new(SerialBackend::new()))
            .build()
            .unwrap()
    }

    #[test]
    fn cell_ids_are_recomputed_past_working_length() {
        let mut p = column(vec![0, 0]);
        p.set_working_length(1).unwrap();
        p.spatial_mut().unwrap().cell_origin.set(0, 1, 1);
        p.mark_updated(CELL_ORIGIN).unwrap();
        assert!(p.recalculate_cell_id().unwrap());
        assert_eq!(p.cell_id(), &[0, 1]);
        p.reset_working_length();
        assert_eq!(p.cell_start().unwrap(), &[0, 1, 2]);
    }

    #[test]
    fn dead_slots_keep_their_cell_ids() {
        let mut p = column(vec![1, 1]);
        p.multiplicity_mut()[0] = 0;
        p.mark_updated("n").unwrap();
        p.spatial_mut().unwrap().cell_origin.set(0, 0, -3);
        p.spatial_mut().unwrap().cell_origin.set(0, 1, 0);
        assert!(p.recalculate_cell_id().unwrap());
        assert_eq!(p.cell_id(), &[1, 0]);
    }

    #[test]
    fn adaptive_end_restricts_working_range() {
        let mut p = set(vec![1; 6], vec![2, 0, 1, 0, 2, 1], 3);
        assert_eq!(p.adaptive_sdm_end(&[0.5, 0.2, 0.0]).unwrap(), 4);
        let end = p.adaptive_sdm_end(&[0.5, 0.0, 0.0]).unwrap();
        assert_eq!(end, 2);
        p.set_working_length(end).unwrap();
        assert_eq!(p.sd_num().unwrap(), 2);
        assert!(p.index().iter().all(|&i| p.cell_id()[i] == 0));
        assert_eq!(p.cell_start().unwrap(), &[0, 2, 2, 2]);

        p.reset_working_length();
        assert_eq!(p.adaptive_sdm_end(&[0.0; 3]).unwrap(), 0);
        assert!(p.adaptive_sdm_end(&[1.0; 2]).unwrap_err().is_fatal());
    }

    #[test]
    fn recalculate_without_mesh_is_a_no_op() {
        let mut p = set(vec![1, 1], vec![0, 0], 1);
        assert!(!p.recalculate_cell_id().unwrap());
        assert_eq!(p.version("cell id").unwrap(), 0);
    }
}
