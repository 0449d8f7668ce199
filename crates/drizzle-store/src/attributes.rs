//! Named per-particle attribute buffers.
//!
//! [`AttributeStore`] owns every per-particle buffer of a particle set.
//! Scalar attributes are grouped into an extensive and an intensive
//! [`Stack`], each with an insertion-ordered name → row map that is fixed
//! once the store is built. Every attribute also carries a version counter
//! bumped by [`mark_updated`](AttributeStore::mark_updated); derived
//! intensive rows remember the versions they were computed from so
//! consumers can tell when recomputation is owed.

use indexmap::IndexMap;

use drizzle_core::attribute::{CELL_ID, CELL_ORIGIN, MULTIPLICITY, POSITION_IN_CELL, VOLUME};
use drizzle_core::{
    AttrDef, AttrGroup, AttrKind, CoalescenceArgs, MergeRule, ParticleError,
    PrecipitationArgs, SlotRule, Stack,
};

use crate::spatial::Spatial;

/// Per-particle buffers of one particle set.
#[derive(Clone, Debug)]
pub struct AttributeStore {
    n: Vec<u64>,
    cell_id: Vec<usize>,
    extensive: Stack<f64>,
    intensive: Stack<f64>,
    extensive_keys: IndexMap<String, usize>,
    intensive_keys: IndexMap<String, usize>,
    intensive_rules: Vec<SlotRule>,
    /// `(numerator, denominator)` versions each ratio row was computed at.
    ratio_inputs: Vec<Option<(u64, u64)>>,
    spatial: Option<Spatial>,
    versions: IndexMap<String, u64>,
}

impl AttributeStore {
    /// Build a store over `n.len()` slots.
    ///
    /// Merge rules are resolved to extensive rows here. Ratio rows are not
    /// evaluated; call [`recompute_derived`](Self::recompute_derived).
    ///
    /// # Errors
    ///
    /// [`ParticleError::UnknownAttribute`] if a merge rule names an
    /// attribute that is not extensive; [`ParticleError::InvariantViolation`]
    /// on length mismatches or duplicate names.
    pub fn new(
        n: Vec<u64>,
        cell_id: Vec<usize>,
        attributes: Vec<(AttrDef, Vec<f64>)>,
        spatial: Option<Spatial>,
    ) -> Result<Self, ParticleError> {
        let n_sd = n.len();
        if cell_id.len() != n_sd {
            return Err(ParticleError::invariant(
                "build",
                format!("{} cell ids for {n_sd} particles", cell_id.len()),
            ));
        }
        if let Some(s) = &spatial {
            if s.cell_origin.cols() != n_sd || s.position_in_cell.cols() != n_sd {
                return Err(ParticleError::invariant(
                    "build",
                    "spatial attributes do not cover every particle",
                ));
            }
        }

        let mut extensive_keys = IndexMap::new();
        let mut intensive_keys = IndexMap::new();
        let mut extensive_rows = Vec::new();
        let mut intensive_rows = Vec::new();
        let mut rules = Vec::new();
        for (def, values) in attributes {
            if values.len() != n_sd {
                return Err(ParticleError::invariant(
                    "build",
                    format!("attribute '{}' has {} values for {n_sd} particles", def.name, values.len()),
                ));
            }
            if extensive_keys.contains_key(&def.name) || intensive_keys.contains_key(&def.name) {
                return Err(ParticleError::invariant(
                    "build",
                    format!("attribute '{}' declared twice", def.name),
                ));
            }
            match def.kind {
                AttrKind::Extensive => {
                    extensive_keys.insert(def.name, extensive_rows.len());
                    extensive_rows.push(values);
                }
                AttrKind::Intensive(rule) => {
                    intensive_keys.insert(def.name, intensive_rows.len());
                    intensive_rows.push(values);
                    rules.push(rule);
                }
            }
        }

        let resolve = |name: &str| {
            extensive_keys
                .get(name)
                .copied()
                .ok_or_else(|| ParticleError::unknown(name))
        };
        let intensive_rules = rules
            .iter()
            .map(|rule| {
                Ok(match rule {
                    MergeRule::WeightedMean { weight } => SlotRule::WeightedMean {
                        weight: resolve(weight)?,
                    },
                    MergeRule::Ratio {
                        numerator,
                        denominator,
                    } => SlotRule::Ratio {
                        numerator: resolve(numerator)?,
                        denominator: resolve(denominator)?,
                    },
                })
            })
            .collect::<Result<Vec<_>, ParticleError>>()?;

        let mut versions = IndexMap::new();
        versions.insert(MULTIPLICITY.to_string(), 0);
        versions.insert(CELL_ID.to_string(), 0);
        if spatial.is_some() {
            versions.insert(CELL_ORIGIN.to_string(), 0);
            versions.insert(POSITION_IN_CELL.to_string(), 0);
        }
        for name in extensive_keys.keys().chain(intensive_keys.keys()) {
            versions.insert(name.clone(), 0);
        }

        // Both stacks were filled from length-checked rows.
        let extensive = Stack::from_rows(n_sd, extensive_rows)
            .ok_or_else(|| ParticleError::invariant("build", "ragged extensive rows"))?;
        let intensive = Stack::from_rows(n_sd, intensive_rows)
            .ok_or_else(|| ParticleError::invariant("build", "ragged intensive rows"))?;

        Ok(Self {
            ratio_inputs: vec![None; intensive_rules.len()],
            n,
            cell_id,
            extensive,
            intensive,
            extensive_keys,
            intensive_keys,
            intensive_rules,
            spatial,
            versions,
        })
    }

    /// Number of particle slots.
    pub fn n_sd(&self) -> usize {
        self.n.len()
    }

    /// Whether `name` is registered, reserved names included.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.versions.contains_key(name)
    }

    /// Group and row of a scalar attribute.
    pub fn slot(&self, name: &str) -> Option<(AttrGroup, usize)> {
        if let Some(&row) = self.extensive_keys.get(name) {
            return Some((AttrGroup::Extensive, row));
        }
        self.intensive_keys
            .get(name)
            .map(|&row| (AttrGroup::Intensive, row))
    }

    /// Current values of a scalar attribute.
    ///
    /// # Errors
    ///
    /// [`ParticleError::UnknownAttribute`] if `name` is not an extensive or
    /// intensive attribute of this store.
    pub fn get(&self, name: &str) -> Result<&[f64], ParticleError> {
        match self.slot(name) {
            Some((AttrGroup::Extensive, row)) => Ok(self.extensive.row(row)),
            Some((AttrGroup::Intensive, row)) => Ok(self.intensive.row(row)),
            None => Err(ParticleError::unknown(name)),
        }
    }

    /// Mutable values of a scalar attribute. The caller must
    /// [`mark_updated`](Self::mark_updated) it after writing.
    pub fn get_mut(&mut self, name: &str) -> Result<&mut [f64], ParticleError> {
        match self.slot(name) {
            Some((AttrGroup::Extensive, row)) => Ok(self.extensive.row_mut(row)),
            Some((AttrGroup::Intensive, row)) => Ok(self.intensive.row_mut(row)),
            None => Err(ParticleError::unknown(name)),
        }
    }

    /// Record that `name` was written.
    pub fn mark_updated(&mut self, name: &str) -> Result<(), ParticleError> {
        let version = self
            .versions
            .get_mut(name)
            .ok_or_else(|| ParticleError::unknown(name))?;
        *version += 1;
        Ok(())
    }

    /// Mark every attribute of a group written.
    pub fn mark_group_updated(&mut self, group: AttrGroup) {
        let keys = match group {
            AttrGroup::Extensive => &self.extensive_keys,
            AttrGroup::Intensive => &self.intensive_keys,
        };
        for name in keys.keys() {
            if let Some(v) = self.versions.get_mut(name) {
                *v += 1;
            }
        }
    }

    /// Mark everything a coalescence kernel writes: multiplicity, every
    /// extensive attribute, and every intensive row blended in the kernel.
    /// Ratio rows are left for [`recompute_derived`](Self::recompute_derived).
    pub fn mark_merged(&mut self) {
        if let Some(v) = self.versions.get_mut(MULTIPLICITY) {
            *v += 1;
        }
        self.mark_group_updated(AttrGroup::Extensive);
        for (name, &row) in &self.intensive_keys {
            if self.intensive_rules[row].weight().is_some() {
                if let Some(v) = self.versions.get_mut(name) {
                    *v += 1;
                }
            }
        }
    }

    /// How many times `name` has been marked updated.
    pub fn version(&self, name: &str) -> Result<u64, ParticleError> {
        self.versions
            .get(name)
            .copied()
            .ok_or_else(|| ParticleError::unknown(name))
    }

    /// Whether a derived intensive attribute lags its inputs. Attributes
    /// that are not derived are never stale.
    pub fn is_stale(&self, name: &str) -> Result<bool, ParticleError> {
        if !self.has_attribute(name) {
            return Err(ParticleError::unknown(name));
        }
        let Some(&row) = self.intensive_keys.get(name) else {
            return Ok(false);
        };
        match self.intensive_rules[row] {
            SlotRule::WeightedMean { .. } => Ok(false),
            SlotRule::Ratio {
                numerator,
                denominator,
            } => Ok(self.ratio_inputs[row]
                != Some((self.extensive_version(numerator), self.extensive_version(denominator)))),
        }
    }

    /// Evaluate every ratio rule over the slots in `idx` and mark the
    /// derived rows updated. Returns the number of rows recomputed.
    pub fn recompute_derived(&mut self, idx: &[usize]) -> usize {
        let mut recomputed = 0;
        for row in 0..self.intensive_rules.len() {
            let SlotRule::Ratio {
                numerator,
                denominator,
            } = self.intensive_rules[row]
            else {
                continue;
            };
            let num = self.extensive.row(numerator);
            let den = self.extensive.row(denominator);
            let values: Vec<(usize, f64)> = idx
                .iter()
                .map(|&i| {
                    let v = if den[i] == 0.0 { 0.0 } else { num[i] / den[i] };
                    (i, v)
                })
                .collect();
            let out = self.intensive.row_mut(row);
            for (i, v) in values {
                out[i] = v;
            }
            self.ratio_inputs[row] = Some((
                self.extensive_version(numerator),
                self.extensive_version(denominator),
            ));
            if let Some((name, _)) = self.intensive_keys.get_index(row) {
                if let Some(v) = self.versions.get_mut(name) {
                    *v += 1;
                }
            }
            recomputed += 1;
        }
        recomputed
    }

    fn extensive_version(&self, row: usize) -> u64 {
        self.extensive_keys
            .get_index(row)
            .and_then(|(name, _)| self.versions.get(name))
            .copied()
            .unwrap_or(0)
    }

    /// Multiplicities.
    pub fn multiplicity(&self) -> &[u64] {
        &self.n
    }

    /// Mutable multiplicities. The caller must mark `"n"` updated.
    pub fn multiplicity_mut(&mut self) -> &mut [u64] {
        &mut self.n
    }

    /// Cell id of every slot.
    pub fn cell_id(&self) -> &[usize] {
        &self.cell_id
    }

    /// Extensive stack.
    pub fn extensive(&self) -> &Stack<f64> {
        &self.extensive
    }

    /// Intensive stack.
    pub fn intensive(&self) -> &Stack<f64> {
        &self.intensive
    }

    /// Extensive name → row map.
    pub fn extensive_keys(&self) -> &IndexMap<String, usize> {
        &self.extensive_keys
    }

    /// Intensive name → row map.
    pub fn intensive_keys(&self) -> &IndexMap<String, usize> {
        &self.intensive_keys
    }

    /// Resolved merge rule of each intensive row.
    pub fn intensive_rules(&self) -> &[SlotRule] {
        &self.intensive_rules
    }

    /// Spatial attributes, if the particle set lives in a mesh.
    pub fn spatial(&self) -> Option<&Spatial> {
        self.spatial.as_ref()
    }

    /// Mutable spatial attributes. Recompute cell ids after moving
    /// particles.
    pub fn spatial_mut(&mut self) -> Option<&mut Spatial> {
        self.spatial.as_mut()
    }

    /// Cell ids alongside the spatial attributes, for the cell-id kernel.
    pub fn cell_id_and_spatial(&mut self) -> (&mut [usize], Option<&Spatial>) {
        (&mut self.cell_id, self.spatial.as_ref())
    }

    /// Borrow the buffers the coalescence kernel works on.
    pub fn coalescence_args<'a>(
        &'a mut self,
        idx: &'a [usize],
        gamma: &'a [f64],
        is_first_in_pair: &'a [bool],
    ) -> CoalescenceArgs<'a> {
        CoalescenceArgs {
            n: &mut self.n,
            extensive: &mut self.extensive,
            intensive: &mut self.intensive,
            intensive_rules: &self.intensive_rules,
            idx,
            gamma,
            is_first_in_pair,
        }
    }

    /// Borrow the buffers the precipitation kernel works on.
    ///
    /// # Errors
    ///
    /// [`ParticleError::UnknownAttribute`] if the store has no spatial
    /// attributes or no `"volume"`.
    pub fn precipitation_args<'a>(
        &'a mut self,
        idx: &'a [usize],
    ) -> Result<PrecipitationArgs<'a>, ParticleError> {
        let row = *self
            .extensive_keys
            .get(VOLUME)
            .ok_or_else(|| ParticleError::unknown(VOLUME))?;
        let spatial = self
            .spatial
            .as_ref()
            .ok_or_else(|| ParticleError::unknown(CELL_ORIGIN))?;
        Ok(PrecipitationArgs {
            cell_origin: &spatial.cell_origin,
            position_in_cell: &spatial.position_in_cell,
            volume: self.extensive.row(row),
            n: &mut self.n,
            idx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> AttributeStore {
        AttributeStore::new(
            vec![1, 2, 3],
            vec![0, 0, 0],
            vec![
                (AttrDef::extensive("volume"), vec![1.0, 2.0, 4.0]),
                (AttrDef::extensive("moles_S"), vec![3.0, 3.0, 0.0]),
                (
                    AttrDef::intensive("conc_S", MergeRule::ratio("moles_S", "volume")),
                    vec![0.0; 3],
                ),
                (
                    AttrDef::intensive("temperature", MergeRule::weighted_mean("volume")),
                    vec![280.0; 3],
                ),
            ],
            None,
        )
        .unwrap()
    }

    #[test]
    fn slot_maps_follow_declaration_order() {
        let s = store();
        assert_eq!(s.slot("volume"), Some((AttrGroup::Extensive, 0)));
        assert_eq!(s.slot("moles_S"), Some((AttrGroup::Extensive, 1)));
        assert_eq!(s.slot("temperature"), Some((AttrGroup::Intensive, 1)));
        assert_eq!(
            s.intensive_rules(),
            &[
                SlotRule::Ratio {
                    numerator: 1,
                    denominator: 0
                },
                SlotRule::WeightedMean { weight: 0 }
            ]
        );
    }

    #[test]
    fn unknown_names_are_reported() {
        let s = store();
        assert_eq!(
            s.get("radius").unwrap_err(),
            ParticleError::unknown("radius")
        );
        assert!(!s.has_attribute("cell origin"));
        assert!(s.has_attribute("n"));
        assert!(s.has_attribute("cell id"));
    }

    #[test]
    fn rules_must_reference_extensive_attributes() {
        let err = AttributeStore::new(
            vec![1],
            vec![0],
            vec![(
                AttrDef::intensive("conc", MergeRule::ratio("moles", "volume")),
                vec![0.0],
            )],
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ParticleError::UnknownAttribute { .. }));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = AttributeStore::new(
            vec![1],
            vec![0],
            vec![
                (AttrDef::extensive("volume"), vec![1.0]),
                (
                    AttrDef::intensive("volume", MergeRule::weighted_mean("volume")),
                    vec![1.0],
                ),
            ],
            None,
        )
        .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn ratio_rows_track_staleness() {
        let mut s = store();
        assert!(s.is_stale("conc_S").unwrap());
        assert_eq!(s.recompute_derived(&[0, 1, 2]), 1);
        assert!(!s.is_stale("conc_S").unwrap());
        assert_eq!(s.get("conc_S").unwrap(), &[3.0, 1.5, 0.0]);

        s.get_mut("volume").unwrap()[0] = 3.0;
        s.mark_updated("volume").unwrap();
        assert!(s.is_stale("conc_S").unwrap());
        assert!(!s.is_stale("temperature").unwrap());
    }

    #[test]
    fn mark_updated_bumps_versions() {
        let mut s = store();
        assert_eq!(s.version("n").unwrap(), 0);
        s.mark_updated("n").unwrap();
        s.mark_group_updated(AttrGroup::Extensive);
        assert_eq!(s.version("n").unwrap(), 1);
        assert_eq!(s.version("moles_S").unwrap(), 1);
        assert_eq!(s.version("temperature").unwrap(), 0);
        assert!(s.mark_updated("radius").is_err());
    }

    #[test]
    fn mark_merged_skips_ratio_rows() {
        let mut s = store();
        s.mark_merged();
        assert_eq!(s.version("n").unwrap(), 1);
        assert_eq!(s.version("volume").unwrap(), 1);
        assert_eq!(s.version("temperature").unwrap(), 1);
        assert_eq!(s.version("conc_S").unwrap(), 0);
    }

    #[test]
    fn precipitation_needs_spatial_attributes() {
        let mut s = store();
        let err = s.precipitation_args(&[0]).unwrap_err();
        assert_eq!(err, ParticleError::unknown("cell origin"));
    }

    #[test]
    fn zero_denominator_yields_zero() {
        let mut s = AttributeStore::new(
            vec![1],
            vec![0],
            vec![
                (AttrDef::extensive("volume"), vec![0.0]),
                (AttrDef::extensive("moles"), vec![2.0]),
                (
                    AttrDef::intensive("conc", MergeRule::ratio("moles", "volume")),
                    vec![9.0],
                ),
            ],
            None,
        )
        .unwrap();
        s.recompute_derived(&[0]);
        assert_eq!(s.get("conc").unwrap(), &[0.0]);
    }
}
