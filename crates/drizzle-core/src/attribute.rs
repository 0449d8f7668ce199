//! Attribute descriptors, groups, and merge rules.
//!
//! Attributes are declared once, at particle-set construction, as
//! [`AttrDef`] values. The store resolves every descriptor into a fixed
//! row of the extensive or intensive [`Stack`](crate::Stack), and every
//! [`MergeRule`] into a [`SlotRule`] over extensive rows, so kernels never
//! look names up inside per-particle loops.

use smallvec::SmallVec;

/// Multiplicity of each super-particle.
pub const MULTIPLICITY: &str = "n";
/// Discrete cell id of each super-particle.
pub const CELL_ID: &str = "cell id";
/// Integer cell origin, one row per mesh dimension.
pub const CELL_ORIGIN: &str = "cell origin";
/// Fractional position within the cell, one row per mesh dimension.
pub const POSITION_IN_CELL: &str = "position in cell";
/// Per-droplet volume. Must be extensive; used for precipitation flux.
pub const VOLUME: &str = "volume";

/// Names that cannot be declared as extensive or intensive attributes.
pub const RESERVED: [&str; 4] = [MULTIPLICITY, CELL_ID, CELL_ORIGIN, POSITION_IN_CELL];

/// Which stacked buffer an attribute lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttrGroup {
    /// Additive under merge.
    Extensive,
    /// Averaged or recomputed under merge.
    Intensive,
}

/// How an intensive attribute is recombined when two particles merge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MergeRule {
    /// Mean of both parents, weighted by `gamma_eff · weight_i` and
    /// `weight_j`. Blended inside the coalescence kernel.
    WeightedMean {
        /// Extensive attribute supplying the weights.
        weight: String,
    },
    /// `numerator / denominator`, recomputed by the derived pass after
    /// any kernel touches the extensive group. Zero when the denominator
    /// is zero.
    Ratio {
        /// Extensive numerator.
        numerator: String,
        /// Extensive denominator.
        denominator: String,
    },
}

impl MergeRule {
    /// Weighted-mean rule over the given extensive attribute.
    pub fn weighted_mean(weight: impl Into<String>) -> Self {
        Self::WeightedMean {
            weight: weight.into(),
        }
    }

    /// Ratio rule `numerator / denominator`.
    pub fn ratio(numerator: impl Into<String>, denominator: impl Into<String>) -> Self {
        Self::Ratio {
            numerator: numerator.into(),
            denominator: denominator.into(),
        }
    }

    /// Extensive attributes this rule reads.
    pub fn dependencies(&self) -> SmallVec<[&str; 2]> {
        match self {
            Self::WeightedMean { weight } => SmallVec::from_slice(&[weight.as_str()]),
            Self::Ratio {
                numerator,
                denominator,
            } => SmallVec::from_slice(&[numerator.as_str(), denominator.as_str()]),
        }
    }
}

/// Kind of a declared attribute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttrKind {
    /// Lives in the extensive stack.
    Extensive,
    /// Lives in the intensive stack and merges by the given rule.
    Intensive(MergeRule),
}

/// Declaration of a per-particle scalar attribute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttrDef {
    /// Attribute name, unique within a particle set.
    pub name: String,
    /// Group and merge behaviour.
    pub kind: AttrKind,
}

impl AttrDef {
    /// Declare an extensive attribute.
    pub fn extensive(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: AttrKind::Extensive,
        }
    }

    /// Declare an intensive attribute with its merge rule.
    pub fn intensive(name: impl Into<String>, rule: MergeRule) -> Self {
        Self {
            name: name.into(),
            kind: AttrKind::Intensive(rule),
        }
    }

    /// The stack this attribute is stored in.
    pub fn group(&self) -> AttrGroup {
        match self.kind {
            AttrKind::Extensive => AttrGroup::Extensive,
            AttrKind::Intensive(_) => AttrGroup::Intensive,
        }
    }
}

/// A [`MergeRule`] resolved to extensive row positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotRule {
    /// Blend weighted by extensive row `weight`.
    WeightedMean {
        /// Extensive row of the weight attribute.
        weight: usize,
    },
    /// Recompute as `numerator / denominator` extensive rows.
    Ratio {
        /// Extensive row of the numerator.
        numerator: usize,
        /// Extensive row of the denominator.
        denominator: usize,
    },
}

impl SlotRule {
    /// The weight row if this rule is blended inside the kernel.
    pub fn weight(&self) -> Option<usize> {
        match *self {
            Self::WeightedMean { weight } => Some(weight),
            Self::Ratio { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_depends_on_both_operands() {
        let rule = MergeRule::ratio("moles_S", "volume");
        assert_eq!(rule.dependencies().as_slice(), &["moles_S", "volume"]);
    }

    #[test]
    fn group_follows_kind() {
        assert_eq!(AttrDef::extensive("volume").group(), AttrGroup::Extensive);
        let def = AttrDef::intensive("temperature", MergeRule::weighted_mean("volume"));
        assert_eq!(def.group(), AttrGroup::Intensive);
    }

    #[test]
    fn only_weighted_mean_is_blended_in_kernel() {
        assert_eq!(SlotRule::WeightedMean { weight: 2 }.weight(), Some(2));
        assert_eq!(
            SlotRule::Ratio {
                numerator: 0,
                denominator: 1
            }
            .weight(),
            None
        );
    }
}
