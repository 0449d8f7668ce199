//! Per-cell statistical moments of particle attributes.
//!
//! A [`MomentRequest`] names attributes and the ranks wanted for each,
//! in insertion order. [`Moments`] is the caller-owned output sized for
//! one request; it is reused across calls so the hot path allocates
//! nothing.
//!
//! For a weighting attribute `w` and range `[lo, hi)`, cell `c` gets
//! `moment_0[c] = Σ n` over its particles with `w` in range, and every
//! `(attribute, rank)` term gets `Σ n · a^rank / moment_0[c]`. Cells with
//! no particle in range report
//! [`EMPTY_CELL_MOMENT`](drizzle_core::EMPTY_CELL_MOMENT) for every term.

use std::cmp::Ordering;

use indexmap::IndexMap;
use smallvec::SmallVec;

use drizzle_core::{MomentArgs, MomentTerm, ParticleError, Stack};

use crate::particles::ParticleSet;

/// Attributes and ranks to compute, in insertion order.
///
/// ```
/// use drizzle_engine::MomentRequest;
///
/// let request = MomentRequest::new()
///     .ranks("volume", &[0, 1, 2])
///     .rank("temperature", 1);
/// assert_eq!(request.n_terms(), 4);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MomentRequest {
    specs: IndexMap<String, SmallVec<[i32; 4]>>,
}

impl MomentRequest {
    /// An empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one rank for `attribute`.
    pub fn rank(mut self, attribute: impl Into<String>, rank: i32) -> Self {
        self.specs.entry(attribute.into()).or_default().push(rank);
        self
    }

    /// Add several ranks for `attribute`.
    pub fn ranks(mut self, attribute: impl Into<String>, ranks: &[i32]) -> Self {
        self.specs
            .entry(attribute.into())
            .or_default()
            .extend_from_slice(ranks);
        self
    }

    /// Total number of `(attribute, rank)` terms.
    pub fn n_terms(&self) -> usize {
        self.specs.values().map(|r| r.len()).sum()
    }

    /// Whether no terms were requested.
    pub fn is_empty(&self) -> bool {
        self.n_terms() == 0
    }

    /// Every `(attribute, rank)` term in output order.
    pub fn terms(&self) -> impl Iterator<Item = (&str, i32)> + '_ {
        self.specs
            .iter()
            .flat_map(|(name, ranks)| ranks.iter().map(move |&r| (name.as_str(), r)))
    }
}

/// Output buffers for one [`MomentRequest`].
#[derive(Clone, Debug, PartialEq)]
pub struct Moments {
    moment_0: Vec<f64>,
    values: Stack<f64>,
    labels: Vec<(String, i32)>,
}

impl Moments {
    /// Buffers sized for `request` over `n_cells` cells.
    pub fn for_request(request: &MomentRequest, n_cells: usize) -> Self {
        let labels: Vec<(String, i32)> = request
            .terms()
            .map(|(name, rank)| (name.to_string(), rank))
            .collect();
        Self {
            moment_0: vec![0.0; n_cells],
            values: Stack::zeros(labels.len(), n_cells),
            labels,
        }
    }

    /// Number of cells covered.
    pub fn n_cells(&self) -> usize {
        self.moment_0.len()
    }

    /// Summed multiplicity per cell.
    pub fn moment_0(&self) -> &[f64] {
        &self.moment_0
    }

    /// One row per term, one column per cell.
    pub fn values(&self) -> &Stack<f64> {
        &self.values
    }

    /// Per-cell values of one term.
    pub fn get(&self, attribute: &str, rank: i32) -> Option<&[f64]> {
        self.labels
            .iter()
            .position(|(name, r)| name == attribute && *r == rank)
            .map(|row| self.values.row(row))
    }

    fn matches(&self, request: &MomentRequest) -> bool {
        self.labels.len() == request.n_terms()
            && self
                .labels
                .iter()
                .zip(request.terms())
                .all(|((name, rank), (n, r))| name == n && *rank == r)
    }
}

impl ParticleSet {
    /// Fill `out` with the moments of `request`, counting only particles
    /// whose `weighting` attribute lies in `[range.0, range.1)`.
    ///
    /// # Errors
    ///
    /// [`ParticleError::UnknownAttribute`] if the weighting or a requested
    /// attribute is not registered. [`ParticleError::InvariantViolation`]
    /// if the set is unhealthy or `out` was sized for another request or
    /// cell count.
    pub fn moments(
        &mut self,
        out: &mut Moments,
        request: &MomentRequest,
        weighting: &str,
        range: (f64, f64),
    ) -> Result<(), ParticleError> {
        self.require_healthy("moments")?;
        let terms = request
            .terms()
            .map(|(name, rank)| {
                let (group, row) = self
                    .store
                    .slot(name)
                    .ok_or_else(|| ParticleError::unknown(name))?;
                Ok(MomentTerm { group, row, rank })
            })
            .collect::<Result<SmallVec<[MomentTerm; 8]>, ParticleError>>()?;
        if !out.matches(request) {
            return Err(ParticleError::invariant(
                "moments",
                "output buffers were sized for a different request",
            ));
        }
        let weighting = self.store.get(weighting)?;

        let backend = self.backend.as_ref();
        let cell_start = self
            .cells
            .cell_start(backend, self.store.cell_id(), &mut self.index)?;
        let args = MomentArgs {
            n: self.store.multiplicity(),
            extensive: self.store.extensive(),
            intensive: self.store.intensive(),
            idx: self.index.as_slice(),
            cell_start,
            terms: &terms,
            range,
            weighting,
        };
        backend.moments(args, &mut out.moment_0, &mut out.values)
    }

    /// Moments over consecutive bins of the weighting attribute:
    /// `out[b]` covers `[edges[b], edges[b + 1])`.
    ///
    /// # Errors
    ///
    /// As [`moments`](Self::moments), plus
    /// [`ParticleError::InvariantViolation`] unless
    /// `out.len() + 1 == edges.len()` and the edges are increasing.
    pub fn spectrum_moments(
        &mut self,
        out: &mut [Moments],
        request: &MomentRequest,
        weighting: &str,
        edges: &[f64],
    ) -> Result<(), ParticleError> {
        if edges.len() != out.len() + 1 {
            return Err(ParticleError::invariant(
                "spectrum_moments",
                format!("{} bin edges for {} bins", edges.len(), out.len()),
            ));
        }
        if edges
            .windows(2)
            .any(|w| w[0].partial_cmp(&w[1]) != Some(Ordering::Less))
        {
            return Err(ParticleError::invariant(
                "spectrum_moments",
                "bin edges must be strictly increasing",
            ));
        }
        for (bin, w) in out.iter_mut().zip(edges.windows(2)) {
            self.moments(bin, request, weighting, (w[0], w[1]))?;
        }
        Ok(())
    }
}
