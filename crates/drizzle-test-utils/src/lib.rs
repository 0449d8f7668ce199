//! Test fixtures and helpers for drizzle development.
//!
//! [`fixtures`] builds representative particle sets, [`conformance`]
//! runs a workload across backends, and the free functions here compute
//! the conserved quantities tests assert on and run one full collision
//! step.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod conformance;
pub mod fixtures;

use drizzle_core::{CoalescenceOutcome, ParticleError};
use drizzle_engine::{ParticleSet, UniformSource};

/// `Σ n · a` over the working range.
pub fn total_extensive(particles: &ParticleSet, name: &str) -> f64 {
    let values = particles.get(name).expect("fixture attribute");
    let n = particles.multiplicity();
    particles
        .index()
        .iter()
        .map(|&i| n[i] as f64 * values[i])
        .sum()
}

/// `Σ n` over the working range.
pub fn total_multiplicity(particles: &ParticleSet) -> u64 {
    let n = particles.multiplicity();
    particles.index().iter().map(|&i| n[i]).sum()
}

/// Shuffle within cells, pair neighbours, order each pair by
/// multiplicity, and coalesce with `gamma` drawn from `rng` scaled by
/// `gamma_scale`.
pub fn collision_step(
    particles: &mut ParticleSet,
    rng: &mut UniformSource,
    gamma_scale: f64,
) -> Result<CoalescenceOutcome, ParticleError> {
    let n_sd = particles.n_sd();
    particles.permutation(&rng.sample(n_sd), true)?;
    let mut pairs = vec![false; n_sd];
    particles.find_pairs(&mut pairs)?;
    particles.sort_within_pair_by_attr(&pairs, "n")?;
    let gamma: Vec<f64> = rng
        .sample(n_sd)
        .into_iter()
        .map(|u| (u * gamma_scale).floor())
        .collect();
    particles.coalescence(&gamma, &pairs)
}
