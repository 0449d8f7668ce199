//! Benchmark profiles for the drizzle super-droplet engine.
//!
//! - [`reference_profile`]: 65 536 droplets over a 16x16 mesh
//! - [`stress_profile`]: ~1M droplets over a 32x32x4 mesh
//! - [`collision_step`]: one shuffle, pair, coalesce, sanitize cycle

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use drizzle_core::{Backend, CoalescenceOutcome, ParticleError};
use drizzle_engine::{MergeRule, Mesh, ParticleSet, UniformSource};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// 65 536 droplets on a 16x16 mesh.
pub fn reference_profile(seed: u64, backend: Box<dyn Backend>) -> ParticleSet {
    profile(seed, 1 << 16, &[16, 16], backend)
}

/// 1 048 576 droplets on a 32x32x4 mesh.
pub fn stress_profile(seed: u64, backend: Box<dyn Backend>) -> ParticleSet {
    profile(seed, 1 << 20, &[32, 32, 4], backend)
}

/// Droplets scattered uniformly over `grid` with exponentially
/// distributed volumes and a volume-weighted temperature.
pub fn profile(seed: u64, n_sd: usize, grid: &[usize], backend: Box<dyn Backend>) -> ParticleSet {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mesh = Mesh::new(grid).expect("benchmark mesh");
    let n = (0..n_sd).map(|_| rng.random_range(1..100_000u64)).collect();
    let volume = (0..n_sd)
        .map(|_| -(1.0 - rng.random::<f64>()).ln())
        .collect();
    let temperature = (0..n_sd).map(|_| rng.random_range(270.0..300.0)).collect();
    let cell_origin = grid
        .iter()
        .map(|&size| (0..n_sd).map(|_| rng.random_range(0..size as i64)).collect())
        .collect();
    let position_in_cell = grid
        .iter()
        .map(|_| (0..n_sd).map(|_| rng.random::<f64>()).collect())
        .collect();
    ParticleSet::builder()
        .multiplicity(n)
        .extensive("volume", volume)
        .intensive("temperature", MergeRule::weighted_mean("volume"), temperature)
        .mesh(mesh, cell_origin, position_in_cell)
        .backend(backend)
        .build()
        .expect("benchmark profile")
}

/// One collision step followed by compaction.
pub fn collision_step(
    particles: &mut ParticleSet,
    rng: &mut UniformSource,
    u01: &mut [f64],
    pairs: &mut [bool],
    gamma: &mut [f64],
) -> Result<CoalescenceOutcome, ParticleError> {
    rng.fill(u01);
    particles.permutation(u01, true)?;
    particles.find_pairs(pairs)?;
    particles.sort_within_pair_by_attr(pairs, "n")?;
    rng.fill(gamma);
    for g in gamma.iter_mut() {
        *g = (*g * 3.0).floor();
    }
    let outcome = particles.coalescence(gamma, pairs)?;
    particles.sanitize();
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use drizzle_backend::SerialBackend;

    #[test]
    fn profile_places_every_droplet_in_the_mesh() {
        let p = profile(1, 1000, &[4, 5], Box::new(SerialBackend::new()));
        assert_eq!(p.n_cells(), 20);
        assert!(p.cell_id().iter().all(|&c| c < 20));
        assert!(p.is_healthy());
    }

    #[test]
    fn collision_step_runs_repeatedly() {
        let mut p = profile(2, 2048, &[8], Box::new(SerialBackend::new()));
        let mut rng = UniformSource::new(2);
        let mut u01 = vec![0.0; 2048];
        let mut pairs = vec![false; 2048];
        let mut gamma = vec![0.0; 2048];
        for _ in 0..5 {
            collision_step(&mut p, &mut rng, &mut u01, &mut pairs, &mut gamma).unwrap();
            assert!(p.is_healthy());
        }
    }
}
