//! Reusable particle-set fixtures.
//!
//! - [`four_droplets`]: the two-pair single-cell population used to pin
//!   coalescence and compaction behaviour.
//! - [`random_population`]: seeded random droplets spread over cells,
//!   with extensive, weighted-mean and ratio attributes.
//! - [`rain_column`]: a seeded 1-d vertical column with spatial
//!   attributes, for precipitation.

use drizzle_core::Backend;
use drizzle_engine::{MergeRule, Mesh, ParticleSet};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Multiplicities `[5, 5, 3, 3]` in one cell, volumes `[1, 2, 3, 4]`.
pub fn four_droplets(backend: Box<dyn Backend>) -> ParticleSet {
    ParticleSet::builder()
        .multiplicity(vec![5, 5, 3, 3])
        .extensive("volume", vec![1.0, 2.0, 3.0, 4.0])
        .intensive(
            "temperature",
            MergeRule::weighted_mean("volume"),
            vec![280.0, 290.0, 300.0, 310.0],
        )
        .backend(backend)
        .build()
        .expect("four-droplet fixture")
}

/// `n_sd` droplets over `n_cells` cells with attributes `volume`,
/// `moles_S`, `conc_S = moles_S / volume` and a volume-weighted
/// `temperature`.
pub fn random_population(
    seed: u64,
    n_sd: usize,
    n_cells: usize,
    backend: Box<dyn Backend>,
) -> ParticleSet {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let n = (0..n_sd).map(|_| rng.random_range(1..1_000u64)).collect();
    let cell_id = (0..n_sd).map(|_| rng.random_range(0..n_cells)).collect();
    let volume = (0..n_sd).map(|_| rng.random_range(0.5..4.0)).collect();
    let moles = (0..n_sd).map(|_| rng.random_range(0.0..1.0)).collect();
    let temperature = (0..n_sd).map(|_| rng.random_range(270.0..300.0)).collect();
    ParticleSet::builder()
        .multiplicity(n)
        .cell_id(cell_id)
        .n_cells(n_cells)
        .extensive("volume", volume)
        .extensive("moles_S", moles)
        .intensive("conc_S", MergeRule::ratio("moles_S", "volume"), vec![0.0; n_sd])
        .intensive("temperature", MergeRule::weighted_mean("volume"), temperature)
        .backend(backend)
        .build()
        .expect("random population fixture")
}

/// `n_sd` droplets in a column of `levels` cells. Every droplet starts
/// inside the domain.
pub fn rain_column(
    seed: u64,
    n_sd: usize,
    levels: usize,
    backend: Box<dyn Backend>,
) -> ParticleSet {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let n = (0..n_sd).map(|_| rng.random_range(1..100u64)).collect();
    let volume = (0..n_sd).map(|_| rng.random_range(0.1..2.0)).collect();
    let origin = (0..n_sd)
        .map(|_| rng.random_range(0..levels as i64))
        .collect();
    let offset = (0..n_sd).map(|_| rng.random::<f64>()).collect();
    ParticleSet::builder()
        .multiplicity(n)
        .extensive("volume", volume)
        .mesh(
            Mesh::new(&[levels]).expect("non-empty column"),
            vec![origin],
            vec![offset],
        )
        .backend(backend)
        .build()
        .expect("rain column fixture")
}

/// Move every droplet down by `dz` cells, in place. Droplets leaving the
/// bottom end up with a negative origin.
pub fn fall(particles: &mut ParticleSet, dz: f64) {
    let index = particles.index().to_vec();
    let spatial = particles.spatial_mut().expect("spatial fixture");
    for slot in index {
        let z = spatial.cell_origin.get(0, slot) as f64
            + spatial.position_in_cell.get(0, slot)
            - dz;
        let cell = z.floor();
        spatial.cell_origin.set(0, slot, cell as i64);
        spatial.position_in_cell.set(0, slot, z - cell);
    }
    particles
        .mark_updated("cell origin")
        .expect("spatial fixture");
    particles
        .mark_updated("position in cell")
        .expect("spatial fixture");
}
