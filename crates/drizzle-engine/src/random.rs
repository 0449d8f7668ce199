//! Seeded source of uniform variates for shuffles and coalescence.
//!
//! Shuffles consume one value in `[0, 1)` per working position. Drawing
//! them from a seeded ChaCha8 stream makes a run reproducible from its
//! seed alone.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Deterministic stream of values in `[0, 1)`.
#[derive(Clone, Debug)]
pub struct UniformSource {
    rng: ChaCha8Rng,
    seed: u64,
}

impl UniformSource {
    /// A stream seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }

    /// The seed this stream was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Overwrite `out` with fresh values.
    pub fn fill(&mut self, out: &mut [f64]) {
        for v in out {
            *v = self.rng.random::<f64>();
        }
    }

    /// A freshly allocated buffer of `len` values.
    pub fn sample(&mut self, len: usize) -> Vec<f64> {
        let mut out = vec![0.0; len];
        self.fill(&mut out);
        out
    }
}
