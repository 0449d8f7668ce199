//! Particle-set orchestration for the drizzle super-droplet engine.
//!
//! [`ParticleSet`] ties together the attribute store, the index
//! permutation, the cell partition and a kernel backend, and exposes the
//! per-timestep operations a microphysics driver calls:
//!
//! - ordering: [`cell_start`](ParticleSet::cell_start),
//!   [`permutation`](ParticleSet::permutation),
//!   [`find_pairs`](ParticleSet::find_pairs),
//!   [`sort_within_pair_by_attr`](ParticleSet::sort_within_pair_by_attr),
//!   [`adaptive_sdm_end`](ParticleSet::adaptive_sdm_end)
//! - collisions: [`coalescence`](ParticleSet::coalescence)
//! - diagnostics: [`moments`](ParticleSet::moments),
//!   [`spectrum_moments`](ParticleSet::spectrum_moments)
//! - lifecycle: [`sanitize`](ParticleSet::sanitize),
//!   [`remove_precipitated`](ParticleSet::remove_precipitated),
//!   [`recalculate_cell_id`](ParticleSet::recalculate_cell_id)
//!
//! A typical collision step:
//!
//! ```
//! use drizzle_engine::{ParticleSet, UniformSource};
//!
//! let mut particles = ParticleSet::builder()
//!     .multiplicity(vec![8, 5, 3, 3])
//!     .extensive("volume", vec![1.0, 2.0, 3.0, 4.0])
//!     .build()
//!     .unwrap();
//! let mut rng = UniformSource::new(7);
//! let n_sd = particles.n_sd();
//!
//! particles.permutation(&rng.sample(n_sd), true).unwrap();
//! let mut pairs = vec![false; n_sd];
//! particles.find_pairs(&mut pairs).unwrap();
//! particles.sort_within_pair_by_attr(&pairs, "n").unwrap();
//! let gamma = vec![1.0; n_sd];
//! let outcome = particles.coalescence(&gamma, &pairs).unwrap();
//! assert_eq!(outcome.pairs_merged, 2);
//! particles.sanitize();
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

mod coalescence;
pub mod config;
mod lifecycle;
pub mod metrics;
pub mod moments;
pub mod particles;
pub mod random;

pub use config::{ConfigError, ParticlesBuilder};
pub use metrics::EngineMetrics;
pub use moments::{MomentRequest, Moments};
pub use particles::ParticleSet;
pub use random::UniformSource;

pub use drizzle_core::{
    AttrDef, AttrGroup, AttrKind, CoalescenceOutcome, MergeRule, ParticleError, EMPTY_CELL_MOMENT,
};
pub use drizzle_store::Mesh;
