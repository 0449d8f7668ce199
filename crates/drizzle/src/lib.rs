//! Drizzle: a super-droplet particle-population engine.
//!
//! Each super-droplet stands for many identical real droplets through its
//! multiplicity. Drizzle stores their attributes in flat buffers, keeps
//! them sorted into cells, and runs the per-timestep bulk operations
//! (coalescence, moments, compaction, precipitation) through a pluggable
//! kernel backend.
//!
//! This is the facade crate that re-exports the public API of every
//! drizzle sub-crate.
//!
//! # Quick start
//!
//! ```rust
//! use drizzle::prelude::*;
//!
//! let mut particles = ParticleSet::builder()
//!     .multiplicity(vec![5, 5, 3, 3])
//!     .extensive("volume", vec![1.0, 2.0, 3.0, 4.0])
//!     .build()
//!     .unwrap();
//!
//! let pairs = [true, false, true, false];
//! let gamma = [1.0, 0.0, 2.0, 0.0];
//! let outcome = particles.coalescence(&gamma, &pairs).unwrap();
//! assert_eq!(outcome.zeroed, 2);
//!
//! particles.sanitize();
//! assert_eq!(particles.index(), &[1, 3]);
//!
//! let request = MomentRequest::new().rank("volume", 1);
//! let mut out = Moments::for_request(&request, particles.n_cells());
//! particles
//!     .moments(&mut out, &request, "volume", (0.0, f64::INFINITY))
//!     .unwrap();
//! assert_eq!(out.moment_0(), &[8.0]);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `drizzle-core` | Errors, attribute descriptors, `Stack`, the `Backend` trait |
//! | [`store`] | `drizzle-store` | Index, cell partition, attribute store, mesh |
//! | [`backend`] | `drizzle-backend` | Serial and rayon-parallel kernels |
//! | [`engine`] | `drizzle-engine` | `ParticleSet`, builder, moments, metrics |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types and the backend trait (`drizzle-core`).
pub use drizzle_core as types;

/// Index, cell partition, and attribute storage (`drizzle-store`).
pub use drizzle_store as store;

/// Kernel backends (`drizzle-backend`).
///
/// [`backend::SerialBackend`] always; `ParallelBackend` with the
/// `parallel` feature.
pub use drizzle_backend as backend;

/// Particle-set orchestration (`drizzle-engine`).
pub use drizzle_engine as engine;

/// Common imports for typical drizzle usage.
pub mod prelude {
    // Core types
    pub use drizzle_core::{
        AttrDef, AttrGroup, AttrKind, Backend, CoalescenceOutcome, MergeRule, Stack,
        EMPTY_CELL_MOMENT,
    };

    // Errors
    pub use drizzle_core::ParticleError;
    pub use drizzle_engine::ConfigError;

    // Storage
    pub use drizzle_store::{Mesh, Spatial};

    // Backends
    pub use drizzle_backend::{default_backend, SerialBackend};

    // Engine
    pub use drizzle_engine::{
        EngineMetrics, MomentRequest, Moments, ParticleSet, ParticlesBuilder, UniformSource,
    };
}
