//! Kernel backends for the drizzle super-droplet engine.
//!
//! Two implementations of [`Backend`] are provided:
//!
//! - [`SerialBackend`]: straight-line loops over the working range.
//! - `ParallelBackend` (feature `parallel`, on by default): rayon data
//!   parallelism for the cell-scoped and row-scoped kernels.
//!
//! Both share the validation and per-element logic in `kernels`, so they
//! produce identical results for identical inputs. Shuffles and the
//! counting sort are sequential in both; their output depends on visit
//! order.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

mod kernels;
#[cfg(feature = "parallel")]
pub mod parallel;
pub mod serial;

use drizzle_core::Backend;

#[cfg(feature = "parallel")]
pub use parallel::ParallelBackend;
pub use serial::SerialBackend;

/// The preferred backend for this build: `ParallelBackend` when the
/// `parallel` feature is enabled, [`SerialBackend`] otherwise.
pub fn default_backend() -> Box<dyn Backend> {
    #[cfg(feature = "parallel")]
    {
        Box::new(ParallelBackend::new())
    }
    #[cfg(not(feature = "parallel"))]
    {
        Box::new(SerialBackend::new())
    }
}
