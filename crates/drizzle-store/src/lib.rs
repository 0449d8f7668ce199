//! Index, cell partition, and attribute storage for drizzle particle sets.
//!
//! Particles are rows in flat buffers, never individually allocated.
//! Liveness is encoded by multiplicity and the working set is described by
//! an index permutation over the slots:
//!
//! ```text
//! AttributeStore (owns every per-particle buffer)
//! ├── n: Vec<u64>                 multiplicity, 0 = dead
//! ├── cell_id: Vec<usize>
//! ├── extensive: Stack<f64>       one row per extensive attribute
//! ├── intensive: Stack<f64>       one row per intensive attribute
//! └── Spatial (optional)          Mesh + cell origin + position in cell
//!
//! IndexArray                      permutation of slots
//! └── [0, working) ⊆ [0, valid) ⊆ [0, capacity)
//!
//! CellPartition                   cell_start over the sorted index
//! ```
//!
//! Kernels are executed through a [`Backend`](drizzle_core::Backend)
//! passed into each operation; this crate only maintains the invariants
//! around them.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod attributes;
pub mod cells;
pub mod index;
pub mod spatial;

pub use attributes::AttributeStore;
pub use cells::CellPartition;
pub use index::{IndexArray, ShuffleScope};
pub use spatial::{Mesh, Spatial};
