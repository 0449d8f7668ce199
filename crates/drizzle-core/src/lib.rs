//! Core types and traits for the drizzle super-droplet engine.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the abstractions shared by every other drizzle crate: the error
//! taxonomy, attribute descriptors, the row-major [`Stack`] buffer that
//! holds grouped per-particle attributes, and the [`Backend`] capability
//! trait through which all bulk kernels are executed.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod attribute;
pub mod backend;
pub mod error;
pub mod stack;

pub use attribute::{AttrDef, AttrGroup, AttrKind, MergeRule, SlotRule};
pub use backend::{
    Backend, CoalescenceArgs, CoalescenceOutcome, MomentArgs, MomentTerm, PrecipitationArgs,
    PrecipitationOutcome, SortKey, EMPTY_CELL_MOMENT,
};
pub use error::ParticleError;
pub use stack::Stack;
