//! Error types for particle-set operations.
//!
//! Three classes of failure exist: range errors on the index, lookups of
//! attributes that were never registered, and invariant violations. The
//! first and last indicate a bug in the caller and are fatal; only the
//! unknown-attribute case is meant to be handled.

use std::error::Error;
use std::fmt;

/// Errors raised by particle-set operations and backend kernels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParticleError {
    /// A working length larger than the valid length was requested.
    Range {
        /// The requested working length.
        requested: usize,
        /// The current valid length of the index.
        valid: usize,
    },
    /// The attribute name is not registered for this particle set.
    UnknownAttribute {
        /// The name that failed to resolve.
        name: String,
    },
    /// A caller contract was broken. The particle set must not be used
    /// for further length-sensitive work after this error.
    InvariantViolation {
        /// The operation that detected the violation.
        operation: &'static str,
        /// Description of the broken invariant.
        reason: String,
    },
}

impl ParticleError {
    /// Build an [`InvariantViolation`](Self::InvariantViolation).
    pub fn invariant(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::InvariantViolation {
            operation,
            reason: reason.into(),
        }
    }

    /// Build an [`UnknownAttribute`](Self::UnknownAttribute).
    pub fn unknown(name: impl Into<String>) -> Self {
        Self::UnknownAttribute { name: name.into() }
    }

    /// Whether this error signals a caller bug rather than a recoverable
    /// lookup failure.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::UnknownAttribute { .. })
    }
}

impl fmt::Display for ParticleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Range { requested, valid } => {
                write!(
                    f,
                    "working length {requested} exceeds valid length {valid}"
                )
            }
            Self::UnknownAttribute { name } => write!(f, "unknown attribute '{name}'"),
            Self::InvariantViolation { operation, reason } => {
                write!(f, "invariant violated in {operation}: {reason}")
            }
        }
    }
}

impl Error for ParticleError {}
