//! Solver Error Types
//!
//! Unified error type for solver construction and solve-entry validation.
//! The hot iteration loops themselves are error-free by design — malformed
//! inputs there are caller contract violations caught by `debug_assert!`,
//! not recoverable conditions.
//!
//! Author: Moroya Sakamoto

use core::fmt;

/// Unified error type for solver operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SolverError {
    /// A constraint references a body index outside the population.
    InvalidBodyIndex {
        /// The invalid index that was provided
        index: usize,
        /// Current number of bodies in the step
        count: usize,
    },
    /// A constraint is malformed (e.g. a joint reporting an impossible row
    /// count).
    InvalidConstraint {
        /// Human-readable description of the problem
        reason: &'static str,
    },
    /// Invalid configuration parameter (non-positive timestep, zero tasks, …).
    InvalidConfiguration {
        /// Description of the invalid configuration
        reason: &'static str,
    },
    /// A capacity limit was exceeded (too many rows for one pair, …).
    CapacityExceeded {
        /// What resource was exhausted
        resource: &'static str,
        /// The limit that was exceeded
        limit: usize,
    },
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBodyIndex { index, count } => {
                write!(f, "body index {index} out of range (count={count})")
            }
            Self::InvalidConstraint { reason } => {
                write!(f, "invalid constraint: {reason}")
            }
            Self::InvalidConfiguration { reason } => {
                write!(f, "invalid configuration: {reason}")
            }
            Self::CapacityExceeded { resource, limit } => {
                write!(f, "{resource} capacity exceeded (limit={limit})")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SolverError {}
