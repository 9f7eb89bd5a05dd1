//! Error types reported by the constraint solver core.

use thiserror::Error;

use crate::config::SolverType;

/// Errors that abort a solver step or reject a configuration change.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SolverError {
    /// The requested algorithm has no implementation.
    #[error("unsupported solver algorithm: {0:?}")]
    UnsupportedAlgorithm(SolverType),

    /// Assembled matrices or vectors disagree with the constraint counts.
    #[error("structural mismatch in {what}: expected {expected}, got {actual}")]
    StructuralMismatch {
        /// Which array or matrix was inconsistent.
        what: &'static str,
        /// Expected dimension.
        expected: String,
        /// Dimension actually found.
        actual: String,
    },

    /// A constraint references a body outside the body list.
    #[error("{kind} {index} references body {body} but only {num_bodies} bodies exist")]
    InvalidBodyIndex {
        /// Constraint family ("contact" or "bilateral").
        kind: &'static str,
        /// Index of the offending constraint.
        index: usize,
        /// Referenced body index.
        body: usize,
        /// Number of bodies in the step.
        num_bodies: usize,
    },

    /// The step size must be positive and finite.
    #[error("invalid step size: {0} (must be positive and finite)")]
    InvalidStepSize(f64),

    /// Impulses or residual became `NaN` or infinite.
    #[error("solver diverged during {phase} phase: {reason}")]
    Diverged {
        /// Phase in which the divergence was detected.
        phase: &'static str,
        /// Description of what went wrong.
        reason: String,
    },

    /// A direct sub-solve could not be completed.
    #[error("numerical failure: {0}")]
    Numerical(String),
}

/// Convenience alias used across the crate.
pub type SolverResult<T> = Result<T, SolverError>;

impl SolverError {
    pub(crate) fn mismatch(
        what: &'static str,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        Self::StructuralMismatch {
            what,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}
