//! Error taxonomy for the solver boundary.
//!
//! Every failure surfaces from the `solve` / `value_of_policy` call sites as
//! one of these variants; no partial state escapes except the documented
//! partial result carried by [`SolveError::NotConverged`].

use thiserror::Error;

use crate::types::Solution;

/// Errors reported from the solver boundary.
#[derive(Debug, Error)]
pub enum SolveError {
    /// The model violates a structural invariant: transition rows that do not
    /// sum to 1, negative slack, a state family that is not a partition, an
    /// ordering that is not a permutation, zero reward factors, or a state
    /// left without any enabled action.
    #[error("model inconsistency: {0}")]
    ModelInconsistency(String),

    /// A Bellman update produced a non-finite value. Fatal; inspect the model.
    #[error("numeric fault: non-finite value for reward {reward} at state {state}")]
    NumericFault { reward: usize, state: usize },

    /// The accelerator backend failed device-side. The caller may retry on
    /// the CPU backend.
    #[error("accelerator fault: {0}")]
    AcceleratorFault(String),

    /// The iteration cap was hit before the convergence criterion. Carries
    /// the best policy and value table found so far.
    #[error("not converged after {iterations} outer sweeps (residual {residual:.3e})")]
    NotConverged {
        iterations: u32,
        residual: f64,
        partial: Box<Solution>,
    },
}

impl SolveError {
    /// Shorthand used by validation code.
    pub(crate) fn model(msg: impl Into<String>) -> Self {
        SolveError::ModelInconsistency(msg.into())
    }
}
