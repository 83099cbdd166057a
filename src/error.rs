//! Error types of the reconstruction.
//!
//! The numerical kernels themselves (OPUS, TROPUS, DIST, PROJECT) cannot fail on well-shaped
//! input. Errors come from validating inputs and from the small linear solve that chooses the
//! step inside the three-dimensional search subspace.

use thiserror::Error;

/// The small step system could not be solved by LU decomposition.
///
/// `pivot` is the smallest absolute pivot that was found and `scale` the largest absolute matrix
/// entry. Both are `0.0` if the matrix contains non-finite entries.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
#[error("singular {dim}x{dim} step system (smallest pivot {pivot:e}, matrix scale {scale:e})")]
pub struct SingularSystem {
    pub dim: usize,
    pub pivot: f64,
    pub scale: f64,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MaxentError {
    #[error("shape mismatch for {what}: expected {expected}, found {found}")]
    ShapeMismatch {
        what: &'static str,
        expected: String,
        found: String,
    },

    #[error("invalid value {value} for {name}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("step system stayed singular for {iterations} consecutive iterations")]
    RepeatedSingular { iterations: usize },

    #[error("non-finite {what} at iteration {iteration}")]
    NonFinite {
        what: &'static str,
        iteration: usize,
    },
}

pub type MaxentResult<T> = Result<T, MaxentError>;

impl MaxentError {
    pub(crate) fn shape(what: &'static str, expected: impl ToString, found: impl ToString) -> Self {
        MaxentError::ShapeMismatch {
            what,
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}
