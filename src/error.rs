use thiserror::Error;

/// Result alias for the detection engine.
pub type Result<T> = std::result::Result<T, CommunityError>;

/// Errors surfaced by graph construction and community detection.
///
/// `WeightNotConserved` and `DetachedHyperNode` indicate a defect in the
/// mutation logic rather than bad input, and abort the run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommunityError {
    #[error("invalid weight {weight} on edge {from} -> {to}: weights must be finite and non-negative")]
    InvalidWeight { from: String, to: String, weight: f64 },

    #[error("invalid parameter `{name}`: {message}")]
    InvalidParameter { name: &'static str, message: String },

    #[error("edge weight not conserved by {operation}: expected {expected}, found {actual}")]
    WeightNotConserved {
        operation: &'static str,
        expected: f64,
        actual: f64,
    },

    #[error("hypernode {0} is not attached to any community")]
    DetachedHyperNode(usize),

    #[error("node {0} is not tracked by any community")]
    UnknownNode(usize),
}
