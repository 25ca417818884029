use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{CommunityError, Result};

/// Edges whose weight drops to or below this value after a reduction are removed.
pub const WEIGHT_EPSILON: f64 = 1e-9;

/// Absolute tolerance (scaled by the magnitude of the expected total) used
/// when verifying that a graph mutation conserved edge weight.
pub const CONSERVATION_TOLERANCE: f64 = 1e-6;

/// Internal API used for allocating new internal ids for nodes
/// when seeing external (string) ids. Ids are dense and never reused,
/// even after the node they named has been removed from the graph.
#[derive(Default, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NameSet {
    pub next_id: usize,
    pub forward: AHashMap<String, usize>,
    pub rev: Vec<String>,
}

impl NameSet {
    /// Given an external id, retrieve the internal id
    pub fn retrieve(&self, name: &str) -> Option<usize> {
        self.forward.get(name).copied()
    }

    /// Given an internal id, retrieve the external id
    pub fn rev(&self, id: usize) -> Option<&str> {
        self.rev.get(id).map(|s| s.as_str())
    }

    /// Returns the internal id of `name`, allocating a fresh one if needed.
    pub fn request(&mut self, name: &str) -> usize {
        if let Some(id) = self.retrieve(name) {
            return id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.forward.insert(name.to_string(), id);
        self.rev.push(name.to_string());
        id
    }

    pub fn contains(&self, name: &str) -> bool {
        self.forward.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.rev.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rev.is_empty()
    }
}

/// Checks that `actual` matches `expected` up to [CONSERVATION_TOLERANCE].
pub fn verify_conservation(operation: &'static str, expected: f64, actual: f64) -> Result<()> {
    let tolerance = CONSERVATION_TOLERANCE * expected.abs().max(1.0);
    if (actual - expected).abs() > tolerance {
        return Err(CommunityError::WeightNotConserved {
            operation,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Accepts finite, non-negative weights only.
pub fn is_valid_weight(weight: f64) -> bool {
    weight.is_finite() && weight >= 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_set_allocates_dense_ids() {
        let mut names = NameSet::default();
        assert_eq!(0, names.request("a"));
        assert_eq!(1, names.request("b"));
        assert_eq!(0, names.request("a"));
        assert_eq!(Some(1), names.retrieve("b"));
        assert_eq!(Some("b"), names.rev(1));
        assert_eq!(None, names.retrieve("c"));
        assert_eq!(2, names.len());
    }

    #[test]
    fn conservation_tolerates_rounding_only() {
        assert!(verify_conservation("split", 7.5, 7.5 + 1e-9).is_ok());
        assert!(verify_conservation("split", 7.5, 7.4).is_err());
        assert!(verify_conservation("merge", 1e9, 1e9 + 1.0).is_ok());
    }

    #[test]
    fn weight_validation() {
        assert!(is_valid_weight(0.0));
        assert!(is_valid_weight(3.5));
        assert!(!is_valid_weight(-1.0));
        assert!(!is_valid_weight(f64::NAN));
        assert!(!is_valid_weight(f64::INFINITY));
    }
}
