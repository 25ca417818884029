use std::collections::BTreeMap;

/// The pair of penalty edges (`weight` in each direction) tying a split copy
/// to the node it was split from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub partner: usize,
    pub weight: f64,
}

/// Maps synthetic split ids back to the origin node they were split from.
/// Entries always store the root origin, so a split of a split still
/// resolves to the caller-supplied node. Each live split also owns one
/// [Anchor].
#[derive(Default, Debug, Clone, PartialEq)]
pub struct SplitProvenance {
    origins: BTreeMap<usize, usize>,
    anchors: BTreeMap<usize, Anchor>,
}

impl SplitProvenance {
    /// Records `split` as a copy of `of` (which may itself be a split id).
    pub fn record(&mut self, split: usize, of: usize) {
        let root = self.original_of(of);
        self.origins.insert(split, root);
    }

    /// Records the penalty edges between `split` and `partner`.
    pub fn anchor(&mut self, split: usize, partner: usize, weight: f64) {
        self.anchors.insert(split, Anchor { partner, weight });
    }

    pub fn anchor_of(&self, split: usize) -> Option<Anchor> {
        self.anchors.get(&split).copied()
    }

    /// Anchor weight (one direction) between `a` and `b`, whichever of the
    /// two owns the anchor.
    pub fn anchor_weight_between(&self, a: usize, b: usize) -> f64 {
        [(a, b), (b, a)]
            .iter()
            .filter_map(|&(split, partner)| {
                self.anchors
                    .get(&split)
                    .filter(|anchor| anchor.partner == partner)
                    .map(|anchor| anchor.weight)
            })
            .sum()
    }

    /// Anchors whose partner was `from` now point at `to`.
    pub fn reassign_partner(&mut self, from: usize, to: usize) {
        for anchor in self.anchors.values_mut() {
            if anchor.partner == from {
                anchor.partner = to;
            }
        }
    }

    /// The origin id of `node`; origin nodes resolve to themselves.
    pub fn original_of(&self, node: usize) -> usize {
        let mut current = node;
        while let Some(&parent) = self.origins.get(&current) {
            if parent == current {
                break;
            }
            current = parent;
        }
        current
    }

    pub fn is_split(&self, node: usize) -> bool {
        self.origins.contains_key(&node)
    }

    pub fn forget(&mut self, node: usize) -> Option<usize> {
        self.anchors.remove(&node);
        self.origins.remove(&node)
    }

    /// Number of live split ids.
    pub fn len(&self) -> usize {
        self.origins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.origins.iter().map(|(&s, &o)| (s, o))
    }
}

#[cfg(test)]
mod tests {
    use super::SplitProvenance;

    #[test]
    fn chains_resolve_to_the_root() {
        let mut p = SplitProvenance::default();
        p.record(10, 1);
        p.record(11, 10);
        assert_eq!(1, p.original_of(10));
        assert_eq!(1, p.original_of(11));
        assert_eq!(7, p.original_of(7));
        assert!(p.is_split(11));
        assert!(!p.is_split(1));
        assert_eq!(Some(1), p.forget(10));
        assert_eq!(1, p.original_of(11));
        assert_eq!(1, p.len());
    }

    #[test]
    fn anchors_follow_merges() {
        let mut p = SplitProvenance::default();
        p.anchor(10, 1, 0.75);
        p.anchor(11, 10, 0.75);
        assert_eq!(0.75, p.anchor_weight_between(1, 10));
        assert_eq!(0.75, p.anchor_weight_between(10, 1));
        assert_eq!(0.0, p.anchor_weight_between(1, 11));
        p.reassign_partner(10, 1);
        p.forget(10);
        assert_eq!(None, p.anchor_of(10));
        assert_eq!(1, p.anchor_of(11).unwrap().partner);
        assert_eq!(0.75, p.anchor_weight_between(11, 1));
    }
}
