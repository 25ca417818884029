use std::collections::BTreeSet;

use crate::base::WeightedDiGraph;
use crate::provenance::SplitProvenance;

/// Index of a [Community] inside the `Communities` arena.
pub type CommunityId = usize;

/// A group of origin-level node ids (split ids included) together with the
/// aggregated weighted degrees of the hypernodes currently assigned to it.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct Community {
    pub nodes: BTreeSet<usize>,
    pub total_in_degree: f64,
    pub total_out_degree: f64,
}

impl Community {
    pub fn singleton(node: usize) -> Self {
        Community {
            nodes: BTreeSet::from([node]),
            ..Default::default()
        }
    }

    pub fn with_nodes(nodes: BTreeSet<usize>) -> Self {
        Community {
            nodes,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains(&self, node: &usize) -> bool {
        self.nodes.contains(node)
    }

    /// Members with at least one predecessor or successor outside the community.
    pub fn edge_nodes(&self, graph: &WeightedDiGraph) -> BTreeSet<usize> {
        self.nodes
            .iter()
            .copied()
            .filter(|&node| {
                graph.successors(node).any(|n| !self.nodes.contains(&n))
                    || graph.predecessors(node).any(|n| !self.nodes.contains(&n))
            })
            .collect()
    }

    /// Members resolved to their origin ids. A node with a live split copy in
    /// another community shows up in both communities' origin sets.
    pub fn origin_nodes(&self, provenance: &SplitProvenance) -> BTreeSet<usize> {
        self.nodes
            .iter()
            .map(|&n| provenance.original_of(n))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::Graph;

    #[test]
    pub fn edge_nodes_are_the_boundary() -> anyhow::Result<()> {
        let g = Graph::from_weighted_edges(vec![("a", "b", 1.0), ("b", "c", 1.0), ("d", "a", 1.0)])?;
        let ids = |names: &[&str]| -> BTreeSet<usize> {
            names.iter().map(|n| g.retrieve(n).unwrap()).collect()
        };
        let community = Community::with_nodes(ids(&["a", "b"]));
        assert_eq!(ids(&["a", "b"]), community.edge_nodes(&g.digraph));
        let community = Community::with_nodes(ids(&["a", "b", "c", "d"]));
        assert!(community.edge_nodes(&g.digraph).is_empty());
        let community = Community::with_nodes(ids(&["a", "b", "d"]));
        assert_eq!(ids(&["b"]), community.edge_nodes(&g.digraph));
        Ok(())
    }

    #[test]
    pub fn origin_nodes_collapse_split_copies() {
        let mut provenance = SplitProvenance::default();
        provenance.record(5, 1);
        let community = Community::with_nodes(BTreeSet::from([1, 2, 5]));
        assert_eq!(BTreeSet::from([1, 2]), community.origin_nodes(&provenance));
        let other = Community::with_nodes(BTreeSet::from([5, 3]));
        assert_eq!(BTreeSet::from([1, 3]), other.origin_nodes(&provenance));
        assert!(!other.is_empty());
        assert!(Community::default().is_empty());
    }
}
