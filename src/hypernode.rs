use std::collections::BTreeMap;

use itertools::Itertools;

use crate::base::WeightedDiGraph;
use crate::community::{Community, CommunityId};

/// Index of a [HyperNode] inside the `Communities` arena; it is also the node
/// key of the hypernode in the current hypergraph.
pub type HyperNodeId = usize;

/// A node of the current coarsened graph.
///
/// `nodes` lists the origin-level ids it stands for. The degrees and
/// `weights_to_other_hypernodes` are derived from the hypergraph by
/// [`Self::refresh()`]; the latter never contains the hypernode itself.
#[derive(Debug, Clone, PartialEq)]
pub struct HyperNode {
    pub id: HyperNodeId,
    pub community: Option<CommunityId>,
    pub nodes: Vec<usize>,
    pub total_in_degree: f64,
    pub total_out_degree: f64,
    pub weights_to_other_hypernodes: BTreeMap<HyperNodeId, f64>,
}

impl HyperNode {
    pub fn new(id: HyperNodeId, community: CommunityId, nodes: Vec<usize>) -> Self {
        HyperNode {
            id,
            community: Some(community),
            nodes,
            total_in_degree: 0.0,
            total_out_degree: 0.0,
            weights_to_other_hypernodes: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Recomputes degrees and neighbor weights from the hypergraph.
    pub fn refresh(&mut self, hyper_graph: &WeightedDiGraph) {
        self.total_out_degree = hyper_graph.out_degree(self.id);
        self.total_in_degree = hyper_graph.in_degree(self.id);
        self.weights_to_other_hypernodes.clear();
        for (target, edge) in hyper_graph.out_edges(self.id) {
            if target == self.id {
                continue;
            }
            *self.weights_to_other_hypernodes.entry(target).or_insert(0.0) += edge.weight;
        }
        for (source, edge) in hyper_graph.in_edges(self.id) {
            if source == self.id {
                continue;
            }
            *self.weights_to_other_hypernodes.entry(source).or_insert(0.0) += edge.weight;
        }
    }

    pub fn weight_to_hypernode(&self, other: HyperNodeId) -> f64 {
        self.weights_to_other_hypernodes
            .get(&other)
            .copied()
            .unwrap_or(0.0)
    }

    /// Aggregated neighbor weight grouped by the neighbors' current community.
    pub fn weights_to_communities(&self, hypernodes: &[HyperNode]) -> BTreeMap<CommunityId, f64> {
        let mut weights = BTreeMap::new();
        for (&other, &weight) in &self.weights_to_other_hypernodes {
            if let Some(c) = hypernodes.get(other).and_then(|h| h.community) {
                *weights.entry(c).or_insert(0.0) += weight;
            }
        }
        weights
    }

    pub fn weight_to_community(&self, community: CommunityId, hypernodes: &[HyperNode]) -> f64 {
        self.weights_to_other_hypernodes
            .iter()
            .filter(|(&other, _)| {
                hypernodes.get(other).and_then(|h| h.community) == Some(community)
            })
            .map(|(_, &w)| w)
            .sum()
    }

    /// Distinct non-empty communities reachable through neighbor weights.
    pub fn neighbor_communities(
        &self,
        hypernodes: &[HyperNode],
        communities: &[Community],
    ) -> Vec<CommunityId> {
        self.weights_to_communities(hypernodes)
            .into_keys()
            .filter(|&c| communities.get(c).map_or(false, |c| !c.is_empty()))
            .collect_vec()
    }

    /// Expected weight between this hypernode and `community` under the
    /// directed null model: both the out->in and the in->out term.
    pub fn expected_edges_to(&self, community: &Community, resolution: f64, m: f64) -> f64 {
        if m <= 0.0 {
            return 0.0;
        }
        let out_prob = self.total_out_degree * community.total_in_degree / m;
        let in_prob = self.total_in_degree * community.total_out_degree / m;
        resolution * (out_prob + in_prob)
    }

    /// Modularity gain of adding this (detached) hypernode to `target`.
    pub fn gain_for_adding(
        &self,
        target: CommunityId,
        communities: &[Community],
        hypernodes: &[HyperNode],
        resolution: f64,
        m: f64,
    ) -> f64 {
        if m <= 0.0 {
            return 0.0;
        }
        let community = match communities.get(target) {
            Some(c) => c,
            None => return 0.0,
        };
        let weight_to_target = self.weight_to_community(target, hypernodes);
        self.gain_for_weight(weight_to_target, community, resolution, m)
    }

    /// Gain of adding this hypernode to `community`, given its precomputed
    /// weight towards it.
    pub fn gain_for_weight(
        &self,
        weight_to_target: f64,
        community: &Community,
        resolution: f64,
        m: f64,
    ) -> f64 {
        if m <= 0.0 {
            return 0.0;
        }
        (weight_to_target - self.expected_edges_to(community, resolution, m)) / m
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> WeightedDiGraph {
        let mut g = WeightedDiGraph::default();
        g.add_weight(0, 1, 2.0);
        g.add_weight(1, 2, 3.0);
        g.add_weight(2, 0, 4.0);
        g.add_weight(1, 0, 1.0);
        g.add_weight(0, 0, 5.0);
        g
    }

    #[test]
    pub fn refresh_skips_self_loops_in_neighbors() {
        let g = triangle();
        let mut h = HyperNode::new(0, 0, vec![0]);
        h.refresh(&g);
        assert_eq!(7.0, h.total_out_degree);
        assert_eq!(10.0, h.total_in_degree);
        assert_eq!(3.0, h.weight_to_hypernode(1));
        assert_eq!(4.0, h.weight_to_hypernode(2));
        assert_eq!(0.0, h.weight_to_hypernode(0));
        assert!(!h.weights_to_other_hypernodes.contains_key(&0));
    }

    #[test]
    pub fn gain_matches_hand_computation() {
        let g = triangle();
        let mut hypernodes = (0..3).map(|i| HyperNode::new(i, i, vec![i])).collect_vec();
        for h in hypernodes.iter_mut() {
            h.refresh(&g);
        }
        let communities = hypernodes
            .iter()
            .map(|h| Community {
                nodes: h.nodes.iter().copied().collect(),
                total_in_degree: h.total_in_degree,
                total_out_degree: h.total_out_degree,
            })
            .collect_vec();
        let m = g.total_weight();
        assert_eq!(15.0, m);
        // hypernode 1: out 4, in 2; community 2: in 3, out 4; weight 1<->2 is 3
        let expected = (4.0 * 3.0 + 2.0 * 4.0) / m;
        let gain = hypernodes[1].gain_for_adding(2, &communities, &hypernodes, 1.0, m);
        assert!((gain - (3.0 - expected) / m).abs() < 1e-12);
        assert_eq!(vec![0, 2], hypernodes[1].neighbor_communities(&hypernodes, &communities));
        assert_eq!(0.0, hypernodes[1].gain_for_adding(2, &communities, &hypernodes, 1.0, 0.0));
    }
}
