use std::collections::{BTreeMap, BTreeSet};

use ahash::AHashMap;
use itertools::Itertools;
use tracing::{debug, warn};

use crate::base::{Edge, Graph, WeightedDiGraph};
use crate::community::{Community, CommunityId};
use crate::error::{CommunityError, Result};
use crate::hypernode::{HyperNode, HyperNodeId};
use crate::provenance::SplitProvenance;
use crate::quality::directed_modularity;
use crate::utils::{verify_conservation, WEIGHT_EPSILON};

/// Owns the origin graph, the current hypergraph and both arenas.
///
/// Communities and hypernodes are addressed by their arena index. Empty
/// communities stay in the arena for the rest of a level and are skipped by
/// every enumeration; [`Self::coarsen()`] compacts both arenas.
#[derive(Debug, Clone)]
pub struct Communities {
    pub origin_graph: Graph,
    pub hyper_graph: WeightedDiGraph,
    pub communities: Vec<Community>,
    pub hypernodes: Vec<HyperNode>,
    pub provenance: SplitProvenance,
    node_to_community: AHashMap<usize, CommunityId>,
    node_to_hypernode: AHashMap<usize, HyperNodeId>,
    m: f64,
    initial_weight: f64,
    live_penalty: f64,
    splits: usize,
    merges: usize,
    level: usize,
}

impl Communities {
    /// Every node starts in its own community and its own hypernode; the
    /// hypergraph mirrors the origin graph.
    pub fn new(origin_graph: Graph) -> Self {
        let node_ids = origin_graph.digraph.node_ids().collect_vec();
        let index: AHashMap<usize, HyperNodeId> = node_ids
            .iter()
            .enumerate()
            .map(|(i, &n)| (n, i))
            .collect();
        let mut hyper_graph = WeightedDiGraph::default();
        for i in 0..node_ids.len() {
            hyper_graph.add_node(i);
        }
        for (s, t, edge) in origin_graph.digraph.edges() {
            if let (Some(&hs), Some(&ht)) = (index.get(&s), index.get(&t)) {
                hyper_graph.add_weight(hs, ht, edge.weight);
            }
        }
        let mut hypernodes = node_ids
            .iter()
            .enumerate()
            .map(|(i, &n)| HyperNode::new(i, i, vec![n]))
            .collect_vec();
        let mut communities = Vec::with_capacity(node_ids.len());
        for (h, &n) in hypernodes.iter_mut().zip(node_ids.iter()) {
            h.refresh(&hyper_graph);
            let mut c = Community::singleton(n);
            c.total_in_degree = h.total_in_degree;
            c.total_out_degree = h.total_out_degree;
            communities.push(c);
        }
        let m = origin_graph.total_weight();
        Communities {
            origin_graph,
            hyper_graph,
            communities,
            hypernodes,
            provenance: SplitProvenance::default(),
            node_to_community: index.clone(),
            node_to_hypernode: index,
            m,
            initial_weight: m,
            live_penalty: 0.0,
            splits: 0,
            merges: 0,
            level: 0,
        }
    }

    /// Total edge weight of the origin graph when the run started; the
    /// modularity normalization used by every gain computation.
    pub fn m(&self) -> f64 {
        self.m
    }

    pub fn initial_weight(&self) -> f64 {
        self.initial_weight
    }

    /// Penalty weight currently injected by live splits.
    pub fn live_penalty(&self) -> f64 {
        self.live_penalty
    }

    pub fn splits_performed(&self) -> usize {
        self.splits
    }

    pub fn merges_performed(&self) -> usize {
        self.merges
    }

    pub fn live_splits(&self) -> usize {
        self.provenance.len()
    }

    /// Number of coarsenings performed so far.
    pub fn level(&self) -> usize {
        self.level
    }

    pub fn community_of_node(&self, node: usize) -> Option<CommunityId> {
        self.node_to_community.get(&node).copied()
    }

    pub fn hypernode_of_node(&self, node: usize) -> Option<HyperNodeId> {
        self.node_to_hypernode.get(&node).copied()
    }

    pub fn community_of_hypernode(&self, hypernode: HyperNodeId) -> Result<CommunityId> {
        self.hypernodes
            .get(hypernode)
            .and_then(|h| h.community)
            .ok_or(CommunityError::DetachedHyperNode(hypernode))
    }

    /// Ids of all non-empty communities, in arena order.
    pub fn non_empty_communities(&self) -> impl Iterator<Item = CommunityId> + '_ {
        self.communities
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_empty())
            .map(|(i, _)| i)
    }

    /// Ids of all non-empty hypernodes, in arena order.
    pub fn current_hypernodes(&self) -> Vec<HyperNodeId> {
        self.hypernodes
            .iter()
            .filter(|h| !h.is_empty())
            .map(|h| h.id)
            .collect_vec()
    }

    /// The current partition of the origin graph (split ids included).
    pub fn communities_as_sets(&self) -> Vec<BTreeSet<usize>> {
        self.non_empty_communities()
            .map(|c| self.communities[c].nodes.clone())
            .collect_vec()
    }

    /// The current communities resolved to origin ids; may overlap.
    pub fn origin_communities(&self) -> Vec<BTreeSet<usize>> {
        self.non_empty_communities()
            .map(|c| self.communities[c].origin_nodes(&self.provenance))
            .collect_vec()
    }

    pub fn named_communities(&self) -> Vec<BTreeSet<String>> {
        self.origin_communities()
            .into_iter()
            .map(|c| {
                c.into_iter()
                    .filter_map(|n| self.origin_graph.name(n).map(|s| s.to_string()))
                    .collect()
            })
            .collect_vec()
    }

    /// Directed modularity of the current partition on the current origin graph.
    pub fn modularity(&self, resolution: f64) -> f64 {
        directed_modularity(
            &self.origin_graph.digraph,
            &self.communities_as_sets(),
            resolution,
        )
    }

    //########################################################
    // Local moves
    //########################################################

    /// Detaches the hypernode from its community and returns the modularity
    /// cost of doing so. The community totals are decremented before the
    /// expected term is computed.
    pub fn remove_from_current_community(
        &mut self,
        hypernode: HyperNodeId,
        resolution: f64,
    ) -> Result<f64> {
        let c = self.community_of_hypernode(hypernode)?;
        let h = &self.hypernodes[hypernode];
        let community = &mut self.communities[c];
        community.total_in_degree -= h.total_in_degree;
        community.total_out_degree -= h.total_out_degree;

        let contribution = h.weight_to_community(c, &self.hypernodes);
        let expected = h.expected_edges_to(&self.communities[c], resolution, self.m);

        let community = &mut self.communities[c];
        for n in &self.hypernodes[hypernode].nodes {
            community.nodes.remove(n);
        }
        self.hypernodes[hypernode].community = None;

        if self.m <= 0.0 {
            return Ok(0.0);
        }
        Ok((expected - contribution) / self.m)
    }

    pub fn gain_for_adding(
        &self,
        hypernode: HyperNodeId,
        target: CommunityId,
        resolution: f64,
    ) -> f64 {
        self.hypernodes[hypernode].gain_for_adding(
            target,
            &self.communities,
            &self.hypernodes,
            resolution,
            self.m,
        )
    }

    /// Gain of adding the (detached) hypernode to each non-empty neighbor
    /// community, in community order. Neighbor weights are aggregated once.
    pub fn candidate_gains(&self, hypernode: HyperNodeId, resolution: f64) -> Vec<(CommunityId, f64)> {
        let h = &self.hypernodes[hypernode];
        h.weights_to_communities(&self.hypernodes)
            .into_iter()
            .filter_map(|(c, weight)| {
                let community = self.communities.get(c).filter(|c| !c.is_empty())?;
                Some((c, h.gain_for_weight(weight, community, resolution, self.m)))
            })
            .collect_vec()
    }

    pub fn neighbor_communities(&self, hypernode: HyperNodeId) -> Vec<CommunityId> {
        self.hypernodes[hypernode].neighbor_communities(&self.hypernodes, &self.communities)
    }

    pub fn add_to_community(&mut self, hypernode: HyperNodeId, target: CommunityId) {
        let h = &mut self.hypernodes[hypernode];
        let community = &mut self.communities[target];
        community.total_in_degree += h.total_in_degree;
        community.total_out_degree += h.total_out_degree;
        community.nodes.extend(h.nodes.iter().copied());
        for &n in &h.nodes {
            self.node_to_community.insert(n, target);
        }
        h.community = Some(target);
    }

    //########################################################
    // Coarsening
    //########################################################

    /// Replaces the hypergraph by one node per non-empty community, summing
    /// the edges between communities (intra-community weight becomes a
    /// self-loop), then initializes every new hypernode.
    pub fn coarsen(&mut self) -> Result<()> {
        let live = self.non_empty_communities().collect_vec();
        let mut renumber: Vec<Option<usize>> = vec![None; self.communities.len()];
        for (i, &c) in live.iter().enumerate() {
            renumber[c] = Some(i);
        }
        let mut new_graph = WeightedDiGraph::default();
        for i in 0..live.len() {
            new_graph.add_node(i);
        }
        for (s, t, edge) in self.hyper_graph.edges() {
            let cs = self.community_of_hypernode(s)?;
            let ct = self.community_of_hypernode(t)?;
            match (renumber[cs], renumber[ct]) {
                (Some(ns), Some(nt)) => new_graph.add_weight(ns, nt, edge.weight),
                _ => return Err(CommunityError::DetachedHyperNode(s)),
            }
        }

        let old_communities = std::mem::take(&mut self.communities);
        self.communities = live
            .iter()
            .map(|&c| Community::with_nodes(old_communities[c].nodes.clone()))
            .collect_vec();
        self.hypernodes = self
            .communities
            .iter()
            .enumerate()
            .map(|(i, c)| HyperNode::new(i, i, c.nodes.iter().copied().collect_vec()))
            .collect_vec();
        self.hyper_graph = new_graph;
        self.node_to_community.clear();
        self.node_to_hypernode.clear();
        for h in &self.hypernodes {
            for &n in &h.nodes {
                self.node_to_community.insert(n, h.id);
                self.node_to_hypernode.insert(n, h.id);
            }
        }
        self.level += 1;

        for h in 0..self.hypernodes.len() {
            self.init_hypernode(h)?;
        }
        debug!(
            level = self.level,
            hypernodes = self.hypernodes.len(),
            edges = self.hyper_graph.num_edges(),
            "coarsened hypergraph"
        );
        Ok(())
    }

    /// Merges split copies that ended up together, recomputes the degrees
    /// and neighbor weights of the hypernode and resets its community totals
    /// to them (valid only while the hypernode is alone in its community).
    /// Hypernodes that lost anchor edges to a merge are refreshed too.
    /// Returns the number of merges performed.
    pub fn init_hypernode(&mut self, hypernode: HyperNodeId) -> Result<usize> {
        let (merged, touched) = self.deduplicate_hypernode(hypernode)?;
        self.refresh_hypernode(hypernode);
        for h in touched {
            self.refresh_hypernode(h);
        }
        Ok(merged)
    }

    fn refresh_hypernode(&mut self, hypernode: HyperNodeId) {
        let h = &mut self.hypernodes[hypernode];
        h.refresh(&self.hyper_graph);
        if let Some(c) = h.community {
            let community = &mut self.communities[c];
            community.total_in_degree = h.total_in_degree;
            community.total_out_degree = h.total_out_degree;
        }
    }

    fn deduplicate_hypernode(&mut self, hypernode: HyperNodeId) -> Result<(usize, BTreeSet<HyperNodeId>)> {
        let mut occurrences: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for &n in &self.hypernodes[hypernode].nodes {
            occurrences
                .entry(self.provenance.original_of(n))
                .or_default()
                .push(n);
        }
        let mut merged = 0;
        let mut touched = BTreeSet::new();
        for (original, nodes) in occurrences {
            if nodes.len() < 2 {
                continue;
            }
            let keep = if nodes.contains(&original) {
                original
            } else {
                nodes[0]
            };
            for duplicate in nodes.into_iter().filter(|&n| n != keep) {
                if let Some(h) = self.merge_node_into(hypernode, duplicate, keep)? {
                    touched.insert(h);
                }
                merged += 1;
            }
        }
        Ok((merged, touched))
    }

    /// Folds `duplicate` into `keep` (both members of `hypernode`). The
    /// anchor edges between `duplicate` and the node it was split from are
    /// dropped wherever that node lives; every other edge is redirected onto
    /// `keep`. The copy is then forgotten everywhere. Returns the partner's
    /// hypernode when the dropped anchors crossed into another hypernode.
    fn merge_node_into(
        &mut self,
        hypernode: HyperNodeId,
        duplicate: usize,
        keep: usize,
    ) -> Result<Option<HyperNodeId>> {
        let before = self.origin_graph.total_weight();
        let before_hyper = self.hyper_graph.total_weight();

        let mut dropped = 0.0;
        let mut touched = None;
        if let Some(anchor) = self.provenance.anchor_of(duplicate) {
            let partner_hypernode = self
                .hypernode_of_node(anchor.partner)
                .ok_or(CommunityError::UnknownNode(anchor.partner))?;
            for (s, t, hs, ht) in [
                (duplicate, anchor.partner, hypernode, partner_hypernode),
                (anchor.partner, duplicate, partner_hypernode, hypernode),
            ] {
                let removed = self.origin_graph.digraph.reduce_weight(s, t, anchor.weight);
                self.hyper_graph.reduce_weight(hs, ht, removed);
                dropped += removed;
            }
            if partner_hypernode != hypernode {
                touched = Some(partner_hypernode);
            }
        }

        let digraph = &mut self.origin_graph.digraph;
        let out_edges = digraph
            .out_edges(duplicate)
            .map(|(t, e)| (t, e.clone()))
            .collect_vec();
        let in_edges = digraph
            .in_edges(duplicate)
            .map(|(s, e)| (s, e.clone()))
            .collect_vec();
        for (target, edge) in out_edges {
            let target = if target == duplicate { keep } else { target };
            digraph.merge_edge(keep, target, edge);
        }
        for (source, edge) in in_edges {
            if source == duplicate {
                continue;
            }
            digraph.merge_edge(source, keep, edge);
        }
        digraph.remove_node(duplicate);
        self.provenance.reassign_partner(duplicate, keep);
        self.forget_node(duplicate);
        self.live_penalty -= dropped;
        self.merges += 1;

        verify_conservation("merge", before - dropped, self.origin_graph.total_weight())?;
        verify_conservation("merge", before_hyper - dropped, self.hyper_graph.total_weight())?;
        debug!(
            duplicate = self.origin_graph.name(duplicate).unwrap_or("?"),
            keep = self.origin_graph.name(keep).unwrap_or("?"),
            dropped,
            "merged split copy"
        );
        Ok(touched)
    }

    /// Removes a node from its community, its hypernode, the lookup tables
    /// and the provenance table. The origin graph is left untouched.
    fn forget_node(&mut self, node: usize) {
        if let Some(c) = self.node_to_community.remove(&node) {
            self.communities[c].nodes.remove(&node);
        }
        if let Some(h) = self.node_to_hypernode.remove(&node) {
            self.hypernodes[h].nodes.retain(|&n| n != node);
        }
        self.provenance.forget(node);
    }

    //########################################################
    // Splitting
    //########################################################

    /// Sum of origin edge weight, both directions, between `node` and the
    /// current members of `community`.
    pub fn weight_from_node_to_community(&self, node: usize, community: CommunityId) -> f64 {
        let members = &self.communities[community].nodes;
        let digraph = &self.origin_graph.digraph;
        let outgoing: f64 = digraph
            .out_edges(node)
            .filter(|(t, _)| members.contains(t))
            .map(|(_, e)| e.weight)
            .sum();
        let incoming: f64 = digraph
            .in_edges(node)
            .filter(|(s, _)| members.contains(s))
            .map(|(_, e)| e.weight)
            .sum();
        outgoing + incoming
    }

    /// Splits `node` between `community_a` and `community_b`: a fresh copy is
    /// anchored to `node` by two edges of `penalty / 2`, takes over every
    /// edge between `node` and the community `node` does not live in, and
    /// joins that community. Returns the id of the copy.
    pub fn split_node(
        &mut self,
        node: usize,
        community_a: CommunityId,
        community_b: CommunityId,
        penalty: f64,
    ) -> Result<usize> {
        let before = self.origin_graph.total_weight();
        let before_hyper = self.hyper_graph.total_weight();

        let current = self
            .hypernode_of_node(node)
            .ok_or(CommunityError::UnknownNode(node))?;
        let home = self.community_of_hypernode(current)?;
        let other = if home == community_b {
            community_a
        } else {
            community_b
        };

        let base = self
            .origin_graph
            .name(node)
            .ok_or(CommunityError::UnknownNode(node))?
            .to_string();
        let split_name = self.origin_graph.fresh_split_name(&base);
        let split = self.origin_graph.request(&split_name);
        self.provenance.record(split, node);
        self.provenance.anchor(split, node, penalty / 2.0);
        let split_hypernode = self.hypernodes.len();
        self.hyper_graph.add_node(split_hypernode);

        self.origin_graph.digraph.add_weight(node, split, penalty / 2.0);
        self.origin_graph.digraph.add_weight(split, node, penalty / 2.0);
        self.hyper_graph.add_weight(current, split_hypernode, penalty / 2.0);
        self.hyper_graph.add_weight(split_hypernode, current, penalty / 2.0);

        let mut to_hypernodes: BTreeMap<HyperNodeId, f64> = BTreeMap::new();
        let mut from_hypernodes: BTreeMap<HyperNodeId, f64> = BTreeMap::new();
        let others = self.communities[other].nodes.iter().copied().collect_vec();
        for other_node in others {
            let other_hypernode = self
                .hypernode_of_node(other_node)
                .ok_or(CommunityError::UnknownNode(other_node))?;
            let pinned = self.provenance.anchor_weight_between(node, other_node);
            let digraph = &mut self.origin_graph.digraph;
            let moved = move_edge(digraph, (other_node, node), (other_node, split), pinned);
            if moved > 0.0 {
                *from_hypernodes.entry(other_hypernode).or_insert(0.0) += moved;
            }
            let moved = move_edge(digraph, (node, other_node), (split, other_node), pinned);
            if moved > 0.0 {
                *to_hypernodes.entry(other_hypernode).or_insert(0.0) += moved;
            }
        }
        for (&h, &weight) in &to_hypernodes {
            self.hyper_graph.add_weight(split_hypernode, h, weight);
            self.hyper_graph.reduce_weight(current, h, weight);
        }
        for (&h, &weight) in &from_hypernodes {
            self.hyper_graph.add_weight(h, split_hypernode, weight);
            self.hyper_graph.reduce_weight(h, current, weight);
        }

        verify_conservation("split", before + penalty, self.origin_graph.total_weight())?;
        verify_conservation("split", before_hyper + penalty, self.hyper_graph.total_weight())?;
        self.live_penalty += penalty;
        self.splits += 1;

        let mut h = HyperNode::new(split_hypernode, other, vec![split]);
        h.community = None;
        h.refresh(&self.hyper_graph);
        self.hypernodes.push(h);
        self.node_to_hypernode.insert(split, split_hypernode);
        self.add_to_community(split_hypernode, other);

        let touched = to_hypernodes
            .keys()
            .chain(from_hypernodes.keys())
            .copied()
            .chain(std::iter::once(current))
            .unique()
            .collect_vec();
        for h in touched {
            self.hypernodes[h].refresh(&self.hyper_graph);
        }
        self.recompute_community_totals(home);
        self.recompute_community_totals(other);

        debug!(
            node = base.as_str(),
            split = split_name.as_str(),
            penalty,
            moved = to_hypernodes.values().chain(from_hypernodes.values()).sum::<f64>(),
            "split node"
        );
        Ok(split)
    }

    fn recompute_community_totals(&mut self, community: CommunityId) {
        let (total_in, total_out) = self
            .hypernodes
            .iter()
            .filter(|h| h.community == Some(community))
            .fold((0.0, 0.0), |(i, o), h| {
                (i + h.total_in_degree, o + h.total_out_degree)
            });
        let c = &mut self.communities[community];
        c.total_in_degree = total_in;
        c.total_out_degree = total_out;
    }

    /// The split heuristic: every boundary node of every non-empty community
    /// is split towards each other community it is attached to by more than
    /// `penalty`. At most `budget` splits are performed; returns the count.
    pub fn split_boundary_nodes(&mut self, penalty: f64, budget: usize) -> Result<usize> {
        let snapshot = self.non_empty_communities().collect_vec();
        let mut performed = 0;
        for (i, &community) in snapshot.iter().enumerate() {
            let edge_nodes = self.communities[community].edge_nodes(&self.origin_graph.digraph);
            for node in edge_nodes {
                for (j, &other) in snapshot.iter().enumerate() {
                    if i == j {
                        continue;
                    }
                    let weight = self.weight_from_node_to_community(node, other);
                    if weight <= penalty {
                        continue;
                    }
                    if performed >= budget {
                        warn!(budget, "split budget exhausted, skipping remaining splits");
                        return Ok(performed);
                    }
                    debug!(
                        node = self.origin_graph.name(node).unwrap_or("?"),
                        weight,
                        "splitting boundary node"
                    );
                    self.split_node(node, community, other, penalty)?;
                    performed += 1;
                }
            }
        }
        Ok(performed)
    }
}

/// Moves the edge `from` onto `to`, leaving `pinned` weight (anchor edges of
/// an earlier split) in place. Returns the weight moved.
fn move_edge(
    digraph: &mut WeightedDiGraph,
    from: (usize, usize),
    to: (usize, usize),
    pinned: f64,
) -> f64 {
    let edge = match digraph.remove_edge(from.0, from.1) {
        Some(edge) => edge,
        None => return 0.0,
    };
    let moved = edge.weight - pinned;
    if moved <= WEIGHT_EPSILON {
        digraph.insert_edge(from.0, from.1, edge);
        return 0.0;
    }
    if pinned > 0.0 {
        digraph.insert_edge(from.0, from.1, Edge::new(pinned));
    }
    digraph.merge_edge(
        to.0,
        to.1,
        Edge {
            weight: moved,
            label: edge.label,
        },
    );
    moved
}
