use std::collections::{BTreeMap, BTreeSet};

use ahash::AHashMap;
use ordered_float::NotNan;
use serde::{Deserialize, Serialize};

use crate::base::{Graph, WeightedDiGraph};
use crate::community::Community;

/// Directed modularity of a partition:
/// `Q = sum_C [ e_C / m - resolution * out(C) * in(C) / m^2 ]`
/// where `e_C` is the weight inside `C` (self-loops included) and `m` the
/// total weight of `g`. Nodes missing from the partition contribute nothing.
pub fn directed_modularity(g: &WeightedDiGraph, partition: &[BTreeSet<usize>], resolution: f64) -> f64 {
    let m = g.total_weight();
    if m <= 0.0 {
        return 0.0;
    }
    let mut membership: AHashMap<usize, usize> = AHashMap::new();
    for (i, community) in partition.iter().enumerate() {
        for &n in community {
            membership.insert(n, i);
        }
    }
    let k = partition.len();
    let (mut internal, mut out_deg, mut in_deg) = (vec![0.0; k], vec![0.0; k], vec![0.0; k]);
    for (s, t, edge) in g.edges() {
        let cs = membership.get(&s).copied();
        let ct = membership.get(&t).copied();
        if let Some(cs) = cs {
            out_deg[cs] += edge.weight;
        }
        if let Some(ct) = ct {
            in_deg[ct] += edge.weight;
        }
        if let (Some(cs), Some(ct)) = (cs, ct) {
            if cs == ct {
                internal[cs] += edge.weight;
            }
        }
    }
    (0..k)
        .map(|c| internal[c] / m - resolution * out_deg[c] * in_deg[c] / (m * m))
        .sum()
}

/// Modularity contribution of a single (possibly overlapping) community.
pub fn community_modularity(g: &WeightedDiGraph, community: &BTreeSet<usize>, resolution: f64) -> f64 {
    let m = g.total_weight();
    if m <= 0.0 {
        return 0.0;
    }
    let (internal, _, out_deg, in_deg) = community_weights(g, community);
    internal / m - resolution * out_deg * in_deg / (m * m)
}

/// (internal weight, cut weight, out degree, in degree) of a node set.
fn community_weights(g: &WeightedDiGraph, community: &BTreeSet<usize>) -> (f64, f64, f64, f64) {
    let (mut internal, mut cut, mut out_deg, mut in_deg) = (0.0, 0.0, 0.0, 0.0);
    for &n in community {
        for (t, e) in g.out_edges(n) {
            out_deg += e.weight;
            if community.contains(&t) {
                internal += e.weight;
            } else {
                cut += e.weight;
            }
        }
        for (s, e) in g.in_edges(n) {
            in_deg += e.weight;
            if !community.contains(&s) {
                cut += e.weight;
            }
        }
    }
    (internal, cut, out_deg, in_deg)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommunityInformation {
    pub cid: usize,
    pub n: usize,
    pub boundary_n: usize,
    pub internal_weight: f64,
    pub cut_weight: f64,
    pub modularity: f64,
}

impl CommunityInformation {
    pub fn from_community(g: &WeightedDiGraph, cid: usize, community: &BTreeSet<usize>, resolution: f64) -> Self {
        let (internal_weight, cut_weight, _, _) = community_weights(g, community);
        let boundary_n = Community::with_nodes(community.clone()).edge_nodes(g).len();
        CommunityInformation {
            cid,
            n: community.len(),
            boundary_n,
            internal_weight,
            cut_weight,
            modularity: community_modularity(g, community, resolution),
        }
    }

    pub fn vec_from_clustering(
        g: &Graph,
        clustering: &BTreeMap<usize, BTreeSet<usize>>,
        resolution: f64,
    ) -> Vec<Self> {
        clustering
            .iter()
            .map(|(&cid, c)| Self::from_community(&g.digraph, cid, c, resolution))
            .collect()
    }
}

/// Summary over a clustering that may contain overlapping communities.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusteringSummary {
    pub num_communities: usize,
    pub node_coverage: f64,
    pub overlapping_nodes: usize,
    pub total_modularity: f64,
    pub min_modularity: Option<f64>,
    pub max_modularity: Option<f64>,
}

impl ClusteringSummary {
    pub fn from_communities(g: &Graph, communities: &[BTreeSet<usize>], resolution: f64) -> Self {
        let mut memberships: AHashMap<usize, usize> = AHashMap::new();
        for c in communities {
            for &n in c {
                *memberships.entry(n).or_insert(0) += 1;
            }
        }
        let n = g.n();
        let node_coverage = if n == 0 {
            0.0
        } else {
            memberships.len() as f64 / n as f64
        };
        let scores: Vec<NotNan<f64>> = communities
            .iter()
            .filter_map(|c| NotNan::new(community_modularity(&g.digraph, c, resolution)).ok())
            .collect();
        ClusteringSummary {
            num_communities: communities.len(),
            node_coverage,
            overlapping_nodes: memberships.values().filter(|&&k| k > 1).count(),
            total_modularity: scores.iter().map(|s| s.into_inner()).sum(),
            min_modularity: scores.iter().min().map(|s| s.into_inner()),
            max_modularity: scores.iter().max().map(|s| s.into_inner()),
        }
    }
}
