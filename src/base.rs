use crate::error::{CommunityError, Result};
use crate::utils::{is_valid_weight, NameSet, WEIGHT_EPSILON};
use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};
use tracing::debug;

/// A weighted directed edge. The label is carried along when an edge is
/// moved or merged but plays no role in the optimization.
#[derive(Default, Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    pub weight: f64,
    pub label: Option<String>,
}

impl Edge {
    pub fn new(weight: f64) -> Self {
        Edge {
            weight,
            label: None,
        }
    }

    pub fn labeled(weight: f64, label: impl Into<String>) -> Self {
        Edge {
            weight,
            label: Some(label.into()),
        }
    }
}

#[derive(Default, Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Adjacency {
    out_edges: BTreeMap<usize, Edge>,
    in_edges: BTreeSet<usize>,
}

/// A simple directed graph with `f64` weights over `usize` node keys.
///
/// Edges are stored once, in the adjacency of their source; the target only
/// records the source as a predecessor. All maps are ordered so that every
/// enumeration (and therefore every run of the detector) is deterministic.
/// It backs both the origin graph and the coarsened hypergraph.
#[derive(Default, Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeightedDiGraph {
    adjacency: BTreeMap<usize, Adjacency>,
}

impl WeightedDiGraph {
    pub fn add_node(&mut self, id: usize) {
        self.adjacency.entry(id).or_default();
    }

    pub fn contains_node(&self, id: usize) -> bool {
        self.adjacency.contains_key(&id)
    }

    /// Removes the node together with every incident edge.
    pub fn remove_node(&mut self, id: usize) {
        let adjacency = match self.adjacency.remove(&id) {
            Some(adjacency) => adjacency,
            None => return,
        };
        for target in adjacency.out_edges.keys() {
            if let Some(t) = self.adjacency.get_mut(target) {
                t.in_edges.remove(&id);
            }
        }
        for source in adjacency.in_edges.iter() {
            if let Some(s) = self.adjacency.get_mut(source) {
                s.out_edges.remove(&id);
            }
        }
    }

    /// Returns the number of nodes in the graph.
    pub fn n(&self) -> usize {
        self.adjacency.len()
    }

    /// Returns the number of (directed) edges in the graph.
    pub fn num_edges(&self) -> usize {
        self.adjacency.values().map(|a| a.out_edges.len()).sum()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = usize> + '_ {
        self.adjacency.keys().copied()
    }

    pub fn edge(&self, source: usize, target: usize) -> Option<&Edge> {
        self.adjacency.get(&source)?.out_edges.get(&target)
    }

    pub fn edge_weight(&self, source: usize, target: usize) -> Option<f64> {
        self.edge(source, target).map(|e| e.weight)
    }

    pub fn has_edge(&self, source: usize, target: usize) -> bool {
        self.edge(source, target).is_some()
    }

    /// Inserts the edge, replacing any existing edge between the same endpoints.
    pub fn insert_edge(&mut self, source: usize, target: usize, edge: Edge) {
        self.add_node(target);
        self.adjacency
            .entry(source)
            .or_default()
            .out_edges
            .insert(target, edge);
        if let Some(t) = self.adjacency.get_mut(&target) {
            t.in_edges.insert(source);
        }
    }

    /// Adds `edge` onto an existing edge (summing the weights, keeping the
    /// existing label if any) or inserts it.
    pub fn merge_edge(&mut self, source: usize, target: usize, edge: Edge) {
        let existing = self
            .adjacency
            .get_mut(&source)
            .and_then(|a| a.out_edges.get_mut(&target));
        match existing {
            Some(e) => {
                e.weight += edge.weight;
                if e.label.is_none() {
                    e.label = edge.label;
                }
            }
            None => self.insert_edge(source, target, edge),
        }
    }

    /// Accumulates `weight` onto the edge `source -> target`, creating it if needed.
    pub fn add_weight(&mut self, source: usize, target: usize, weight: f64) {
        self.merge_edge(source, target, Edge::new(weight));
    }

    pub fn remove_edge(&mut self, source: usize, target: usize) -> Option<Edge> {
        let edge = self.adjacency.get_mut(&source)?.out_edges.remove(&target)?;
        if let Some(t) = self.adjacency.get_mut(&target) {
            t.in_edges.remove(&source);
        }
        Some(edge)
    }

    /// Lowers the weight of `source -> target` by at most `weight`, removing
    /// the edge once it is consumed. Returns the weight actually removed.
    pub fn reduce_weight(&mut self, source: usize, target: usize, weight: f64) -> f64 {
        let current = match self.edge_weight(source, target) {
            Some(w) => w,
            None => return 0.0,
        };
        if current - weight > WEIGHT_EPSILON {
            if let Some(e) = self
                .adjacency
                .get_mut(&source)
                .and_then(|a| a.out_edges.get_mut(&target))
            {
                e.weight -= weight;
            }
            weight
        } else {
            self.remove_edge(source, target);
            current
        }
    }

    pub fn out_edges(&self, source: usize) -> impl Iterator<Item = (usize, &Edge)> + '_ {
        self.adjacency
            .get(&source)
            .into_iter()
            .flat_map(|a| a.out_edges.iter().map(|(&t, e)| (t, e)))
    }

    pub fn in_edges(&self, target: usize) -> impl Iterator<Item = (usize, &Edge)> + '_ {
        self.adjacency
            .get(&target)
            .into_iter()
            .flat_map(move |a| {
                a.in_edges
                    .iter()
                    .filter_map(move |&s| self.edge(s, target).map(|e| (s, e)))
            })
    }

    pub fn successors(&self, source: usize) -> impl Iterator<Item = usize> + '_ {
        self.out_edges(source).map(|(t, _)| t)
    }

    pub fn predecessors(&self, target: usize) -> impl Iterator<Item = usize> + '_ {
        self.adjacency
            .get(&target)
            .into_iter()
            .flat_map(|a| a.in_edges.iter().copied())
    }

    /// Weighted out-degree, self-loops included.
    pub fn out_degree(&self, id: usize) -> f64 {
        self.out_edges(id).map(|(_, e)| e.weight).sum()
    }

    /// Weighted in-degree, self-loops included.
    pub fn in_degree(&self, id: usize) -> f64 {
        self.in_edges(id).map(|(_, e)| e.weight).sum()
    }

    pub fn edges(&self) -> impl Iterator<Item = (usize, usize, &Edge)> + '_ {
        self.adjacency
            .iter()
            .flat_map(|(&s, a)| a.out_edges.iter().map(move |(&t, e)| (s, t, e)))
    }

    /// Sum of all edge weights.
    pub fn total_weight(&self) -> f64 {
        self.edges().map(|(_, _, e)| e.weight).sum()
    }
}

/// The origin graph: string identifiers interned into a [WeightedDiGraph].
/// As in the rest of the crate, node ids stored in the graph are the
/// *internal* ids; [NameSet] maps them back when writing output.
#[derive(Default, Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Graph {
    pub name_set: NameSet,
    pub digraph: WeightedDiGraph,
}

impl Graph {
    /// Returns the internal id of `name`, adding the node if it is new.
    pub fn request(&mut self, name: &str) -> usize {
        let id = self.name_set.request(name);
        self.digraph.add_node(id);
        id
    }

    pub fn retrieve(&self, name: &str) -> Option<usize> {
        self.name_set
            .retrieve(name)
            .filter(|&id| self.digraph.contains_node(id))
    }

    pub fn name(&self, id: usize) -> Option<&str> {
        self.name_set.rev(id)
    }

    /// Returns the number of nodes in the graph.
    pub fn n(&self) -> usize {
        self.digraph.n()
    }

    /// Returns the number of edges in the graph.
    pub fn num_edges(&self) -> usize {
        self.digraph.num_edges()
    }

    pub fn total_weight(&self) -> f64 {
        self.digraph.total_weight()
    }

    pub fn add_edge(&mut self, source: &str, target: &str, weight: f64) -> Result<()> {
        self.add_labeled_edge(source, target, weight, None)
    }

    /// Adds a weighted edge; parallel edges are summed into one.
    pub fn add_labeled_edge(
        &mut self,
        source: &str,
        target: &str,
        weight: f64,
        label: Option<String>,
    ) -> Result<()> {
        if !is_valid_weight(weight) {
            return Err(CommunityError::InvalidWeight {
                from: source.to_string(),
                to: target.to_string(),
                weight,
            });
        }
        let s = self.request(source);
        let t = self.request(target);
        self.digraph.merge_edge(s, t, Edge { weight, label });
        Ok(())
    }

    /// First unused `<base>__split_<k>` name.
    pub fn fresh_split_name(&self, base: &str) -> String {
        let mut counter = 0usize;
        loop {
            let candidate = format!("{}__split_{}", base, counter);
            if !self.name_set.contains(&candidate) {
                return candidate;
            }
            counter += 1;
        }
    }

    pub fn from_weighted_edges<I, S>(edges: I) -> Result<Graph>
    where
        I: IntoIterator<Item = (S, S, f64)>,
        S: AsRef<str>,
    {
        let mut graph = Graph::default();
        for (source, target, weight) in edges {
            graph.add_edge(source.as_ref(), target.as_ref(), weight)?;
        }
        Ok(graph)
    }

    /// Parses a whitespace separated edge list: `source target [weight [label]]`.
    /// A line with a single token declares an isolated node.
    pub fn parse_edgelist_from_reader<R: BufRead>(reader: R) -> anyhow::Result<Graph> {
        let mut graph = Graph::default();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.split_whitespace();
            let from = parts
                .next()
                .ok_or_else(|| anyhow::anyhow!("missing from"))?;
            let to = match parts.next() {
                Some(to) => to,
                None => {
                    graph.request(from);
                    continue;
                }
            };
            let weight = match parts.next() {
                Some(w) => w
                    .parse::<f64>()
                    .map_err(|e| anyhow::anyhow!("invalid weight on line {}: {}", lineno + 1, e))?,
                None => 1.0,
            };
            let label = parts.next().map(|l| l.to_string());
            if parts.next().is_some() {
                bail!("too many columns on line {}", lineno + 1);
            }
            graph.add_labeled_edge(from, to, weight, label)?;
        }
        Ok(graph)
    }

    pub fn parse_edgelist_from_str(s: &str) -> anyhow::Result<Graph> {
        let reader = BufReader::new(s.as_bytes());
        Graph::parse_edgelist_from_reader(reader)
    }

    pub fn parse_edgelist<P>(path: P) -> anyhow::Result<Graph>
    where
        P: AsRef<Path>,
    {
        debug!("loading from edgelist");
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        Self::parse_edgelist_from_reader(reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn can_parse_weighted_edgelist() -> anyhow::Result<()> {
        let graph = Graph::parse_edgelist_from_str(
            "# comment\na b 2.5\nb c\n\na b 0.5 mqtt\nlonely\n",
        )?;
        assert_eq!(4, graph.n());
        assert_eq!(2, graph.num_edges());
        let (a, b) = (graph.retrieve("a").unwrap(), graph.retrieve("b").unwrap());
        assert_eq!(Some(3.0), graph.digraph.edge_weight(a, b));
        assert_eq!(4.0, graph.total_weight());
        let e = graph.digraph.edge(a, b).unwrap();
        assert_eq!(Some("mqtt".to_string()), e.label);
        assert!(graph.retrieve("lonely").is_some());
        Ok(())
    }

    #[test]
    pub fn rejects_negative_weights() {
        assert!(Graph::parse_edgelist_from_str("a b -1").is_err());
        let err = Graph::from_weighted_edges(vec![("a", "b", f64::NAN)]).unwrap_err();
        assert!(matches!(err, CommunityError::InvalidWeight { .. }));
    }

    #[test]
    pub fn degrees_and_neighbors() -> anyhow::Result<()> {
        let graph = Graph::from_weighted_edges(vec![("a", "b", 1.0), ("b", "a", 2.0), ("c", "a", 4.0)])?;
        let a = graph.retrieve("a").unwrap();
        assert_eq!(1.0, graph.digraph.out_degree(a));
        assert_eq!(6.0, graph.digraph.in_degree(a));
        let preds: Vec<usize> = graph.digraph.predecessors(a).collect();
        assert_eq!(2, preds.len());
        assert_eq!(1, graph.digraph.successors(a).count());
        Ok(())
    }

    #[test]
    pub fn remove_node_drops_incident_edges() -> anyhow::Result<()> {
        let mut graph = Graph::from_weighted_edges(vec![("a", "b", 1.0), ("b", "c", 2.0), ("c", "b", 3.0)])?;
        let b = graph.retrieve("b").unwrap();
        graph.digraph.remove_node(b);
        assert_eq!(2, graph.n());
        assert_eq!(0, graph.num_edges());
        assert_eq!(0.0, graph.total_weight());
        assert!(graph.retrieve("b").is_none());
        Ok(())
    }

    #[test]
    pub fn reduce_weight_consumes_edges() {
        let mut g = WeightedDiGraph::default();
        g.add_weight(0, 1, 3.0);
        assert_eq!(1.0, g.reduce_weight(0, 1, 1.0));
        assert_eq!(Some(2.0), g.edge_weight(0, 1));
        assert_eq!(2.0, g.reduce_weight(0, 1, 5.0));
        assert!(!g.has_edge(0, 1));
        assert_eq!(0, g.predecessors(1).count());
        assert_eq!(0.0, g.reduce_weight(0, 1, 1.0));
    }

    #[test]
    pub fn merge_edge_keeps_first_label() {
        let mut g = WeightedDiGraph::default();
        g.insert_edge(0, 1, Edge::labeled(1.0, "topic/a"));
        g.merge_edge(0, 1, Edge::labeled(2.0, "topic/b"));
        let e = g.edge(0, 1).unwrap();
        assert_eq!(3.0, e.weight);
        assert_eq!(Some("topic/a".to_string()), e.label);
    }

    #[test]
    pub fn fresh_split_names_skip_taken_ones() -> anyhow::Result<()> {
        let mut graph = Graph::from_weighted_edges(vec![("x", "x__split_0", 1.0)])?;
        assert_eq!("x__split_1", graph.fresh_split_name("x"));
        graph.request("x__split_1");
        assert_eq!("x__split_2", graph.fresh_split_name("x"));
        Ok(())
    }
}
