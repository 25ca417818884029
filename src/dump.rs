use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};

use crate::base::Graph;
use crate::detector::Detection;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeightedDegree {
    pub in_degree: f64,
    pub out_degree: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphDump {
    pub n: usize,
    pub m: usize,
    pub total_weight: f64,
    pub degrees: BTreeMap<String, WeightedDegree>,
}

pub fn dump_graph(graph: &Graph) -> GraphDump {
    let mut degrees = BTreeMap::new();
    for id in graph.digraph.node_ids() {
        if let Some(name) = graph.name(id) {
            degrees.insert(
                name.to_string(),
                WeightedDegree {
                    in_degree: graph.digraph.in_degree(id),
                    out_degree: graph.digraph.out_degree(id),
                },
            );
        }
    }
    GraphDump {
        n: graph.n(),
        m: graph.num_edges(),
        total_weight: graph.total_weight(),
        degrees,
    }
}

pub fn dump_graph_to_json<P: AsRef<Path>>(graph: &Graph, p: P) -> anyhow::Result<()> {
    let dump = dump_graph(graph);
    let json = serde_json::to_string_pretty(&dump)?;
    std::fs::write(p, json)?;
    Ok(())
}

/// Writes one or more detection reports as pretty JSON.
pub fn dump_detections_to_json<P: AsRef<Path>>(detections: &[Detection], p: P) -> anyhow::Result<()> {
    let json = match detections {
        [single] => serde_json::to_string_pretty(single)?,
        many => serde_json::to_string_pretty(many)?,
    };
    std::fs::write(p, json)?;
    Ok(())
}
