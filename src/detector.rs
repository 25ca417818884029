use std::collections::BTreeSet;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use tracing::{debug, info, warn};

use crate::base::Graph;
use crate::communities::Communities;
use crate::error::{CommunityError, Result};
use crate::order::{NodeOrdering, SeededShuffle};

/// Parameters of one detection run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Scales the expected-edges term of the modularity.
    pub resolution: f64,
    /// Minimum modularity improvement per level required to continue.
    pub threshold: f64,
    /// Cross-community weight above which a boundary node is split; also the
    /// weight injected by each split.
    pub split_penalty: f64,
    pub max_levels: usize,
    /// Local-search passes per level before giving up on convergence.
    pub max_passes: usize,
    /// Splits allowed over the whole run.
    pub max_splits: usize,
    pub seed: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        DetectionConfig {
            resolution: 1.0,
            threshold: 1e-7,
            split_penalty: 1.5,
            max_levels: 100,
            max_passes: 1000,
            max_splits: 10_000,
            seed: 42,
        }
    }
}

impl DetectionConfig {
    pub fn with_resolution(mut self, resolution: f64) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_split_penalty(mut self, split_penalty: f64) -> Self {
        self.split_penalty = split_penalty;
        self
    }

    pub fn with_max_levels(mut self, max_levels: usize) -> Self {
        self.max_levels = max_levels;
        self
    }

    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes;
        self
    }

    pub fn with_max_splits(mut self, max_splits: usize) -> Self {
        self.max_splits = max_splits;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        fn invalid(name: &'static str, message: String) -> Result<()> {
            Err(CommunityError::InvalidParameter { name, message })
        }
        if !self.split_penalty.is_finite() || self.split_penalty <= 1.0 {
            return invalid(
                "split_penalty",
                format!("must be a finite value above 1.0, got {}", self.split_penalty),
            );
        }
        if !self.resolution.is_finite() || self.resolution <= 0.0 {
            return invalid(
                "resolution",
                format!("must be finite and positive, got {}", self.resolution),
            );
        }
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return invalid(
                "threshold",
                format!("must be finite and non-negative, got {}", self.threshold),
            );
        }
        for (name, value) in [
            ("max_levels", self.max_levels),
            ("max_passes", self.max_passes),
            ("max_splits", self.max_splits),
        ] {
            if value == 0 {
                return invalid(name, "must be at least 1".to_string());
            }
        }
        Ok(())
    }
}

/// What happened during one level of the detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelSummary {
    pub level: usize,
    pub hypernodes: usize,
    pub passes: usize,
    pub moved: usize,
    pub converged: bool,
    pub splits: usize,
    pub merges: usize,
    pub modularity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    #[strum(serialize = "modularity improvement below threshold")]
    BelowThreshold,
    #[strum(serialize = "local search made no move")]
    NoMoves,
    #[strum(serialize = "level cap reached")]
    LevelCap,
    #[strum(serialize = "degenerate input")]
    Degenerate,
}

/// Result of a run: overlapping communities of origin node names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub config: DetectionConfig,
    pub communities: Vec<BTreeSet<String>>,
    pub levels: Vec<LevelSummary>,
    pub stop_reason: StopReason,
    pub initial_modularity: f64,
    pub final_modularity: f64,
    pub splits: usize,
    pub merges: usize,
    pub live_splits: usize,
    pub initial_weight: f64,
    pub final_weight: f64,
    pub live_penalty: f64,
}

impl Detection {
    pub fn num_communities(&self) -> usize {
        self.communities.len()
    }

    /// Number of origin nodes that belong to more than one community.
    pub fn overlapping_nodes(&self) -> usize {
        let mut seen = BTreeSet::new();
        let mut overlapping = BTreeSet::new();
        for node in self.communities.iter().flatten() {
            if !seen.insert(node) {
                overlapping.insert(node);
            }
        }
        overlapping.len()
    }
}

struct LocalSearchOutcome {
    passes: usize,
    moved: usize,
    converged: bool,
}

/// Multi-level directed-modularity optimizer with node splitting.
pub struct CommunityDetector<O: NodeOrdering = SeededShuffle> {
    communities: Communities,
    config: DetectionConfig,
    ordering: O,
}

impl CommunityDetector<SeededShuffle> {
    /// Takes ownership of `graph`, which is mutated by splits and merges.
    pub fn new(graph: Graph, config: DetectionConfig) -> Result<Self> {
        let ordering = SeededShuffle::new(config.seed);
        Self::with_ordering(graph, config, ordering)
    }
}

impl<O: NodeOrdering> CommunityDetector<O> {
    pub fn with_ordering(graph: Graph, config: DetectionConfig, ordering: O) -> Result<Self> {
        config.validate()?;
        Ok(CommunityDetector {
            communities: Communities::new(graph),
            config,
            ordering,
        })
    }

    pub fn communities(&self) -> &Communities {
        &self.communities
    }

    pub fn run(mut self) -> Result<Detection> {
        let resolution = self.config.resolution;
        let initial_modularity = self.communities.modularity(resolution);
        if self.communities.origin_graph.n() < 2 || self.communities.m() <= 0.0 {
            info!(
                n = self.communities.origin_graph.n(),
                m = self.communities.m(),
                "degenerate input, returning singletons"
            );
            return Ok(self.finish(Vec::new(), StopReason::Degenerate, initial_modularity));
        }

        let mut levels = Vec::new();
        let mut previous = initial_modularity;
        let mut stop_reason = StopReason::LevelCap;
        for _ in 0..self.config.max_levels {
            let merges_before = self.communities.merges_performed();
            self.communities.coarsen()?;
            let merges = self.communities.merges_performed() - merges_before;
            let level = self.communities.level();
            let hypernodes = self.communities.current_hypernodes().len();

            let outcome = self.local_search()?;
            let splits = self.split_pass()?;
            let modularity = self.communities.modularity(resolution);
            info!(
                level,
                hypernodes,
                passes = outcome.passes,
                moved = outcome.moved,
                splits,
                merges,
                modularity,
                "level finished"
            );
            levels.push(LevelSummary {
                level,
                hypernodes,
                passes: outcome.passes,
                moved: outcome.moved,
                converged: outcome.converged,
                splits,
                merges,
                modularity,
            });

            if outcome.moved == 0 {
                stop_reason = StopReason::NoMoves;
                break;
            }
            if modularity - previous < self.config.threshold {
                stop_reason = StopReason::BelowThreshold;
                break;
            }
            previous = modularity;
        }
        if stop_reason == StopReason::LevelCap {
            warn!(max_levels = self.config.max_levels, "level cap reached");
        }
        Ok(self.finish(levels, stop_reason, initial_modularity))
    }

    /// Moves hypernodes between communities until a full pass moves nothing
    /// or the pass cap is hit.
    fn local_search(&mut self) -> Result<LocalSearchOutcome> {
        let resolution = self.config.resolution;
        let mut order = self.communities.current_hypernodes();
        self.ordering.arrange(&mut order);

        let mut outcome = LocalSearchOutcome {
            passes: 0,
            moved: 0,
            converged: false,
        };
        while outcome.passes < self.config.max_passes {
            outcome.passes += 1;
            let mut moved = 0;
            for &h in &order {
                let current = self.communities.community_of_hypernode(h)?;
                let remove_cost = self.communities.remove_from_current_community(h, resolution)?;
                let mut best = (current, 0.0);
                for (c, gain) in self.communities.candidate_gains(h, resolution) {
                    let gain = remove_cost + gain;
                    if gain > best.1 {
                        best = (c, gain);
                    }
                }
                self.communities.add_to_community(h, best.0);
                if best.0 != current {
                    moved += 1;
                }
            }
            debug!(pass = outcome.passes, moved, "local search pass");
            outcome.moved += moved;
            if moved == 0 {
                outcome.converged = true;
                break;
            }
        }
        if !outcome.converged {
            warn!(
                level = self.communities.level(),
                max_passes = self.config.max_passes,
                "local search did not converge"
            );
        }
        Ok(outcome)
    }

    fn split_pass(&mut self) -> Result<usize> {
        let budget = self
            .config
            .max_splits
            .saturating_sub(self.communities.splits_performed());
        if budget == 0 {
            debug!("split budget spent, skipping split pass");
            return Ok(0);
        }
        self.communities
            .split_boundary_nodes(self.config.split_penalty, budget)
    }

    fn finish(self, levels: Vec<LevelSummary>, stop_reason: StopReason, initial_modularity: f64) -> Detection {
        let c = &self.communities;
        Detection {
            config: self.config,
            communities: c.named_communities(),
            levels,
            stop_reason,
            initial_modularity,
            final_modularity: c.modularity(self.config.resolution),
            splits: c.splits_performed(),
            merges: c.merges_performed(),
            live_splits: c.live_splits(),
            initial_weight: c.initial_weight(),
            final_weight: c.origin_graph.total_weight(),
            live_penalty: c.live_penalty(),
        }
    }
}

/// Runs the detector with a seeded shuffle on a private copy of `graph`.
pub fn detect(graph: &Graph, config: &DetectionConfig) -> Result<Detection> {
    CommunityDetector::new(graph.clone(), *config)?.run()
}

pub fn detect_with_ordering<O: NodeOrdering>(
    graph: &Graph,
    config: &DetectionConfig,
    ordering: O,
) -> Result<Detection> {
    CommunityDetector::with_ordering(graph.clone(), *config, ordering)?.run()
}

/// Independent runs over the same graph, one per configuration, in parallel.
pub fn detect_many(graph: &Graph, configs: &[DetectionConfig]) -> Result<Vec<Detection>> {
    configs
        .par_iter()
        .map(|config| detect(graph, config))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_gen::concrete_examples;
    use crate::order::IdentityOrder;

    fn sets(list: &[&[&str]]) -> Vec<BTreeSet<String>> {
        let mut v = list
            .iter()
            .map(|c| c.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>())
            .collect::<Vec<_>>();
        v.sort();
        v
    }

    fn sorted(detection: &Detection) -> Vec<BTreeSet<String>> {
        let mut v = detection.communities.clone();
        v.sort();
        v
    }

    #[test]
    pub fn disjoint_edges_form_two_communities() -> anyhow::Result<()> {
        let g = concrete_examples::two_disjoint_edges();
        let detection = detect(&g, &DetectionConfig::default())?;
        assert_eq!(sets(&[&["A", "B"], &["C", "D"]]), sorted(&detection));
        assert_eq!(StopReason::NoMoves, detection.stop_reason);
        assert!((detection.final_modularity - 0.5).abs() < 1e-12);
        assert_eq!(0, detection.splits);
        Ok(())
    }

    #[test]
    pub fn single_edge_a_to_b_stays_apart_at_unit_resolution() -> anyhow::Result<()> {
        let g = concrete_examples::single_edge();
        let detection = detect(&g, &DetectionConfig::default())?;
        assert_eq!(sets(&[&["A"], &["B"]]), sorted(&detection));
        assert_eq!(0, detection.levels[0].moved);
        let detection = detect(&g, &DetectionConfig::default().with_resolution(0.5))?;
        assert_eq!(sets(&[&["A", "B"]]), sorted(&detection));
        assert!(detection.final_modularity > detection.initial_modularity);
        Ok(())
    }

    #[test]
    pub fn triangles_separate_and_modularity_never_drops() -> anyhow::Result<()> {
        let g = concrete_examples::two_triangles_with_bridge();
        let detection = detect_with_ordering(&g, &DetectionConfig::default(), IdentityOrder)?;
        assert_eq!(
            sets(&[&["a1", "a2", "a3"], &["b1", "b2", "b3"]]),
            sorted(&detection)
        );
        assert!((detection.final_modularity - 18.0 / 49.0).abs() < 1e-12);
        assert_eq!(3, detection.levels[0].passes);
        assert!(detection.levels[0].converged);
        let mut previous = detection.initial_modularity;
        for level in &detection.levels {
            assert!(level.modularity >= previous - 1e-12);
            previous = level.modularity;
        }
        Ok(())
    }

    #[test]
    pub fn caps_are_reported() -> anyhow::Result<()> {
        let g = concrete_examples::two_triangles_with_bridge();
        let config = DetectionConfig::default().with_max_levels(1);
        let detection = detect_with_ordering(&g, &config, IdentityOrder)?;
        assert_eq!(1, detection.levels.len());
        assert_eq!(StopReason::LevelCap, detection.stop_reason);

        let config = DetectionConfig::default().with_max_passes(1);
        let detection = detect_with_ordering(&g, &config, IdentityOrder)?;
        assert_eq!(1, detection.levels[0].passes);
        assert!(!detection.levels[0].converged);
        Ok(())
    }

    #[test]
    pub fn every_node_is_covered_and_weight_is_accounted_for() -> anyhow::Result<()> {
        let g = concrete_examples::two_groups_with_shared_hub();
        let detection = detect(&g, &DetectionConfig::default())?;
        let covered: BTreeSet<&String> = detection.communities.iter().flatten().collect();
        for name in ["p1", "p2", "p3", "q1", "q2", "q3", "h"] {
            assert!(covered.contains(&name.to_string()), "{} not covered", name);
        }
        assert!(covered.iter().all(|n| !n.contains("__split_")));
        assert_eq!(36.0, detection.initial_weight);
        assert!(
            (detection.final_weight - (detection.initial_weight + detection.live_penalty)).abs()
                < 1e-9
        );
        let expected = detection.initial_weight
            + detection.config.split_penalty * detection.live_splits as f64;
        assert!((detection.final_weight - expected).abs() < 1e-9);
        assert!(detection.splits >= detection.live_splits);
        Ok(())
    }

    #[test]
    pub fn bridge_node_is_shared_by_both_communities() -> anyhow::Result<()> {
        let g = concrete_examples::split_bridge_graph();
        let config = DetectionConfig::default();
        let detection = detect(&g, &config)?;
        assert_eq!(sets(&[&["A", "X"], &["B", "X"]]), sorted(&detection));
        assert_eq!(1, detection.splits);
        assert_eq!(1, detection.live_splits);
        assert_eq!(1, detection.overlapping_nodes());
        assert_eq!(StopReason::NoMoves, detection.stop_reason);
        assert_eq!(6.0, detection.initial_weight);
        let expected = detection.initial_weight + config.split_penalty * detection.live_splits as f64;
        assert!((detection.final_weight - expected).abs() < 1e-9);
        Ok(())
    }

    #[test]
    pub fn equal_seeds_give_equal_results() -> anyhow::Result<()> {
        let g = concrete_examples::two_groups_with_shared_hub();
        let config = DetectionConfig::default().with_seed(7);
        assert_eq!(detect(&g, &config)?, detect(&g, &config)?);
        let g = concrete_examples::two_triangles_with_bridge();
        assert_eq!(detect(&g, &config)?, detect(&g, &config)?);
        Ok(())
    }

    #[test]
    pub fn detect_many_matches_sequential_runs() -> anyhow::Result<()> {
        let g = concrete_examples::two_groups_with_shared_hub();
        let configs = [1.5, 2.0, 3.0]
            .iter()
            .map(|&p| DetectionConfig::default().with_split_penalty(p))
            .collect::<Vec<_>>();
        let parallel = detect_many(&g, &configs)?;
        assert_eq!(3, parallel.len());
        for (config, detection) in configs.iter().zip(parallel.iter()) {
            assert_eq!(&detect(&g, config)?, detection);
        }
        Ok(())
    }

    #[test]
    pub fn invalid_configurations_are_rejected() {
        let g = concrete_examples::single_edge();
        for config in [
            DetectionConfig::default().with_split_penalty(1.0),
            DetectionConfig::default().with_split_penalty(f64::INFINITY),
            DetectionConfig::default().with_resolution(0.0),
            DetectionConfig::default().with_threshold(-1.0),
            DetectionConfig::default().with_max_levels(0),
            DetectionConfig::default().with_max_splits(0),
        ] {
            let err = detect(&g, &config).unwrap_err();
            assert!(matches!(err, CommunityError::InvalidParameter { .. }));
        }
        assert!(DetectionConfig::default().validate().is_ok());
    }

    #[test]
    pub fn degenerate_inputs_return_singletons() -> anyhow::Result<()> {
        let detection = detect(&Graph::default(), &DetectionConfig::default())?;
        assert!(detection.communities.is_empty());
        assert_eq!(StopReason::Degenerate, detection.stop_reason);

        let g = Graph::parse_edgelist_from_str("lonely\n")?;
        let detection = detect(&g, &DetectionConfig::default())?;
        assert_eq!(sets(&[&["lonely"]]), sorted(&detection));

        let g = Graph::parse_edgelist_from_str("a\nb\na c 0\n")?;
        let detection = detect(&g, &DetectionConfig::default())?;
        assert_eq!(sets(&[&["a"], &["b"], &["c"]]), sorted(&detection));
        assert!(detection.levels.is_empty());
        assert_eq!(0.0, detection.final_modularity);
        Ok(())
    }

    #[test]
    pub fn stop_reasons_display() {
        assert_eq!("level cap reached", StopReason::LevelCap.to_string());
        assert_eq!(
            "\"no_moves\"",
            serde_json::to_string(&StopReason::NoMoves).unwrap()
        );
    }
}
