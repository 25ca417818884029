use std::io::BufWriter;
use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use comfy_table::Table;
use indicatif::ParallelProgressIterator;
use rayon::prelude::*;
use shadow_rs::shadow;
use tracing::{info, warn};

use commsplit::detector::{detect, detect_with_ordering, DetectionConfig};
use commsplit::dump::{dump_detections_to_json, dump_graph_to_json};
use commsplit::io::{self, read_clustering, write_communities};
use commsplit::order::{AnyOrdering, OrderingSpecifier};
use commsplit::quality::{ClusteringSummary, CommunityInformation};
use commsplit::Graph;

shadow!(build);

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None, long_version = build::CLAP_LONG_VERSION)]
struct Args {
    #[clap(subcommand)]
    cmd: SubCommand,
    #[clap(short = 't', long)]
    threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum SubCommand {
    /// Detect overlapping communities
    Detect {
        /// Path to the edgelist graph
        #[clap(short, long)]
        graph: PathBuf,
        /// Output path for the clustering (`node<TAB>cid` per membership)
        #[clap(short, long)]
        output: PathBuf,
        #[clap(long, default_value_t = 1.0)]
        resolution: f64,
        /// Minimum modularity improvement per level
        #[clap(long, default_value_t = 1e-7)]
        threshold: f64,
        /// Cross-community weight needed to split a node, and the weight each split costs
        #[clap(short = 'p', long, default_value_t = 1.5)]
        split_penalty: f64,
        /// `identity`, `shuffle` or `shuffle:<seed>`
        #[clap(long, parse(try_from_str = io::parse_ordering_specifier))]
        ordering: Option<OrderingSpecifier>,
        #[clap(long, default_value_t = 100)]
        max_levels: usize,
        #[clap(long, default_value_t = 1000)]
        max_passes: usize,
        #[clap(long, default_value_t = 10_000)]
        max_splits: usize,
        #[clap(long, default_value_t = 42)]
        seed: u64,
        /// Optional JSON report of the run
        #[clap(long)]
        report: Option<PathBuf>,
        #[clap(long)]
        legacy_cid_nid_order: bool,
    },

    /// Run the detector once per split penalty, in parallel
    Sweep {
        /// Path to the edgelist graph
        #[clap(short, long)]
        graph: PathBuf,
        /// Comma separated split penalties, e.g. `1.5,2,3`
        #[clap(long)]
        penalties: String,
        #[clap(long, default_value_t = 1.0)]
        resolution: f64,
        #[clap(long, default_value_t = 42)]
        seed: u64,
        /// Output path for the JSON reports
        #[clap(short, long)]
        output: PathBuf,
    },

    /// Calculate statistics for a given clustering
    Stats {
        /// Path to the edgelist graph
        #[clap(short, long)]
        graph: PathBuf,
        /// Path to the clustering file
        #[clap(short, long)]
        clusters: PathBuf,
        #[clap(long)]
        legacy_cid_nid_order: bool,
        #[clap(long, default_value_t = 1.0)]
        resolution: f64,
        /// Output path for the per-community statistics (csv)
        #[clap(short, long)]
        output: PathBuf,
    },

    /// Dump basic information about the graph
    Dump {
        /// Path to the graph
        #[clap(short, long)]
        graph: PathBuf,
        /// Output path for the dumped graph in json format
        #[clap(short, long)]
        output: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let starting = Instant::now();
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    let mut num_cpu = num_cpus::get_physical().min(32);
    if let Some(specified_cores) = args.threads {
        if specified_cores > num_cpus::get_physical() {
            warn!("Specified more cores than available, using all available cores");
        } else {
            num_cpu = specified_cores;
        }
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_cpu)
        .build_global()?;
    match args.cmd {
        SubCommand::Detect {
            graph,
            output,
            resolution,
            threshold,
            split_penalty,
            ordering,
            max_levels,
            max_passes,
            max_splits,
            seed,
            report,
            legacy_cid_nid_order,
        } => {
            let now = Instant::now();
            let graph = Graph::parse_edgelist(&graph)?;
            info!(
                n = graph.n(),
                m = graph.num_edges(),
                total_weight = graph.total_weight(),
                "Graph loaded in {:?}",
                now.elapsed()
            );
            let config = DetectionConfig {
                resolution,
                threshold,
                split_penalty,
                max_levels,
                max_passes,
                max_splits,
                seed,
            };
            let ordering = ordering.unwrap_or(OrderingSpecifier::Shuffle(None));
            info!("Detecting communities with config: {:?}, ordering: {:?}", config, ordering);
            let now = Instant::now();
            let detection = match ordering {
                OrderingSpecifier::Shuffle(None) => detect(&graph, &config)?,
                spec => detect_with_ordering(&graph, &config, AnyOrdering::from_specifier(spec, seed))?,
            };
            info!(
                communities = detection.num_communities(),
                overlapping = detection.overlapping_nodes(),
                splits = detection.splits,
                merges = detection.merges,
                modularity = detection.final_modularity,
                stop = %detection.stop_reason,
                "Detection finished in {:?}",
                now.elapsed()
            );
            write_communities(&output, &detection.communities, legacy_cid_nid_order)?;
            if let Some(report) = report {
                dump_detections_to_json(std::slice::from_ref(&detection), report)?;
            }
        }
        SubCommand::Sweep {
            graph,
            penalties,
            resolution,
            seed,
            output,
        } => {
            let penalties = io::parse_penalty_list(&penalties).map_err(anyhow::Error::msg)?;
            let graph = Graph::parse_edgelist(&graph)?;
            info!(n = graph.n(), m = graph.num_edges(), "Graph loaded");
            let configs = penalties
                .iter()
                .map(|&p| {
                    DetectionConfig::default()
                        .with_split_penalty(p)
                        .with_resolution(resolution)
                        .with_seed(seed)
                })
                .collect::<Vec<_>>();
            for config in &configs {
                config.validate()?;
            }
            let now = Instant::now();
            let detections = configs
                .par_iter()
                .progress_count(configs.len() as u64)
                .map(|config| detect(&graph, config))
                .collect::<commsplit::Result<Vec<_>>>()?;
            for d in &detections {
                info!(
                    split_penalty = d.config.split_penalty,
                    communities = d.num_communities(),
                    overlapping = d.overlapping_nodes(),
                    modularity = d.final_modularity,
                    "sweep entry"
                );
            }
            info!("Sweep of {} runs finished in {:?}", detections.len(), now.elapsed());
            dump_detections_to_json(&detections, &output)?;
        }
        SubCommand::Stats {
            graph,
            clusters,
            legacy_cid_nid_order,
            resolution,
            output,
        } => {
            let graph = Graph::parse_edgelist(&graph)?;
            info!(n = graph.n(), m = graph.num_edges(), "Graph loaded");
            let clustering = read_clustering(&graph, &clusters, legacy_cid_nid_order)?;
            info!(
                "Clustering contains {} communities with {} entries",
                clustering.len(),
                clustering.values().map(|c| c.len()).sum::<usize>()
            );
            let entries = CommunityInformation::vec_from_clustering(&graph, &clustering, resolution);
            let buf_writer = BufWriter::new(std::fs::File::create(output)?);
            let mut wtr = csv::Writer::from_writer(buf_writer);
            for entry in entries {
                wtr.serialize(entry)?;
            }
            wtr.flush()?;

            let sets = clustering.into_values().collect::<Vec<_>>();
            let summary = ClusteringSummary::from_communities(&graph, &sets, resolution);
            let fmt_opt = |v: Option<f64>| v.map_or("-".to_string(), |v| format!("{:.6}", v));
            let mut table = Table::new();
            table.set_header(vec!["statistic", "value"]);
            table.add_row(vec!["communities".to_string(), summary.num_communities.to_string()]);
            table.add_row(vec!["node coverage".to_string(), format!("{:.4}", summary.node_coverage)]);
            table.add_row(vec![
                "overlapping nodes".to_string(),
                summary.overlapping_nodes.to_string(),
            ]);
            table.add_row(vec![
                "modularity (sum)".to_string(),
                format!("{:.6}", summary.total_modularity),
            ]);
            table.add_row(vec!["modularity (min)".to_string(), fmt_opt(summary.min_modularity)]);
            table.add_row(vec!["modularity (max)".to_string(), fmt_opt(summary.max_modularity)]);
            println!("{table}");
        }
        SubCommand::Dump { graph, output } => {
            let graph = Graph::parse_edgelist(&graph)?;
            dump_graph_to_json(&graph, &output)?;
        }
    }
    info!("commsplit finished in {:?}", starting.elapsed());
    Ok(())
}
