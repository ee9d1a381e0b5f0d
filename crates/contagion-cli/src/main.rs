//! CLI for contagion: measure how emotion carries from parent comments into replies.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "contagion")]
#[command(about = "contagion: emotional propagation analysis for threaded discussions")]
#[command(version = contagion_core::VERSION)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full analysis: correlation, transitions, propagation ranking,
    /// depth decay, significance tests and outliers.
    Analyze {
        /// Labeled pair batch (.csv with header row, or a JSON array)
        input: String,

        /// Analysis configuration JSON; flags below override its fields
        #[arg(long)]
        config: Option<String>,

        /// Write the full report as JSON
        #[arg(long)]
        output: Option<String>,

        /// Print the JSON report to stdout instead of the summary
        #[arg(long)]
        json: bool,

        /// Depth buckets smaller than this are low-confidence
        #[arg(long)]
        min_bucket_size: Option<usize>,

        /// Outlier |z| threshold
        #[arg(long)]
        z_threshold: Option<f64>,

        /// Per-depth decay metric
        #[arg(long, value_parser = ["match_rate", "propagation_strength"])]
        decay_metric: Option<String>,

        /// Per-thread statistic for outlier detection
        #[arg(long, value_parser = ["match_rate", "mean_valence_shift"])]
        outlier_statistic: Option<String>,

        /// Depths compared by the z-test, as "A,B"
        #[arg(long)]
        depth_groups: Option<String>,

        /// Label shuffles for the permutation test (0 disables it)
        #[arg(long)]
        permutations: Option<usize>,

        /// Permutation test seed
        #[arg(long)]
        seed: Option<u64>,

        /// Run every component on the calling thread
        #[arg(long)]
        serial: bool,
    },

    /// Load and validate a batch without analyzing it
    Validate {
        /// Labeled pair batch (.csv or .json)
        input: String,
    },

    /// Print the fine label → macro category / valence table
    Taxonomy {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resolve active fine-grained labels into one macro label and valence
    Resolve {
        /// Active fine labels, e.g. `admiration joy`
        labels: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    commands::init_logging(cli.verbose);

    match cli.command {
        Commands::Analyze {
            input,
            config,
            output,
            json,
            min_bucket_size,
            z_threshold,
            decay_metric,
            outlier_statistic,
            depth_groups,
            permutations,
            seed,
            serial,
        } => commands::analyze::run(commands::analyze::AnalyzeCommandConfig {
            input: &input,
            config_path: config.as_deref(),
            output_path: output.as_deref(),
            json,
            overrides: commands::analyze::ConfigOverrides {
                min_bucket_size,
                z_threshold,
                decay_metric: decay_metric.as_deref(),
                outlier_statistic: outlier_statistic.as_deref(),
                depth_groups: depth_groups.as_deref(),
                permutations,
                seed,
                serial,
            },
        }),
        Commands::Validate { input } => commands::validate::run(&input),
        Commands::Taxonomy { json } => commands::taxonomy::run(json),
        Commands::Resolve { labels } => commands::resolve::run(&labels),
    }
}
