//! Command-line interface for the membership pipeline.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::MinSamplesRange;
use crate::core::catalog::load_catalog;
use crate::core::writers::{load_probabilities, write_members};
use crate::processors::batch::{find_catalogs, process_batch, process_catalog, CatalogReport};
use crate::processors::selection::{effective_cut, select_members};
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "membership-pipeline")]
#[command(about = "Star cluster membership probabilities from proper motions and parallax", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate membership probabilities for a catalog or a directory of catalogs
    Run {
        /// Catalog file, or directory searched for `*_match.dat` catalogs
        input: PathBuf,
        /// Output directory for probability tables (defaults to next to each input)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Monte-Carlo trials per min_samples value
        #[arg(long)]
        runs: Option<usize>,
        /// Base random seed
        #[arg(long)]
        seed: Option<u64>,
        /// Number of principal components kept
        #[arg(long)]
        pca_dims: Option<usize>,
        /// Percentile of member distances used by the eps sweep
        #[arg(long)]
        perc_cut: Option<f64>,
        /// First min_samples value
        #[arg(long)]
        min_samples_start: Option<usize>,
        /// End of the min_samples range (exclusive)
        #[arg(long)]
        min_samples_stop: Option<usize>,
        /// Step of the min_samples range
        #[arg(long)]
        min_samples_step: Option<usize>,
    },

    /// Select members from a catalog and its probability table
    Members {
        /// Catalog the probabilities were computed for
        catalog: PathBuf,
        /// Probability table written by `run`
        probs: PathBuf,
        /// Output member table (defaults to `<probs stem>_members.dat`)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Probability cut, lowered to the best probability if unreachable
        #[arg(long)]
        prob_cut: Option<f64>,
    },

    /// Write the default configuration as YAML
    InitConfig {
        /// Destination file
        path: PathBuf,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            format!("{}...", value.chars().take(36).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Load config
    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("Failed to load config from {}: {}, using defaults", path.display(), e);
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    // Dispatch to subcommands
    match cli.command {
        Commands::Run {
            input,
            output_dir,
            runs,
            seed,
            pca_dims,
            perc_cut,
            min_samples_start,
            min_samples_stop,
            min_samples_step,
        } => {
            let mut config = config;
            let membership = &mut config.membership;
            membership.n_runs = runs.unwrap_or(membership.n_runs);
            membership.seed = seed.or(membership.seed);
            membership.pca_dims = pca_dims.unwrap_or(membership.pca_dims);
            membership.perc_cut = perc_cut.unwrap_or(membership.perc_cut);
            let range = membership.min_samples;
            membership.min_samples = MinSamplesRange::new(
                min_samples_start.unwrap_or(range.start),
                min_samples_stop.unwrap_or(range.stop),
                min_samples_step.unwrap_or(range.step),
            );

            cmd_run(&input, output_dir.as_deref(), &config);
        }
        Commands::Members {
            catalog,
            probs,
            output,
            prob_cut,
        } => {
            cmd_members(&catalog, &probs, output, prob_cut, &config);
        }
        Commands::InitConfig { path } => {
            cmd_init_config(&path, &config);
        }
    }
}

fn report_items(report: &CatalogReport) -> Vec<(&'static str, String)> {
    let mut items = vec![
        ("Input file", report.input.display().to_string()),
        ("Output table", report.output.display().to_string()),
        ("Stars read", report.stars_read.to_string()),
        ("Stars removed", report.stars_removed.to_string()),
    ];
    if let (Some(first), Some(last)) = (report.expected_members.first(), report.expected_members.last()) {
        items.push(("min_samples", format!("{}..={}", first.0, last.0)));
        items.push((
            "Expected members",
            format!("{:.1} .. {:.1}", first.1, last.1),
        ));
    }
    items
}

fn cmd_run(input: &Path, output_dir: Option<&Path>, config: &PipelineConfig) {
    let start = Instant::now();
    let membership = &config.membership;

    println!("Estimating membership probabilities...");
    println!("Input: {}", input.display());
    println!("Parameters:");
    println!("  pca_dims: {}", membership.pca_dims);
    println!(
        "  min_samples: {}..{} step {}",
        membership.min_samples.start, membership.min_samples.stop, membership.min_samples.step
    );
    println!("  runs: {}", membership.n_runs);
    println!("  perc_cut: {}", membership.perc_cut);

    if !input.is_dir() {
        let spinner = create_spinner("Running Monte-Carlo trials...");

        match process_catalog(input, output_dir, config) {
            Ok(report) => {
                spinner.finish_and_clear();
                let mut items = report_items(&report);
                items.push(("Duration", format!("{:.2?}", start.elapsed())));
                print_summary("Membership Complete", &items);
            }
            Err(e) => {
                spinner.finish_and_clear();
                error!("Membership estimate failed: {:#}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    let catalogs = match find_catalogs(input, &config.catalog.input_suffix, &config.catalog.exclude_suffix) {
        Ok(c) => c,
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    };
    if catalogs.is_empty() {
        error!(
            "No catalogs ending in '{}' found in {}",
            config.catalog.input_suffix,
            input.display()
        );
        std::process::exit(1);
    }

    let spinner = create_spinner(&format!("Processing {} catalogs...", catalogs.len()));
    let results = process_batch(&catalogs, output_dir, config);
    spinner.finish_and_clear();

    let mut failed = 0;
    for (path, result) in &results {
        let name = path.file_name().unwrap_or_default().to_string_lossy();
        match result {
            Ok(report) => println!(
                "{}: {} stars, {} removed -> {}",
                name,
                report.stars_read,
                report.stars_removed,
                report.output.display()
            ),
            Err(e) => {
                failed += 1;
                eprintln!("{}: failed: {:#}", name, e);
            }
        }
    }

    print_summary(
        "Batch Membership Complete",
        &[
            ("Input directory", input.display().to_string()),
            ("Catalogs", results.len().to_string()),
            ("Succeeded", (results.len() - failed).to_string()),
            ("Failed", failed.to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    if failed > 0 {
        std::process::exit(1);
    }
}

fn cmd_members(
    catalog_path: &Path,
    probs_path: &Path,
    output: Option<PathBuf>,
    prob_cut: Option<f64>,
    config: &PipelineConfig,
) {
    let start = Instant::now();
    let prob_cut = prob_cut.unwrap_or(config.selection.prob_cut);

    let output_path = output.unwrap_or_else(|| {
        let stem = probs_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "probs".to_string());
        probs_path.with_file_name(format!("{}_members.dat", stem))
    });

    let catalog = match load_catalog(catalog_path, &config.catalog) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load catalog {}: {}", catalog_path.display(), e);
            std::process::exit(1);
        }
    };
    let records = match load_probabilities(probs_path) {
        Ok(r) => r,
        Err(e) => {
            error!("Failed to load probabilities: {}", e);
            std::process::exit(1);
        }
    };
    if records.ids != catalog.ids {
        error!(
            "{} does not match {}: {} vs {} rows or differing identifiers",
            probs_path.display(),
            catalog_path.display(),
            records.ids.len(),
            catalog.ids.len()
        );
        std::process::exit(1);
    }

    let accepted: Vec<f64> = records
        .probabilities
        .iter()
        .zip(&catalog.accept_mask)
        .filter(|(_, accepted)| **accepted)
        .map(|(p, _)| *p)
        .collect();
    let cut = effective_cut(prob_cut, &accepted);
    if cut < prob_cut {
        warn!("No star reaches P >= {:.2}, lowering the cut to {:.3}", prob_cut, cut);
    }

    let rows = select_members(&records.probabilities, &catalog.accept_mask, prob_cut);

    match write_members(&output_path, &catalog, &records.probabilities, &rows) {
        Ok(()) => {
            print_summary(
                "Member Selection Complete",
                &[
                    ("Catalog", catalog_path.display().to_string()),
                    ("Probabilities", probs_path.display().to_string()),
                    ("Output", output_path.display().to_string()),
                    ("Probability cut", format!("{:.3}", cut)),
                    ("Members", rows.len().to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            error!("Failed to write members: {}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_init_config(path: &Path, config: &PipelineConfig) {
    match config.to_yaml(path) {
        Ok(()) => println!("Wrote configuration to {}", path.display()),
        Err(e) => {
            error!("Failed to write config {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}
