#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

mod progress;
mod tsv;

use clap::{Args, CommandFactory, Parser, Subcommand};
use covary::{
    CancellationToken, Dataset, PlsConfig, PlsError, PlsResult, StorageError, behavioral_pls_with,
};
use progress::TerminalProgress;
use std::path::PathBuf;
use std::process;
use std::thread;
use thiserror::Error;
use tsv::{TableError, load_table};

/// Bootstrap ratios at or beyond this magnitude are reported as reliable.
const RELIABLE_RATIO: f64 = 2.0;

#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Analysis(#[from] PlsError),
    #[error("Failed to install the interrupt handler: {0}")]
    Interrupt(#[from] std::io::Error),
}

#[derive(Args)]
pub struct RunArgs {
    /// TSV file of the first feature block (header row of labels, one row per sample)
    #[arg(long, value_name = "X_TSV")]
    pub x: PathBuf,

    /// TSV file of the second feature block, rows paired with the first
    #[arg(long, value_name = "Y_TSV")]
    pub y: PathBuf,

    /// TOML file with analysis options; flags given here take precedence
    #[arg(long, value_name = "CONFIG_TOML")]
    pub config: Option<PathBuf>,

    /// Number of permutations for the significance test
    #[arg(long, value_name = "N")]
    pub n_perm: Option<usize>,

    /// Number of bootstrap resamples for loading reliability
    #[arg(long, value_name = "N")]
    pub n_boot: Option<usize>,

    /// Master seed for all resampling
    #[arg(long)]
    pub seed: Option<u64>,

    /// Worker threads (defaults to all logical CPUs)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Decompose the cross-covariance instead of the cross-correlation
    #[arg(long)]
    pub covariance: bool,

    /// Compare Procrustes-rescaled singular values in the permutation test
    #[arg(long)]
    pub rotate: bool,

    /// Width of the percentile intervals, in percent
    #[arg(long, value_name = "PERCENT")]
    pub ci: Option<f64>,

    /// Split-half resamples per decomposition (0 skips split-half reliability)
    #[arg(long, value_name = "N")]
    pub n_split: Option<usize>,

    /// Where to write the result bundle (TOML)
    #[arg(long, value_name = "OUT_TOML")]
    pub output: PathBuf,
}

#[derive(Parser)]
#[command(
    name = "covary",
    about = "Behavioral partial least squares with permutation and bootstrap inference",
    long_about = "Finds the latent variables shared by two paired feature blocks, tests each \
                 one with a permutation test and estimates loading reliability by bootstrap."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a behavioral PLS analysis
    #[command(about = "Run a behavioral PLS analysis (outputs: result TOML)")]
    Run(RunArgs),
}

fn build_config(args: &RunArgs) -> Result<PlsConfig, CliError> {
    let mut config = match &args.config {
        Some(path) => PlsConfig::load(path)?,
        None => PlsConfig::default(),
    };
    if let Some(n_perm) = args.n_perm {
        config.n_perm = n_perm;
    }
    if let Some(n_boot) = args.n_boot {
        config.n_boot = n_boot;
    }
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    if let Some(threads) = args.threads {
        config.threads = Some(threads);
    }
    if let Some(ci) = args.ci {
        config.ci = ci;
    }
    if let Some(n_split) = args.n_split {
        config.n_split = n_split;
    }
    config.covariance |= args.covariance;
    config.rotate |= args.rotate;
    Ok(config)
}

/// Cancels `cancel` on Ctrl-C so both resampling loops stop after the draws in flight.
fn cancel_on_interrupt(cancel: CancellationToken) -> Result<(), CliError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    thread::Builder::new()
        .name("covary-interrupt".to_string())
        .spawn(move || {
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::warn!("Interrupt received; stopping after the draws in flight");
                    cancel.cancel();
                }
            });
        })?;
    Ok(())
}

fn reliable_features(labels: Option<&[String]>, ratios: ndarray::ArrayView1<'_, f64>) -> String {
    let names: Vec<String> = ratios
        .iter()
        .enumerate()
        .filter(|(_, ratio)| ratio.abs() >= RELIABLE_RATIO)
        .map(|(idx, _)| match labels {
            Some(labels) => labels[idx].clone(),
            None => format!("#{}", idx + 1),
        })
        .collect();
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}

fn print_summary(result: &PlsResult) {
    let config = result.config();
    println!(
        "\n{} samples, seed {}, {} permutations, {} bootstrap resamples",
        result.n_samples(),
        config.seed,
        result.permutation().completed(),
        result.bootstrap().completed()
    );
    println!("{:<6} {:>12} {:>10} {:>10}", "LV", "singular", "effect", "p-value");
    for lv in 0..result.n_components() {
        println!(
            "{:<6} {:>12.4} {:>9.2}% {:>10.4}",
            format!("LV{}", lv + 1),
            result.singular_values()[lv],
            result.effect_sizes()[lv] * 100.0,
            result.permutation().p_values()[lv]
        );
    }

    if let Some(split) = result.permutation().split_half() {
        println!("\nSplit-half reliability over {} splits:", split.n_split());
        println!("{:<6} {:>8} {:>8} {:>8} {:>8}", "LV", "ucorr", "p", "vcorr", "p");
        for lv in 0..result.n_components() {
            println!(
                "{:<6} {:>8.3} {:>8.4} {:>8.3} {:>8.4}",
                format!("LV{}", lv + 1),
                split.u_correlations()[lv],
                split.u_p_values()[lv],
                split.v_correlations()[lv],
                split.v_p_values()[lv]
            );
        }
    }

    let bootstrap = result.bootstrap();
    println!("\nFeatures with |bootstrap ratio| >= {RELIABLE_RATIO} on LV1:");
    println!(
        "  X: {}",
        reliable_features(result.x_labels(), bootstrap.x().ratios().column(0))
    );
    println!(
        "  Y: {}",
        reliable_features(result.y_labels(), bootstrap.y().ratios().column(0))
    );
}

fn run(args: RunArgs) -> Result<(), CliError> {
    let config = build_config(&args)?;

    println!("Loading X block from: {}", args.x.display());
    let x = load_table(&args.x)?;
    println!("Loading Y block from: {}", args.y.display());
    let y = load_table(&args.y)?;
    println!(
        "Loaded {} samples with {} X features and {} Y features",
        x.values.nrows(),
        x.values.ncols(),
        y.values.ncols()
    );

    let dataset = Dataset::new(x.values, y.values)?.with_labels(Some(x.labels), Some(y.labels))?;

    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone())?;
    let progress = TerminalProgress::new();
    let result = behavioral_pls_with(&dataset, &config, &cancel, &progress);
    progress.clear();
    let result = result?;

    print_summary(&result);
    result.save(&args.output)?;
    println!("\nResults written to: {}", args.output.display());
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let Cli { command } = cli;

    let result = match command {
        Some(Commands::Run(args)) => run(args),
        None => {
            if let Err(e) = Cli::command().print_help() {
                eprintln!("Error: {e}");
                process::exit(1);
            }
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
