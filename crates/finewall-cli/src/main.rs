//! finewall CLI - rewrite sliced G-code for finer outer walls.
//!
//! Takes a G-code file, splits every outer-wall block into thinner passes,
//! and overwrites the file in place. Diagnostics go to stderr or, with
//! `--log-file`, to a log file.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use log::error;

use finewall::{PassPolicy, SmoothSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Split the header's nominal layer height into equal passes.
    Fixed,
    /// Decide per layer from its annotated height.
    Adaptive,
}

#[derive(Parser)]
#[command(name = "finewall")]
#[command(about = "Re-lay the outer walls of sliced G-code as thinner passes", long_about = None)]
struct Cli {
    /// G-code file to rewrite in place
    input: PathBuf,

    /// Desired outer wall height (mm). Defaults to the file's
    /// min_layer_height header field; required with --mode fixed
    #[arg(short = 'l', long)]
    outer_layer_height: Option<f64>,

    /// Pass-count policy
    #[arg(long, value_enum, default_value_t = Mode::Adaptive)]
    mode: Mode,

    /// Feed rate for travel-back moves between passes (mm/min)
    #[arg(long, default_value_t = 9000.0)]
    travel_feedrate: f64,

    /// Retain a copy of the rewritten file at this path
    #[arg(long)]
    keep_copy: Option<PathBuf>,

    /// Write diagnostics to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref())?;

    if cli.mode == Mode::Fixed && cli.outer_layer_height.is_none() {
        bail!("--outer-layer-height is required with --mode fixed");
    }

    let settings = SmoothSettings {
        policy: match cli.mode {
            Mode::Fixed => PassPolicy::Fixed,
            Mode::Adaptive => PassPolicy::Adaptive,
        },
        target_height: cli.outer_layer_height,
        travel_feedrate: cli.travel_feedrate,
    };

    let stats = match finewall::process_file(&cli.input, &settings) {
        Ok(stats) => stats,
        Err(err) => {
            error!("{err}");
            return Err(err)
                .with_context(|| format!("failed to rewrite {}", cli.input.display()));
        }
    };

    if let Some(copy) = &cli.keep_copy {
        std::fs::copy(&cli.input, copy)
            .with_context(|| format!("failed to copy result to {}", copy.display()))?;
    }

    println!(
        "{}: {} wall blocks -> {} passes across {} layers ({} kept unsplit)",
        cli.input.display(),
        stats.segments,
        stats.passes_emitted,
        stats.layers,
        stats.unsplit_blocks
    );

    Ok(())
}

fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(path) = log_file {
        let file = std::fs::File::create(path)
            .with_context(|| format!("failed to create log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}
