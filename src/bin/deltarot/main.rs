//! Deltarot CLI - relative rotation decoding tool.
//!
//! Usage: deltarot <COMMAND> [OPTIONS] <FEATURES> <ADJACENCY> [OUTPUT]
//!
//! Run `deltarot --help` for available commands. Log verbosity follows
//! `RUST_LOG` (default `warn`).

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use deltarot::algo::decode::{self, DecodeOptions, Orthogonalization, SolverKind};
use deltarot::algo::Progress;
use deltarot::encoding::{OutputLayout, RELATIVE_STRIDE};
use deltarot::io;
use deltarot::nalgebra::Vector3;

#[derive(Parser)]
#[command(name = "deltarot")]
#[command(author, version, about = "Relative rotation decoding CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a relative rotation encoding into absolute rotations
    Decode {
        /// Relative rotation feature file (15 values per face)
        features: PathBuf,

        /// Face adjacency file (3 neighbours per face, negative = none)
        adjacency: PathBuf,

        /// Output feature file
        output: PathBuf,

        /// Rotation vector assigned to face 0, as X,Y,Z
        #[arg(short, long, value_parser = parse_direction, default_value = "0,0,0", allow_hyphen_values = true)]
        direction: Vector3<f64>,

        /// Linear solver for the normal equations
        #[arg(short, long, value_enum, default_value = "ldlt")]
        solver: Solver,

        /// Keep reflections instead of correcting them to proper rotations
        #[arg(long)]
        improper: bool,

        /// Write 10 values per face (rotation, one zero, shape)
        #[arg(long)]
        padded: bool,

        /// Use single-threaded execution (for benchmarking)
        #[arg(long)]
        sequential: bool,

        /// Write the decode report as JSON to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Display encoding and adjacency information
    Info {
        /// Relative rotation feature file
        features: PathBuf,

        /// Face adjacency file
        adjacency: PathBuf,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Solver {
    /// Sparse LDLᵀ factorization
    Ldlt,
    /// Conjugate gradient
    Cg,
}

fn parse_direction(s: &str) -> Result<Vector3<f64>, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(format!("expected X,Y,Z, got '{}'", s));
    }
    let mut v = Vector3::zeros();
    for (i, part) in parts.iter().enumerate() {
        v[i] = part
            .parse::<f64>()
            .map_err(|e| format!("invalid component '{}': {}", part, e))?;
    }
    Ok(v)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Decode {
            features,
            adjacency,
            output,
            direction,
            solver,
            improper,
            padded,
            sequential,
            report,
        } => {
            let options = DecodeOptions::default()
                .with_direction(direction)
                .with_solver(match solver {
                    Solver::Ldlt => SolverKind::Ldlt,
                    Solver::Cg => SolverKind::ConjugateGradient,
                })
                .with_orthogonalization(if improper {
                    Orthogonalization::Nearest
                } else {
                    Orthogonalization::Proper
                })
                .with_layout(if padded {
                    OutputLayout::Padded
                } else {
                    OutputLayout::Compact
                })
                .with_parallel(!sequential);
            cmd_decode(&features, &adjacency, &output, report.as_deref(), &options)?;
        }

        Commands::Info {
            features,
            adjacency,
        } => {
            cmd_info(&features, &adjacency)?;
        }
    }

    Ok(())
}

/// Create a progress callback that displays a progress bar.
fn create_progress() -> Progress {
    let max_percent = Arc::new(AtomicUsize::new(0));

    Progress::new(move |current, total, message| {
        if total == 0 {
            return;
        }

        let raw_percent = if current >= total {
            100
        } else {
            ((current * 100) + (total / 2)) / total
        };

        // Monotonic: never redraw a lower percentage
        let previous = max_percent.fetch_max(raw_percent, Ordering::Relaxed);
        if raw_percent <= previous && raw_percent != 100 {
            return;
        }

        let bar_width = 30;
        let filled = (raw_percent * bar_width) / 100;
        let bar = "=".repeat(filled);
        let space = " ".repeat(bar_width - filled);

        // Clear the tail of a longer previous message
        eprint!("\r[{}{}] {:3}% {:<32}", bar, space, raw_percent, message);
        let _ = std::io::stderr().flush();

        if current >= total {
            eprintln!();
        }
    })
}

fn cmd_decode(
    features_path: &Path,
    adjacency_path: &Path,
    output: &Path,
    report_path: Option<&Path>,
    options: &DecodeOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let features = io::load_features(features_path)?;
    let adjacency = io::load_adjacency(adjacency_path)?;

    println!(
        "Loaded: {} faces ({} values), {} adjacency rows",
        features.len() / RELATIVE_STRIDE,
        features.len(),
        adjacency.num_faces()
    );

    let mode = if options.parallel { "parallel" } else { "sequential" };
    let solver = match options.solver {
        SolverKind::Ldlt => "LDLt",
        SolverKind::ConjugateGradient => "conjugate gradient",
    };
    println!("Decoding ({} solver, {})...", solver, mode);

    let progress = create_progress();
    let start = Instant::now();
    let decoded =
        decode::decode_relative_rotation_with_progress(&features, &adjacency, options, &progress)?;
    let elapsed = start.elapsed();

    let report = decoded.report();
    println!(
        "Constraints: {} edges, {} rows, {} nonzeros",
        report.used_edges, report.constraint_rows, report.constraint_nnz
    );
    if report.factor_nnz > 0 {
        println!("Factor nonzeros: {}", report.factor_nnz);
    }
    println!("Residual: {:.6e}", report.residual);
    if report.reflections_corrected > 0 {
        println!("Reflections corrected: {}", report.reflections_corrected);
    }
    if report.reflections_kept > 0 {
        println!(
            "Reflections kept: {} (stored negated, faces {:?})",
            report.reflections_kept,
            decoded.reflected_faces()
        );
    }

    io::save_features_with_stride(decoded.as_slice(), decoded.layout().stride(), output)?;
    println!(
        "Saved: {} ({} values per face, {:.2?})",
        output.display(),
        decoded.layout().stride(),
        elapsed
    );

    if let Some(path) = report_path {
        let file = std::fs::File::create(path)?;
        let mut writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, report)?;
        writer.flush()?;
        println!("Report: {}", path.display());
    }

    Ok(())
}

fn cmd_info(features_path: &Path, adjacency_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let features = io::load_features(features_path)?;
    let adjacency = io::load_adjacency(adjacency_path)?;

    println!("Features: {}", features_path.display());
    println!("Values: {}", features.len());
    if features.len() % RELATIVE_STRIDE == 0 {
        println!("Faces (from features): {}", features.len() / RELATIVE_STRIDE);
    } else {
        println!(
            "Faces (from features): malformed, {} values is not a multiple of {}",
            features.len(),
            RELATIVE_STRIDE
        );
    }

    println!("Adjacency: {}", adjacency_path.display());
    println!("Faces (from adjacency): {}", adjacency.num_faces());

    if let Err(e) = adjacency.validate() {
        println!("Adjacency is invalid: {}", e);
        return Ok(());
    }

    let isolated = adjacency
        .rows()
        .filter(|row| row.iter().all(Option::is_none))
        .count();
    let boundary = adjacency
        .rows()
        .filter(|row| row.iter().any(Option::is_none))
        .count();
    println!("Undirected edges: {}", adjacency.num_forward_edges());
    println!("Faces with an open slot: {}", boundary);
    println!("Isolated faces: {}", isolated);

    let (labels, count) = adjacency.connected_components();
    if count <= 1 {
        println!("Connectivity: single component");
    } else {
        // First face outside the component of face 0
        let first_unreached = labels.iter().position(|&l| l != labels[0]).unwrap_or(0);
        println!(
            "Connectivity: {} components (face {} is not reachable from face 0, decoding will fail)",
            count, first_unreached
        );
    }

    Ok(())
}
