//! Findex CLI - Command-line interface for cohort heatmaps
//!
//! Commands:
//! - heatmap: Merge subject recordings into one heatmap per cohort
//! - summary: Tabulate behavioral measures per subject as CSV
//! - resolve: List the subject folders found under the given paths
//! - inspect: Show what a single artifact contains

use clap::{ArgAction, Parser, Subcommand};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use findex::config::default_output_dir;
use findex::schema::{Artifact, ArtifactPayload};
use findex::{
    collect_summary, resolve_folders, write_summary_csv, HeatmapError, HeatmapProcessor,
    MergeConfig, FINDEX_VERSION,
};

/// Findex - cohort heatmaps for animal-tracking recordings
#[derive(Parser)]
#[command(name = "findex")]
#[command(version = FINDEX_VERSION)]
#[command(about = "Merge tracking heatmaps by experimental cohort", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge subject heatmaps into one image per cohort
    Heatmap {
        /// Subject folders or parent folders holding them
        #[arg(short, long, num_args = 1.., required = true)]
        folders: Vec<PathBuf>,

        /// Output directory (default: Heatmaps_<timestamp>)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Merge near-duplicate cohort spellings
        #[arg(long)]
        fuzzy: bool,

        /// Gaussian kernel size
        #[arg(long)]
        kernel_size: Option<usize>,

        /// Heatmap opacity (0-1)
        #[arg(long)]
        heatmap_alpha: Option<f64>,

        /// JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// TrueType font for captions
        #[arg(long)]
        font: Option<PathBuf>,
    },

    /// Write a behavioral summary table
    Summary {
        /// Subject folders or parent folders holding them
        #[arg(short, long, num_args = 1.., required = true)]
        folders: Vec<PathBuf>,

        /// CSV output file
        #[arg(short, long)]
        output: PathBuf,

        /// Merge near-duplicate cohort spellings
        #[arg(long)]
        fuzzy: bool,
    },

    /// List resolved subject folders
    Resolve {
        /// Subject folders or parent folders holding them
        #[arg(short, long, num_args = 1.., required = true)]
        folders: Vec<PathBuf>,
    },

    /// Describe a single artifact
    Inspect {
        /// Artifact file
        artifact: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .init();
}

fn run(cli: Cli) -> Result<(), FindexCliError> {
    match cli.command {
        Commands::Heatmap {
            folders,
            output_dir,
            fuzzy,
            kernel_size,
            heatmap_alpha,
            config,
            font,
        } => {
            let mut merge_config = match config {
                Some(path) => MergeConfig::from_file(&path)?,
                None => MergeConfig::default(),
            };
            if fuzzy {
                merge_config = merge_config.with_fuzzy(true);
            }
            if let Some(size) = kernel_size {
                merge_config = merge_config.with_kernel_size(size);
            }
            if let Some(alpha) = heatmap_alpha {
                merge_config = merge_config.with_heatmap_alpha(alpha);
            }
            if let Some(path) = font {
                merge_config = merge_config.with_font_path(path);
            }
            let output_dir = output_dir.unwrap_or_else(|| default_output_dir(chrono::Local::now()));
            cmd_heatmap(&folders, &output_dir, merge_config)
        }

        Commands::Summary {
            folders,
            output,
            fuzzy,
        } => cmd_summary(&folders, &output, fuzzy),

        Commands::Resolve { folders } => cmd_resolve(&folders),

        Commands::Inspect { artifact, json } => cmd_inspect(&artifact, json),
    }
}

fn cmd_heatmap(
    folders: &[PathBuf],
    output_dir: &Path,
    config: MergeConfig,
) -> Result<(), FindexCliError> {
    let processor = HeatmapProcessor::new(config)?;
    let report = processor.run(folders, output_dir)?;

    if report.written.is_empty() && report.failures.is_empty() {
        println!("No valid heatmap data found; nothing was written.");
        return Ok(());
    }

    println!("Generated {} heatmap(s):", report.written.len());
    for path in &report.written {
        println!("  {}", path.display());
    }

    if report.failures.is_empty() {
        Ok(())
    } else {
        for failure in &report.failures {
            eprintln!("  {}: {}", failure.label, failure.error);
        }
        Err(FindexCliError::CohortsFailed(report.failures.len()))
    }
}

fn cmd_summary(folders: &[PathBuf], output: &Path, fuzzy: bool) -> Result<(), FindexCliError> {
    let subjects = resolve_folders(folders);
    if subjects.is_empty() {
        return Err(FindexCliError::NoSubjects);
    }

    let summary = collect_summary(&subjects, fuzzy);
    write_summary_csv(&summary, output)?;

    let rows: usize = summary.iter().map(|c| c.subjects.len()).sum();
    println!(
        "Wrote {} subject(s) in {} cohort(s) to {}",
        rows,
        summary.len(),
        output.display()
    );
    Ok(())
}

fn cmd_resolve(folders: &[PathBuf]) -> Result<(), FindexCliError> {
    let subjects = resolve_folders(folders);
    if subjects.is_empty() {
        return Err(FindexCliError::NoSubjects);
    }
    for subject in subjects {
        println!("{}", subject.display());
    }
    Ok(())
}

fn cmd_inspect(path: &Path, json: bool) -> Result<(), FindexCliError> {
    let artifact = Artifact::read(path)?;
    let report = InspectReport::new(&artifact.path, &artifact.payload)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Artifact: {}", report.path);
    println!("Keys: {}", report.keys.join(", "));
    match &report.grid {
        Some(grid) => println!(
            "Grid: {}x{} (min {}, max {})",
            grid.rows, grid.cols, grid.min, grid.max
        ),
        None => println!("Grid: none"),
    }
    println!("Shape: {}", report.shape);
    println!("Scale: {}", report.scale);
    if let Some(duration) = report.total_duration {
        println!("Total duration: {}", duration);
    }
    Ok(())
}

// Error handling

#[derive(Debug)]
enum FindexCliError {
    Io(io::Error),
    Heatmap(HeatmapError),
    Json(serde_json::Error),
    NoSubjects,
    CohortsFailed(usize),
}

impl From<io::Error> for FindexCliError {
    fn from(e: io::Error) -> Self {
        FindexCliError::Io(e)
    }
}

impl From<HeatmapError> for FindexCliError {
    fn from(e: HeatmapError) -> Self {
        FindexCliError::Heatmap(e)
    }
}

impl From<serde_json::Error> for FindexCliError {
    fn from(e: serde_json::Error) -> Self {
        FindexCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<FindexCliError> for CliError {
    fn from(e: FindexCliError) -> Self {
        match e {
            FindexCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            FindexCliError::Heatmap(e) => {
                let (code, hint) = match &e {
                    HeatmapError::Io(_) => ("IO_ERROR", "Check file paths and permissions"),
                    HeatmapError::Json(_) | HeatmapError::InvalidArtifact(_) => {
                        ("ARTIFACT_ERROR", "Check that the artifact is valid JSON")
                    }
                    HeatmapError::Image(_) => ("IMAGE_ERROR", "Check the output directory"),
                    HeatmapError::InvalidConfig(_) => {
                        ("CONFIG_ERROR", "Check the configuration values")
                    }
                    HeatmapError::UnknownShape(_)
                    | HeatmapError::EmptyCohort(_)
                    | HeatmapError::DimensionMismatch { .. } => {
                        ("MERGE_ERROR", "Run with -v for per-subject details")
                    }
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            FindexCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            FindexCliError::NoSubjects => CliError {
                code: "NO_SUBJECTS".to_string(),
                message: "No subject folders found".to_string(),
                hint: Some("Pass folders that contain .json artifacts or subject subfolders".to_string()),
            },
            FindexCliError::CohortsFailed(count) => CliError {
                code: "COHORTS_FAILED".to_string(),
                message: format!("{} cohort(s) produced no heatmap", count),
                hint: Some("Run with -v for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct InspectReport {
    path: String,
    keys: Vec<&'static str>,
    grid: Option<GridStats>,
    shape: String,
    scale: f64,
    total_duration: Option<f64>,
}

#[derive(serde::Serialize)]
struct GridStats {
    rows: usize,
    cols: usize,
    min: f64,
    max: f64,
}

impl InspectReport {
    fn new(path: &Path, payload: &ArtifactPayload) -> Result<Self, HeatmapError> {
        let grid = payload.grid()?.map(|grid| {
            let (rows, cols) = grid.dim();
            let (min, max) = grid
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                    (lo.min(v), hi.max(v))
                });
            GridStats { rows, cols, min, max }
        });

        Ok(Self {
            path: path.display().to_string(),
            keys: payload.keys(),
            grid,
            shape: payload.shape().to_string(),
            scale: payload.scale(),
            total_duration: payload.total_duration,
        })
    }
}
