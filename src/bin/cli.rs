//! tour-cli - Build and inspect tour documents
//!
//! Usage:
//!   tour-cli build <tracks> [--photos <file>] [--timezone <tz>] [--partition day|session] --output <file>
//!   tour-cli summary <file>
//!
//! `build` reads every GPX/GeoJSON track file in a folder plus an optional
//! photo GeoJSON, reconciles them and writes one merged document. `summary`
//! prints the totals and per-path breakdown of an existing document.

use clap::{Parser, Subcommand};
use chrono_tz::Tz;
use log::{error, warn};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tour_builder::{
    build_tour,
    ingest::{read_track_dir, GeoJsonPointFile, PointSource},
    temporal::{iso8601, parse_timezone},
    DuplicatePolicy, MergedDocument, PartitionMode, TourConfig,
};

#[derive(Parser)]
#[command(name = "tour-cli")]
#[command(about = "Reconcile GPS tracks and photos into a tour document", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose debug output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a tour document from track files and photos
    Build {
        /// Folder containing GPX/GeoJSON track files
        tracks: PathBuf,

        /// GeoJSON file of photo points (a missing file gives an image-less tour)
        #[arg(short, long)]
        photos: Option<PathBuf>,

        /// IANA timezone used for day keys (e.g. "America/Mexico_City")
        #[arg(short, long, default_value = "UTC")]
        timezone: String,

        /// Partition strategy: day or session
        #[arg(long, default_value = "day")]
        partition: PartitionMode,

        /// Same-start handling in day mode: reject or concatenate
        #[arg(long, default_value = "reject")]
        duplicates: DuplicatePolicy,

        /// Use panoramic photo timestamps for matching
        #[arg(long)]
        trust_panoramic: bool,

        /// Output document path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Print totals for an existing tour document
    Summary {
        /// Tour document
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format(|buf, record| writeln!(buf, "[{:5}] {}", record.level(), record.args()))
        .init();

    let result = match cli.command {
        Commands::Build {
            tracks,
            photos,
            timezone,
            partition,
            duplicates,
            trust_panoramic,
            output,
        } => run_build(
            &tracks,
            photos.as_deref(),
            &timezone,
            partition,
            duplicates,
            trust_panoramic,
            &output,
        ),
        Commands::Summary { file } => run_summary(&file),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_build(
    tracks: &Path,
    photos: Option<&Path>,
    timezone: &str,
    partition: PartitionMode,
    duplicates: DuplicatePolicy,
    trust_panoramic: bool,
    output: &Path,
) -> tour_builder::Result<()> {
    let tz: Tz = parse_timezone(timezone)?;
    let config = TourConfig {
        duplicate_policy: duplicates,
        trust_panoramic_timestamps: trust_panoramic,
        ..TourConfig::new(partition, tz)
    };

    let features = read_track_dir(tracks, tz)?;
    let points = match photos {
        Some(path) => GeoJsonPointFile::new(path, tz).optional().read_points()?,
        None => Vec::new(),
    };

    let build = build_tour(features, points, &config)?;
    for diagnostic in &build.diagnostics {
        warn!("  dropped: {}", diagnostic);
    }

    build.document.write_to(output)
}

fn run_summary(file: &Path) -> tour_builder::Result<()> {
    let document = MergedDocument::read_from(file)?;
    let summary = document.summary();

    println!("\n{}", "=".repeat(60));
    println!("Tour: {}", file.display());
    println!("{}", "=".repeat(60));
    println!("  Paths:     {}", summary.path_count);
    println!("  Waypoints: {}", summary.waypoint_count);
    println!("  Duration:  {:.0} s", summary.total_duration_seconds);
    println!("  Distance:  {:.2} km", summary.total_distance_km);
    if let Some(b) = summary.bounds {
        let c = b.center();
        println!("  Center:    {:.5}, {:.5}", c.latitude, c.longitude);
    }

    for path in &document.paths {
        let start = path
            .start_time()
            .map(iso8601)
            .unwrap_or_else(|| "-".to_string());
        let photos = document.waypoints_for_path(path.key.as_str()).len();
        println!(
            "\n  {} ({})\n    start {}  {} points  {:.2} km  {:.0} s  {} photo stops",
            path.key,
            path.name.as_deref().unwrap_or("unnamed"),
            start,
            path.len(),
            path.distance_km,
            path.duration_seconds,
            photos
        );
    }

    Ok(())
}
