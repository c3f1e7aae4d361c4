//! suntrack CLI — command-line frontend for the sunspot tracking pipeline.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use image::Luma;
use suntrack::{FloatImage, TrackParams, Tracker, TrackingConfig};
use tracing::info;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "suntrack")]
#[command(about = "Track sunspots and pores through a sequence of solar continuum images")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the tracking pipeline over a directory of frames.
    Track(CliTrackArgs),

    /// Extract contours from a single frame and print them as JSON.
    Contours {
        /// Path to the input image.
        #[arg(long)]
        image: PathBuf,

        /// Intensity level, as a fraction of the quiet-sun intensity.
        #[arg(long, default_value = "0.9")]
        level: f32,
    },
}

#[derive(Debug, Clone, Args)]
struct CliTrackArgs {
    /// Directory of frames, processed in lexical filename order.
    #[arg(long)]
    frames: PathBuf,

    /// Path to write tracking results (JSON).
    #[arg(long)]
    out: PathBuf,

    /// Penumbra boundary level.
    #[arg(long, default_value = "0.9")]
    outer_level: f32,

    /// Pore-discriminating intermediate level.
    #[arg(long, default_value = "0.65")]
    middle_level: f32,

    /// Umbra boundary level.
    #[arg(long, default_value = "0.5")]
    inner_level: f32,

    /// Minimum containment ratio for nested removal and association.
    #[arg(long, default_value = "0.8")]
    min_containment: f64,

    /// Minimum contour area in pixels.
    #[arg(long, default_value = "5.0")]
    min_area: f64,

    /// Maximum frame gap a track may bridge.
    #[arg(long, default_value = "3")]
    max_gap: usize,

    /// Minimum IoU for matching a contour to a track.
    #[arg(long, default_value = "0.3")]
    iou_threshold: f64,

    /// Minimum track lifetime in frames.
    #[arg(long, default_value = "3")]
    min_frames: usize,

    /// Disable frame-to-frame registration (use identity transforms).
    #[arg(long)]
    no_registration: bool,
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Track(args) => run_track(&args),
        Commands::Contours { image, level } => run_contours(&image, level),
    }
}

fn run_track(args: &CliTrackArgs) -> CliResult<()> {
    let images = load_frames(&args.frames)?;
    if images.is_empty() {
        return Err(format!("no frames found in {}", args.frames.display()).into());
    }
    info!(n_frames = images.len(), "frames loaded");

    let config = TrackingConfig {
        outer_level: args.outer_level,
        middle_level: args.middle_level,
        inner_level: args.inner_level,
        min_containment: args.min_containment,
        track: TrackParams {
            min_area: args.min_area,
            max_gap: args.max_gap,
            iou_threshold: args.iou_threshold,
            min_frames: args.min_frames,
            registration: !args.no_registration,
            ..TrackParams::default()
        },
    };

    let result = Tracker::with_config(config).run(&images)?;
    info!(
        sunspots = result.sunspots.len(),
        pores = result.pores.len(),
        "tracking complete"
    );

    let json = serde_json::to_string_pretty(&result)?;
    fs::write(&args.out, json)?;
    println!("Results written to {}", args.out.display());
    Ok(())
}

fn run_contours(path: &Path, level: f32) -> CliResult<()> {
    let image = load_frame(path)?;
    let contours = suntrack::find_level_contours(&image, level);
    let json = serde_json::to_string_pretty(&contours)?;
    println!("{json}");
    Ok(())
}

/// Load every image in `dir` as a normalized grayscale frame, in lexical
/// filename order. Non-image files are skipped.
fn load_frames(dir: &Path) -> CliResult<Vec<FloatImage>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    paths.sort();

    let mut frames = Vec::new();
    for path in paths {
        match image::open(&path) {
            Ok(img) => frames.push(to_float(&img)),
            Err(e) => info!(path = %path.display(), "skipping unreadable file: {e}"),
        }
    }
    Ok(frames)
}

fn load_frame(path: &Path) -> CliResult<FloatImage> {
    Ok(to_float(&image::open(path)?))
}

/// Convert to single-channel f32 with intensities scaled into [0, 1].
fn to_float(img: &image::DynamicImage) -> FloatImage {
    let gray = img.to_luma8();
    let mut out = FloatImage::new(gray.width(), gray.height());
    for (x, y, p) in gray.enumerate_pixels() {
        out.put_pixel(x, y, Luma([p[0] as f32 / 255.0]));
    }
    out
}
