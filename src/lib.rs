//! Framelabel: annotation core for building YOLO detection datasets.
//!
//! Frames come in one at a time, as a folder batch, or from a stream. Their
//! annotations are edited with undo/redo and saved into a YOLO-style dataset
//! directory with a stable class list and a `data.yaml` manifest.
//!
//! # Modules
//!
//! - [`ir`]: Geometry types and the pixel/normalized codec
//! - [`registry`]: Label name to class id mapping (`classes.txt`)
//! - [`store`]: Per-frame annotation list with undo/redo
//! - [`dataset`]: On-disk dataset layout and manifest
//! - [`detect`]: Detector trait and built-in detectors
//! - [`source`]: Frames and frame sources
//! - [`pipeline`]: Single, batch and stream ingestion
//! - [`config`]: YAML configuration and logging setup
//! - [`error`]: Error types for framelabel operations

pub mod atomic;
pub mod config;
pub mod dataset;
pub mod detect;
pub mod error;
pub mod ir;
pub mod pipeline;
pub mod registry;
pub mod source;
pub mod store;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};

pub use error::FramelabelError;

use config::{init_logging, Config, CONFIG_ENV};
use dataset::{DatasetLayout, Split};
use detect::{DetectionSource, NullDetector, SidecarDetector};
use ir::Region;
use pipeline::{CancelToken, IngestionPipeline, SharedPipeline};
use source::ImageSequenceSource;

/// The framelabel CLI application.
#[derive(Parser)]
#[command(name = "framelabel")]
#[command(version, author, about)]
#[command(propagate_version = true)]
struct Cli {
    /// YAML configuration file.
    #[arg(long, global = true, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Dataset root (overrides `dataset_root` from the config).
    #[arg(long, global = true)]
    dataset: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Save hand-drawn boxes for one image.
    Label(LabelArgs),
    /// Auto-annotate every image in a folder and save it into the dataset.
    Annotate(AnnotateArgs),
    /// Play a folder of frames as a stream with tracking.
    Stream(StreamArgs),
    /// Write every n-th frame of a frame sequence to a directory.
    Extract(ExtractArgs),
    /// Regenerate data.yaml from classes.txt.
    Manifest,
    /// Copy the dataset (images, labels, classes, manifest) elsewhere.
    Export(ExportArgs),
    /// List registered classes with their ids.
    Classes,
    /// Count images and label files per split.
    Summary(SummaryArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Arguments for the label subcommand.
#[derive(clap::Args)]
struct LabelArgs {
    /// Image to annotate.
    image: PathBuf,

    /// A box as LABEL:X,Y,W,H in pixels; repeatable.
    #[arg(long = "box", value_name = "LABEL:X,Y,W,H", value_parser = parse_box_arg)]
    boxes: Vec<(String, Region)>,

    /// Split to save into (defaults to `manual_split`).
    #[arg(long)]
    split: Option<Split>,

    /// Fail instead of registering labels not already in classes.txt.
    #[arg(long)]
    strict: bool,
}

/// Arguments for the annotate subcommand.
#[derive(clap::Args)]
struct AnnotateArgs {
    /// Folder of images.
    input: PathBuf,

    /// Folder of `<stem>.json` prediction files; without it nothing is detected.
    #[arg(long)]
    predictions: Option<PathBuf>,

    /// Split to save into (defaults to `auto_split`).
    #[arg(long)]
    split: Option<Split>,

    /// Minimum detection confidence (overrides the config).
    #[arg(long)]
    confidence: Option<f32>,

    /// Skip the first N frames, e.g. to resume a cancelled run.
    #[arg(long, default_value_t = 0)]
    start: usize,

    /// Report format.
    #[arg(long, value_enum, default_value = "text")]
    output: OutputFormat,
}

/// Arguments for the stream subcommand.
#[derive(clap::Args)]
struct StreamArgs {
    /// Folder of frames, played in file-name order.
    input: PathBuf,

    /// Folder of `<stem>.json` prediction files.
    #[arg(long)]
    predictions: Option<PathBuf>,

    /// Save every frame into the dataset.
    #[arg(long)]
    record: bool,

    /// Write per-class snapshots under this directory.
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    /// Milliseconds between ticks (overrides `stream_interval_ms`).
    #[arg(long)]
    interval_ms: Option<u64>,
}

/// Arguments for the extract subcommand.
#[derive(clap::Args)]
struct ExtractArgs {
    /// Folder of frames.
    input: PathBuf,

    /// Output directory.
    output: PathBuf,

    /// Keep every n-th frame (overrides `extract_every`).
    #[arg(long)]
    every: Option<u64>,
}

/// Arguments for the export subcommand.
#[derive(clap::Args)]
struct ExportArgs {
    /// Destination directory.
    dest: PathBuf,
}

/// Arguments for the summary subcommand.
#[derive(clap::Args)]
struct SummaryArgs {
    /// Report format.
    #[arg(long, value_enum, default_value = "text")]
    output: OutputFormat,
}

/// Run the framelabel CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), FramelabelError> {
    let cli = Cli::parse();

    let mut config = Config::load_or_default(cli.config.as_deref())?;
    if let Some(root) = cli.dataset {
        config.dataset_root = root;
    }
    init_logging(cli.verbose, config.log_file.as_deref())?;

    match cli.command {
        Some(Commands::Label(args)) => run_label(&config, args),
        Some(Commands::Annotate(args)) => run_annotate(&config, args),
        Some(Commands::Stream(args)) => run_stream(&config, args),
        Some(Commands::Extract(args)) => run_extract(&config, args),
        Some(Commands::Manifest) => run_manifest(&config),
        Some(Commands::Export(args)) => run_export(&config, args),
        Some(Commands::Classes) => run_classes(&config),
        Some(Commands::Summary(args)) => run_summary(&config, args),
        None => {
            println!("framelabel {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Annotation core for YOLO detection datasets.");
            println!();
            println!("Run 'framelabel --help' for usage information.");
            Ok(())
        }
    }
}

fn parse_box_arg(raw: &str) -> Result<(String, Region), String> {
    let (label, coords) = raw
        .rsplit_once(':')
        .ok_or_else(|| format!("expected LABEL:X,Y,W,H, got '{raw}'"))?;
    let values = coords
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid number in '{coords}': {e}"))?;
    let [x, y, w, h] = values[..] else {
        return Err(format!("expected 4 numbers, got {}", values.len()));
    };
    Ok((label.to_string(), Region::new(x, y, w, h)))
}

fn sidecar_or_null(predictions: Option<&Path>) -> Box<dyn DetectionSource> {
    match predictions {
        Some(dir) => Box::new(SidecarDetector::new(dir)),
        None => Box::new(NullDetector),
    }
}

fn open_layout(config: &Config) -> Result<DatasetLayout, FramelabelError> {
    DatasetLayout::open(&config.dataset_root)
}

fn run_label(config: &Config, args: LabelArgs) -> Result<(), FramelabelError> {
    let layout = open_layout(config)?;
    let split = args.split.unwrap_or(config.manual_split);
    let mut pipeline =
        IngestionPipeline::new(layout, Box::new(NullDetector), config.pipeline_options())?;
    pipeline.open_single(&args.image)?;

    for (label, region) in &args.boxes {
        if args.strict {
            pipeline.registry().id_for_strict(label)?;
        }
        pipeline.store_mut().add(label, *region)?;
    }

    let written = pipeline.save_current(split)?;
    println!(
        "Saved {} annotation(s) to {}",
        written.records.len(),
        written.label_path.display()
    );
    Ok(())
}

fn run_annotate(config: &Config, args: AnnotateArgs) -> Result<(), FramelabelError> {
    let layout = open_layout(config)?;
    let mut options = config.pipeline_options();
    if let Some(confidence) = args.confidence {
        options.confidence = confidence;
    }
    let split = args.split.unwrap_or(config.auto_split);

    let mut pipeline =
        IngestionPipeline::new(layout, sidecar_or_null(args.predictions.as_deref()), options)?;
    pipeline.open_folder(&args.input)?;
    let report = pipeline.annotate_from(args.start, split, &CancelToken::new())?;

    match args.output {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&report)
                .map_err(FramelabelError::ReportSerialize)?;
            println!("{json}");
        }
        OutputFormat::Text => print!("{report}"),
    }
    report.into_result().map(|_| ())
}

fn run_stream(config: &Config, args: StreamArgs) -> Result<(), FramelabelError> {
    let layout = open_layout(config)?;
    let mut options = config.pipeline_options();
    options.record_stream |= args.record;
    if args.snapshot_dir.is_some() {
        options.snapshot_dir = args.snapshot_dir;
    }
    let interval = args
        .interval_ms
        .map(std::time::Duration::from_millis)
        .unwrap_or_else(|| config.stream_interval());

    let mut pipeline =
        IngestionPipeline::new(layout, sidecar_or_null(args.predictions.as_deref()), options)?;
    pipeline.open_stream(Box::new(ImageSequenceSource::from_dir(&args.input)?));

    let shared = SharedPipeline::new(pipeline);
    let stats = shared.run_stream(interval, &CancelToken::new());
    println!(
        "Streamed {} frame(s), {} detection(s), {} error(s)",
        stats.frames, stats.detections, stats.errors
    );
    Ok(())
}

fn run_extract(config: &Config, args: ExtractArgs) -> Result<(), FramelabelError> {
    let every = args.every.unwrap_or(config.extract_every);
    let mut frames = ImageSequenceSource::from_dir(&args.input)?;
    let written = source::extract_frames(&mut frames, &args.output, every)?;
    println!(
        "Extracted {} frame(s) to {}",
        written.len(),
        args.output.display()
    );
    Ok(())
}

fn run_manifest(config: &Config) -> Result<(), FramelabelError> {
    let layout = open_layout(config)?;
    let registry = layout.load_registry()?;
    let path = layout.write_manifest(&registry)?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn run_export(config: &Config, args: ExportArgs) -> Result<(), FramelabelError> {
    let layout = open_layout(config)?;
    let report = layout.export_to(&args.dest)?;
    println!(
        "Exported {} file(s) ({} bytes) to {}",
        report.files_copied,
        report.bytes_copied,
        report.destination.display()
    );
    Ok(())
}

fn run_classes(config: &Config) -> Result<(), FramelabelError> {
    let layout = DatasetLayout::new(&config.dataset_root);
    let registry = layout.load_registry()?;
    for (id, name) in registry.names().iter().enumerate() {
        println!("{id}: {name}");
    }
    Ok(())
}

fn run_summary(config: &Config, args: SummaryArgs) -> Result<(), FramelabelError> {
    let layout = DatasetLayout::new(&config.dataset_root);
    let summary = layout.summary()?;
    match args.output {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&summary)
                .map_err(FramelabelError::ReportSerialize)?;
            println!("{json}");
        }
        OutputFormat::Text => print!("{summary}"),
    }
    Ok(())
}
