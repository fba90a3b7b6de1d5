//! pdf_image_extract - Extract embedded images from a PDF in reading order
//!
//! Images are ordered top-to-bottom by row, left-to-right within a row,
//! filtered by minimum pixel size, and written as
//! `img_{seq:03}_page{page}.png` into a ZIP archive or a directory.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use pdf_image_lib::api::{write_dir, write_zip, ImageExtractor, DEFAULT_ARCHIVE_NAME};
use pdf_image_lib::page_extractor::{
    ExtractionConfig, ExtractionReport, ImageStatus, PlacementPolicy, RunOutcome, SkipReason,
};

#[derive(Parser, Debug)]
#[command(name = "pdf_image_extract")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the PDF file
    input: PathBuf,

    /// Output ZIP archive
    #[arg(short = 'o', long = "output", conflicts_with = "out_dir")]
    output: Option<PathBuf>,

    /// Write PNG files into this directory instead of a ZIP archive
    #[arg(long = "out-dir")]
    out_dir: Option<PathBuf>,

    /// Minimum image width in pixels (50-500)
    #[arg(long = "min-width")]
    min_width: Option<u32>,

    /// Minimum image height in pixels (50-500)
    #[arg(long = "min-height")]
    min_height: Option<u32>,

    /// Maximum vertical distance, in points, for images to share a row (0-50)
    #[arg(long = "row-tolerance")]
    row_tolerance: Option<f32>,

    /// Extract an image once per placement instead of once per page
    #[arg(long = "each-placement", action = ArgAction::SetTrue)]
    each_placement: bool,

    /// Keep soft-mask transparency as an alpha channel
    #[arg(long, action = ArgAction::SetTrue)]
    alpha: bool,

    /// Decode images on a thread pool
    #[arg(long, action = ArgAction::SetTrue)]
    parallel: bool,

    /// JSON file with extraction settings; flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print why every image was kept or skipped
    #[arg(long, action = ArgAction::SetTrue)]
    report: bool,
}

fn build_config(args: &Args) -> Result<ExtractionConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Invalid config {}", path.display()))?
        }
        None => ExtractionConfig::default(),
    };

    if let Some(width) = args.min_width {
        config.min_width = width;
    }
    if let Some(height) = args.min_height {
        config.min_height = height;
    }
    if let Some(tolerance) = args.row_tolerance {
        config.row_tolerance = tolerance;
    }
    if args.each_placement {
        config.placement_policy = PlacementPolicy::EachPlacement;
    }
    config.include_alpha |= args.alpha;
    config.parallel |= args.parallel;

    Ok(config)
}

fn print_report(report: &ExtractionReport) {
    for audit in &report.audits {
        let status = match &audit.status {
            ImageStatus::Extracted { filename } => format!("-> {}", filename),
            ImageStatus::Skipped(SkipReason::TooSmall { width, height }) => {
                format!("skipped: too small ({}x{})", width, height)
            }
            ImageStatus::Skipped(SkipReason::Failed(e)) => {
                format!("skipped: {} failed: {}", e.stage(), e)
            }
        };
        println!(
            "page {:>3}  {:<10} at ({:>7.1}, {:>7.1})  {}",
            audit.page_number,
            audit.xref.to_string(),
            audit.x,
            audit.y,
            status
        );
    }
    for page in &report.failed_pages {
        println!("page {:>3}  layout unreadable, no images taken", page);
    }
}

fn main() -> Result<()> {
    pdf_image_lib::init_logging();
    let args = Args::parse();

    let config = build_config(&args)?;
    let extractor = ImageExtractor::create(config)?;

    let report = extractor
        .extract_file_with_progress(&args.input, &mut |progress| {
            eprintln!(
                "[{}/{}] {}...",
                progress.pages_completed, progress.pages_total, progress.label
            );
        })
        .with_context(|| format!("Failed to extract images from {}", args.input.display()))?;

    if args.report {
        print_report(&report);
    }

    match report.outcome() {
        RunOutcome::NoImagesFound => {
            println!("No images found! Try lowering --min-width / --min-height.");
        }
        RunOutcome::Extracted(count) => {
            if let Some(dir) = &args.out_dir {
                write_dir(dir, &report.images)?;
                println!("Extracted {} images into {}", count, dir.display());
            } else {
                let path = args
                    .output
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_ARCHIVE_NAME));
                write_zip(&path, &report.images)?;
                println!("Extracted {} images into {}", count, path.display());
            }
        }
    }

    Ok(())
}
