use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use sluice_engine::{Pipeline, PipelineConfig};
use tracing::{Level, error, info};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};
use url::Url;

#[derive(Parser, Debug)]
#[command(author, version, about = "Manifest-driven VOD downloader", long_about = None)]
struct Args {
    /// URL of the compressed master manifest
    #[arg(short, long)]
    manifest: Url,

    /// Base content URL for resolving relative references; defaults to the
    /// manifest URL's directory
    #[arg(short, long)]
    base_url: Option<Url>,

    /// Staging directory for downloaded artifacts and outputs
    #[arg(short, long, default_value = "downloads")]
    output_dir: PathBuf,

    /// Rendition ids to process (repeatable); all renditions when omitted
    #[arg(long = "variant")]
    variants: Vec<String>,

    /// Maximum concurrent segment downloads per rendition (0 = unbounded)
    #[arg(long, default_value_t = 8)]
    concurrency: usize,

    /// Maximum retry attempts per segment after the initial try
    #[arg(long, default_value_t = 3)]
    max_retries: u32,

    /// Whole-transfer timeout per segment, in seconds
    #[arg(long, default_value_t = 30)]
    download_timeout: u64,

    /// Decompressor invocation, program plus leading arguments
    #[arg(long = "decompress-with", num_args = 1.., default_values = ["blurl", "-d"])]
    decompress_command: Vec<String>,

    /// Path to the ffmpeg binary
    #[arg(long)]
    ffmpeg: Option<String>,

    /// Path to the MP4Box binary
    #[arg(long)]
    mp4box: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    if let Err(e) = run(args).await {
        error!("Download failed: {e}");
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let base_url = match args.base_url {
        Some(base) => base,
        None => args.manifest.join(".")?,
    };

    let mut config = PipelineConfig::new(args.manifest, base_url, args.output_dir);
    config.variants = args.variants;
    config.decompress_command = args.decompress_command;
    config.fetcher.fetch_concurrency = args.concurrency;
    config.fetcher.retry.max_retries = args.max_retries;
    config.fetcher.segment_download_timeout = Duration::from_secs(args.download_timeout);
    if let Some(ffmpeg) = args.ffmpeg {
        config.ffmpeg_path = ffmpeg;
    }
    if let Some(mp4box) = args.mp4box {
        config.mp4box_path = mp4box;
    }

    let pipeline = Pipeline::new(config)?;
    let deliverable = pipeline.run().await?;
    info!(output = %deliverable.display(), "Download finished");
    println!("{}", deliverable.display());
    Ok(())
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_level(verbose))
        .init();
}
