//! Band merge CLI.
//!
//! Fetches one day of RTMA analysis files, stacks the selected band of
//! each into a multi-band raster and writes it as GeoTIFF or GRIB2.
//!
//! Exit status: 0 when every time step was merged, 2 when some were
//! missing, 1 when the run failed.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use band_merge::{DatasetVariant, ParameterSelector, Pipeline, RunConfig, RunResult, TimeStep};
use chrono::NaiveDate;
use clap::Parser;
use raster_writer::OutputFormat;
use storage::ObjectStorage;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "merger")]
#[command(about = "Merge a day of RTMA analysis bands into one multi-band raster")]
struct Args {
    /// Run date (YYYY-MM-DD, UTC)
    #[arg(long, env = "MERGE_DATE")]
    date: Option<NaiveDate>,

    /// YAML run configuration; flags override its values
    #[arg(short, long, env = "MERGE_CONFIG")]
    config: Option<PathBuf>,

    /// Dataset variant (rtma2p5, rtma2p5_ru, akrtma, hirtma, prrtma)
    #[arg(long)]
    dataset: Option<DatasetVariant>,

    /// Time step between bands (e.g. 1h, 15m, 03:00)
    #[arg(long)]
    step: Option<TimeStep>,

    /// Message number (e.g. 9) or parameter (e.g. TMP, "TMP:2 m above ground")
    #[arg(long)]
    selector: Option<ParameterSelector>,

    /// Product file name suffix
    #[arg(long)]
    product: Option<String>,

    /// Artifact path (default: derived from the request inside --output-dir)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory for derived artifact names
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Output format (geotiff or grib2)
    #[arg(long)]
    format: Option<OutputFormat>,

    /// Skip re-reading the artifact before publishing it
    #[arg(long)]
    no_verify: bool,

    /// Read objects from this directory instead of S3
    #[arg(long, env = "MERGE_LOCAL_ROOT")]
    local_root: Option<PathBuf>,

    /// S3 bucket
    #[arg(long, env = "MERGE_BUCKET")]
    bucket: Option<String>,

    /// S3 endpoint override
    #[arg(long, env = "MERGE_ENDPOINT")]
    endpoint: Option<String>,

    /// Keep a copy of every fetched object here
    #[arg(long, env = "MERGE_DOWNLOAD_DIR")]
    download_dir: Option<PathBuf>,

    /// Maximum concurrent fetches
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Attempts per object before it is treated as missing
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Human-readable logs instead of JSON
    #[arg(long)]
    pretty: bool,
}

impl Args {
    /// File configuration (or defaults) with command line overrides.
    fn run_config(&self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::from_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => RunConfig::default(),
        };

        if let Some(date) = self.date {
            config.date = Some(date);
        }
        if let Some(dataset) = self.dataset {
            config.dataset = dataset;
        }
        if let Some(step) = self.step {
            config.time_step = step;
        }
        if let Some(selector) = &self.selector {
            config.selector = selector.clone();
        }
        if let Some(product) = &self.product {
            config.product = Some(product.clone());
        }
        if let Some(output) = &self.output {
            config.output.path = Some(output.clone());
        }
        if let Some(dir) = &self.output_dir {
            config.output.dir = dir.clone();
        }
        if let Some(format) = self.format {
            config.output.format = format;
        }
        if self.no_verify {
            config.output.verify = false;
        }
        if let Some(root) = &self.local_root {
            config.store.local_root = Some(root.clone());
        }
        if let Some(bucket) = &self.bucket {
            config.store.bucket = bucket.clone();
        }
        if let Some(endpoint) = &self.endpoint {
            config.store.endpoint = Some(endpoint.clone());
        }
        if let Some(dir) = &self.download_dir {
            config.download_dir = Some(dir.clone());
        }
        if let Some(n) = self.max_concurrent {
            config.max_concurrent_fetches = n;
        }
        if let Some(n) = self.max_attempts {
            config.retry.max_attempts = n;
        }

        config.check()?;
        Ok(config)
    }
}

fn init_tracing(level: &str, pretty: bool) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);

    if pretty {
        tracing::subscriber::set_global_default(builder.finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.with_thread_ids(true).json().finish())?;
    }
    Ok(())
}

fn print_report(result: &RunResult) {
    println!("status: {}", result.status);
    for report in &result.outcomes {
        println!("  {}  {}", report.key, report.outcome);
    }
    if let Some(path) = &result.artifact {
        println!(
            "artifact: {} ({} of {} bands)",
            path.display(),
            result.assembled(),
            result.outcomes.len()
        );
    }
    if let Some(error) = &result.error {
        println!("error: {}", error);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args.log_level, args.pretty)?;

    let config = args.run_config()?;
    let request = config.request().context("Invalid run request")?;
    let destination = config.destination(&request);

    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let storage = ObjectStorage::new(&config.store).context("Failed to open object store")?;
    info!(
        store = storage.label(),
        dataset = %request.dataset(),
        date = %request.date(),
        step = %request.time_step(),
        selector = %request.selector(),
        destination = %destination.display(),
        "Starting merge"
    );

    let cancel = CancellationToken::new();
    let pipeline = Pipeline::new(Arc::new(storage), &config).with_cancellation(cancel.clone());

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        cancel.cancel();
    });

    let result = pipeline.run(&request, &destination).await;
    print_report(&result);

    std::process::exit(result.exit_code());
}
