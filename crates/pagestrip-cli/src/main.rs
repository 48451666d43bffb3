//! `pagestrip`: split a scanned page into strips and upload them.
//!
//! Usage:
//! ```text
//! pagestrip page.jpg
//! pagestrip page.jpg --strips 30 --concurrency 3 --json
//! pagestrip page.jpg --config pagestrip.toml --base-url http://localhost:8080/cloud-storage
//! ```
//!
//! Exit status is 0 when every strip uploaded, 2 when some strips failed,
//! and 1 when the page could not be processed at all.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use pagestrip_core::logging::init_tracing;
use pagestrip_core::{summarize, CancelHandle, PipelineConfig, RunSummary, StripPipeline};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "pagestrip")]
#[command(version = pagestrip_core::version())]
#[command(about = "Split a scanned page into vertical strips and upload them")]
struct Args {
    /// Page image (JPEG or PNG)
    image: PathBuf,

    /// TOML config file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of vertical strips
    #[arg(short = 'n', long)]
    strips: Option<usize>,

    /// Maximum concurrent uploads
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Base URL of the upload service
    #[arg(long)]
    base_url: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Directory for transient strip files
    #[arg(long)]
    scratch_dir: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<String>,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,
}

impl Args {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        if let Some(strips) = self.strips {
            config.strip_count = strips;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(base_url) = &self.base_url {
            config.store.base_url = base_url.clone();
        }
        if let Some(timeout) = self.timeout {
            config.store.timeout_secs = timeout;
        }
        if let Some(dir) = &self.scratch_dir {
            config.scratch_dir = Some(dir.clone());
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

/// Plain-text summary: the status line, then one line per failed strip.
fn summary_text(summary: &RunSummary) -> String {
    let mut text = summary.message();
    for label in summary.failure_labels() {
        text.push_str("\nfailed: ");
        text.push_str(&label);
    }
    text
}

fn print_summary(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(summary).context("serializing summary")?
        );
    } else {
        println!("{}", summary_text(summary));
    }
    Ok(())
}

fn run(args: &Args) -> Result<RunSummary> {
    let config = args.pipeline_config()?;
    init_tracing(&config.log_level);

    let bytes = std::fs::read(&args.image)
        .with_context(|| format!("reading {}", args.image.display()))?;

    let pipeline = StripPipeline::from_config(&config).context("setting up pipeline")?;
    info!(
        image = %args.image.display(),
        strips = pipeline.strip_count(),
        concurrency = pipeline.concurrency(),
        store = %config.store.base_url,
        "processing page"
    );

    let run = pipeline
        .run(&bytes, &CancelHandle::new())
        .with_context(|| format!("processing {}", args.image.display()))?;

    Ok(summarize(&run))
}

fn main() -> ExitCode {
    let args = Args::parse();

    let summary = match run(&args) {
        Ok(summary) => summary,
        Err(err) => {
            error!("{err:#}");
            eprintln!("error: {err:#}");
            return ExitCode::from(1);
        }
    };

    if let Err(err) = print_summary(&summary, args.json) {
        eprintln!("error: {err:#}");
        return ExitCode::from(1);
    }

    if summary.is_complete() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    }
}
