mod spinner;

use std::path::PathBuf;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use siteaudit_core::{AuditConfig, CheckSelection};
use siteaudit_engine::Browser;
use siteaudit_extract::{collect_sites, CsvFileSource, GooglePlacesSource, GoogleSearchSource, Source};
use siteaudit_report::CsvSink;
use spinner::Spinner;

#[derive(Parser)]
#[command(name = "siteaudit")]
#[command(about = "Audit business websites for front-end health issues", long_about = None)]
#[command(version)]
struct Cli {
    /// Google Places search prompt ("[Business Type] in [Location]")
    #[arg(long)]
    search: Option<String>,

    /// Google Search prompt to scrape result URLs for
    #[arg(long)]
    scrape: Option<String>,

    /// Path to an input CSV file with URLs in the first column
    #[arg(long)]
    input: Option<PathBuf>,

    /// Path to the output CSV report
    #[arg(long, default_value = "report.csv")]
    output: PathBuf,

    /// Comma-separated checks to run
    /// (security,lcp,console,request,headers,mobile,form,tech,screenshot).
    /// Empty = all checks
    #[arg(long, default_value = "")]
    checks: String,

    /// Run only critical/important checks (faster)
    #[arg(long)]
    important: bool,

    /// Directory screenshots are saved to
    #[arg(long, default_value = "screenshots")]
    screenshot_dir: PathBuf,

    /// Per-site audit deadline in seconds
    #[arg(long, default_value_t = 60)]
    site_timeout: u64,

    /// Treat a network-idle timeout as a fatal audit error for that site
    #[arg(long)]
    strict_idle: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    // Everything that can be rejected without a browser is rejected here.
    let selection = CheckSelection::from_config(&cli.checks, cli.important)?;
    let sources = build_sources(&cli)?;
    let sink = CsvSink::create(&cli.output)?;

    let mut config = AuditConfig {
        site_timeout_secs: cli.site_timeout,
        screenshot_dir: cli.screenshot_dir.clone(),
        ..AuditConfig::default()
    };
    config.idle.fail_on_timeout = cli.strict_idle;

    let progress = Spinner::start("Extracting website URLs");
    let sites = collect_sites(&sources).await?;
    progress.stop().await;

    if sites.is_empty() {
        warn!("no sites to audit after filtering");
        sink.write(&selection, &[])?;
        return Ok(());
    }
    info!(count = sites.len(), "sites to audit");

    // Ctrl-C trips the batch cancellation token; the in-flight site
    // aborts promptly and the partial batch is still reported.
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling audit");
            signal_cancel.cancel();
        }
    });

    let browser = Browser::launch().await?;

    let progress = Spinner::start(format!("Auditing {} websites", sites.len()));
    let results = browser.run(&sites, &selection, &config, &cancel).await;
    progress.stop().await;

    browser.close().await;
    let results = results?;

    sink.write(&selection, &results)?;
    info!(path = %cli.output.display(), "audit report written");

    Ok(())
}

/// Build the URL sources from the CLI surface. At least one is required.
fn build_sources(cli: &Cli) -> anyhow::Result<Vec<Box<dyn Source>>> {
    let mut sources: Vec<Box<dyn Source>> = Vec::new();

    if let Some(prompt) = cli.search.as_deref().filter(|s| !s.is_empty()) {
        sources.push(Box::new(GooglePlacesSource::new(prompt)?));
    }
    if let Some(query) = cli.scrape.as_deref().filter(|s| !s.is_empty()) {
        sources.push(Box::new(GoogleSearchSource::new(query)));
    }
    if let Some(path) = &cli.input {
        sources.push(Box::new(CsvFileSource::new(path)?));
    }

    if sources.is_empty() {
        anyhow::bail!(
            "neither search prompt, nor scrape prompt, nor input file are specified"
        );
    }

    Ok(sources)
}
