//! Mixtape Archiver main entry point
//!
//! This is the command-line interface for the crawl-and-archive pipeline.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use mixtape_archiver::api::{ArchiveApi, DownloadStatus};
use mixtape_archiver::archive::{archive_key, ArchiveAssembler, CompletionTracker, UrlSigner};
use mixtape_archiver::config::{load_config_with_hash, Config};
use mixtape_archiver::crawler::PageLinkExtractor;
use mixtape_archiver::pipeline::Components;
use mixtape_archiver::server;
use mixtape_archiver::storage::{open_shared_storage, ArtifactStore, FsArtifactStore};
use mixtape_archiver::tasks::TaskReceiver;
use mixtape_archiver::worker::default_renderer;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Mixtape Archiver: crawl a listing of mixes and bundle them into one archive
///
/// Every mix found on a user's listen history or collection is rendered,
/// its track list extracted and saved as text, and all results are zipped
/// together once the last item has finished.
#[derive(Parser, Debug)]
#[command(name = "mixtape-archiver")]
#[command(version)]
#[command(about = "A distributed crawl-and-archive pipeline", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, value_name = "CONFIG", default_value = "archiver.toml")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a crawl request and process it in this process
    Request {
        /// Listing URL, e.g. https://example.com/some_user/history
        url: String,

        /// Listing kind: history or collection
        #[arg(long = "type", default_value = "history")]
        kind: String,
    },

    /// Show the progress of a request, assembling the archive when ready
    Status {
        /// Request id returned by `request`
        id: String,
    },

    /// Crawl a listing end to end and write archive.zip
    Crawl {
        /// Listing URL
        url: String,

        /// Listing kind: history or collection
        #[arg(long = "type", default_value = "history")]
        kind: String,

        /// Directory archive.zip is written to
        #[arg(long, default_value = "tmp")]
        out_dir: PathBuf,

        /// Give up waiting for completion after this many seconds
        #[arg(long, default_value_t = 600)]
        timeout_secs: u64,

        /// Delay between completion checks (milliseconds)
        #[arg(long, default_value_t = 1000)]
        poll_interval_ms: u64,
    },

    /// Run the HTTP server with an in-process worker pool
    Serve {
        /// Address to bind; overrides the configured one
        #[arg(long)]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    match cli.command {
        Command::Request { url, kind } => {
            handle_request(&config, &config_hash, &url, &kind).await
        }
        Command::Status { id } => handle_status(&config, &id).await,
        Command::Crawl {
            url,
            kind,
            out_dir,
            timeout_secs,
            poll_interval_ms,
        } => {
            handle_crawl(
                &config,
                &config_hash,
                &url,
                &kind,
                &out_dir,
                Duration::from_secs(timeout_secs),
                Duration::from_millis(poll_interval_ms),
            )
            .await
        }
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let (components, receiver) = build_components(&config, &config_hash)?;
            server::serve(components, receiver, &bind).await?;
            Ok(())
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("mixtape_archiver=info,warn"),
            1 => EnvFilter::new("mixtape_archiver=debug,info"),
            2 => EnvFilter::new("mixtape_archiver=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn build_components(
    config: &Config,
    config_hash: &str,
) -> anyhow::Result<(Components, TaskReceiver)> {
    let extractor = PageLinkExtractor::new(config).context("Failed to build HTTP client")?;
    let renderer = default_renderer(config).context("Failed to set up the renderer")?;
    let built = Components::build(config, config_hash, Arc::new(extractor), renderer)?;
    Ok(built)
}

/// Submits a request and drains the task queue until every item has run
async fn submit_and_run(
    config: &Config,
    config_hash: &str,
    url: &str,
    kind: &str,
) -> anyhow::Result<(Components, String)> {
    let (components, mut receiver) = build_components(config, config_hash)?;

    let accepted = components.api.request_archive(url, kind).await?;
    tracing::info!("Request id: {}", accepted.id);

    let processed = components.pool.run_until_idle(&mut receiver).await;
    tracing::info!("Ran {} tasks for {}", processed, accepted.id);

    Ok((components, accepted.id))
}

async fn handle_request(
    config: &Config,
    config_hash: &str,
    url: &str,
    kind: &str,
) -> anyhow::Result<()> {
    let (_components, id) = submit_and_run(config, config_hash, url, kind).await?;
    println!("{}", id);
    Ok(())
}

/// Prints progress; assembles and prints the archive URL when ready
async fn handle_status(config: &Config, id: &str) -> anyhow::Result<()> {
    let storage = open_shared_storage(Path::new(&config.storage.database_path))?;
    let readiness = CompletionTracker::new(storage.clone()).check_ready(id)?;

    println!("Request: {}", id);
    println!(
        "  Progress: {} of {} items{}",
        readiness.completed_count,
        readiness.total_discovered,
        if readiness.finalized { "" } else { " (still discovering)" }
    );
    if readiness.truncated {
        println!("  Pagination stopped early on a page that failed to load");
    }

    if readiness.ready {
        let assembler = ArchiveAssembler::new(
            storage,
            Arc::new(FsArtifactStore::new(&config.storage.artifact_dir)),
            UrlSigner::new(&config.archive),
        );
        let reference = assembler.assemble(id).await?;
        println!("  Archive: {}", reference.url);
        if !reference.failed.is_empty() {
            println!("  Failed items: {}", reference.failed.len());
        }
    }

    Ok(())
}

/// Runs the whole pipeline locally and writes the bundle to `out_dir`
async fn handle_crawl(
    config: &Config,
    config_hash: &str,
    url: &str,
    kind: &str,
    out_dir: &Path,
    timeout: Duration,
    poll_interval: Duration,
) -> anyhow::Result<()> {
    let (components, id) = submit_and_run(config, config_hash, url, kind).await?;

    let wait = wait_until_ready(&components.api, &id, poll_interval);
    let status = match tokio::time::timeout(timeout, wait).await {
        Ok(status) => status?,
        Err(_) => bail!("Request {} did not complete within {:?}", id, timeout),
    };

    let bytes = components
        .artifacts
        .get(&archive_key(&id))
        .await?
        .with_context(|| format!("Archive for {} is missing after upload", id))?;

    tokio::fs::create_dir_all(out_dir).await?;
    let out_path = out_dir.join("archive.zip");
    tokio::fs::write(&out_path, &bytes).await?;

    println!("✓ Archived {} of {} items", status.count, status.total);
    if status.truncated {
        println!("  Pagination stopped early on a page that failed to load");
    }
    println!("✓ Wrote {}", out_path.display());

    Ok(())
}

/// Polls the status query until the archive has been assembled
async fn wait_until_ready(
    api: &ArchiveApi,
    id: &str,
    poll_interval: Duration,
) -> anyhow::Result<DownloadStatus> {
    loop {
        let status = api.download_status(id).await?;
        if status.ready {
            return Ok(status);
        }
        tracing::info!("Waiting: {} of {} items complete", status.count, status.total);
        tokio::time::sleep(poll_interval).await;
    }
}
