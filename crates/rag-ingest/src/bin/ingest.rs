//! rag-ingest command line
//!
//! Run with: cargo run -p rag-ingest -- run ./documents

use anyhow::Context;
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rag_ingest::processing::{
    estimate_sources, purge_source, Broadcast, LogProgress, ProgressEvent, ProgressSink,
};
use rag_ingest::providers::{build_embedder, QdrantStore, VectorStoreProvider};
use rag_ingest::{
    DirectoryScanner, FileParser, IngestConfig, ManifestDb, ManifestSummary, ProcessingWorker,
    Recovery,
};

#[derive(Parser)]
#[command(name = "rag-ingest", version, about = "Bulk document ingestion into a vector store")]
struct Cli {
    /// TOML configuration file
    #[arg(long, short, global = true, env = "INGEST_CONFIG")]
    config: Option<PathBuf>,

    /// Manifest database path (overrides config)
    #[arg(long, global = true)]
    manifest: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a directory and drain the queue
    Run {
        /// Directory to scan
        root: Option<PathBuf>,
        /// Skip discovery and only drain what is already queued
        #[arg(long)]
        no_scan: bool,
        /// Files processed simultaneously
        #[arg(long)]
        concurrency: Option<usize>,
        /// Requeue files left in `processing` by an interrupted run first
        #[arg(long)]
        reset_stale: bool,
    },
    /// Discover files without processing them
    Scan {
        /// Directory to scan
        root: PathBuf,
    },
    /// Show manifest counts
    Status {
        /// Also list up to N errored files
        #[arg(long, value_name = "N")]
        errors: Option<usize>,
    },
    /// Requeue errored files
    Reset {
        /// Also requeue files stuck in `processing`
        #[arg(long)]
        processing: bool,
    },
    /// Estimate how many distinct sources the vector store holds
    Sources {
        #[arg(long, default_value_t = 256)]
        page_size: usize,
        #[arg(long, default_value_t = 20)]
        max_pages: usize,
    },
    /// Delete every vector whose source is PATH and requeue it
    Purge {
        /// Path as recorded in the manifest
        path: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rag_ingest=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = IngestConfig::load(cli.config.as_deref()).context("invalid configuration")?;
    if let Some(manifest) = cli.manifest {
        config.manifest.path = manifest;
    }

    let manifest = ManifestDb::open(&config.manifest.path)
        .with_context(|| format!("cannot open manifest {}", config.manifest.path.display()))?;

    match cli.command {
        Command::Run {
            root,
            no_scan,
            concurrency,
            reset_stale,
        } => {
            if let Some(concurrency) = concurrency {
                config.processing.concurrency = concurrency;
                config.validate()?;
            }
            if reset_stale {
                Recovery::new(manifest.clone()).reset_stale_processing()?;
            }
            if !no_scan {
                let root = root.context("a root directory is required unless --no-scan is given")?;
                scan(&config, &manifest, root).await?;
            }
            run(&config, manifest).await?;
        }
        Command::Scan { root } => {
            scan(&config, &manifest, root).await?;
            print_summary(&manifest.summary()?);
        }
        Command::Status { errors } => {
            let recovery = Recovery::new(manifest);
            print_summary(&recovery.summary()?);
            if let Some(limit) = errors {
                for entry in recovery.errored(limit)? {
                    println!(
                        "  {} {}\n      {}",
                        style("✗").red(),
                        entry.path,
                        entry.error.as_deref().unwrap_or("")
                    );
                }
            }
        }
        Command::Reset { processing } => {
            let recovery = Recovery::new(manifest);
            let errors = recovery.reset_errors()?;
            println!("Requeued {} errored files", errors);
            if processing {
                let stale = recovery.reset_stale_processing()?;
                println!("Requeued {} files stuck in processing", stale);
            }
            print_summary(&recovery.summary()?);
        }
        Command::Sources {
            page_size,
            max_pages,
        } => {
            let store = QdrantStore::new(&config.vector_store)?;
            let total = store.len().await?;
            let estimate = estimate_sources(&store, page_size, max_pages).await?;
            println!("{}: {} points", style(store.collection()).bold(), total);
            println!("  {}", estimate);
        }
        Command::Purge { path } => {
            let store = QdrantStore::new(&config.vector_store)?;
            let recorded = purge_source(&store, &manifest, &path).await?;
            println!(
                "Deleted all vectors for {} ({} chunks recorded) and requeued it",
                path, recorded
            );
        }
    }

    Ok(())
}

async fn scan(config: &IngestConfig, manifest: &ManifestDb, root: PathBuf) -> anyhow::Result<()> {
    let scanner = DirectoryScanner::from_config(&config.scan);
    let manifest = manifest.clone();
    let report = tokio::task::spawn_blocking(move || scanner.scan(Path::new(&root), &manifest))
        .await
        .context("scan task failed")??;

    println!(
        "Discovered {} files: {} new, {} already known, {} unreadable",
        report.discovered, report.inserted, report.already_known, report.skipped_unreadable
    );
    Ok(())
}

async fn run(config: &IngestConfig, manifest: ManifestDb) -> anyhow::Result<()> {
    let embedder = build_embedder(&config.embeddings)?;
    let store = Arc::new(QdrantStore::new(&config.vector_store)?);

    if !embedder.health_check().await.unwrap_or(false) {
        tracing::warn!("Embedding provider '{}' is not responding", embedder.name());
    }
    if !store.health_check().await.unwrap_or(false) {
        tracing::warn!("Vector store at {} is not ready", config.vector_store.url);
    }

    // An unreachable store fails files individually; a dimension mismatch fails the run
    match store.ensure_collection(config.embeddings.dimensions).await {
        Ok(()) => {}
        Err(e) if e.is_fatal() => return Err(e.into()),
        Err(e) => tracing::warn!("Could not verify collection '{}': {}", store.collection(), e),
    }

    let pending = manifest.summary()?.pending();
    let bar = ProgressBar::new(pending as u64);
    bar.set_style(
        ProgressStyle::with_template(
            "[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} files {msg}",
        )?
        .progress_chars("##-"),
    );

    let progress = Broadcast(vec![Box::new(LogProgress), Box::new(BarProgress(bar.clone()))]);
    let worker = ProcessingWorker::from_config(
        config,
        manifest.clone(),
        Arc::new(FileParser::new()),
        embedder,
        store as Arc<dyn VectorStoreProvider>,
    )
    .with_progress(Arc::new(progress));

    let shutdown = worker.shutdown_handle();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if !shutdown.request() {
                tracing::error!("Second interrupt, abandoning in-flight files");
                std::process::exit(130);
            }
            tracing::warn!("Stop requested, finishing in-flight files (Ctrl-C again to abort)");
        }
    });

    let report = worker.run().await?;
    bar.finish_and_clear();

    println!(
        "{} {} completed ({} chunks), {} empty, {} failed{}",
        style("Run finished:").bold(),
        style(report.completed).green(),
        report.chunks,
        report.empty,
        style(report.failed).red(),
        if report.stopped_early { " (stopped early)" } else { "" }
    );
    print_summary(&manifest.summary()?);
    Ok(())
}

/// Advances the bar once per finished file
struct BarProgress(ProgressBar);

impl ProgressSink for BarProgress {
    fn on_event(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::FileStarted { path } => {
                let name = Path::new(path)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                self.0.set_message(name);
            }
            e if e.is_file_done() => self.0.inc(1),
            _ => {}
        }
    }
}

fn print_summary(summary: &ManifestSummary) {
    println!(
        "Manifest: {} completed, {} error, {} queued, {} processing ({} chunks)",
        style(summary.completed).green(),
        style(summary.error).red(),
        summary.queued,
        summary.processing,
        summary.total_chunks
    );
}
