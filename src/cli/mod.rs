//! Command-line interface.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::warn;

use crate::adapters::AdapterRegistry;
use crate::config::Settings;
use crate::download::{CookieCache, Downloader};
use crate::models::Job;
use crate::queue::{Dispatcher, JobRunner, WorkerPool};
use crate::repository::DbContext;
use crate::server::{self, AppState};
use crate::services::MediaService;

#[derive(Parser)]
#[command(name = "depot")]
#[command(about = "Central depot for saving social-media posts and their media")]
#[command(version)]
pub struct Cli {
    /// Data directory
    #[arg(long, global = true, env = "DEPOT_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database
    Init,

    /// Run the intake API together with download workers
    Serve {
        /// Address to bind
        #[arg(short, long, env = "DEPOT_BIND_ADDR")]
        bind: Option<String>,
        /// Number of download workers
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Run download workers only (share the database with a serve process)
    Worker {
        /// Number of download workers
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Queue a share for download
    Submit {
        /// Share text or URL
        share: String,
    },

    /// Show job status
    Status {
        /// Job id (omit to list recent jobs)
        job_id: Option<String>,
        /// How many recent jobs to list
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },
}

/// Run the CLI.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::from_env();
    if let Some(data_dir) = cli.data_dir {
        settings.data_dir = data_dir;
    }

    match cli.command {
        Commands::Init => cmd_init(&settings).await,
        Commands::Serve { bind, workers } => {
            if let Some(bind) = bind {
                settings.bind_addr = bind;
            }
            if let Some(workers) = workers {
                settings.workers = workers;
            }
            cmd_serve(&settings).await
        }
        Commands::Worker { workers } => {
            if let Some(workers) = workers {
                settings.workers = workers;
            }
            cmd_worker(&settings).await
        }
        Commands::Submit { share } => cmd_submit(&settings, &share).await,
        Commands::Status { job_id, limit } => cmd_status(&settings, job_id.as_deref(), limit).await,
    }
}

/// Everything a running pipeline needs, wired from settings.
pub struct Pipeline {
    pub ctx: DbContext,
    pub dispatcher: Dispatcher,
    pub runner: JobRunner,
}

/// Build the pipeline against an adapter registry.
///
/// The binary ships without platform adapters; deployments provide them by
/// linking against this crate. Jobs queued while the registry is empty
/// stay pending until a worker with adapters picks them up.
pub async fn build_pipeline(settings: &Settings, registry: AdapterRegistry) -> Result<Pipeline> {
    if registry.is_empty() {
        warn!("no platform adapters registered; submissions will be rejected");
    }

    let ctx = settings.create_db_context().await?;
    let cookies = settings
        .cookie_file
        .as_ref()
        .map(|path| Arc::new(CookieCache::new(path, settings.cookie_ttl)));
    let downloader = Downloader::new(
        settings.download_retries,
        settings.download_retry_base,
        settings.request_timeout,
        cookies,
    )?;
    let media = MediaService::new(ctx.clone(), downloader);
    let dispatcher = Dispatcher::new(ctx.clone(), registry.clone(), settings.resubmit_completed);
    let runner = JobRunner::new(
        ctx.clone(),
        media,
        registry,
        settings.max_attempts,
        settings.retry_base,
        settings.claim_lease,
    );

    Ok(Pipeline {
        ctx,
        dispatcher,
        runner,
    })
}

async fn cmd_init(settings: &Settings) -> Result<()> {
    settings.create_db_context().await?;
    println!("Initialized data directory at {}", settings.data_dir.display());
    println!("Database: {}", settings.database_url());
    println!("Media root: {}", settings.media_root().display());
    Ok(())
}

async fn cmd_serve(settings: &Settings) -> Result<()> {
    let pipeline = build_pipeline(settings, AdapterRegistry::default()).await?;

    let pool = WorkerPool::spawn(
        settings.workers,
        pipeline.runner,
        settings.poll_interval,
        pipeline.dispatcher.wake_handle(),
    );

    let state = AppState::new(pipeline.dispatcher, pipeline.ctx);
    let result = server::serve(state, &settings.bind_addr).await;
    pool.abort();
    result
}

async fn cmd_worker(settings: &Settings) -> Result<()> {
    let pipeline = build_pipeline(settings, AdapterRegistry::default()).await?;

    println!("Running {} worker(s); ctrl-c to stop", settings.workers);
    let pool = WorkerPool::spawn(
        settings.workers,
        pipeline.runner,
        settings.poll_interval,
        pipeline.dispatcher.wake_handle(),
    );
    pool.join().await;
    Ok(())
}

async fn cmd_submit(settings: &Settings, share: &str) -> Result<()> {
    let pipeline = build_pipeline(settings, AdapterRegistry::default()).await?;
    let job = pipeline.dispatcher.submit(share).await?;
    print_job(&job);
    Ok(())
}

async fn cmd_status(settings: &Settings, job_id: Option<&str>, limit: i64) -> Result<()> {
    let ctx = settings.create_db_context().await?;
    match job_id {
        Some(id) => match ctx.jobs().get(id).await? {
            Some(job) => print_job(&job),
            None => println!("No job with id {id}"),
        },
        None => {
            let jobs = ctx.jobs().list_recent(limit).await?;
            if jobs.is_empty() {
                println!("No jobs yet");
            }
            for job in jobs {
                println!(
                    "{}  {:<10}  {}  attempts={}",
                    job.id,
                    job.status.as_str(),
                    job.share_url,
                    job.attempts()
                );
            }
        }
    }
    Ok(())
}

fn print_job(job: &Job) {
    println!("Job {}", job.id);
    println!("  status:    {}", job.status.as_str());
    println!("  share url: {}", job.share_url);
    if let Some(post_id) = job.post_id {
        println!("  post id:   {post_id}");
    }
    if let Some(due) = job.next_retry_at {
        println!("  retry at:  {}", due.to_rfc3339());
    }
    for (i, err) in job.error_history.iter().enumerate() {
        println!("  attempt {}: [{}] {}", i + 1, err.kind, err.message);
    }
}
