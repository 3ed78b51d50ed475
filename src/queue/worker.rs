//! Workers and the job state machine.
//!
//! Each worker claims one due job at a time and runs it end to end. Every
//! failed attempt appends one error record; a transient failure schedules
//! a retry with exponential backoff until the attempt ceiling, anything
//! else fails the job immediately. Terminal transitions go through
//! `JobRepository::finish`, which refuses to touch terminal rows.

use std::error::Error as _;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::adapters::{AdapterError, AdapterRegistry};
use crate::models::{ErrorRecord, Job, JobStatus};
use crate::repository::{DbContext, DieselError};
use crate::services::MediaService;

#[derive(Debug, Error)]
pub enum JobFailure {
    #[error("no adapter supports {0}")]
    NoAdapter(String),
    #[error("post not found or removed")]
    NotFound,
    #[error("permanent failure: {0}")]
    Permanent(String),
    #[error("transient failure: {0}")]
    Transient(#[source] anyhow::Error),
}

impl JobFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoAdapter(_) => "no_adapter",
            Self::NotFound => "not_found",
            Self::Permanent(_) => "permanent",
            Self::Transient(_) => "transient",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    fn to_record(&self) -> ErrorRecord {
        let trace = match self {
            Self::Transient(e) => {
                let chain: Vec<String> = e.chain().skip(1).map(|c| c.to_string()).collect();
                (!chain.is_empty()).then(|| chain.join(": "))
            }
            _ => None,
        };
        ErrorRecord {
            kind: self.kind().to_string(),
            message: self.to_string(),
            trace,
        }
    }
}

impl From<AdapterError> for JobFailure {
    fn from(e: AdapterError) -> Self {
        if e.is_transient() {
            Self::Transient(e.into())
        } else {
            let mut message = e.to_string();
            if let Some(source) = e.source() {
                message = format!("{message}: {source}");
            }
            Self::Permanent(message)
        }
    }
}

impl From<DieselError> for JobFailure {
    fn from(e: DieselError) -> Self {
        Self::Transient(e.into())
    }
}

/// Runs one job attempt through the full pipeline.
#[derive(Clone)]
pub struct JobRunner {
    ctx: DbContext,
    media: MediaService,
    registry: AdapterRegistry,
    max_attempts: u32,
    retry_base: Duration,
    claim_lease: Duration,
}

impl JobRunner {
    pub fn new(
        ctx: DbContext,
        media: MediaService,
        registry: AdapterRegistry,
        max_attempts: u32,
        retry_base: Duration,
        claim_lease: Duration,
    ) -> Self {
        Self {
            ctx,
            media,
            registry,
            max_attempts: max_attempts.max(1),
            retry_base,
            claim_lease,
        }
    }

    /// Drive a claimed job to its next state: completed, failed, or
    /// scheduled for retry.
    pub async fn run_claimed(&self, job: Job) -> Result<(), DieselError> {
        let jobs = self.ctx.jobs();

        match self.run_attempt(&job).await {
            Ok(post_id) => {
                jobs.finish(&job.id, JobStatus::Completed).await?;
                info!(job_id = %job.id, post_id, "job completed");
                Ok(())
            }
            Err(failure) => {
                let attempts = jobs.append_error(&job.id, &failure.to_record()).await? as u32;

                if !failure.is_retryable() {
                    jobs.finish(&job.id, JobStatus::Failed).await?;
                    warn!(job_id = %job.id, kind = failure.kind(), error = %failure, "job failed");
                } else if attempts >= self.max_attempts {
                    jobs.finish(&job.id, JobStatus::Failed).await?;
                    warn!(job_id = %job.id, attempts, "job failed, retries exhausted");
                } else {
                    let delay = self.retry_base * 2u32.saturating_pow(attempts - 1);
                    let due = Utc::now()
                        + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
                    jobs.schedule_retry(&job.id, due).await?;
                    warn!(
                        job_id = %job.id,
                        attempts,
                        retry_in_secs = delay.as_secs(),
                        error = %failure,
                        "attempt failed, retry scheduled"
                    );
                }
                Ok(())
            }
        }
    }

    /// One attempt: resolve, extract, upsert, then download.
    async fn run_attempt(&self, job: &Job) -> Result<i64, JobFailure> {
        let adapter = self
            .registry
            .adapter_for(&job.share_url)
            .ok_or_else(|| JobFailure::NoAdapter(job.share_url.clone()))?;

        let share = adapter.load(&job.share_url).await?;
        let info = adapter.extract_info(&share)?.ok_or(JobFailure::NotFound)?;

        let entities = self.ctx.entities();
        let platform = entities
            .get_or_create_platform(adapter.platform_name(), adapter.display_name())
            .await?;
        let creator = entities
            .get_or_create_creator(
                platform.id,
                &info.account_id,
                info.username.as_deref(),
                info.author_display_name.as_deref(),
                info.profile_pic_url.as_deref(),
            )
            .await?;
        let post = entities
            .get_or_create_post(
                platform.id,
                creator.id,
                &info.platform_post_id,
                info.post_type,
                &info.url,
                &job.share_url,
                info.title.as_deref(),
                info.caption_text.as_deref(),
                info.platform_created_at,
            )
            .await?;
        self.ctx.jobs().set_post(&job.id, post.id).await?;

        // A re-submitted post whose files are all still on disk needs no
        // second download
        if self.ctx.jobs().has_completed_for_post(post.id).await?
            && self
                .media
                .post_files_complete(post.id)
                .await
                .map_err(|e| JobFailure::Transient(e.into()))?
        {
            info!(job_id = %job.id, post_id = post.id, "post already downloaded, skipping");
            return Ok(post.id);
        }

        // Side attachments are best-effort and never fail the job
        if let Some(url) = &info.profile_pic_url {
            if let Err(e) = self.media.cache_profile_pic(&platform.name, &creator, url).await {
                warn!(creator_id = creator.id, error = %e, "profile pic caching failed");
            }
        }
        if let Some(url) = &info.thumbnail_url {
            if let Err(e) = self.media.cache_thumbnail(&platform.name, &post, url).await {
                warn!(post_id = post.id, error = %e, "thumbnail caching failed");
            }
        }

        let links = adapter.download(&share, &post, &self.media).await?;
        info!(job_id = %job.id, post_id = post.id, media = links.len(), "media fetched");
        Ok(post.id)
    }
}

/// A set of claim-loop worker tasks sharing one runner.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` workers. Each loops forever: claim a due job, run it,
    /// and when the queue is empty wait for a wake-up or the poll tick.
    pub fn spawn(
        count: usize,
        runner: JobRunner,
        poll_interval: Duration,
        wake: Arc<Notify>,
    ) -> Self {
        let handles = (0..count.max(1))
            .map(|worker_id| {
                let runner = runner.clone();
                let wake = wake.clone();
                tokio::spawn(async move {
                    info!(worker_id, "worker started");
                    loop {
                        match runner.ctx.jobs().claim_due_job(runner.claim_lease).await {
                            Ok(Some(job)) => {
                                let job_id = job.id.clone();
                                if let Err(e) = runner.run_claimed(job).await {
                                    error!(worker_id, job_id = %job_id, error = %e, "job bookkeeping failed");
                                }
                            }
                            Ok(None) => {
                                tokio::select! {
                                    _ = wake.notified() => {}
                                    _ = tokio::time::sleep(poll_interval) => {}
                                }
                            }
                            Err(e) => {
                                error!(worker_id, error = %e, "claim failed");
                                tokio::time::sleep(poll_interval).await;
                            }
                        }
                    }
                })
            })
            .collect();
        Self { handles }
    }

    /// Run until aborted (the pool never drains on its own).
    pub async fn join(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }

    pub fn abort(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}
