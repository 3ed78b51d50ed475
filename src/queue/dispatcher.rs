//! Job submission.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Notify;
use tracing::info;

use crate::adapters::AdapterRegistry;
use crate::models::Job;
use crate::repository::{DbContext, DieselError};

#[derive(Debug, Error)]
pub enum SubmitError {
    /// No adapter recognized a URL in the share text. Nothing is created.
    #[error("no supported share link found in input")]
    Unsupported,
    #[error(transparent)]
    Db(#[from] DieselError),
}

/// Turns share text into queued jobs.
///
/// Validation happens before anything touches the database: unsupported
/// input is rejected without creating a job. Accepted shares dedup onto an
/// existing active job for the same URL.
#[derive(Clone)]
pub struct Dispatcher {
    ctx: DbContext,
    registry: AdapterRegistry,
    resubmit_completed: bool,
    wake: Arc<Notify>,
}

impl Dispatcher {
    pub fn new(ctx: DbContext, registry: AdapterRegistry, resubmit_completed: bool) -> Self {
        Self {
            ctx,
            registry,
            resubmit_completed,
            wake: Arc::new(Notify::new()),
        }
    }

    /// Handle workers wait on between queue polls.
    pub fn wake_handle(&self) -> Arc<Notify> {
        self.wake.clone()
    }

    /// Submit share text, returning the job now covering it.
    pub async fn submit(&self, share_text: &str) -> Result<Job, SubmitError> {
        let (adapter, share_url) = self
            .registry
            .extract_share(share_text)
            .ok_or(SubmitError::Unsupported)?;

        let (job, created) = self
            .ctx
            .jobs()
            .get_or_create_from_share(share_text, &share_url, self.resubmit_completed)
            .await?;

        if created {
            info!(
                job_id = %job.id,
                platform = adapter.platform_name(),
                url = %share_url,
                "job queued"
            );
            self.wake.notify_waiters();
        } else {
            info!(job_id = %job.id, status = job.status.as_str(), "share already covered");
        }
        Ok(job)
    }
}
