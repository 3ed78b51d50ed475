//! Job rows and the database-backed work queue.
//!
//! The jobs table doubles as the durable queue: submission inserts a
//! `pending` row, workers atomically claim due rows, and retries are the
//! same `processing` row becoming claimable again once `next_retry_at`
//! passes. A claim writes a lease into `next_retry_at`, so a job whose
//! worker died mid-attempt comes back on its own once the lease expires.
//! Terminal rows are never modified.

use std::time::Duration;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncConnection, RunQueryDsl};
use uuid::Uuid;

use super::pool::{DieselError, SqlitePool};
use super::records::{JobRecord, NewJob};
use super::{format_datetime, parse_datetime, parse_datetime_opt};
use crate::models::{ErrorRecord, Job, JobStatus};
use crate::schema::jobs;

const ACTIVE_STATUSES: [&str; 2] = ["pending", "processing"];

pub struct JobRepository {
    pool: SqlitePool,
}

impl JobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Find an active job for this share URL or create a fresh one.
    ///
    /// Returns the job and whether it was newly created. When a completed
    /// job already exists for the URL and `resubmit_completed` is false,
    /// the finished job is returned instead of spawning a duplicate.
    pub async fn get_or_create_from_share(
        &self,
        share_text: &str,
        share_url: &str,
        resubmit_completed: bool,
    ) -> Result<(Job, bool), DieselError> {
        let mut conn = self.pool.get().await?;
        let share_text = share_text.to_string();
        let share_url = share_url.to_string();

        conn.transaction(|conn| {
            Box::pin(async move {
                let active: Option<JobRecord> = jobs::table
                    .filter(jobs::share_url.eq(&share_url))
                    .filter(jobs::status.eq_any(ACTIVE_STATUSES))
                    .order(jobs::created_at.asc())
                    .first(conn)
                    .await
                    .optional()?;

                if let Some(record) = active {
                    return Ok((job_from_record(record), false));
                }

                if !resubmit_completed {
                    let completed: Option<JobRecord> = jobs::table
                        .filter(jobs::share_url.eq(&share_url))
                        .filter(jobs::status.eq("completed"))
                        .order(jobs::created_at.desc())
                        .first(conn)
                        .await
                        .optional()?;
                    if let Some(record) = completed {
                        return Ok((job_from_record(record), false));
                    }
                }

                let id = Uuid::new_v4().to_string();
                let now = format_datetime(Utc::now());
                diesel::insert_into(jobs::table)
                    .values(NewJob {
                        id: &id,
                        share_text: &share_text,
                        share_url: &share_url,
                        status: JobStatus::Pending.as_str(),
                        error_history: "[]",
                        created_at: now.clone(),
                        updated_at: now,
                    })
                    .execute(conn)
                    .await?;

                let record: JobRecord = jobs::table.find(&id).first(conn).await?;
                Ok((job_from_record(record), true))
            })
        })
        .await
    }

    /// Fetch a job by id.
    pub async fn get(&self, job_id: &str) -> Result<Option<Job>, DieselError> {
        let mut conn = self.pool.get().await?;
        let record: Option<JobRecord> = jobs::table
            .find(job_id)
            .first(&mut conn)
            .await
            .optional()?;
        Ok(record.map(job_from_record))
    }

    /// Atomically claim the oldest due job, marking it `processing`.
    ///
    /// Due means `pending`, or `processing` with a retry time in the past
    /// (a retrying job keeps its status and only its due time changes).
    /// The claim stamps `next_retry_at` with a lease deadline: if the
    /// worker never reports back, the row becomes due again after `lease`
    /// instead of being stuck in `processing` forever. The lease must
    /// outlast any single attempt. Runs in a transaction so two workers
    /// never claim the same row.
    pub async fn claim_due_job(&self, lease: Duration) -> Result<Option<Job>, DieselError> {
        let mut conn = self.pool.get().await?;
        let now = Utc::now();
        let lease_until =
            now + chrono::Duration::from_std(lease).unwrap_or_else(|_| chrono::Duration::hours(1));

        conn.transaction(|conn| {
            let now = format_datetime(now);
            let lease_str = format_datetime(lease_until);
            Box::pin(async move {
                let record: Option<JobRecord> = jobs::table
                    .filter(
                        jobs::status.eq("pending").or(jobs::status
                            .eq("processing")
                            .and(jobs::next_retry_at.le(now.clone()))),
                    )
                    .order(jobs::created_at.asc())
                    .first(conn)
                    .await
                    .optional()?;

                let Some(record) = record else {
                    return Ok(None);
                };

                diesel::update(jobs::table.find(&record.id))
                    .set((
                        jobs::status.eq(JobStatus::Processing.as_str()),
                        jobs::next_retry_at.eq(Some(lease_str)),
                        jobs::updated_at.eq(&now),
                    ))
                    .execute(conn)
                    .await?;

                let mut job = job_from_record(record);
                job.status = JobStatus::Processing;
                job.next_retry_at = Some(lease_until);
                Ok(Some(job))
            })
        })
        .await
    }

    /// Append one failed attempt to the job's history.
    ///
    /// Returns the total attempt count after the append. History is
    /// append-only; earlier records are never rewritten.
    pub async fn append_error(
        &self,
        job_id: &str,
        error: &ErrorRecord,
    ) -> Result<usize, DieselError> {
        let mut conn = self.pool.get().await?;
        let job_id = job_id.to_string();
        let error = error.clone();

        conn.transaction(|conn| {
            Box::pin(async move {
                let record: JobRecord = jobs::table.find(&job_id).first(conn).await?;
                let mut history: Vec<ErrorRecord> =
                    serde_json::from_str(&record.error_history).unwrap_or_default();
                history.push(error);
                let serialized = serde_json::to_string(&history)
                    .map_err(super::util::to_diesel_error)?;

                diesel::update(jobs::table.find(&job_id))
                    .set((
                        jobs::error_history.eq(serialized),
                        jobs::updated_at.eq(format_datetime(Utc::now())),
                    ))
                    .execute(conn)
                    .await?;

                Ok(history.len())
            })
        })
        .await
    }

    /// Schedule the job's next attempt; it stays `processing` and becomes
    /// claimable again once the retry time passes.
    pub async fn schedule_retry(
        &self,
        job_id: &str,
        next_retry_at: DateTime<Utc>,
    ) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        diesel::update(
            jobs::table
                .find(job_id)
                .filter(jobs::status.eq_any(ACTIVE_STATUSES)),
        )
        .set((
            jobs::next_retry_at.eq(format_datetime(next_retry_at)),
            jobs::updated_at.eq(format_datetime(Utc::now())),
        ))
        .execute(&mut conn)
        .await?;
        Ok(())
    }

    /// Record the post a job resolved to.
    pub async fn set_post(&self, job_id: &str, post_id: i64) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        diesel::update(jobs::table.find(job_id))
            .set((
                jobs::post_id.eq(Some(post_id)),
                jobs::updated_at.eq(format_datetime(Utc::now())),
            ))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    /// Move a non-terminal job into a terminal state.
    ///
    /// Returns false (and changes nothing) when the job is already
    /// terminal.
    pub async fn finish(&self, job_id: &str, status: JobStatus) -> Result<bool, DieselError> {
        debug_assert!(status.is_terminal());
        let mut conn = self.pool.get().await?;
        let updated = diesel::update(
            jobs::table
                .find(job_id)
                .filter(jobs::status.eq_any(ACTIVE_STATUSES)),
        )
        .set((
            jobs::status.eq(status.as_str()),
            jobs::next_retry_at.eq(None::<String>),
            jobs::updated_at.eq(format_datetime(Utc::now())),
        ))
        .execute(&mut conn)
        .await?;
        Ok(updated > 0)
    }

    /// Whether any completed job references this post. Used by the
    /// already-downloaded skip check.
    pub async fn has_completed_for_post(&self, post_id: i64) -> Result<bool, DieselError> {
        let mut conn = self.pool.get().await?;
        let count: i64 = jobs::table
            .filter(jobs::post_id.eq(post_id))
            .filter(jobs::status.eq("completed"))
            .count()
            .get_result(&mut conn)
            .await?;
        Ok(count > 0)
    }

    /// Recent jobs, newest first (status listing).
    pub async fn list_recent(&self, limit: i64) -> Result<Vec<Job>, DieselError> {
        let mut conn = self.pool.get().await?;
        let records: Vec<JobRecord> = jobs::table
            .order(jobs::created_at.desc())
            .limit(limit)
            .load(&mut conn)
            .await?;
        Ok(records.into_iter().map(job_from_record).collect())
    }
}

fn job_from_record(record: JobRecord) -> Job {
    Job {
        status: JobStatus::from_str(&record.status).unwrap_or(JobStatus::Pending),
        error_history: serde_json::from_str(&record.error_history).unwrap_or_default(),
        post_id: record.post_id,
        next_retry_at: parse_datetime_opt(&record.next_retry_at),
        created_at: parse_datetime(&record.created_at),
        updated_at: parse_datetime(&record.updated_at),
        id: record.id,
        share_text: record.share_text,
        share_url: record.share_url,
    }
}
