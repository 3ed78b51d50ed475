//! Runtime configuration.
//!
//! All settings have defaults suitable for local use; each can be overridden
//! with a `DEPOT_`-prefixed environment variable (loaded from `.env` when
//! present) or a CLI flag.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::repository::DbContext;

/// Runtime settings for the depot.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Root directory for the database and downloaded media.
    pub data_dir: PathBuf,
    /// Explicit database URL; derived from `data_dir` when unset.
    pub database_url: Option<String>,
    /// Number of concurrent download workers.
    pub workers: usize,
    /// Maximum processing attempts per job before it is marked failed.
    pub max_attempts: u32,
    /// Base delay for job retry backoff (doubled per attempt).
    pub retry_base: Duration,
    /// How long an idle worker sleeps between queue polls.
    pub poll_interval: Duration,
    /// How long a claimed job is leased to its worker before it becomes
    /// claimable again. Must outlast the longest single attempt.
    pub claim_lease: Duration,
    /// Per-request attempt ceiling inside the downloader.
    pub download_retries: u32,
    /// Base delay for byte-level download backoff.
    pub download_retry_base: Duration,
    /// Request timeout for metadata/probe requests.
    pub request_timeout: Duration,
    /// Optional Netscape-format cookie file for authenticated platforms.
    pub cookie_file: Option<PathBuf>,
    /// How long parsed cookies stay cached before re-reading the file.
    pub cookie_ttl: Duration,
    /// When true, submitting a share that already completed creates a fresh
    /// job instead of returning the finished one.
    pub resubmit_completed: bool,
    /// Address the intake API binds to.
    pub bind_addr: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_url: None,
            workers: 2,
            max_attempts: 3,
            retry_base: Duration::from_secs(60),
            poll_interval: Duration::from_secs(2),
            claim_lease: Duration::from_secs(1800),
            download_retries: 5,
            download_retry_base: Duration::from_secs(1),
            request_timeout: Duration::from_secs(30),
            cookie_file: None,
            cookie_ttl: Duration::from_secs(300),
            resubmit_completed: false,
            bind_addr: "127.0.0.1:8350".to_string(),
        }
    }
}

impl Settings {
    /// Build settings from defaults plus environment overrides.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Ok(dir) = env::var("DEPOT_DATA_DIR") {
            settings.data_dir = PathBuf::from(dir);
        }
        if let Ok(url) = env::var("DEPOT_DATABASE_URL") {
            settings.database_url = Some(url);
        }
        if let Some(n) = env_parse("DEPOT_WORKERS") {
            settings.workers = n;
        }
        if let Some(n) = env_parse("DEPOT_MAX_ATTEMPTS") {
            settings.max_attempts = n;
        }
        if let Some(secs) = env_parse("DEPOT_RETRY_BASE_SECS") {
            settings.retry_base = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse("DEPOT_CLAIM_LEASE_SECS") {
            settings.claim_lease = Duration::from_secs(secs);
        }
        if let Some(n) = env_parse("DEPOT_DOWNLOAD_RETRIES") {
            settings.download_retries = n;
        }
        if let Ok(path) = env::var("DEPOT_COOKIE_FILE") {
            settings.cookie_file = Some(PathBuf::from(path));
        }
        if let Some(v) = env_parse("DEPOT_RESUBMIT_COMPLETED") {
            settings.resubmit_completed = v;
        }
        if let Ok(addr) = env::var("DEPOT_BIND_ADDR") {
            settings.bind_addr = addr;
        }
        settings
    }

    /// Settings rooted at a specific directory (used by tests).
    pub fn with_data_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: dir.into(),
            ..Self::default()
        }
    }

    /// The SQLite database URL.
    pub fn database_url(&self) -> String {
        match &self.database_url {
            Some(url) => url.clone(),
            None => format!("sqlite://{}", self.data_dir.join("depot.db").display()),
        }
    }

    /// Directory that media files are stored under.
    pub fn media_root(&self) -> PathBuf {
        self.data_dir.join("media")
    }

    /// Create the data directories and open a database context.
    pub async fn create_db_context(&self) -> Result<DbContext> {
        tokio::fs::create_dir_all(&self.data_dir)
            .await
            .with_context(|| format!("creating data dir {}", self.data_dir.display()))?;
        tokio::fs::create_dir_all(self.media_root())
            .await
            .with_context(|| format!("creating media root {}", self.media_root().display()))?;
        DbContext::new(&self.database_url(), self.media_root()).await
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mediadepot")
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_url_derived_from_data_dir() {
        let settings = Settings::with_data_dir("/tmp/depot-test");
        assert_eq!(settings.database_url(), "sqlite:///tmp/depot-test/depot.db");
    }

    #[test]
    fn explicit_database_url_wins() {
        let mut settings = Settings::with_data_dir("/tmp/depot-test");
        settings.database_url = Some("sqlite://elsewhere.db".to_string());
        assert_eq!(settings.database_url(), "sqlite://elsewhere.db");
    }

    #[test]
    fn media_root_under_data_dir() {
        let settings = Settings::with_data_dir("/tmp/depot-test");
        assert_eq!(settings.media_root(), PathBuf::from("/tmp/depot-test/media"));
    }
}
