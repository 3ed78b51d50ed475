//! Resumable, retrying HTTP download engine.
//!
//! One public entry point, [`Downloader::download_file`]: probe the URL,
//! derive a safe local filename, then stream to disk with bounded retries.
//! When the server advertises range support, a retry re-requests only the
//! missing bytes instead of starting over.

mod cookies;
mod filename;

pub use cookies::CookieCache;
pub use filename::{
    extension_from_mime, parse_content_disposition_filename, sanitize_filename,
};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("server returned {status} for {url}")]
    Status { status: StatusCode, url: String },
    #[error("response ended early: got {written} of {expected} bytes")]
    Incomplete { written: u64, expected: u64 },
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("giving up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<DownloadError>,
    },
}

impl DownloadError {
    /// Whether a retry could plausibly succeed.
    ///
    /// Network-level failures and 408/429/5xx responses are transient;
    /// other client errors and local i/o failures are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(e) => !e.is_builder(),
            Self::Status { status, .. } => {
                status.is_server_error()
                    || *status == StatusCode::REQUEST_TIMEOUT
                    || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::Incomplete { .. } => true,
            Self::InvalidUrl(_) | Self::Io(_) | Self::RetriesExhausted { .. } => false,
        }
    }
}

/// Per-call tuning for [`Downloader::download_file`].
#[derive(Debug, Clone, Default)]
pub struct DownloadOptions {
    /// Preferred base filename (without extension).
    pub name_hint: Option<String>,
    /// Extension to use when neither the response nor the URL names one.
    pub extension_fallback: Option<String>,
    /// Extra request headers (e.g. a platform Referer).
    pub headers: Vec<(String, String)>,
    /// Inject cookies from the configured cookie cache.
    pub use_cookies: bool,
    /// Replace an existing file at the target path instead of picking a
    /// fresh name.
    pub overwrite: bool,
}

/// What the probe learned about the remote file.
#[derive(Debug, Clone, Default)]
struct Probe {
    accept_ranges: bool,
    total_size: Option<u64>,
    filename: Option<String>,
    content_type: Option<String>,
}

/// HTTP download engine with probe, resume and bounded retries.
#[derive(Clone)]
pub struct Downloader {
    client: reqwest::Client,
    cookies: Option<Arc<CookieCache>>,
    retries: u32,
    retry_base: Duration,
}

impl Downloader {
    pub fn new(
        retries: u32,
        retry_base: Duration,
        request_timeout: Duration,
        cookies: Option<Arc<CookieCache>>,
    ) -> Result<Self, DownloadError> {
        // read_timeout bounds each chunk read, so a stalled stream turns
        // into a transient error instead of parking the worker
        let client = reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .read_timeout(request_timeout)
            .user_agent(concat!("mediadepot/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            cookies,
            retries: retries.max(1),
            retry_base,
        })
    }

    /// Download `url` into `dest_dir`, returning the path written.
    ///
    /// On total failure every file this call created is removed;
    /// pre-existing files are never touched.
    pub async fn download_file(
        &self,
        url: &str,
        dest_dir: &Path,
        options: &DownloadOptions,
    ) -> Result<PathBuf, DownloadError> {
        let parsed = Url::parse(url).map_err(|e| DownloadError::InvalidUrl(e.to_string()))?;
        let headers = self.request_headers(&parsed, options).await;
        tokio::fs::create_dir_all(dest_dir).await?;

        // The probe shares the attempt budget: a transient probe failure
        // burns an attempt and is retried with the same backoff. Probe
        // results and the target path are settled once.
        let mut settled: Option<(Probe, PathBuf)> = None;
        let mut last_error: Option<DownloadError> = None;
        for attempt in 0..self.retries {
            if attempt > 0 {
                let delay = self.retry_base * 2u32.saturating_pow(attempt - 1);
                tokio::time::sleep(delay).await;
            }

            if settled.is_none() {
                match self.probe(url, &headers).await {
                    Ok(probe) => {
                        let target = self.target_path(&parsed, &probe, dest_dir, options);
                        debug!(url, target = %target.display(), ranges = probe.accept_ranges, "starting download");
                        settled = Some((probe, target));
                    }
                    Err(e) if e.is_transient() => {
                        warn!(url, attempt, error = %e, "transient probe failure");
                        last_error = Some(e);
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }
            let Some((probe, target)) = settled.as_ref() else {
                continue;
            };

            match self.fetch(url, &headers, probe, target).await {
                Ok(()) => return Ok(target.clone()),
                Err(e) if e.is_transient() => {
                    warn!(url, attempt, error = %e, "transient download failure");
                    last_error = Some(e);
                }
                Err(e) => {
                    remove_quietly(target).await;
                    return Err(e);
                }
            }
        }

        if let Some((_, target)) = &settled {
            remove_quietly(target).await;
        }
        Err(DownloadError::RetriesExhausted {
            attempts: self.retries,
            last: Box::new(last_error.unwrap_or(DownloadError::Incomplete {
                written: 0,
                expected: 0,
            })),
        })
    }

    /// Learn size, range support and naming hints before downloading.
    ///
    /// HEAD first; servers that reject it get a one-byte ranged GET whose
    /// headers carry the same information.
    async fn probe(&self, url: &str, headers: &HeaderMap) -> Result<Probe, DownloadError> {
        let head = self
            .client
            .head(url)
            .headers(headers.clone())
            .send()
            .await;

        if let Ok(resp) = head {
            if resp.status().is_success() {
                return Ok(probe_from_headers(resp.headers(), resp.content_length()));
            }
        }

        let resp = self
            .client
            .get(url)
            .headers(headers.clone())
            .header(reqwest::header::RANGE, "bytes=0-0")
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                status,
                url: url.to_string(),
            });
        }

        let mut probe = probe_from_headers(resp.headers(), None);
        // A 206 both proves range support and names the full size
        if status == StatusCode::PARTIAL_CONTENT {
            probe.accept_ranges = true;
            probe.total_size = resp
                .headers()
                .get(reqwest::header::CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.rsplit('/').next())
                .and_then(|v| v.parse().ok());
        }
        Ok(probe)
    }

    /// One download attempt, resuming from whatever is already on disk
    /// when the server supports ranges.
    async fn fetch(
        &self,
        url: &str,
        headers: &HeaderMap,
        probe: &Probe,
        target: &Path,
    ) -> Result<(), DownloadError> {
        let existing = match tokio::fs::metadata(target).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };

        let resume_from = if probe.accept_ranges && existing > 0 {
            if let Some(total) = probe.total_size {
                if existing >= total {
                    return finish_check(existing, probe.total_size);
                }
            }
            existing
        } else {
            0
        };

        let mut request = self.client.get(url).headers(headers.clone());
        if resume_from > 0 {
            request = request.header(reqwest::header::RANGE, format!("bytes={resume_from}-"));
        }

        let mut resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                status,
                url: url.to_string(),
            });
        }

        // Server ignored the range request; start the file over
        let resume_from = if resume_from > 0 && status != StatusCode::PARTIAL_CONTENT {
            0
        } else {
            resume_from
        };

        let mut file = if resume_from > 0 {
            tokio::fs::OpenOptions::new().append(true).open(target).await?
        } else {
            tokio::fs::File::create(target).await?
        };

        let mut written = resume_from;
        loop {
            match resp.chunk().await {
                Ok(Some(chunk)) => {
                    file.write_all(&chunk).await?;
                    written += chunk.len() as u64;
                }
                Ok(None) => break,
                Err(e) => {
                    file.flush().await?;
                    return Err(e.into());
                }
            }
        }
        file.flush().await?;

        finish_check(written, probe.total_size)
    }

    /// Decide where the file goes: name hint > response headers > URL
    /// path > hash of the URL, then sanitize and dodge collisions.
    fn target_path(
        &self,
        url: &Url,
        probe: &Probe,
        dest_dir: &Path,
        options: &DownloadOptions,
    ) -> PathBuf {
        let (url_base, url_ext) = filename::split_url_filename(url);

        let base = options
            .name_hint
            .clone()
            .or_else(|| {
                probe
                    .filename
                    .as_ref()
                    .map(|f| filename::strip_extension(f).to_string())
            })
            .or(url_base)
            .unwrap_or_else(|| short_url_hash(url.as_str()));

        let extension = probe
            .content_type
            .as_deref()
            .and_then(extension_from_mime)
            .map(str::to_string)
            .or_else(|| {
                probe
                    .filename
                    .as_deref()
                    .and_then(filename::extension_of)
                    .map(str::to_string)
            })
            .or(url_ext)
            .or_else(|| options.extension_fallback.clone())
            .unwrap_or_else(|| "bin".to_string());

        let base = sanitize_filename(&base);
        let mut target = dest_dir.join(format!("{base}.{extension}"));
        if target.exists() && !options.overwrite {
            let tag = Uuid::new_v4().simple().to_string();
            target = dest_dir.join(format!("{base}-{}.{extension}", &tag[..8]));
        }
        target
    }

    async fn request_headers(&self, url: &Url, options: &DownloadOptions) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in &options.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                headers.insert(name, value);
            }
        }
        if options.use_cookies {
            if let (Some(cache), Some(host)) = (&self.cookies, url.host_str()) {
                if let Some(cookie_line) = cache.header_for(host).await {
                    if let Ok(value) = HeaderValue::try_from(cookie_line) {
                        headers.insert(reqwest::header::COOKIE, value);
                    }
                }
            }
        }
        headers
    }
}

fn probe_from_headers(headers: &HeaderMap, content_length: Option<u64>) -> Probe {
    Probe {
        accept_ranges: headers
            .get(reqwest::header::ACCEPT_RANGES)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("bytes"))
            .unwrap_or(false),
        total_size: headers
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .or(content_length),
        filename: headers
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_disposition_filename),
        content_type: headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string()),
    }
}

fn finish_check(written: u64, expected: Option<u64>) -> Result<(), DownloadError> {
    match expected {
        Some(expected) if written < expected => {
            Err(DownloadError::Incomplete { written, expected })
        }
        _ => Ok(()),
    }
}

fn short_url_hash(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "could not remove partial file");
        }
    }
}
