//! End-to-end pipeline tests: submit a share, run workers against an
//! in-process media server, and check what lands in the database and on
//! disk.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::time::{sleep, timeout};

use mediadepot::adapters::{AdapterError, AdapterRegistry, PlatformAdapter, ResolvedShare};
use mediadepot::cli::build_pipeline;
use mediadepot::config::Settings;
use mediadepot::download::{DownloadError, DownloadOptions, Downloader};
use mediadepot::models::{
    Job, JobStatus, MediaDescriptor, MediaType, PostInfo, PostType,
};
use mediadepot::queue::{SubmitError, WorkerPool};

// ---------------------------------------------------------------------------
// In-process media server with range support

struct ServedFile {
    bytes: Vec<u8>,
    /// Serve only the first half of the first full-body GET.
    truncate_first: bool,
    /// Answer this many leading requests with a 503 before serving.
    fail_first: AtomicUsize,
    full_hits: AtomicUsize,
    range_hits: AtomicUsize,
}

impl ServedFile {
    fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            truncate_first: false,
            fail_first: AtomicUsize::new(0),
            full_hits: AtomicUsize::new(0),
            range_hits: AtomicUsize::new(0),
        }
    }

    fn truncated_once(bytes: Vec<u8>) -> Self {
        Self {
            truncate_first: true,
            ..Self::new(bytes)
        }
    }

    fn failing_first(bytes: Vec<u8>, failures: usize) -> Self {
        Self {
            fail_first: AtomicUsize::new(failures),
            ..Self::new(bytes)
        }
    }
}

#[derive(Clone)]
struct MediaServer {
    files: Arc<HashMap<String, Arc<ServedFile>>>,
    addr: SocketAddr,
}

impl MediaServer {
    async fn start(files: Vec<(&str, ServedFile)>) -> Self {
        let files: HashMap<String, Arc<ServedFile>> = files
            .into_iter()
            .map(|(name, file)| (name.to_string(), Arc::new(file)))
            .collect();
        let files = Arc::new(files);

        let app = Router::new()
            .route("/files/:name", get(serve_file))
            .with_state(files.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { files, addr }
    }

    fn url(&self, name: &str) -> String {
        format!("http://{}/files/{}", self.addr, name)
    }

    fn file(&self, name: &str) -> &ServedFile {
        self.files.get(name).unwrap()
    }
}

async fn serve_file(
    State(files): State<Arc<HashMap<String, Arc<ServedFile>>>>,
    Path(name): Path<String>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    let Some(file) = files.get(&name) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let still_failing = file
        .fail_first
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if still_failing {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let total = file.bytes.len();

    if let Some(range) = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("bytes="))
        .and_then(|v| v.trim_end_matches('-').parse::<usize>().ok())
    {
        if method != Method::HEAD {
            file.range_hits.fetch_add(1, Ordering::SeqCst);
        }
        let start = range.min(total);
        return (
            StatusCode::PARTIAL_CONTENT,
            [
                (header::ACCEPT_RANGES, "bytes".to_string()),
                (
                    header::CONTENT_RANGE,
                    format!("bytes {}-{}/{}", start, total.saturating_sub(1), total),
                ),
                (header::CONTENT_TYPE, "video/mp4".to_string()),
            ],
            file.bytes[start..].to_vec(),
        )
            .into_response();
    }

    let body = if method != Method::HEAD {
        let hit = file.full_hits.fetch_add(1, Ordering::SeqCst);
        if file.truncate_first && hit == 0 {
            // Hyper refuses to encode a sized body shorter than an explicit
            // content-length, so stream the bytes: the header keeps claiming
            // the full size and the connection ends mid-body, like a real
            // truncated transfer. The pause after the chunk lets hyper flush
            // it to the wire before the early end aborts the connection.
            let truncated = file.bytes[..total / 2].to_vec();
            let (tx, rx) = tokio::sync::mpsc::channel::<Result<Vec<u8>, std::io::Error>>(1);
            tokio::spawn(async move {
                let _ = tx.send(Ok(truncated)).await;
                sleep(Duration::from_millis(100)).await;
            });
            return (
                [
                    (header::ACCEPT_RANGES, "bytes".to_string()),
                    (header::CONTENT_LENGTH, total.to_string()),
                    (header::CONTENT_TYPE, "video/mp4".to_string()),
                ],
                axum::body::Body::from_stream(
                    tokio_stream::wrappers::ReceiverStream::new(rx),
                ),
            )
                .into_response();
        }
        file.bytes.clone()
    } else {
        file.bytes.clone()
    };

    (
        [
            (header::ACCEPT_RANGES, "bytes".to_string()),
            (header::CONTENT_LENGTH, total.to_string()),
            (header::CONTENT_TYPE, "video/mp4".to_string()),
        ],
        body,
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Stub adapters

/// Adapter resolving share URLs of the form `https://stub.test/p/<id>` to
/// posts whose media lives on the test media server.
struct StubAdapter {
    /// post id -> media URLs in display order
    posts: HashMap<String, Vec<String>>,
}

fn post_id_of(url: &str) -> String {
    url.rsplit('/').next().unwrap_or_default().to_string()
}

#[async_trait]
impl PlatformAdapter for StubAdapter {
    fn platform_name(&self) -> &'static str {
        "stub"
    }
    fn display_name(&self) -> &'static str {
        "Stub"
    }
    fn supports(&self, url: &str) -> bool {
        url.contains("stub.test")
    }
    async fn load(&self, share_url: &str) -> Result<ResolvedShare, AdapterError> {
        Ok(ResolvedShare {
            share_url: share_url.to_string(),
            resolved_url: share_url.to_string(),
            payload: serde_json::Value::Null,
        })
    }
    fn extract_info(&self, share: &ResolvedShare) -> Result<Option<PostInfo>, AdapterError> {
        let post_id = post_id_of(&share.resolved_url);
        let Some(urls) = self.posts.get(&post_id) else {
            return Ok(None);
        };
        Ok(Some(PostInfo {
            platform: "stub".to_string(),
            platform_post_id: post_id.clone(),
            url: share.resolved_url.clone(),
            post_type: PostType::Video,
            title: Some(format!("post {post_id}")),
            caption_text: None,
            platform_created_at: None,
            thumbnail_url: None,
            account_id: "creator-1".to_string(),
            username: Some("creator".to_string()),
            author_display_name: None,
            profile_pic_url: None,
            media: urls
                .iter()
                .map(|url| MediaDescriptor {
                    url: url.clone(),
                    media_type: MediaType::Video,
                    extension_hint: Some("mp4".to_string()),
                })
                .collect(),
        }))
    }
}

/// Adapter whose resolution always fails with a retryable error.
struct FlakyAdapter;

#[async_trait]
impl PlatformAdapter for FlakyAdapter {
    fn platform_name(&self) -> &'static str {
        "flaky"
    }
    fn display_name(&self) -> &'static str {
        "Flaky"
    }
    fn supports(&self, url: &str) -> bool {
        url.contains("flaky.test")
    }
    async fn load(&self, _share_url: &str) -> Result<ResolvedShare, AdapterError> {
        Err(AdapterError::Other(anyhow::anyhow!("upstream hiccup")))
    }
    fn extract_info(&self, _share: &ResolvedShare) -> Result<Option<PostInfo>, AdapterError> {
        unreachable!("load always fails")
    }
}

// ---------------------------------------------------------------------------
// Helpers

fn test_settings(dir: &tempfile::TempDir) -> Settings {
    let mut settings = Settings::with_data_dir(dir.path());
    settings.workers = 2;
    settings.max_attempts = 3;
    settings.retry_base = Duration::from_millis(20);
    settings.poll_interval = Duration::from_millis(20);
    settings.download_retries = 4;
    settings.download_retry_base = Duration::from_millis(5);
    settings
}

async fn wait_for_terminal(
    ctx: &mediadepot::repository::DbContext,
    job_id: &str,
) -> Job {
    timeout(Duration::from_secs(15), async {
        loop {
            let job = ctx.jobs().get(job_id).await.unwrap().unwrap();
            if job.status.is_terminal() {
                return job;
            }
            sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .expect("job did not reach a terminal state in time")
}

// ---------------------------------------------------------------------------
// Tests

#[tokio::test]
async fn submit_to_completed_with_media_on_disk() {
    let server = MediaServer::start(vec![(
        "clip.mp4",
        ServedFile::new(b"fake mp4 payload, long enough to matter".to_vec()),
    )])
    .await;

    let dir = tempfile::tempdir().unwrap();
    let settings = test_settings(&dir);

    let mut posts = HashMap::new();
    posts.insert("101".to_string(), vec![server.url("clip.mp4")]);
    let registry = AdapterRegistry::new(vec![Arc::new(StubAdapter { posts })]);

    let pipeline = build_pipeline(&settings, registry).await.unwrap();
    let pool = WorkerPool::spawn(
        1,
        pipeline.runner,
        settings.poll_interval,
        pipeline.dispatcher.wake_handle(),
    );

    let job = pipeline
        .dispatcher
        .submit("look at this https://stub.test/p/101 wow")
        .await
        .unwrap();
    assert_eq!(job.share_url, "https://stub.test/p/101");

    let done = wait_for_terminal(&pipeline.ctx, &job.id).await;
    pool.abort();

    assert_eq!(done.status, JobStatus::Completed);
    assert!(done.error_history.is_empty());
    let post_id = done.post_id.expect("completed job has a post");

    let links = pipeline.ctx.entities().list_post_media(post_id).await.unwrap();
    assert_eq!(links.len(), 1);

    let assets = pipeline.ctx.assets();
    let asset = assets.get(links[0].media_asset_id).await.unwrap().unwrap();
    let on_disk = tokio::fs::read(assets.resolve_path(&asset)).await.unwrap();
    assert_eq!(on_disk, b"fake mp4 payload, long enough to matter");
    assert_eq!(asset.file_size, on_disk.len() as i64);
}

#[tokio::test]
async fn identical_media_across_posts_stored_once() {
    let payload = b"identical bytes served twice".to_vec();
    let server = MediaServer::start(vec![
        ("a.mp4", ServedFile::new(payload.clone())),
        ("b.mp4", ServedFile::new(payload)),
    ])
    .await;

    let dir = tempfile::tempdir().unwrap();
    let settings = test_settings(&dir);

    let mut posts = HashMap::new();
    posts.insert("201".to_string(), vec![server.url("a.mp4")]);
    posts.insert("202".to_string(), vec![server.url("b.mp4")]);
    let registry = AdapterRegistry::new(vec![Arc::new(StubAdapter { posts })]);

    let pipeline = build_pipeline(&settings, registry).await.unwrap();
    let pool = WorkerPool::spawn(
        1,
        pipeline.runner,
        settings.poll_interval,
        pipeline.dispatcher.wake_handle(),
    );

    let first = pipeline
        .dispatcher
        .submit("https://stub.test/p/201")
        .await
        .unwrap();
    let second = pipeline
        .dispatcher
        .submit("https://stub.test/p/202")
        .await
        .unwrap();

    let first = wait_for_terminal(&pipeline.ctx, &first.id).await;
    let second = wait_for_terminal(&pipeline.ctx, &second.id).await;
    pool.abort();

    assert_eq!(first.status, JobStatus::Completed);
    assert_eq!(second.status, JobStatus::Completed);

    let entities = pipeline.ctx.entities();
    let links_a = entities.list_post_media(first.post_id.unwrap()).await.unwrap();
    let links_b = entities.list_post_media(second.post_id.unwrap()).await.unwrap();
    assert_eq!(links_a.len(), 1);
    assert_eq!(links_b.len(), 1);
    // Two posts, two links, one asset
    assert_ne!(links_a[0].post_id, links_b[0].post_id);
    assert_eq!(links_a[0].media_asset_id, links_b[0].media_asset_id);
}

#[tokio::test]
async fn transient_failures_retry_up_to_the_ceiling() {
    let dir = tempfile::tempdir().unwrap();
    let settings = test_settings(&dir);

    let registry = AdapterRegistry::new(vec![Arc::new(FlakyAdapter)]);
    let pipeline = build_pipeline(&settings, registry).await.unwrap();
    let pool = WorkerPool::spawn(
        1,
        pipeline.runner,
        settings.poll_interval,
        pipeline.dispatcher.wake_handle(),
    );

    let job = pipeline
        .dispatcher
        .submit("https://flaky.test/p/1")
        .await
        .unwrap();
    let done = wait_for_terminal(&pipeline.ctx, &job.id).await;
    pool.abort();

    assert_eq!(done.status, JobStatus::Failed);
    // Exactly the configured ceiling of attempts, one error record each
    assert_eq!(done.error_history.len(), settings.max_attempts as usize);
    assert!(done
        .error_history
        .iter()
        .all(|record| record.kind == "transient"));
}

#[tokio::test]
async fn missing_post_fails_once_without_retry() {
    let dir = tempfile::tempdir().unwrap();
    let settings = test_settings(&dir);

    // Adapter knows no posts, so extract_info returns None
    let registry = AdapterRegistry::new(vec![Arc::new(StubAdapter {
        posts: HashMap::new(),
    })]);
    let pipeline = build_pipeline(&settings, registry).await.unwrap();
    let pool = WorkerPool::spawn(
        1,
        pipeline.runner,
        settings.poll_interval,
        pipeline.dispatcher.wake_handle(),
    );

    let job = pipeline
        .dispatcher
        .submit("https://stub.test/p/gone")
        .await
        .unwrap();
    let done = wait_for_terminal(&pipeline.ctx, &job.id).await;
    pool.abort();

    assert_eq!(done.status, JobStatus::Failed);
    assert_eq!(done.error_history.len(), 1);
    assert_eq!(done.error_history[0].kind, "not_found");
}

#[tokio::test]
async fn duplicate_submissions_share_one_job() {
    let dir = tempfile::tempdir().unwrap();
    let settings = test_settings(&dir);

    let mut posts = HashMap::new();
    posts.insert("301".to_string(), vec![]);
    let registry = AdapterRegistry::new(vec![Arc::new(StubAdapter { posts })]);
    // No workers running: the job stays pending between submissions
    let pipeline = build_pipeline(&settings, registry).await.unwrap();

    let first = pipeline
        .dispatcher
        .submit("https://stub.test/p/301")
        .await
        .unwrap();
    let second = pipeline
        .dispatcher
        .submit("share text around https://stub.test/p/301 here")
        .await
        .unwrap();
    assert_eq!(first.id, second.id);

    let err = pipeline
        .dispatcher
        .submit("no link here at all")
        .await
        .unwrap_err();
    assert!(matches!(err, SubmitError::Unsupported));
}

#[tokio::test]
async fn truncated_response_resumes_with_a_range_request() {
    let payload: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
    let server = MediaServer::start(vec![(
        "big.mp4",
        ServedFile::truncated_once(payload.clone()),
    )])
    .await;

    let dir = tempfile::tempdir().unwrap();
    let downloader = Downloader::new(
        4,
        Duration::from_millis(5),
        Duration::from_secs(5),
        None,
    )
    .unwrap();

    let path = downloader
        .download_file(
            &server.url("big.mp4"),
            dir.path(),
            &DownloadOptions::default(),
        )
        .await
        .unwrap();

    let on_disk = tokio::fs::read(&path).await.unwrap();
    assert_eq!(on_disk, payload);
    // The retry asked for the missing tail, not the whole file
    assert_eq!(server.file("big.mp4").full_hits.load(Ordering::SeqCst), 1);
    assert!(server.file("big.mp4").range_hits.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn failing_probe_is_retried_with_backoff() {
    let payload = b"served after two 503s".to_vec();
    // Both the HEAD and its ranged-GET fallback see a 503 on the first
    // attempt; the next attempt probes again and succeeds.
    let server = MediaServer::start(vec![(
        "later.mp4",
        ServedFile::failing_first(payload.clone(), 2),
    )])
    .await;

    let dir = tempfile::tempdir().unwrap();
    let downloader = Downloader::new(
        4,
        Duration::from_millis(5),
        Duration::from_secs(5),
        None,
    )
    .unwrap();

    let path = downloader
        .download_file(
            &server.url("later.mp4"),
            dir.path(),
            &DownloadOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(tokio::fs::read(&path).await.unwrap(), payload);
    assert_eq!(server.file("later.mp4").full_hits.load(Ordering::SeqCst), 1);
}

/// Serve response headers plus half the promised body, then hold the
/// connection open without ever finishing.
async fn start_stalling_server(total: usize) -> SocketAddr {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut buf = vec![0u8; 2048];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]).into_owned();
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-length: {total}\r\ncontent-type: video/mp4\r\nconnection: close\r\n\r\n"
                );
                let _ = socket.write_all(response.as_bytes()).await;
                if !request.starts_with("HEAD") {
                    let _ = socket.write_all(&vec![b'x'; total / 2]).await;
                    let _ = socket.flush().await;
                    sleep(Duration::from_secs(60)).await;
                }
            });
        }
    });
    addr
}

#[tokio::test]
async fn stalled_stream_times_out_instead_of_hanging() {
    let addr = start_stalling_server(4096).await;

    let dir = tempfile::tempdir().unwrap();
    let downloader = Downloader::new(
        2,
        Duration::from_millis(5),
        Duration::from_millis(250),
        None,
    )
    .unwrap();

    let started = std::time::Instant::now();
    let err = downloader
        .download_file(
            &format!("http://{addr}/clip.mp4"),
            dir.path(),
            &DownloadOptions::default(),
        )
        .await
        .unwrap_err();

    // Each attempt is cut off by the read timeout and classified as
    // retryable, so the call returns instead of blocking the worker
    assert!(matches!(err, DownloadError::RetriesExhausted { .. }));
    assert!(started.elapsed() < Duration::from_secs(10));
}
