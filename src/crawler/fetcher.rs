//! Download manager
//!
//! Fetches one URL to its deterministic place in the mirror:
//! - Skips the request entirely when a previous run already left a
//!   non-empty file there
//! - Sends the session's headers with every request
//! - Streams the body to a temporary file and renames it into place, so an
//!   interrupted download never looks complete
//! - Classifies failures as transport, HTTP status or filesystem errors

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::http::HttpClient;
use super::scheduler::CrawlTask;
use super::session::SessionContext;
use crate::url::MirrorPath;
use crate::FetchFailure;

/// Counter making every temporary file name unique within the process
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Outcome of a single fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub task: CrawlTask,
    pub status: FetchStatus,
}

impl FetchResult {
    pub fn new(task: CrawlTask, status: FetchStatus) -> Self {
        Self { task, status }
    }
}

/// What happened to the resource
///
/// Paths are relative to the output root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    /// Downloaded in this run
    Ok {
        local_path: PathBuf,
        content_type: Option<String>,
        /// Number of body bytes written
        bytes: u64,
    },

    /// A previous run already mirrored it; no request was sent
    Skipped { local_path: PathBuf },

    /// Could not be mirrored
    Failed { reason: FetchFailure },
}

impl FetchStatus {
    /// The mirrored file, unless the fetch failed
    pub fn local_path(&self) -> Option<&Path> {
        match self {
            Self::Ok { local_path, .. } | Self::Skipped { local_path } => Some(local_path),
            Self::Failed { .. } => None,
        }
    }
}

/// Fetches resources into an output directory
#[derive(Clone)]
pub struct Downloader {
    client: Arc<dyn HttpClient>,
    output_root: PathBuf,
    root_domain: String,
}

impl Downloader {
    pub fn new(client: Arc<dyn HttpClient>, output_root: PathBuf, root_domain: String) -> Self {
        Self {
            client,
            output_root,
            root_domain,
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Fetches a task's URL to its local path
    ///
    /// Never returns an error: every failure is folded into
    /// [`FetchStatus::Failed`] so one broken resource cannot stop the crawl.
    pub async fn fetch(&self, task: CrawlTask, session: &SessionContext) -> FetchResult {
        let mirror_path = MirrorPath::for_url(&task.url, &self.root_domain);

        if let Some(local_path) = self.existing_copy(&mirror_path).await {
            tracing::debug!("Skipping {}, already mirrored at {}", task.url, local_path.display());
            return FetchResult {
                task,
                status: FetchStatus::Skipped { local_path },
            };
        }

        let status = match self.download(&task, &mirror_path, session).await {
            Ok(status) => status,
            Err(reason) => FetchStatus::Failed { reason },
        };

        FetchResult { task, status }
    }

    /// Finds a non-empty file left by a previous run
    async fn existing_copy(&self, mirror_path: &MirrorPath) -> Option<PathBuf> {
        for candidate in mirror_path.candidates() {
            if let Ok(metadata) = fs::metadata(self.output_root.join(&candidate)).await {
                if metadata.is_file() && metadata.len() > 0 {
                    return Some(candidate);
                }
            }
        }
        None
    }

    async fn download(
        &self,
        task: &CrawlTask,
        mirror_path: &MirrorPath,
        session: &SessionContext,
    ) -> Result<FetchStatus, FetchFailure> {
        let response = self
            .client
            .get(&task.url, session.headers())
            .await
            .map_err(|e| FetchFailure::Transport(e.0))?;

        if !response.is_success() {
            return Err(FetchFailure::HttpStatus(response.status));
        }

        let content_type = response.content_type.clone();
        let local_path = mirror_path.resolve(content_type.as_deref());
        let target = self.output_root.join(&local_path);

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| FetchFailure::Filesystem(format!("{}: {}", parent.display(), e)))?;
        }

        let temp = temp_path(&target);
        match stream_to_file(response.body, &temp).await {
            Ok(bytes) => {
                if let Err(e) = fs::rename(&temp, &target).await {
                    let _ = fs::remove_file(&temp).await;
                    return Err(FetchFailure::Filesystem(format!(
                        "{}: {}",
                        target.display(),
                        e
                    )));
                }

                Ok(FetchStatus::Ok {
                    local_path,
                    content_type,
                    bytes,
                })
            }
            Err(failure) => {
                let _ = fs::remove_file(&temp).await;
                Err(failure)
            }
        }
    }
}

/// Writes a body stream to `path`, returning the number of bytes written
async fn stream_to_file(
    mut body: futures::stream::BoxStream<'static, Result<Vec<u8>, super::http::TransportError>>,
    path: &Path,
) -> Result<u64, FetchFailure> {
    let fs_error = |e: std::io::Error| FetchFailure::Filesystem(format!("{}: {}", path.display(), e));

    let mut file = fs::File::create(path).await.map_err(fs_error)?;
    let mut written = 0u64;

    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| FetchFailure::Transport(e.0))?;
        file.write_all(&chunk).await.map_err(fs_error)?;
        written += chunk.len() as u64;
    }

    file.flush().await.map_err(fs_error)?;
    file.sync_all().await.map_err(fs_error)?;

    Ok(written)
}

/// A fresh temporary name next to `target`: `<name>.<n>.part`
pub(crate) fn temp_path(target: &Path) -> PathBuf {
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!("{}.{}.part", name, n))
}

/// Atomically replaces `target` with `contents`
pub(crate) async fn write_atomic(target: &Path, contents: &[u8]) -> std::io::Result<()> {
    let temp = temp_path(target);
    let result = match fs::write(&temp, contents).await {
        Ok(()) => fs::rename(&temp, target).await,
        Err(e) => Err(e),
    };

    if result.is_err() {
        let _ = fs::remove_file(&temp).await;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::http::{HttpResponse, TransportError};
    use crate::crawler::scheduler::TaskKind;
    use async_trait::async_trait;
    use reqwest::header::HeaderMap;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use url::Url;

    /// Serves canned responses and counts requests
    struct FakeClient {
        status: u16,
        content_type: Option<String>,
        chunks: Vec<Result<Vec<u8>, TransportError>>,
        requests: AtomicUsize,
        seen_headers: Mutex<Vec<HeaderMap>>,
    }

    impl FakeClient {
        fn ok(content_type: &str, body: &[u8]) -> Self {
            Self {
                status: 200,
                content_type: Some(content_type.to_string()),
                chunks: vec![Ok(body.to_vec())],
                requests: AtomicUsize::new(0),
                seen_headers: Mutex::new(Vec::new()),
            }
        }

        fn status(status: u16) -> Self {
            Self {
                status,
                content_type: None,
                chunks: Vec::new(),
                requests: AtomicUsize::new(0),
                seen_headers: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HttpClient for FakeClient {
        async fn get(&self, _url: &Url, headers: &HeaderMap) -> Result<HttpResponse, TransportError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            self.seen_headers.lock().unwrap().push(headers.clone());
            Ok(HttpResponse {
                status: self.status,
                content_type: self.content_type.clone(),
                body: futures::stream::iter(self.chunks.clone()).boxed(),
            })
        }
    }

    struct Unreachable;

    #[async_trait]
    impl HttpClient for Unreachable {
        async fn get(&self, _url: &Url, _headers: &HeaderMap) -> Result<HttpResponse, TransportError> {
            Err(TransportError("connection failed: refused".to_string()))
        }
    }

    fn task(url: &str) -> CrawlTask {
        CrawlTask::new(Url::parse(url).unwrap(), 0, None, TaskKind::Asset)
    }

    fn downloader(client: Arc<dyn HttpClient>, dir: &TempDir) -> Downloader {
        Downloader::new(client, dir.path().to_path_buf(), "example.com".to_string())
    }

    #[tokio::test]
    async fn test_download_writes_file() {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(FakeClient::ok("image/png", b"PNGDATA"));
        let dl = downloader(client.clone(), &dir);

        let result = dl
            .fetch(task("https://example.com/img/logo.png"), &SessionContext::new())
            .await;

        assert_eq!(
            result.status,
            FetchStatus::Ok {
                local_path: PathBuf::from("img/logo.png"),
                content_type: Some("image/png".to_string()),
                bytes: 7,
            }
        );
        assert_eq!(std::fs::read(dir.path().join("img/logo.png")).unwrap(), b"PNGDATA");
        assert_eq!(client.requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_existing_file_skipped_without_request() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("img")).unwrap();
        std::fs::write(dir.path().join("img/logo.png"), b"old").unwrap();

        let client = Arc::new(FakeClient::ok("image/png", b"new"));
        let dl = downloader(client.clone(), &dir);
        let result = dl
            .fetch(task("https://example.com/img/logo.png"), &SessionContext::new())
            .await;

        assert_eq!(
            result.status,
            FetchStatus::Skipped {
                local_path: PathBuf::from("img/logo.png")
            }
        );
        assert_eq!(client.requests.load(Ordering::SeqCst), 0);
        assert_eq!(std::fs::read(dir.path().join("img/logo.png")).unwrap(), b"old");
    }

    #[tokio::test]
    async fn test_empty_file_is_refetched() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.css"), b"").unwrap();

        let client = Arc::new(FakeClient::ok("text/css", b"body{}"));
        let dl = downloader(client.clone(), &dir);
        let result = dl.fetch(task("https://example.com/a.css"), &SessionContext::new()).await;

        assert!(matches!(result.status, FetchStatus::Ok { .. }));
        assert_eq!(client.requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_inferred_extension_and_resume() {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(FakeClient::ok("text/html; charset=utf-8", b"<html></html>"));
        let dl = downloader(client.clone(), &dir);

        let first = dl.fetch(task("https://example.com/about"), &SessionContext::new()).await;
        assert_eq!(first.status.local_path(), Some(Path::new("about.html")));

        let second = dl.fetch(task("https://example.com/about"), &SessionContext::new()).await;
        assert_eq!(
            second.status,
            FetchStatus::Skipped {
                local_path: PathBuf::from("about.html")
            }
        );
        assert_eq!(client.requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_http_status_failure() {
        let dir = TempDir::new().unwrap();
        let dl = downloader(Arc::new(FakeClient::status(404)), &dir);

        let result = dl.fetch(task("https://example.com/gone.png"), &SessionContext::new()).await;

        assert_eq!(
            result.status,
            FetchStatus::Failed {
                reason: FetchFailure::HttpStatus(404)
            }
        );
        assert!(!dir.path().join("gone.png").exists());
    }

    #[tokio::test]
    async fn test_transport_failure() {
        let dir = TempDir::new().unwrap();
        let dl = downloader(Arc::new(Unreachable), &dir);

        let result = dl.fetch(task("https://example.com/x.js"), &SessionContext::new()).await;

        assert!(matches!(
            result.status,
            FetchStatus::Failed {
                reason: FetchFailure::Transport(_)
            }
        ));
    }

    #[tokio::test]
    async fn test_broken_stream_leaves_no_file() {
        let dir = TempDir::new().unwrap();
        let mut client = FakeClient::ok("image/png", b"partial");
        client
            .chunks
            .push(Err(TransportError("connection reset".to_string())));
        let dl = downloader(Arc::new(client), &dir);

        let result = dl.fetch(task("https://example.com/big.png"), &SessionContext::new()).await;

        assert!(matches!(result.status, FetchStatus::Failed { .. }));
        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_session_headers_sent() {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(FakeClient::ok("text/css", b"x"));
        let dl = downloader(client.clone(), &dir);
        let session = SessionContext::new()
            .with_cookies(&[("sid".to_string(), "abc".to_string())])
            .unwrap();

        dl.fetch(task("https://example.com/s.css"), &session).await;

        let seen = client.seen_headers.lock().unwrap();
        assert_eq!(seen[0].get("cookie").unwrap(), "sid=abc");
    }

    #[tokio::test]
    async fn test_external_host_layout() {
        let dir = TempDir::new().unwrap();
        let dl = downloader(Arc::new(FakeClient::ok("text/javascript", b"1")), &dir);

        let result = dl
            .fetch(task("https://cdn.example.org:8443/lib/x.js"), &SessionContext::new())
            .await;

        assert_eq!(
            result.status.local_path(),
            Some(Path::new("_external/cdn.example.org_8443/lib/x.js"))
        );
    }

    #[tokio::test]
    async fn test_write_atomic_replaces() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("page.html");
        std::fs::write(&target, b"raw").unwrap();

        write_atomic(&target, b"rewritten").await.unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"rewritten");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_temp_paths_unique() {
        let target = Path::new("out/a.png");
        let a = temp_path(target);
        let b = temp_path(target);
        assert_ne!(a, b);
        assert!(a.to_string_lossy().ends_with(".part"));
        assert_eq!(a.parent(), Some(Path::new("out")));
    }
}
