//! Mirror coordinator - main crawl orchestration logic
//!
//! This module drives a mirror run:
//! - Validating the seed and preparing the output directory
//! - Running a bounded pool of workers over the shared scheduler
//! - Scanning fetched pages and persisting rewritten documents
//! - Stopping cleanly on cancellation
//! - Producing the run summary

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::fetcher::{write_atomic, Downloader, FetchResult, FetchStatus};
use super::http::{HttpClient, ReqwestClient};
use super::markup::looks_like_markup;
use super::parser::{extract, Extraction};
use super::scheduler::{CrawlTask, ReadyDocument, Scheduler, TaskKind};
use super::session::SessionContext;
use crate::config::MirrorConfig;
use crate::output::MirrorSummary;
use crate::url::{extract_site, is_markup_content_type, is_markup_path, normalize_url};
use crate::{MirrorError, UrlError};

/// Mirrors the configured site with the production HTTP client
///
/// This is the main entry point for a mirror run. It will:
/// 1. Validate the seed URL (a missing seed fails before any fetch)
/// 2. Build the HTTP client and session from the configuration
/// 3. Crawl, download and rewrite until the frontier is exhausted
/// 4. Return the run summary
pub async fn mirror_site(config: &MirrorConfig) -> Result<MirrorSummary, MirrorError> {
    let client = ReqwestClient::new(&config.crawler)?;
    let session = SessionContext::from_config(&config.session)?;
    Coordinator::new(config, Arc::new(client), session)?.run().await
}

/// State shared by all workers
struct Shared {
    state: Mutex<CrawlState>,
    /// Signalled whenever tasks are queued or a fetch finishes
    progress: Notify,
}

struct CrawlState {
    scheduler: Scheduler,
    summary: MirrorSummary,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, CrawlState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Everything a worker needs, cheap to clone
#[derive(Clone)]
struct Worker {
    id: usize,
    shared: Arc<Shared>,
    downloader: Downloader,
    session: Arc<SessionContext>,
    cancel: CancellationToken,
}

/// Main mirror coordinator structure
pub struct Coordinator {
    seed: Url,
    root_domain: String,
    output_root: PathBuf,
    max_depth: u32,
    concurrency: usize,
    client: Arc<dyn HttpClient>,
    session: SessionContext,
    cancel: CancellationToken,
}

impl Coordinator {
    /// Creates a coordinator for one run
    ///
    /// # Errors
    ///
    /// * `MirrorError::MissingSeed` - no seed URL is configured
    /// * `MirrorError::UrlError` - the seed is not an absolute http(s) URL
    pub fn new(
        config: &MirrorConfig,
        client: Arc<dyn HttpClient>,
        session: SessionContext,
    ) -> Result<Self, MirrorError> {
        let seed = config
            .site
            .seed_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(MirrorError::MissingSeed)?;

        let seed = normalize_url(seed)?;
        let root_domain = extract_site(&seed).ok_or(UrlError::MissingHost)?;

        Ok(Self {
            seed,
            root_domain,
            output_root: PathBuf::from(&config.site.output_dir),
            max_depth: config.crawler.max_depth,
            concurrency: config.crawler.max_concurrent_fetches.max(1) as usize,
            client,
            session,
            cancel: CancellationToken::new(),
        })
    }

    /// Token that stops the run when cancelled
    ///
    /// Once cancelled, workers take no new tasks; fetches already in flight
    /// finish and documents still waiting are rewritten with what resolved.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn seed(&self) -> &Url {
        &self.seed
    }

    /// Runs the crawl to completion or cancellation
    pub async fn run(self) -> Result<MirrorSummary, MirrorError> {
        tokio::fs::create_dir_all(&self.output_root).await?;

        tracing::info!(
            "Mirroring {} into {} (max depth {}, {} workers)",
            self.seed,
            self.output_root.display(),
            self.max_depth,
            self.concurrency
        );

        let mut scheduler = Scheduler::new(self.root_domain.clone(), self.max_depth);
        scheduler.seed(self.seed.clone())?;

        let shared = Arc::new(Shared {
            state: Mutex::new(CrawlState {
                scheduler,
                summary: MirrorSummary::new(
                    self.seed.as_str(),
                    self.output_root.clone(),
                    self.max_depth,
                ),
            }),
            progress: Notify::new(),
        });

        let worker = Worker {
            id: 0,
            shared: shared.clone(),
            downloader: Downloader::new(
                self.client.clone(),
                self.output_root.clone(),
                self.root_domain.clone(),
            ),
            session: Arc::new(self.session),
            cancel: self.cancel.clone(),
        };

        let mut workers = JoinSet::new();
        for id in 0..self.concurrency {
            let worker = Worker { id, ..worker.clone() };
            workers.spawn(async move { worker.run().await });
        }

        let mut failure = None;
        while let Some(joined) = workers.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => Err(MirrorError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("worker panicked: {}", e),
                ))),
            };
            if let Err(e) = outcome {
                tracing::error!("Mirror aborted: {}", e);
                self.cancel.cancel();
                if failure.is_none() {
                    failure = Some(e);
                }
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }

        let cancelled = self.cancel.is_cancelled();
        let leftovers = worker.shared.lock().scheduler.drain_pending();
        if !leftovers.is_empty() {
            tracing::info!(
                "Rewriting {} documents with partially resolved references",
                leftovers.len()
            );
        }
        worker.persist(leftovers).await;

        let mut summary = {
            let state = shared.lock();
            state.summary.clone()
        };
        summary.finish(cancelled);

        tracing::info!(
            "Mirror {}: {} fetched, {} skipped, {} failed",
            if cancelled { "cancelled" } else { "complete" },
            summary.fetched,
            summary.skipped,
            summary.failed
        );

        Ok(summary)
    }
}

impl Worker {
    async fn run(self) -> Result<(), MirrorError> {
        loop {
            if self.cancel.is_cancelled() {
                tracing::debug!("Worker {} stopping on cancellation", self.id);
                return Ok(());
            }

            // Register interest before looking at the queue so a wakeup
            // between the check and the wait is not lost
            let progress = self.shared.progress.notified();

            let next = {
                let mut state = self.shared.lock();
                if state.scheduler.is_finished() {
                    return Ok(());
                }
                state.scheduler.next_task()?
            };

            match next {
                Some(task) => {
                    let outcome = self.process(task).await;
                    self.shared.progress.notify_waiters();
                    outcome?;
                }
                None => {
                    tokio::select! {
                        _ = progress => {}
                        _ = self.cancel.cancelled() => {}
                    }
                }
            }
        }
    }

    /// Fetches one task, scans it if it is a page, and saves finished rewrites
    async fn process(&self, task: CrawlTask) -> Result<(), MirrorError> {
        let result = self.downloader.fetch(task, &self.session).await;
        log_result(&result);

        let document = self.scan_document(&result).await;

        let ready = {
            let mut state = self.shared.lock();
            state.summary.record(&result);

            if let Some((_, extraction)) = &document {
                let url = result.task.url.as_str();
                state.summary.set_title(url, extraction.title.clone());
                if extraction.degraded {
                    state.summary.degraded_pages.push(url.to_string());
                }
            }

            state.scheduler.complete(&result, document)?
        };

        self.persist(ready).await;
        Ok(())
    }

    /// Reads a mirrored page back from disk and extracts its references
    ///
    /// Pages skipped because an earlier run mirrored them are scanned too, so
    /// a resumed run still reaches the rest of the site. Their Content-Type
    /// is unknown, so the stored bytes decide whether they are markup.
    async fn scan_document(&self, result: &FetchResult) -> Option<(Vec<u8>, Extraction)> {
        if result.task.kind != TaskKind::Page {
            return None;
        }

        let declared_markup = match &result.status {
            FetchStatus::Ok {
                local_path,
                content_type,
                ..
            } => Some(
                content_type
                    .as_deref()
                    .map_or_else(|| is_markup_path(local_path), is_markup_content_type),
            ),
            FetchStatus::Skipped { local_path } if is_markup_path(local_path) => Some(true),
            FetchStatus::Skipped { .. } => None,
            FetchStatus::Failed { .. } => return None,
        };
        if declared_markup == Some(false) {
            return None;
        }

        let local_path = result.status.local_path()?;
        let full_path = self.downloader.output_root().join(local_path);
        let bytes = match tokio::fs::read(&full_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", full_path.display(), e);
                return None;
            }
        };

        if declared_markup.is_none() && !looks_like_markup(&bytes) {
            return None;
        }

        let extraction = extract(&bytes, &result.task.url);
        tracing::debug!(
            "Found {} references in {}",
            extraction.references.len(),
            result.task.url
        );
        Some((bytes, extraction))
    }

    /// Writes rewritten documents over their raw copies
    async fn persist(&self, documents: Vec<ReadyDocument>) {
        for document in documents {
            if !document.changed {
                continue;
            }

            let target = self.downloader.output_root().join(&document.local_path);
            match write_atomic(&target, &document.contents).await {
                Ok(()) => {
                    tracing::debug!("Rewrote {}", document.local_path.display());
                    self.shared.lock().summary.documents_rewritten += 1;
                }
                Err(e) => {
                    tracing::warn!("Failed to save rewritten {}: {}", target.display(), e);
                }
            }
        }
    }
}

fn log_result(result: &FetchResult) {
    match &result.status {
        FetchStatus::Ok { local_path, .. } => {
            tracing::info!(
                "Fetched {} -> {} (depth {})",
                result.task.url,
                local_path.display(),
                result.task.depth
            );
        }
        FetchStatus::Skipped { local_path } => {
            tracing::debug!(
                "Already mirrored {} at {}",
                result.task.url,
                local_path.display()
            );
        }
        FetchStatus::Failed { reason } => {
            tracing::warn!("Failed to fetch {}: {}", result.task.url, reason);
        }
    }
}
