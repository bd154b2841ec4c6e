//! Run summary types
//!
//! Every per-resource outcome of a mirror run ends up here instead of being
//! raised as an error.

use crate::crawler::{FetchResult, FetchStatus, TaskKind};
use crate::FetchFailure;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// A resource that could not be mirrored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub url: String,
    pub reason: FetchFailure,
}

/// A page that was mirrored (downloaded now or by an earlier run)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRecord {
    pub url: String,
    pub local_path: PathBuf,
    pub depth: u32,
    pub title: Option<String>,
}

/// Outcome of one mirror run
#[derive(Debug, Clone)]
pub struct MirrorSummary {
    // Run metadata
    pub seed_url: String,
    pub output_dir: PathBuf,
    pub max_depth: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub cancelled: bool,

    // Per-resource counts
    pub fetched: u64,
    pub skipped: u64,
    pub failed: u64,
    pub bytes_downloaded: u64,

    /// Documents whose references were rewritten and saved
    pub documents_rewritten: u64,

    pub failures: Vec<FailureRecord>,
    pub pages: Vec<PageRecord>,

    /// Pages whose markup could only be partially scanned
    pub degraded_pages: Vec<String>,

    /// Page URL -> position in `pages`
    page_index: HashMap<String, usize>,
}

impl MirrorSummary {
    pub fn new(seed_url: impl Into<String>, output_dir: impl Into<PathBuf>, max_depth: u32) -> Self {
        Self {
            seed_url: seed_url.into(),
            output_dir: output_dir.into(),
            max_depth,
            started_at: Utc::now(),
            finished_at: None,
            cancelled: false,
            fetched: 0,
            skipped: 0,
            failed: 0,
            bytes_downloaded: 0,
            documents_rewritten: 0,
            failures: Vec::new(),
            pages: Vec::new(),
            degraded_pages: Vec::new(),
            page_index: HashMap::new(),
        }
    }

    /// Counts one fetch outcome
    pub fn record(&mut self, result: &FetchResult) {
        match &result.status {
            FetchStatus::Ok { bytes, .. } => {
                self.fetched += 1;
                self.bytes_downloaded += bytes;
            }
            FetchStatus::Skipped { .. } => self.skipped += 1,
            FetchStatus::Failed { reason } => {
                self.failed += 1;
                self.failures.push(FailureRecord {
                    url: result.task.url.to_string(),
                    reason: reason.clone(),
                });
            }
        }

        if result.task.kind == TaskKind::Page {
            if let Some(local_path) = result.status.local_path() {
                self.page_index
                    .insert(result.task.url.to_string(), self.pages.len());
                self.pages.push(PageRecord {
                    url: result.task.url.to_string(),
                    local_path: local_path.to_path_buf(),
                    depth: result.task.depth,
                    title: None,
                });
            }
        }
    }

    /// Attaches a title to an already recorded page
    pub fn set_title(&mut self, url: &str, title: Option<String>) {
        if let Some(page) = self
            .page_index
            .get(url)
            .and_then(|&index| self.pages.get_mut(index))
        {
            page.title = title;
        }
    }

    pub fn finish(&mut self, cancelled: bool) {
        self.finished_at = Some(Utc::now());
        self.cancelled = cancelled;
    }

    pub fn total(&self) -> u64 {
        self.fetched + self.skipped + self.failed
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        self.finished_at
            .map(|finished| (finished - self.started_at).num_milliseconds() as f64 / 1000.0)
    }

    /// Percentage of resources that ended up in the mirror
    pub fn success_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        ((self.fetched + self.skipped) as f64 / total as f64) * 100.0
    }

    /// Failure counts grouped by kind (`transport`, `http 404`, ...)
    pub fn failures_by_kind(&self) -> BTreeMap<String, u64> {
        let mut counts = BTreeMap::new();
        for failure in &self.failures {
            let kind = match &failure.reason {
                FetchFailure::Transport(_) => "transport".to_string(),
                FetchFailure::HttpStatus(code) => format!("http {}", code),
                FetchFailure::Filesystem(_) => "filesystem".to_string(),
            };
            *counts.entry(kind).or_insert(0) += 1;
        }
        counts
    }
}
