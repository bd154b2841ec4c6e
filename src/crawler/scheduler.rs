//! Crawl frontier and per-document bookkeeping
//!
//! The scheduler owns all mutable crawl state: the FIFO task queue, the
//! visited set, the state of every tracked URL, the URL-to-path map and the
//! documents waiting for their references to resolve. It is synchronous; the
//! coordinator wraps it in a mutex and drives it from its workers.
//!
//! Traversal is breadth-first. Assets are queued at the depth of the page
//! that references them, same-domain links at `depth + 1` while that stays
//! within `max_depth`. No task of depth `d + 1` is handed out while a task
//! of depth `d` is queued or in flight, so every page is reached by its
//! shortest hop count no matter how workers interleave.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::PathBuf;

use url::Url;

use super::fetcher::FetchResult;
use super::parser::Extraction;
use super::rewriter::{rewrite, RewriteSpec};
use crate::state::{ResourceState, UrlToLocalPathMap, VisitedSet};
use crate::url::is_same_domain;
use crate::MirrorError;

/// Whether a task was accepted as a page or as an asset of a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Seed or same-domain link target; scanned for references if markup
    Page,
    /// Embedded resource; never scanned
    Asset,
}

/// A URL accepted for fetching
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTask {
    pub url: Url,
    pub depth: u32,
    /// The page whose reference led here (`None` for the seed)
    pub source_page: Option<Url>,
    pub kind: TaskKind,
}

impl CrawlTask {
    pub fn new(url: Url, depth: u32, source_page: Option<Url>, kind: TaskKind) -> Self {
        Self {
            url,
            depth,
            source_page,
            kind,
        }
    }
}

/// A document whose rewrite is ready to be written back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyDocument {
    pub url: Url,
    /// Relative to the output root
    pub local_path: PathBuf,
    pub contents: Vec<u8>,
    /// Whether the rewrite differs from the stored document
    pub changed: bool,
}

/// A document waiting for the references it tracks to reach a terminal state
#[derive(Debug)]
struct PendingDocument {
    url: Url,
    local_path: PathBuf,
    original: Vec<u8>,
    spec: RewriteSpec,
    outstanding: HashSet<String>,
}

/// Crawl state shared by all workers
#[derive(Debug)]
pub struct Scheduler {
    root_domain: String,
    max_depth: u32,

    /// FIFO queue per depth level
    queue: BTreeMap<u32, VecDeque<CrawlTask>>,
    visited: VisitedSet,
    states: HashMap<String, ResourceState>,
    paths: UrlToLocalPathMap,

    /// Tasks being fetched, per depth level
    in_flight: BTreeMap<u32, usize>,

    /// Documents by URL
    pending: HashMap<String, PendingDocument>,

    /// Target URL -> documents waiting on it
    waiters: HashMap<String, Vec<String>>,
}

impl Scheduler {
    pub fn new(root_domain: impl Into<String>, max_depth: u32) -> Self {
        Self {
            root_domain: root_domain.into(),
            max_depth,
            queue: BTreeMap::new(),
            visited: VisitedSet::new(),
            states: HashMap::new(),
            paths: UrlToLocalPathMap::new(),
            in_flight: BTreeMap::new(),
            pending: HashMap::new(),
            waiters: HashMap::new(),
        }
    }

    pub fn root_domain(&self) -> &str {
        &self.root_domain
    }

    /// Queues the seed page at depth 0
    pub fn seed(&mut self, url: Url) -> Result<bool, MirrorError> {
        self.offer(CrawlTask::new(url, 0, None, TaskKind::Page))
    }

    /// Accepts a task unless its URL was already seen
    ///
    /// Returns whether the task was queued. The visited check and insert
    /// happen together, so a URL is queued at most once per run.
    pub fn offer(&mut self, task: CrawlTask) -> Result<bool, MirrorError> {
        if !self.visited.check_and_insert(&task.url) {
            return Ok(false);
        }

        self.states
            .insert(task.url.to_string(), ResourceState::Discovered);
        self.transition(&task.url, ResourceState::Enqueued)?;

        tracing::debug!(
            "Enqueued {:?} {} at depth {}",
            task.kind,
            task.url,
            task.depth
        );
        self.queue.entry(task.depth).or_default().push_back(task);
        Ok(true)
    }

    /// Takes the next task of the current depth level and marks it as being fetched
    ///
    /// Returns `None` when the queue is empty, and also when the only queued
    /// tasks are deeper than something still in flight.
    pub fn next_task(&mut self) -> Result<Option<CrawlTask>, MirrorError> {
        let Some(mut level) = self.queue.first_entry() else {
            return Ok(None);
        };
        let depth = *level.key();
        if self.in_flight.keys().next().map_or(false, |busy| *busy < depth) {
            return Ok(None);
        }

        let task = level.get_mut().pop_front();
        if level.get().is_empty() {
            level.remove();
        }
        let Some(task) = task else {
            return Ok(None);
        };

        self.transition(&task.url, ResourceState::Fetching)?;
        *self.in_flight.entry(depth).or_default() += 1;
        Ok(Some(task))
    }

    /// The depth level currently being crawled
    pub fn current_depth(&self) -> Option<u32> {
        let queued = self.queue.keys().next();
        let busy = self.in_flight.keys().next();
        match (queued, busy) {
            (Some(q), Some(b)) => Some(*q.min(b)),
            (level, None) | (None, level) => level.copied(),
        }
    }

    /// Records a finished fetch and everything it leads to
    ///
    /// `document` carries the fetched markup and its extraction when the task
    /// was a page. Discovered references are queued, the document starts
    /// waiting on the ones still in progress, and every document that was
    /// only waiting on this URL is rewritten. Rewritten documents are
    /// returned for the caller to persist.
    pub fn complete(
        &mut self,
        result: &FetchResult,
        document: Option<(Vec<u8>, Extraction)>,
    ) -> Result<Vec<ReadyDocument>, MirrorError> {
        let task = &result.task;
        if let Some(count) = self.in_flight.get_mut(&task.depth) {
            *count -= 1;
            if *count == 0 {
                self.in_flight.remove(&task.depth);
            }
        }

        match result.status.local_path() {
            Some(local_path) => {
                self.paths.insert(&task.url, local_path.to_path_buf());
                self.transition(&task.url, ResourceState::Fetched)?;
            }
            None => self.transition(&task.url, ResourceState::Failed)?,
        }

        let mut ready = Vec::new();

        if let (Some((original, extraction)), Some(local_path)) =
            (document, result.status.local_path())
        {
            let outstanding = self.enqueue_references(task, &extraction)?;
            let pending = PendingDocument {
                url: task.url.clone(),
                local_path: local_path.to_path_buf(),
                original,
                spec: RewriteSpec::from_extraction(&extraction),
                outstanding,
            };

            if pending.outstanding.is_empty() {
                ready.push(self.render(pending));
            } else {
                for target in &pending.outstanding {
                    self.waiters
                        .entry(target.clone())
                        .or_default()
                        .push(pending.url.to_string());
                }
                self.pending.insert(pending.url.to_string(), pending);
            }
        }

        if let Some(documents) = self.waiters.remove(task.url.as_str()) {
            for key in documents {
                let done = match self.pending.get_mut(&key) {
                    Some(pending) => {
                        pending.outstanding.remove(task.url.as_str());
                        pending.outstanding.is_empty()
                    }
                    None => false,
                };
                if done {
                    if let Some(pending) = self.pending.remove(&key) {
                        ready.push(self.render(pending));
                    }
                }
            }
        }

        Ok(ready)
    }

    /// Queues the references of a page and returns the targets it must wait for
    fn enqueue_references(
        &mut self,
        task: &CrawlTask,
        extraction: &Extraction,
    ) -> Result<HashSet<String>, MirrorError> {
        let next_depth = task.depth + 1;

        for reference in extraction.assets() {
            self.offer(CrawlTask::new(
                reference.target.clone(),
                task.depth,
                Some(task.url.clone()),
                TaskKind::Asset,
            ))?;
        }

        for reference in extraction.links() {
            if next_depth > self.max_depth || !is_same_domain(&reference.target, &self.root_domain)
            {
                continue;
            }
            self.offer(CrawlTask::new(
                reference.target.clone(),
                next_depth,
                Some(task.url.clone()),
                TaskKind::Page,
            ))?;
        }

        let outstanding = extraction
            .references
            .iter()
            .map(|r| r.target.to_string())
            .filter(|target| {
                self.states
                    .get(target)
                    .map_or(false, |state| !state.is_terminal())
            })
            .collect();

        Ok(outstanding)
    }

    /// Rewrites every document still waiting, with whatever has resolved
    ///
    /// Used when the crawl stops early.
    pub fn drain_pending(&mut self) -> Vec<ReadyDocument> {
        self.waiters.clear();
        let pending: Vec<PendingDocument> = self.pending.drain().map(|(_, doc)| doc).collect();
        pending.into_iter().map(|doc| self.render(doc)).collect()
    }

    fn render(&self, document: PendingDocument) -> ReadyDocument {
        let contents = rewrite(
            &document.original,
            &document.spec,
            &document.local_path,
            &self.paths,
        );
        ReadyDocument {
            url: document.url,
            local_path: document.local_path,
            changed: contents != document.original,
            contents,
        }
    }

    fn transition(&mut self, url: &Url, next: ResourceState) -> Result<(), MirrorError> {
        let current = self
            .states
            .get_mut(url.as_str())
            .ok_or_else(|| MirrorError::InvalidTransition {
                url: url.to_string(),
                from: ResourceState::Discovered,
                to: next,
            })?;

        if !current.can_transition_to(next) {
            return Err(MirrorError::InvalidTransition {
                url: url.to_string(),
                from: *current,
                to: next,
            });
        }

        *current = next;
        Ok(())
    }

    /// The crawl is over when nothing is queued and nothing is being fetched
    pub fn is_finished(&self) -> bool {
        self.queue.is_empty() && self.in_flight.is_empty()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.values().map(VecDeque::len).sum()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.values().sum()
    }

    pub fn pending_documents(&self) -> usize {
        self.pending.len()
    }

    pub fn state_of(&self, url: &Url) -> Option<ResourceState> {
        self.states.get(url.as_str()).copied()
    }

    pub fn paths(&self) -> &UrlToLocalPathMap {
        &self.paths
    }

    pub fn visited(&self) -> &VisitedSet {
        &self.visited
    }
}
