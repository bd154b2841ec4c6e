use std::collections::HashSet;
use url::Url;

/// Normalized URLs already accepted into the crawl
///
/// A URL is a member at most once. The crawl scheduler owns the set and calls
/// [`VisitedSet::check_and_insert`] under its lock, which makes that call the
/// single point preventing duplicate fetches across workers.
#[derive(Debug, Default)]
pub struct VisitedSet {
    urls: HashSet<String>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts the URL and returns true if it was not already a member
    pub fn check_and_insert(&mut self, url: &Url) -> bool {
        if self.urls.contains(url.as_str()) {
            return false;
        }
        self.urls.insert(url.as_str().to_string())
    }

    pub fn contains(&self, url: &Url) -> bool {
        self.urls.contains(url.as_str())
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}
