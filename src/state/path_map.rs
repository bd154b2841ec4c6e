use std::collections::HashMap;
use std::path::{Path, PathBuf};
use url::Url;

/// Where each successfully mirrored URL lives, relative to the output root
///
/// The map only grows. The first path recorded for a URL is kept; later
/// inserts for the same URL are ignored, so re-runs cannot remap a resource.
#[derive(Debug, Default, Clone)]
pub struct UrlToLocalPathMap {
    paths: HashMap<String, PathBuf>,
}

impl UrlToLocalPathMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the local path for a URL, returning false if one was already set
    pub fn insert(&mut self, url: &Url, path: PathBuf) -> bool {
        if self.paths.contains_key(url.as_str()) {
            return false;
        }
        self.paths.insert(url.as_str().to_string(), path);
        true
    }

    pub fn get(&self, url: &Url) -> Option<&Path> {
        self.paths.get(url.as_str()).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_writer_wins() {
        let mut map = UrlToLocalPathMap::new();
        let url = Url::parse("https://example.com/about").unwrap();

        assert!(map.insert(&url, PathBuf::from("about.html")));
        assert!(!map.insert(&url, PathBuf::from("other.html")));
        assert_eq!(map.get(&url), Some(Path::new("about.html")));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_missing_url() {
        let map = UrlToLocalPathMap::new();
        let url = Url::parse("https://example.com/").unwrap();
        assert!(map.get(&url).is_none());
        assert!(map.is_empty());
    }
}
