//! Deterministic mapping from URLs to paths inside the mirror
//!
//! Every normalized URL maps to one path relative to the output root:
//!
//! - URLs on the root domain mirror their path segments directly
//! - URLs on other hosts live under `_external/<host>[_<port>]/`
//! - empty paths and paths ending in `/` get `index.html`
//! - a query string adds `_<hash>` before the extension, so `data?x=1` and
//!   `data?x=2` land in different files
//! - a final segment without an extension gets one from the Content-Type

use crate::url::is_same_domain;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use url::Url;

/// Directory holding resources fetched from hosts other than the root domain
pub const EXTERNAL_DIR: &str = "_external";

/// File name used for directory-like URLs
pub const INDEX_FILE: &str = "index.html";

/// Content types we know how to name, with the extension they get on disk
const CONTENT_TYPE_EXTENSIONS: &[(&str, &str)] = &[
    ("text/html", "html"),
    ("application/xhtml+xml", "html"),
    ("text/css", "css"),
    ("application/javascript", "js"),
    ("text/javascript", "js"),
    ("application/x-javascript", "js"),
    ("application/json", "json"),
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/gif", "gif"),
    ("image/svg+xml", "svg"),
    ("image/webp", "webp"),
    ("image/x-icon", "ico"),
    ("image/vnd.microsoft.icon", "ico"),
    ("font/woff", "woff"),
    ("font/woff2", "woff2"),
    ("application/pdf", "pdf"),
    ("text/plain", "txt"),
    ("application/xml", "xml"),
    ("text/xml", "xml"),
];

/// Number of hex characters of the query hash kept in file names
const QUERY_HASH_LEN: usize = 8;

/// The local location of one URL, before and after the response is known
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorPath {
    path: PathBuf,
    infer_extension: bool,
}

impl MirrorPath {
    /// Computes the mirror path for a URL
    ///
    /// # Examples
    ///
    /// ```
    /// use sumi_mirror::url::MirrorPath;
    /// use std::path::Path;
    /// use url::Url;
    ///
    /// let url = Url::parse("https://example.com/img/logo.png").unwrap();
    /// let path = MirrorPath::for_url(&url, "example.com");
    /// assert_eq!(path.path(), Path::new("img/logo.png"));
    /// ```
    pub fn for_url(url: &Url, root_domain: &str) -> Self {
        let mut segments: Vec<String> = Vec::new();

        if !is_same_domain(url, root_domain) {
            segments.push(EXTERNAL_DIR.to_string());
            let host = url.host_str().unwrap_or("unknown").to_lowercase();
            match url.port() {
                Some(port) => segments.push(format!("{}_{}", host, port)),
                None => segments.push(host),
            }
        }

        let mut path_segments: Vec<String> = url
            .path_segments()
            .map(|parts| {
                parts
                    .filter(|part| !part.is_empty())
                    .map(|part| sanitize_segment(&decode_segment(part)))
                    .collect()
            })
            .unwrap_or_default();

        if url.path().ends_with('/') || path_segments.is_empty() {
            path_segments.push(INDEX_FILE.to_string());
        }

        let file_name = path_segments.pop().unwrap_or_else(|| INDEX_FILE.to_string());
        let (stem, extension) = split_extension(&file_name);

        let stem = match url.query().filter(|q| !q.is_empty()) {
            Some(query) => format!("{}_{}", stem, query_suffix(query)),
            None => stem.to_string(),
        };

        let file_name = match extension {
            Some(ext) => format!("{}.{}", stem, ext),
            None => stem,
        };

        segments.extend(path_segments);
        segments.push(file_name);

        Self {
            path: segments.iter().collect(),
            infer_extension: extension.is_none(),
        }
    }

    /// The path as derived from the URL alone
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the final segment has no extension of its own
    pub fn infers_extension(&self) -> bool {
        self.infer_extension
    }

    /// Every path a previous run could have written this URL to
    pub fn candidates(&self) -> Vec<PathBuf> {
        let mut candidates = vec![self.path.clone()];

        if self.infer_extension {
            let mut extensions: Vec<&str> =
                CONTENT_TYPE_EXTENSIONS.iter().map(|(_, ext)| *ext).collect();
            extensions.dedup();
            candidates.extend(extensions.into_iter().map(|ext| self.with_extension(ext)));
        }

        candidates
    }

    /// The final path once the response's Content-Type is known
    pub fn resolve(&self, content_type: Option<&str>) -> PathBuf {
        if !self.infer_extension {
            return self.path.clone();
        }

        match content_type.and_then(extension_for_content_type) {
            Some(ext) => self.with_extension(ext),
            None => self.path.clone(),
        }
    }

    fn with_extension(&self, ext: &str) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.path.with_file_name(format!("{}.{}", name, ext))
    }
}

/// Maps a Content-Type header value to a file extension
pub fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    CONTENT_TYPE_EXTENSIONS
        .iter()
        .find(|(known, _)| *known == mime)
        .map(|(_, ext)| *ext)
}

/// Returns true if a Content-Type names an HTML document
pub fn is_markup_content_type(content_type: &str) -> bool {
    matches!(extension_for_content_type(content_type), Some("html"))
}

/// Returns true if a mirrored file is an HTML document, judging by its name
pub fn is_markup_path(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm"))
        .unwrap_or(false)
}

/// Splits a file name into stem and extension
///
/// Only short alphanumeric suffixes count as extensions, so `v1.2-beta` or
/// `.hidden` keep their full name as the stem.
fn split_extension(file_name: &str) -> (&str, Option<&str>) {
    match file_name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && (1..=5).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            (stem, Some(ext))
        }
        _ => (file_name, None),
    }
}

fn query_suffix(query: &str) -> String {
    let digest = Sha256::digest(query.as_bytes());
    let mut suffix = hex::encode(digest);
    suffix.truncate(QUERY_HASH_LEN);
    suffix
}

/// Percent-decodes a path segment so `my%20file.png` is stored as `my file.png`
fn decode_segment(segment: &str) -> String {
    urlencoding::decode(segment)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| segment.to_string())
}

/// Makes one decoded URL path segment safe to use as a file or directory name
fn sanitize_segment(segment: &str) -> String {
    match segment {
        "." | ".." => "_".to_string(),
        _ => segment
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '*' | '|' | '"' | '<' | '>' | '\0' => '_',
                c => c,
            })
            .collect(),
    }
}
