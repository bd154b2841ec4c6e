//! Resource extraction from markup documents
//!
//! Turns the reference sites found by the scanner into resolved references:
//! each one keeps its exact position and raw text (needed by the rewriter)
//! together with the normalized URL it points at. References that do not
//! name a fetchable resource (`mailto:`, `javascript:`, bare `#` anchors,
//! ...) are dropped here.

use std::ops::Range;

use scraper::{Html, Selector};
use url::Url;

use super::markup::{self, ReferenceKind};
use crate::url::normalize;

/// One resolved reference inside a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Ordinal of the site among all reference sites of the document
    pub site: usize,

    pub kind: ReferenceKind,

    /// Byte span of the raw value inside the document
    pub span: Range<usize>,

    /// The value exactly as written in the document
    pub raw: String,

    /// Normalized target URL (fragment stripped)
    pub target: Url,
}

/// Everything extracted from one document
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// All references in document order
    pub references: Vec<Reference>,

    /// Part of the document could not be parsed; references after the
    /// malformed fragment are missing
    pub degraded: bool,

    /// The page title (from the `<title>` tag)
    pub title: Option<String>,
}

impl Extraction {
    /// References to images, stylesheets, scripts and other embedded assets
    pub fn assets(&self) -> impl Iterator<Item = &Reference> {
        self.references.iter().filter(|r| r.kind.is_asset())
    }

    /// Hyperlink references
    pub fn links(&self) -> impl Iterator<Item = &Reference> {
        self.references.iter().filter(|r| !r.kind.is_asset())
    }
}

/// Extracts asset and link references from a markup document
///
/// This is a pure function of its inputs. The document is treated as UTF-8
/// where possible; values that are not valid UTF-8 are skipped.
///
/// # Example
///
/// ```
/// use sumi_mirror::crawler::extract;
/// use url::Url;
///
/// let html = br#"<img src="logo.png"><a href="mailto:me@example.com">mail</a>"#;
/// let base = Url::parse("https://example.com/").unwrap();
/// let extraction = extract(html, &base);
/// assert_eq!(extraction.references.len(), 1);
/// assert_eq!(extraction.references[0].target.as_str(), "https://example.com/logo.png");
/// ```
pub fn extract(document: &[u8], document_url: &Url) -> Extraction {
    let scan = markup::scan(document);

    let references = scan
        .sites
        .iter()
        .enumerate()
        .filter_map(|(site, found)| {
            let raw = std::str::from_utf8(&document[found.span.clone()]).ok()?;
            let target = normalize(document_url, raw)?;
            Some(Reference {
                site,
                kind: found.kind,
                span: found.span.clone(),
                raw: raw.to_string(),
                target,
            })
        })
        .collect();

    if scan.degraded {
        tracing::warn!("Markup of {} is malformed, extraction is partial", document_url);
    }

    Extraction {
        references,
        degraded: scan.degraded,
        title: extract_title(document),
    }
}

/// Extracts the page title from the document
fn extract_title(document: &[u8]) -> Option<String> {
    let html = Html::parse_document(&String::from_utf8_lossy(document));
    let title_selector = Selector::parse("title").ok()?;

    html.select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_url() -> Url {
        Url::parse("https://example.com/blog/post.html").unwrap()
    }

    fn targets(extraction: &Extraction) -> Vec<&str> {
        extraction
            .references
            .iter()
            .map(|r| r.target.as_str())
            .collect()
    }

    #[test]
    fn test_extract_title() {
        let html = b"<html><head><title>  Test Page  </title></head><body></body></html>";
        let extraction = extract(html, &base_url());
        assert_eq!(extraction.title, Some("Test Page".to_string()));
    }

    #[test]
    fn test_no_title() {
        let extraction = extract(b"<html><body></body></html>", &base_url());
        assert_eq!(extraction.title, None);
    }

    #[test]
    fn test_relative_references_resolved() {
        let html = br#"<img src="../img/a.png"><a href="next.html">n</a><script src="//cdn.example.org/x.js"></script>"#;
        let extraction = extract(html, &base_url());
        assert_eq!(
            targets(&extraction),
            vec![
                "https://example.com/img/a.png",
                "https://example.com/blog/next.html",
                "https://cdn.example.org/x.js",
            ]
        );
    }

    #[test]
    fn test_assets_and_links_split() {
        let html = br#"<link rel="stylesheet" href="s.css"><a href="/about.html">a</a><img src="i.png">"#;
        let extraction = extract(html, &base_url());
        assert_eq!(extraction.assets().count(), 2);
        assert_eq!(extraction.links().count(), 1);
        assert_eq!(
            extraction.links().next().unwrap().target.as_str(),
            "https://example.com/about.html"
        );
    }

    #[test]
    fn test_non_fetchable_dropped() {
        let html = br##"<a href="mailto:info@example.com">m</a>
<a href="javascript:void(0)">j</a>
<a href="tel:+1234">t</a>
<a href="#">top</a>
<a href="#section">s</a>
<img src="data:image/png;base64,AAAA">"##;
        let extraction = extract(html, &base_url());
        assert!(extraction.references.is_empty());
    }

    #[test]
    fn test_site_index_counts_dropped_sites() {
        let html = br#"<a href="mailto:x@example.com">m</a><img src="a.png">"#;
        let extraction = extract(html, &base_url());
        assert_eq!(extraction.references.len(), 1);
        assert_eq!(extraction.references[0].site, 1);
    }

    #[test]
    fn test_raw_and_span_preserved() {
        let html = r#"<a href="page.html?a=1&amp;b=2#top">x</a>"#;
        let extraction = extract(html.as_bytes(), &base_url());
        let reference = &extraction.references[0];
        assert_eq!(reference.raw, "page.html?a=1&amp;b=2#top");
        assert_eq!(&html[reference.span.clone()], reference.raw);
        assert_eq!(
            reference.target.as_str(),
            "https://example.com/blog/page.html?a=1&b=2"
        );
    }

    #[test]
    fn test_degraded_keeps_earlier_references() {
        let html = br#"<img src="ok.png"><img src="broken.png"#;
        let extraction = extract(html, &base_url());
        assert!(extraction.degraded);
        assert_eq!(targets(&extraction), vec!["https://example.com/blog/ok.png"]);
    }
}
