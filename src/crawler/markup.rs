//! Byte-level markup scanner
//!
//! Finds every attribute value (or CSS `url(...)` token) that can hold a
//! reference the mirror cares about, and records its exact byte span. The
//! extractor and the rewriter both work from these spans, so a substitution
//! only ever touches the value it was meant for.
//!
//! The scanner does not build a tree. It skips comments, doctypes, end tags
//! and the content of raw-text elements, and reads `url(...)` tokens inside
//! `<style>` elements. When it meets a fragment it cannot parse (an
//! unterminated comment, tag, quoted value or raw-text element) it stops and
//! reports the document as degraded; everything before that point is kept.

use std::ops::Range;

/// The kinds of reference the mirror follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    /// `<img src>`
    ImageSrc,
    /// One candidate URL of `<img srcset>`
    ImageSrcset,
    /// `<link rel="stylesheet" href>`
    StylesheetHref,
    /// `<link rel="icon" href>` and friends
    IconHref,
    /// `<link rel="preload" href>`, `modulepreload` and `manifest`
    PreloadHref,
    /// `<script src>`
    ScriptSrc,
    /// `<a href>`
    AnchorHref,
    /// `url(...)` inside a `style` attribute or `<style>` element
    InlineStyleUrl,
}

impl ReferenceKind {
    /// Assets belong to the page that references them; anchors are page links
    pub fn is_asset(&self) -> bool {
        !matches!(self, Self::AnchorHref)
    }

    /// Whether the original reference's `#fragment` survives rewriting
    ///
    /// Anchors keep their in-page target, images and CSS urls keep SVG
    /// fragment identifiers. Stylesheets, icons and scripts have no use for one.
    pub fn keeps_fragment(&self) -> bool {
        matches!(
            self,
            Self::AnchorHref | Self::ImageSrc | Self::InlineStyleUrl
        )
    }
}

/// Location of one reference-bearing value inside a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSite {
    pub kind: ReferenceKind,
    pub span: Range<usize>,
}

/// Every reference site of a document, in document order
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub sites: Vec<ReferenceSite>,
    /// Part of the document could not be parsed and was skipped
    pub degraded: bool,
}

/// How much of a file [`looks_like_markup`] inspects
const SNIFF_LEN: usize = 1024;

/// Guesses from its first bytes whether a stored file is an HTML document
///
/// Used for pages mirrored by an earlier run, where the response's
/// Content-Type is gone and the file name may end in `.php` or `.aspx`.
/// A document qualifies when it is free of NUL bytes and its first
/// non-blank character (after an optional UTF-8 BOM) opens a tag.
pub fn looks_like_markup(document: &[u8]) -> bool {
    let head = &document[..document.len().min(SNIFF_LEN)];
    if head.contains(&0) {
        return false;
    }
    let head = head.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(head);
    let rest = &head[skip_whitespace(head, 0)..];

    // XML documents only count when they are XHTML
    if rest.starts_with(b"<?") {
        return find_bytes_ignore_case(rest, b"<html").is_some();
    }
    rest.first() == Some(&b'<')
}

/// Elements whose content is text, not markup
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

/// Scans a document for reference sites
pub fn scan(document: &[u8]) -> ScanResult {
    let mut scanner = Scanner {
        doc: document,
        pos: 0,
        sites: Vec::new(),
    };

    let degraded = scanner.run().is_err();
    let mut sites = scanner.sites;
    sites.sort_by_key(|site| site.span.start);

    ScanResult { sites, degraded }
}

/// Marker for a fragment the scanner cannot parse
struct Malformed;

struct Attribute {
    name: String,
    value: Option<Range<usize>>,
}

struct Scanner<'a> {
    doc: &'a [u8],
    pos: usize,
    sites: Vec<ReferenceSite>,
}

impl<'a> Scanner<'a> {
    fn run(&mut self) -> Result<(), Malformed> {
        while let Some(offset) = find_byte(&self.doc[self.pos..], b'<') {
            let start = self.pos + offset;
            let rest = &self.doc[start..];

            if rest.starts_with(b"<!--") {
                let end = find_bytes(&rest[4..], b"-->").ok_or(Malformed)?;
                self.pos = start + 4 + end + 3;
            } else if rest.starts_with(b"<!") || rest.starts_with(b"<?") || rest.starts_with(b"</")
            {
                let end = find_byte(rest, b'>').ok_or(Malformed)?;
                self.pos = start + end + 1;
            } else if rest.get(1).map_or(false, u8::is_ascii_alphabetic) {
                self.start_tag(start + 1)?;
            } else {
                self.pos = start + 1;
            }
        }

        Ok(())
    }

    /// Parses a start tag beginning at `pos` (just past the `<`)
    fn start_tag(&mut self, pos: usize) -> Result<(), Malformed> {
        let doc = self.doc;
        let mut i = pos;
        while i < doc.len() && is_name_byte(doc[i]) {
            i += 1;
        }
        let name = String::from_utf8_lossy(&doc[pos..i]).to_ascii_lowercase();

        let mut attributes = Vec::new();
        loop {
            i = skip_whitespace(doc, i);
            match doc.get(i) {
                None => return Err(Malformed),
                Some(b'>') => {
                    i += 1;
                    break;
                }
                Some(b'/') => {
                    i += 1;
                    continue;
                }
                _ => {}
            }

            let name_start = i;
            while i < doc.len()
                && !is_whitespace(doc[i])
                && !matches!(doc[i], b'=' | b'>' | b'/')
            {
                i += 1;
            }
            if i == name_start {
                // stray '='
                i += 1;
                continue;
            }
            let attr_name = String::from_utf8_lossy(&doc[name_start..i]).to_ascii_lowercase();

            i = skip_whitespace(doc, i);
            let mut value = None;
            if doc.get(i) == Some(&b'=') {
                i = skip_whitespace(doc, i + 1);
                match doc.get(i) {
                    None => return Err(Malformed),
                    Some(&quote) if quote == b'"' || quote == b'\'' => {
                        let value_start = i + 1;
                        let len = find_byte(&doc[value_start..], quote).ok_or(Malformed)?;
                        value = Some(value_start..value_start + len);
                        i = value_start + len + 1;
                    }
                    _ => {
                        let value_start = i;
                        while i < doc.len() && !is_whitespace(doc[i]) && doc[i] != b'>' {
                            i += 1;
                        }
                        value = Some(value_start..i);
                    }
                }
            }

            attributes.push(Attribute {
                name: attr_name,
                value,
            });
        }

        self.pos = i;
        self.record_sites(&name, &attributes);

        if RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
            let closing = format!("</{}", name);
            let len = find_bytes_ignore_case(&doc[self.pos..], closing.as_bytes()).ok_or(Malformed)?;
            let content = self.pos..self.pos + len;
            if name == "style" {
                self.css_urls(content.clone());
            }
            self.pos = content.end;
        }

        Ok(())
    }

    fn record_sites(&mut self, element: &str, attributes: &[Attribute]) {
        let value_of = |name: &str| {
            attributes
                .iter()
                .find(|attr| attr.name == name)
                .and_then(|attr| attr.value.clone())
        };

        match element {
            "img" => {
                if let Some(span) = value_of("src") {
                    self.push(ReferenceKind::ImageSrc, span);
                }
                if let Some(span) = value_of("srcset") {
                    self.srcset_candidates(span);
                }
            }
            "link" => {
                let rel = value_of("rel")
                    .map(|span| String::from_utf8_lossy(&self.doc[span]).to_ascii_lowercase())
                    .unwrap_or_default();
                let kind = if rel.split_whitespace().any(|t| t == "stylesheet") {
                    Some(ReferenceKind::StylesheetHref)
                } else if rel
                    .split_whitespace()
                    .any(|t| t == "icon" || t == "apple-touch-icon")
                {
                    Some(ReferenceKind::IconHref)
                } else if rel
                    .split_whitespace()
                    .any(|t| t == "preload" || t == "modulepreload" || t == "manifest")
                {
                    Some(ReferenceKind::PreloadHref)
                } else {
                    None
                };
                if let (Some(kind), Some(span)) = (kind, value_of("href")) {
                    self.push(kind, span);
                }
            }
            "script" => {
                if let Some(span) = value_of("src") {
                    self.push(ReferenceKind::ScriptSrc, span);
                }
            }
            "a" => {
                if let Some(span) = value_of("href") {
                    self.push(ReferenceKind::AnchorHref, span);
                }
            }
            _ => {}
        }

        if let Some(span) = value_of("style") {
            self.css_urls(span);
        }
    }

    /// Records the URL of each `srcset` candidate (`url [descriptor], ...`)
    fn srcset_candidates(&mut self, span: Range<usize>) {
        let doc = self.doc;
        let mut i = span.start;

        loop {
            while i < span.end && (is_whitespace(doc[i]) || doc[i] == b',') {
                i += 1;
            }
            if i >= span.end {
                break;
            }

            let url_start = i;
            while i < span.end && !is_whitespace(doc[i]) {
                i += 1;
            }
            let mut url_end = i;
            while url_end > url_start && doc[url_end - 1] == b',' {
                url_end -= 1;
            }
            if url_end > url_start {
                self.push(ReferenceKind::ImageSrcset, url_start..url_end);
            }

            if url_end == i {
                // skip the descriptor
                while i < span.end && doc[i] != b',' {
                    i += 1;
                }
            }
        }
    }

    /// Records every `url(...)` token inside a CSS fragment
    fn css_urls(&mut self, span: Range<usize>) {
        let doc = self.doc;
        let mut i = span.start;

        while let Some(offset) = find_bytes_ignore_case(&doc[i..span.end], b"url(") {
            let mut j = skip_whitespace(doc, i + offset + 4).min(span.end);

            if j < span.end && (doc[j] == b'"' || doc[j] == b'\'') {
                let quote = doc[j];
                j += 1;
                let Some(len) = find_byte(&doc[j..span.end], quote) else {
                    break;
                };
                if len > 0 {
                    self.push(ReferenceKind::InlineStyleUrl, j..j + len);
                }
                i = j + len + 1;
            } else {
                let Some(len) = find_byte(&doc[j..span.end], b')') else {
                    break;
                };
                let mut end = j + len;
                while end > j && is_whitespace(doc[end - 1]) {
                    end -= 1;
                }
                if end > j {
                    self.push(ReferenceKind::InlineStyleUrl, j..end);
                }
                i = j + len + 1;
            }
        }
    }

    fn push(&mut self, kind: ReferenceKind, span: Range<usize>) {
        if !span.is_empty() {
            self.sites.push(ReferenceSite { kind, span });
        }
    }
}

fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0c)
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':')
}

fn skip_whitespace(doc: &[u8], mut i: usize) -> usize {
    while i < doc.len() && is_whitespace(doc[i]) {
        i += 1;
    }
    i
}

fn find_byte(haystack: &[u8], needle: u8) -> Option<usize> {
    haystack.iter().position(|&b| b == needle)
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn find_bytes_ignore_case(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
}
