//! Rewrites a document's references to point at the local mirror
//!
//! The rewriter re-scans the document it is given and substitutes values by
//! site: an entry only applies when the site at its ordinal has the same kind
//! and still holds the original text. A second pass over an already
//! rewritten document therefore finds nothing to replace.

use std::path::{Component, Path};

use url::Url;

use super::markup::{self, ReferenceKind};
use super::parser::Extraction;
use crate::state::UrlToLocalPathMap;
use crate::url::fragment_offset;

/// One planned substitution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteEntry {
    pub site: usize,
    pub kind: ReferenceKind,
    pub original: String,
    pub target: Url,
}

/// The substitutions planned for one document, in site order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteSpec {
    pub entries: Vec<RewriteEntry>,
}

impl RewriteSpec {
    /// Plans a substitution for every reference of an extraction
    pub fn from_extraction(extraction: &Extraction) -> Self {
        let entries = extraction
            .references
            .iter()
            .map(|reference| RewriteEntry {
                site: reference.site,
                kind: reference.kind,
                original: reference.raw.clone(),
                target: reference.target.clone(),
            })
            .collect();

        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Rewrites a document so mirrored references point at their local copies
///
/// `document_path` and every path in `paths` are relative to the output root.
/// Entries whose target has no local path (never fetched, or failed) are left
/// byte-identical.
pub fn rewrite(
    document: &[u8],
    spec: &RewriteSpec,
    document_path: &Path,
    paths: &UrlToLocalPathMap,
) -> Vec<u8> {
    let scan = markup::scan(document);
    let document_dir = document_path.parent().unwrap_or_else(|| Path::new(""));

    let mut substitutions: Vec<(std::ops::Range<usize>, String)> = Vec::new();

    for entry in &spec.entries {
        let Some(site) = scan.sites.get(entry.site) else {
            continue;
        };
        if site.kind != entry.kind || &document[site.span.clone()] != entry.original.as_bytes() {
            continue;
        }
        let Some(local) = paths.get(&entry.target) else {
            continue;
        };
        let Some(relative) = relative_reference(document_dir, local) else {
            continue;
        };

        let replacement = match fragment_offset(&entry.original) {
            Some(pos) if entry.kind.keeps_fragment() => {
                format!("{}{}", relative, &entry.original[pos..])
            }
            _ => relative,
        };

        substitutions.push((site.span.clone(), replacement));
    }

    substitutions.sort_by_key(|(span, _)| span.start);
    substitutions.dedup_by_key(|(span, _)| span.start);

    let mut output = Vec::with_capacity(document.len());
    let mut cursor = 0;
    for (span, replacement) in substitutions {
        output.extend_from_slice(&document[cursor..span.start]);
        output.extend_from_slice(replacement.as_bytes());
        cursor = span.end;
    }
    output.extend_from_slice(&document[cursor..]);

    output
}

/// Builds the relative URL reference from a directory to a mirrored file
///
/// Components are joined with `/` and percent-encoded so a browser resolves
/// them to the decoded names used on disk.
pub fn relative_reference(from_dir: &Path, target: &Path) -> Option<String> {
    let relative = pathdiff::diff_paths(target, from_dir)?;

    let parts: Vec<String> = relative
        .components()
        .map(|component| match component {
            Component::ParentDir => Some("..".to_string()),
            Component::CurDir => Some(".".to_string()),
            Component::Normal(name) => {
                Some(urlencoding::encode(&name.to_string_lossy()).into_owned())
            }
            _ => None,
        })
        .collect::<Option<_>>()?;

    if parts.is_empty() {
        return None;
    }

    Some(parts.join("/"))
}
