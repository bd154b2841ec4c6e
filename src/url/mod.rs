//! URL handling module for Sumi-Mirror
//!
//! This module provides URL normalization, reference resolution, the
//! same-domain test, and the deterministic URL-to-local-path mapping.

mod domain;
mod local_path;
mod normalize;

pub use domain::{extract_domain, extract_site, is_same_domain};
pub use local_path::{
    extension_for_content_type, is_markup_content_type, is_markup_path, MirrorPath, EXTERNAL_DIR,
    INDEX_FILE,
};
pub use normalize::{decode_entities, fragment_offset, normalize, normalize_url};
