//! Output module for run summaries and reports
//!
//! This module handles:
//! - Collecting per-resource outcomes into a run summary
//! - Printing the summary to the console
//! - Writing an optional markdown report

mod markdown;
pub mod stats;
mod summary;

pub use markdown::{format_markdown_report, write_markdown_report};
pub use stats::print_summary;
pub use summary::{FailureRecord, MirrorSummary, PageRecord};
