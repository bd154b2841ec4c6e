//! Crawler module for mirroring a site
//!
//! This module contains the core mirroring logic, including:
//! - Markup scanning and reference extraction
//! - Downloading resources to their mirror paths
//! - Rewriting references to point at local copies
//! - Depth-bounded scheduling and overall run coordination

mod coordinator;
mod fetcher;
mod http;
pub mod markup;
mod parser;
mod rewriter;
mod scheduler;
mod session;

pub use coordinator::{mirror_site, Coordinator};
pub use fetcher::{Downloader, FetchResult, FetchStatus};
pub use http::{build_http_client, HttpClient, HttpResponse, ReqwestClient, TransportError};
pub use markup::ReferenceKind;
pub use parser::{extract, Extraction, Reference};
pub use rewriter::{relative_reference, rewrite, RewriteEntry, RewriteSpec};
pub use scheduler::{CrawlTask, ReadyDocument, Scheduler, TaskKind};
pub use session::{parse_cookies, SessionContext};
