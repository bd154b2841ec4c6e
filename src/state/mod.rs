//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `ResourceState`: Tracks the state of individual URLs (discovered, enqueued, fetching, ...)
//! - `VisitedSet`: The URLs already accepted into the crawl
//! - `UrlToLocalPathMap`: Where each mirrored URL was stored

mod path_map;
mod resource_state;
mod visited;

pub use path_map::UrlToLocalPathMap;
pub use resource_state::ResourceState;
pub use visited::VisitedSet;
