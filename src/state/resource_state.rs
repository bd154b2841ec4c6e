/// Resource state definitions for tracking crawl progress
///
/// Every discovered URL moves through `Discovered -> Enqueued -> Fetching`
/// and ends in `Fetched` or `Failed`.
use std::fmt;

/// Represents the current state of one URL in the crawl process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    // ===== Active States =====
    /// Reference was found in a document but not yet accepted
    Discovered,

    /// Accepted into the task queue and waiting for a worker
    Enqueued,

    /// A worker is fetching it
    Fetching,

    // ===== Terminal States =====
    /// Stored in the mirror, either downloaded now or found from a previous run
    Fetched,

    /// Could not be mirrored (transport, HTTP status, or filesystem failure)
    Failed,
}

impl ResourceState {
    /// Returns true if no further processing will happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Fetched | Self::Failed)
    }

    /// Returns true if the resource may still be processed
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if the resource has a local copy
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Fetched)
    }

    /// Returns true if moving from `self` to `next` is allowed
    pub fn can_transition_to(&self, next: ResourceState) -> bool {
        matches!(
            (self, next),
            (Self::Discovered, Self::Enqueued)
                | (Self::Enqueued, Self::Fetching)
                | (Self::Fetching, Self::Fetched)
                | (Self::Fetching, Self::Failed)
        )
    }

    /// Short lowercase name used in logs and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Enqueued => "enqueued",
            Self::Fetching => "fetching",
            Self::Fetched => "fetched",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
