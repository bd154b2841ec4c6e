use serde::Deserialize;
use std::collections::BTreeMap;

/// Browser-like user agent sent when the configuration does not name one
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Main configuration structure for Sumi-Mirror
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MirrorConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// What to mirror and where to put it
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Top-level page the crawl starts from
    #[serde(rename = "seed-url", default)]
    pub seed_url: Option<String>,

    /// Root directory of the mirror
    #[serde(rename = "output-dir", default = "default_output_dir")]
    pub output_dir: String,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of same-domain link hops to follow from the seed
    #[serde(rename = "max-depth", default = "default_max_depth")]
    pub max_depth: u32,

    /// Number of fetch workers
    #[serde(rename = "max-concurrent-fetches", default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: u32,

    /// Per-request timeout handed to the HTTP client
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Cross-request state sent with every fetch
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Cookie string in `key=value; key2=value2` form
    #[serde(default)]
    pub cookies: Option<String>,

    /// Extra request headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_output_dir() -> String {
    "downloaded_site".to_string()
}

fn default_max_depth() -> u32 {
    1
}

fn default_max_concurrent_fetches() -> u32 {
    8
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            seed_url: None,
            output_dir: default_output_dir(),
        }
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            cookies: None,
            headers: BTreeMap::new(),
        }
    }
}
