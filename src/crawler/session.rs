//! Session context shared by every fetch
//!
//! An opaque bag of headers (user agent, cookies, anything else the site
//! needs) that the download manager passes unmodified to each request.

use crate::config::SessionConfig;
use crate::ConfigError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE, USER_AGENT};

/// Cookies and headers sent with every request of a crawl run
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    headers: HeaderMap,
}

impl SessionContext {
    /// Creates an empty session
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a session from the `[session]` configuration section
    pub fn from_config(config: &SessionConfig) -> Result<Self, ConfigError> {
        let mut session = Self::new().with_header(USER_AGENT.as_str(), &config.user_agent)?;

        for (name, value) in &config.headers {
            session = session.with_header(name, value)?;
        }

        if let Some(cookies) = &config.cookies {
            session = session.with_cookies(&parse_cookies(cookies))?;
        }

        Ok(session)
    }

    /// Adds or replaces a header
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, ConfigError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ConfigError::InvalidHeader(format!("name '{}'", name)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| ConfigError::InvalidHeader(format!("value for '{}'", name)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Sets the `Cookie` header from name/value pairs
    ///
    /// An empty list leaves the session untouched.
    pub fn with_cookies(self, cookies: &[(String, String)]) -> Result<Self, ConfigError> {
        if cookies.is_empty() {
            return Ok(self);
        }

        let header = cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ");

        self.with_header(COOKIE.as_str(), &header)
    }

    /// The headers to send with each request
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

/// Parses a cookie string in `key=value; key2=value2` form
///
/// Items without `=` are skipped with a warning rather than failing the run.
pub fn parse_cookies(cookie_string: &str) -> Vec<(String, String)> {
    let mut cookies = Vec::new();

    for item in cookie_string.split(';') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }

        match item.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => {
                cookies.push((name.trim().to_string(), value.trim().to_string()));
            }
            _ => {
                tracing::warn!(
                    "Ignoring malformed cookie item '{}'; expected 'key=value; key2=value2'",
                    item
                );
            }
        }
    }

    cookies
}
