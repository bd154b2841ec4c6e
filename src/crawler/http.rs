//! HTTP transport capability
//!
//! The crawler never opens sockets itself. It talks to an [`HttpClient`],
//! which the caller injects; [`ReqwestClient`] is the production
//! implementation.

use crate::config::CrawlerConfig;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Connection/timeout/DNS failure reported by an [`HttpClient`]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(pub String);

/// A response whose body has not been read yet
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,

    /// Content-Type header value, if any
    pub content_type: Option<String>,

    /// Body as a stream of chunks
    pub body: BoxStream<'static, Result<Vec<u8>, TransportError>>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues GET requests on behalf of the crawler
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a GET request with the given headers
    async fn get(&self, url: &Url, headers: &HeaderMap) -> Result<HttpResponse, TransportError>;
}

/// [`HttpClient`] backed by reqwest
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: Client,
}

impl ReqwestClient {
    /// Builds a client with the configured per-request timeout
    pub fn new(config: &CrawlerConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(Duration::from_secs(config.request_timeout_secs))?,
        })
    }

    /// Wraps an already configured reqwest client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

/// Builds the reqwest client used for mirroring
///
/// The user agent is not set here; it travels with the session headers so
/// every request carries exactly what the session says.
pub fn build_http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, url: &Url, headers: &HeaderMap) -> Result<HttpResponse, TransportError> {
        let response = self
            .client
            .get(url.clone())
            .headers(headers.clone())
            .send()
            .await
            .map_err(classify_error)?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(classify_error))
            .boxed();

        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }
}

fn classify_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError("request timeout".to_string())
    } else if e.is_connect() {
        TransportError(format!("connection failed: {}", e))
    } else {
        TransportError(e.to_string())
    }
}
