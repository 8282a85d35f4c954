//! Network transport behind the caching layer.
//!
//! ### Requests and responses
//! - `Request` carries a normalized URL so its identity is cache-ready.
//! - `Response` is fully buffered; non-2xx statuses are still responses.
//!
//! ### Transport
//! - `Network` is the seam the worker fetches through.
//! - `FetchClient` implements it with reqwest: explicit timeout, redirect
//!   limit, and slow-resource warnings. Bodies of any size are returned;
//!   the size limit on what gets cached is the worker's concern.

pub mod url;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, StatusCode, Url};
use std::time::{Duration, Instant};

pub use self::url::{UrlError, canonicalize, is_http, normalize};

use cachewarden_core::{AppConfig, CachedResponse, Error};

/// An outgoing request as seen by the interception boundary.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    /// Normalized absolute URL
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl Request {
    /// Build a request, normalizing the URL into its identity form.
    pub fn new(method: Method, url: Url) -> Result<Self, Error> {
        let url = normalize(url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self { method, url, headers: HeaderMap::new(), body: None })
    }

    /// Shorthand for a GET request.
    pub fn get(url: Url) -> Result<Self, Error> {
        Self::new(Method::GET, url)
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct Response {
    /// The URL the response was produced for (after redirects)
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Time taken to fetch in milliseconds; 0 when served from cache
    pub fetch_ms: u64,
}

impl Response {
    /// True for 2xx statuses, the only responses that get cached.
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// Snapshot this response as a cache entry for `request`'s identity.
    ///
    /// Headers whose values are not valid UTF-8 are dropped.
    pub fn to_cached(&self, request: &Request) -> CachedResponse {
        let headers = self
            .headers
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect();

        CachedResponse {
            method: request.method.as_str().to_string(),
            url: request.url.to_string(),
            status: self.status.as_u16(),
            headers,
            body: self.body.to_vec(),
            stored_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Rebuild a response from a stored entry.
    pub fn from_cached(entry: CachedResponse) -> Result<Self, Error> {
        let url = Url::parse(&entry.url).map_err(|e| Error::Internal(format!("stored url {}: {e}", entry.url)))?;
        let status = StatusCode::from_u16(entry.status)
            .map_err(|e| Error::Internal(format!("stored status {}: {e}", entry.status)))?;

        let mut headers = HeaderMap::with_capacity(entry.headers.len());
        for (name, value) in &entry.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::Internal(format!("stored header {name}: {e}")))?;
            let value =
                HeaderValue::from_str(value).map_err(|e| Error::Internal(format!("stored header value: {e}")))?;
            headers.append(name, value);
        }

        Ok(Self { url, status, headers, body: Bytes::from(entry.body), fetch_ms: 0 })
    }
}

/// Anything that can perform a network fetch for the worker.
///
/// Implementations return `Ok` for every HTTP response, including error
/// statuses, and reserve `Err` for transport failures.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, Error>;
}

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "cachewarden/0.1")
    pub user_agent: String,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,

    /// Fetches slower than this log a warning (default: 1s)
    pub slow_threshold: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "cachewarden/0.1".to_string(),
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
            slow_threshold: Duration::from_millis(1000),
        }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            timeout: config.timeout(),
            slow_threshold: config.slow_resource_threshold(),
            ..Default::default()
        }
    }
}

/// reqwest-backed transport.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    fn map_transport_error(&self, url: &Url, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::FetchTimeout(format!("{url} after {}ms", self.config.timeout.as_millis()))
        } else {
            Error::Network(format!("{url}: {err}"))
        }
    }
}

#[async_trait]
impl Network for FetchClient {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let start = Instant::now();

        let mut builder = self
            .http
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| self.map_transport_error(&request.url, e))?;

        let status = response.status();
        let final_url = response.url().clone();
        let headers = response.headers().clone();

        let body = response
            .bytes()
            .await
            .map_err(|e| self.map_transport_error(&request.url, e))?;

        let elapsed = start.elapsed();
        let fetch_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

        if elapsed > self.config.slow_threshold {
            tracing::warn!(url = %request.url, fetch_ms, "slow resource");
        } else {
            tracing::debug!(
                "fetched {} {} -> {} in {}ms ({} bytes)",
                request.method,
                request.url,
                status.as_u16(),
                fetch_ms,
                body.len()
            );
        }

        Ok(Response { url: final_url, status, headers, body, fetch_ms })
    }
}
