//! HTTP fetcher implementation
//!
//! This module handles all page requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - GET requests with redirect following
//! - Retry with exponential backoff on transient failures
//! - Rejecting non-text content types
//! - Error classification

use crate::config::{FetchConfig, UserAgentConfig};
use reqwest::{header, redirect::Policy, Client};
use std::time::{Duration, Instant};
use url::Url;

/// Statuses retried before a page is counted as failed
const RETRYABLE_STATUSES: &[u16] = &[429, 500, 502, 503, 504];

/// Maximum redirect hops followed per request
const MAX_REDIRECTS: usize = 10;

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Wait before the first retry; doubles for each further retry
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_base: Duration::from_millis(config.backoff_base_ms),
        }
    }

    /// Returns true for statuses that signal a transient server condition
    pub fn is_retryable_status(&self, status: u16) -> bool {
        RETRYABLE_STATUSES.contains(&status)
    }

    /// Wait before retry number `attempt` (0-based)
    ///
    /// # Examples
    ///
    /// ```
    /// use site_harvest::crawler::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::default();
    /// assert_eq!(policy.backoff(0), Duration::from_millis(500));
    /// assert_eq!(policy.backoff(2), Duration::from_millis(2000));
    /// ```
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(1u32 << attempt.min(16))
    }
}

/// Result of a fetch operation
#[derive(Debug)]
pub enum FetchResult {
    /// Successfully fetched a text page
    Success {
        /// Final URL after redirects
        final_url: Url,
        /// HTTP status code
        status_code: u16,
        /// Content-Type header value
        content_type: String,
        /// Page body content
        body: String,
        /// Requests issued, including retries
        attempts: u32,
        /// Time from sending the last request to its response headers
        latency: Duration,
    },

    /// Page is not text (image, archive, binary download)
    NonText {
        final_url: Url,
        content_type: String,
    },

    /// Server answered with a failing status, after any retries
    HttpError { status_code: u16, attempts: u32 },

    /// Network error (connection refused, timeout, body read failure)
    NetworkError { error: String, attempts: u32 },
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Short description for logs
    pub fn describe(&self) -> String {
        match self {
            Self::Success { status_code, .. } => format!("HTTP {}", status_code),
            Self::NonText { content_type, .. } => format!("non-text content ({})", content_type),
            Self::HttpError {
                status_code,
                attempts,
            } => format!("HTTP {} after {} attempt(s)", status_code, attempts),
            Self::NetworkError { error, attempts } => {
                format!("{} after {} attempt(s)", error, attempts)
            }
        }
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `request_timeout` - Per-request timeout covering connect and read
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use site_harvest::config::UserAgentConfig;
/// use site_harvest::crawler::build_http_client;
/// use std::time::Duration;
///
/// let config = UserAgentConfig {
///     crawler_name: "SiteHarvest".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
/// };
///
/// let client = build_http_client(&config, Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    request_timeout: Duration,
) -> Result<Client, reqwest::Error> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        header::HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        ),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        header::HeaderValue::from_static("en-US,en;q=0.9"),
    );

    Client::builder()
        .user_agent(config.header_value())
        .default_headers(headers)
        .timeout(request_timeout)
        .connect_timeout(request_timeout)
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Returns true if the Content-Type names a text format worth parsing
///
/// A missing header is treated as text.
pub fn is_text_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    mime.is_empty()
        || mime.starts_with("text/")
        || mime.contains("html")
        || mime.contains("xml")
        || mime.contains("json")
}

/// Outcome of a single request attempt
enum Attempt {
    Done(FetchResult),
    Transient { status_code: Option<u16>, error: String },
}

/// Fetches a page with retry logic
///
/// # Retry Logic
///
/// | Condition | Action |
/// |-----------|--------|
/// | HTTP 2xx/3xx, text | Success |
/// | Non-text Content-Type | Immediate → NonText |
/// | HTTP 429, 500, 502, 503, 504 | Retry with backoff, then HttpError |
/// | Other HTTP >= 400 | Immediate → HttpError |
/// | Timeout / connection failure | Retry with backoff, then NetworkError |
/// | Redirect loop / too many redirects | Immediate → NetworkError |
///
/// # Arguments
///
/// * `client` - The HTTP client to use
/// * `url` - The URL to fetch
/// * `retry` - Retry policy
///
/// # Returns
///
/// A FetchResult indicating success or the type of failure
pub async fn fetch_page(client: &Client, url: &Url, retry: &RetryPolicy) -> FetchResult {
    let mut attempt: u32 = 0;

    loop {
        let attempts = attempt + 1;
        match fetch_once(client, url, attempts).await {
            Attempt::Done(result) => return result,
            Attempt::Transient { status_code, error } => {
                if attempt >= retry.max_retries {
                    return match status_code {
                        Some(status_code) => FetchResult::HttpError {
                            status_code,
                            attempts,
                        },
                        None => FetchResult::NetworkError { error, attempts },
                    };
                }

                let wait = retry.backoff(attempt);
                tracing::debug!(
                    "Transient failure for {} ({}), retry {} in {:?}",
                    url,
                    error,
                    attempt + 1,
                    wait
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
        }
    }
}

async fn fetch_once(client: &Client, url: &Url, attempts: u32) -> Attempt {
    let started = Instant::now();

    let response = match client.get(url.clone()).send().await {
        Ok(response) => response,
        Err(e) => return classify_error(e, attempts),
    };
    let latency = started.elapsed();

    let status_code = response.status().as_u16();
    if status_code >= 400 {
        if RETRYABLE_STATUSES.contains(&status_code) {
            return Attempt::Transient {
                status_code: Some(status_code),
                error: format!("HTTP {}", status_code),
            };
        }
        return Attempt::Done(FetchResult::HttpError {
            status_code,
            attempts,
        });
    }

    let final_url = response.url().clone();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if !is_text_content_type(&content_type) {
        return Attempt::Done(FetchResult::NonText {
            final_url,
            content_type,
        });
    }

    match response.text().await {
        Ok(body) => Attempt::Done(FetchResult::Success {
            final_url,
            status_code,
            content_type,
            body,
            attempts,
            latency,
        }),
        Err(e) => classify_error(e, attempts),
    }
}

fn classify_error(e: reqwest::Error, attempts: u32) -> Attempt {
    if e.is_timeout() {
        Attempt::Transient {
            status_code: None,
            error: "Request timeout".to_string(),
        }
    } else if e.is_connect() {
        Attempt::Transient {
            status_code: None,
            error: format!("Connection failed: {}", e),
        }
    } else {
        Attempt::Done(FetchResult::NetworkError {
            error: e.to_string(),
            attempts,
        })
    }
}
