//! Remote package fetching
//!
//! Downloads package files from `http://`, `https://` and `file://` URLs.
//! Transient failures (connection errors, timeouts, 5xx and 429 responses) are
//! retried with exponential backoff; everything else fails immediately.

use reqwest::blocking::{Client, ClientBuilder};
use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur during URL fetching
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP request failed
    #[error("Failed to download {url}: {source}")]
    HttpError { url: String, source: reqwest::Error },

    /// Non-success HTTP status
    #[error("HTTP {status} for URL: {url}")]
    HttpStatus { status: u16, url: String },

    /// Transient failures persisted through every attempt
    #[error("Failed to download {url} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Content too large
    #[error("Content too large: {size} bytes (max: {max})")]
    ContentTooLarge { size: u64, max: u64 },

    /// HTTP client could not be constructed
    #[error("Failed to create HTTP client: {0}")]
    ClientError(reqwest::Error),
}

/// Maximum size for a downloaded package (50 MB)
pub const MAX_CONTENT_SIZE: u64 = 50 * 1024 * 1024;

/// HTTP client configuration
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Retry schedule for transient download failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Retry `max_attempts` times without sleeping
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
        }
    }

    /// Delay to wait after the given zero-based failed attempt
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.initial_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Outcome of a single attempt
enum Attempt {
    Transient(String),
    Fatal(FetchError),
}

/// Blocking URL fetcher
#[derive(Debug, Clone)]
pub struct UrlFetcher {
    client: Client,
    max_size: u64,
    retry: RetryPolicy,
}

impl UrlFetcher {
    /// Create a URL fetcher with a custom retry policy
    pub fn with_retry(retry: RetryPolicy) -> Result<Self, FetchError> {
        Self::from_builder(Client::builder(), retry)
    }

    fn from_builder(builder: ClientBuilder, retry: RetryPolicy) -> Result<Self, FetchError> {
        let client = builder
            .timeout(REQUEST_TIMEOUT)
            .user_agent(format!("origin-pm/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FetchError::ClientError)?;

        Ok(Self {
            client,
            max_size: MAX_CONTENT_SIZE,
            retry,
        })
    }

    /// Fetch content from a URL, retrying transient failures
    pub fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        if let Some(path) = file_url_path(url)? {
            debug!(url, "reading file URL");
            return self.read_local(&path);
        }

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }

        let attempts = self.retry.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            match self.try_fetch(url) {
                Ok(content) => return Ok(content),
                Err(Attempt::Fatal(e)) => return Err(e),
                Err(Attempt::Transient(message)) => {
                    last_error = message;
                    if attempt + 1 < attempts {
                        let delay = self.retry.delay_after(attempt);
                        warn!(url, attempt = attempt + 1, ?delay, error = %last_error, "download failed, retrying");
                        thread::sleep(delay);
                    }
                }
            }
        }

        Err(FetchError::RetriesExhausted {
            url: url.to_string(),
            attempts,
            last_error,
        })
    }

    fn try_fetch(&self, url: &str) -> Result<Vec<u8>, Attempt> {
        let response = self.client.get(url).send().map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                Attempt::Transient(e.to_string())
            } else {
                Attempt::Fatal(FetchError::HttpError {
                    url: url.to_string(),
                    source: e,
                })
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                return Err(Attempt::Transient(format!("HTTP {}", status.as_u16())));
            }
            return Err(Attempt::Fatal(FetchError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            }));
        }

        if let Some(len) = response.content_length() {
            if len > self.max_size {
                return Err(Attempt::Fatal(FetchError::ContentTooLarge {
                    size: len,
                    max: self.max_size,
                }));
            }
        }

        // Read content with size limit
        let mut content = Vec::new();
        let mut reader = response.take(self.max_size + 1);
        reader
            .read_to_end(&mut content)
            .map_err(|e| Attempt::Transient(e.to_string()))?;

        if content.len() as u64 > self.max_size {
            return Err(Attempt::Fatal(FetchError::ContentTooLarge {
                size: content.len() as u64,
                max: self.max_size,
            }));
        }

        Ok(content)
    }

    fn read_local(&self, path: &Path) -> Result<Vec<u8>, FetchError> {
        let size = std::fs::metadata(path)?.len();
        if size > self.max_size {
            return Err(FetchError::ContentTooLarge {
                size,
                max: self.max_size,
            });
        }
        Ok(std::fs::read(path)?)
    }

    /// Fetch and save to a file
    pub fn fetch_to_file(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        let content = self.fetch(url)?;

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(dest, &content)?;
        debug!(url, dest = %dest.display(), bytes = content.len(), "downloaded");
        Ok(())
    }

    /// Fetch the `.sha256` sidecar for `url`
    ///
    /// Accepts both `<hex>` and `<hex>  <filename>` bodies. Any failure yields
    /// `None`; the caller then installs without sidecar verification.
    pub fn fetch_checksum(&self, url: &str) -> Option<String> {
        let sidecar = format!("{}.sha256", url);
        let content = match self.fetch(&sidecar) {
            Ok(content) => content,
            Err(e) => {
                debug!(url = %sidecar, error = %e, "no checksum sidecar");
                return None;
            }
        };

        parse_checksum_file(&String::from_utf8_lossy(&content))
    }
}

/// Parse the body of a `.sha256` file
pub fn parse_checksum_file(body: &str) -> Option<String> {
    let digest = body.split_whitespace().next()?;
    if digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(digest.to_string())
    } else {
        None
    }
}

/// Check whether `source` looks like a URL this fetcher handles
pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://") || source.starts_with("file://")
}

/// Local path for a `file://` URL, `None` for other schemes
fn file_url_path(url: &str) -> Result<Option<std::path::PathBuf>, FetchError> {
    if !url.starts_with("file://") {
        return Ok(None);
    }
    let parsed = url::Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
    parsed
        .to_file_path()
        .map(Some)
        .map_err(|_| FetchError::InvalidUrl(url.to_string()))
}

/// Last path segment of a URL, used as the download's file name
pub fn url_file_name(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let name = parsed.path_segments()?.next_back()?;
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Compute SHA-256 checksum of bytes
pub fn compute_checksum(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Compute SHA-256 checksum of a file
pub fn compute_file_checksum(path: &Path) -> std::io::Result<String> {
    let data = std::fs::read(path)?;
    Ok(compute_checksum(&data))
}

/// Compare hex digests ignoring case
pub fn checksums_match(expected: &str, actual: &str) -> bool {
    expected.trim().eq_ignore_ascii_case(actual.trim())
}
