//! Byte transport for remote and local artwork URLs.

use std::fs::File;
use std::io::{BufReader, Read};
use std::time::Duration;

use crate::error::{CacheError, Result};

/// Default read buffer (8 KiB)
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

/// Default download cap (8 MiB)
pub const DEFAULT_MAX_BYTES: u64 = 8 * 1024 * 1024;

/// Fetches the raw bytes behind a URL.
///
/// Implementations block; they are only called from worker units.
pub trait Fetcher: Send + Sync {
    /// Download `url` in full or fail. Partial bodies are never returned.
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Transport settings for [`HttpFetcher`]
#[derive(Debug, Clone)]
pub struct HttpOptions {
    /// Whole-request timeout
    pub timeout: Duration,
    /// Capacity of the read buffer
    pub buffer_size: usize,
    /// Bodies larger than this are rejected
    pub max_bytes: u64,
    /// Sent as `User-Agent`
    pub user_agent: String,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_bytes: DEFAULT_MAX_BYTES,
            user_agent: format!("artcache/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// `ureq` backed fetcher that also understands `file://` URLs.
pub struct HttpFetcher {
    agent: ureq::Agent,
    options: HttpOptions,
}

impl HttpFetcher {
    /// Build a fetcher with its own connection pool.
    pub fn new(options: HttpOptions) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(options.timeout)
            .user_agent(&options.user_agent)
            .build();
        Self { agent, options }
    }

    fn fetch_http(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.agent.get(url).call().map_err(|e| match e {
            ureq::Error::Status(code, _) => fetch_error(url, format!("HTTP {code}")),
            ureq::Error::Transport(t) => fetch_error(url, t.to_string()),
        })?;

        if let Some(len) = response
            .header("Content-Length")
            .and_then(|l| l.parse::<u64>().ok())
            && len > self.options.max_bytes
        {
            return Err(fetch_error(
                url,
                format!("body of {len} bytes exceeds {}", self.options.max_bytes),
            ));
        }

        read_bounded(response.into_reader(), url, &self.options)
    }

    fn fetch_file(&self, url: &str, path: &str) -> Result<Vec<u8>> {
        let path = urlencoding::decode(path).map_err(|e| fetch_error(url, e.to_string()))?;
        let file = File::open(path.as_ref()).map_err(|e| fetch_error(url, e.to_string()))?;
        read_bounded(file, url, &self.options)
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(HttpOptions::default())
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        tracing::debug!("Fetching artwork: {url}");
        match url.strip_prefix("file://") {
            Some(path) => self.fetch_file(url, path),
            None => self.fetch_http(url),
        }
    }
}

fn fetch_error(url: &str, reason: impl Into<String>) -> CacheError {
    CacheError::Fetch {
        url: url.to_string(),
        reason: reason.into(),
    }
}

/// Read a whole body through a fixed-size buffer, refusing oversized bodies.
fn read_bounded(source: impl Read, url: &str, options: &HttpOptions) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    BufReader::with_capacity(options.buffer_size, source)
        .take(options.max_bytes.saturating_add(1))
        .read_to_end(&mut body)
        .map_err(|e| fetch_error(url, e.to_string()))?;
    if body.len() as u64 > options.max_bytes {
        return Err(fetch_error(
            url,
            format!("body exceeds {} bytes", options.max_bytes),
        ));
    }
    if body.is_empty() {
        return Err(fetch_error(url, "empty body"));
    }
    Ok(body)
}
