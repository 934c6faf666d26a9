//! Blocking HTTP client with a bounded timeout and an optional delay between
//! requests. Every network access in the pipeline goes through [HttpClient].

use std::time::{Duration, Instant};
use thiserror::Error;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; feedbook/0.1)";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_REDIRECTS: usize = 10;

/// Fetch failure carrying the URL and reason. All variants are per-URL; the
/// caller decides whether the failure is fatal (feed) or skippable (article,
/// image, favicon).
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid URL: {input}: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("Network error: could not reach {url}: {source}")]
    Network { url: String, source: reqwest::Error },

    #[error("HTTP {status} when fetching: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Failed to read response body from {url}: {source}")]
    BodyRead { url: String, source: reqwest::Error },
}

/// Successful fetch: body bytes plus the Content-Type header, if any.
#[derive(Debug)]
pub struct Fetched {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Blocking HTTP client. Enforces the configured delay between consecutive
/// requests so a run does not hammer one host.
#[derive(Debug)]
pub struct HttpClient {
    inner: reqwest::blocking::Client,
    delay: Duration,
    last_request: Option<Instant>,
}

impl HttpClient {
    /// Build a client with default User-Agent, timeout, and no delay.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::builder().build()
    }

    /// Builder for custom User-Agent, timeout, and delay.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// GET the URL and return body bytes plus Content-Type. Non-2xx status
    /// is an error; redirects are followed up to a fixed limit.
    pub fn fetch(&mut self, url: &str) -> Result<Fetched, FetchError> {
        self.wait_delay();
        let response = self
            .inner
            .get(url)
            .send()
            .map_err(|e| FetchError::Network {
                url: url.to_string(),
                source: e,
            })?;
        self.last_request = Some(Instant::now());

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let bytes = response
            .bytes()
            .map_err(|e| FetchError::BodyRead {
                url: url.to_string(),
                source: e,
            })?
            .to_vec();
        Ok(Fetched {
            bytes,
            content_type,
        })
    }

    fn wait_delay(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.delay {
                std::thread::sleep(self.delay - elapsed);
            }
        }
    }
}

/// Builder for [HttpClient].
#[derive(Debug)]
pub struct HttpClientBuilder {
    user_agent: Option<String>,
    delay_secs: u64,
    timeout_secs: u64,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            user_agent: None,
            delay_secs: 0,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl HttpClientBuilder {
    /// Set a custom User-Agent. If not set, a browser-like default is used.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Set delay between requests in seconds. Default 0.
    pub fn delay_secs(mut self, secs: u64) -> Self {
        self.delay_secs = secs;
        self
    }

    /// Set request timeout in seconds. Default 30.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn build(self) -> Result<HttpClient, reqwest::Error> {
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let inner = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(self.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(HttpClient {
            inner,
            delay: Duration::from_secs(self.delay_secs),
            last_request: None,
        })
    }
}
