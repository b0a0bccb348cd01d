//! Probe executor - one HTTP GET per firing
//!
//! The prober issues a single GET against a normalized URL, following
//! redirects, and reports the status code and the wall-clock latency until
//! the full body has been read. Transport failures (timeout, DNS, refused
//! connection, TLS, broken body) are not errors: they come back as an
//! unreachable result with neither status nor latency.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, instrument, trace};

/// Default timeout for one probe request
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum number of redirects followed per probe
const MAX_REDIRECTS: usize = 10;

/// Outcome of one probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    /// HTTP status of the final response (None = no response)
    pub status_code: Option<u16>,

    /// Milliseconds from request start to full response (None = no response)
    pub latency_ms: Option<u64>,
}

impl ProbeResult {
    /// The endpoint could not be reached
    pub fn unreachable() -> Self {
        Self {
            status_code: None,
            latency_ms: None,
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.status_code.is_some()
    }
}

/// HTTP prober
///
/// Holds one `reqwest::Client` (reused across requests for connection
/// pooling). Cheap to share behind an `Arc` and safe to call concurrently.
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpProber {
    /// Create a prober with the given request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .user_agent(concat!("uptime-monitoring/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Probe the URL once
    ///
    /// Never fails: any transport-level error yields [`ProbeResult::unreachable`].
    #[instrument(skip(self))]
    pub async fn probe(&self, url: &str) -> ProbeResult {
        let start = Instant::now();

        match self.execute_request(url).await {
            Ok(status_code) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                trace!("{url}: status {status_code} in {latency_ms}ms");
                ProbeResult {
                    status_code: Some(status_code),
                    latency_ms: Some(latency_ms),
                }
            }
            Err(e) => {
                debug!("{url}: probe failed after {:?}: {:#}", start.elapsed(), e);
                ProbeResult::unreachable()
            }
        }
    }

    /// Execute the GET and read the full body
    ///
    /// Returns the final status code on success
    async fn execute_request(&self, url: &str) -> Result<u16> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("HTTP request failed")?;

        let status_code = response.status().as_u16();

        response
            .bytes()
            .await
            .context("Failed to read response body")?;

        Ok(status_code)
    }
}
