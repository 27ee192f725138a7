//! Reachability probe for recovered URLs.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::redirect::Policy;

/// Status codes treated as "the live URL is still dead"; 0 is the sentinel
/// for an unreachable or timed-out probe.
pub const DEAD_STATUSES: [u16; 4] = [0, 403, 404, 410];

pub fn is_dead_status(status: u16) -> bool {
    DEAD_STATUSES.contains(&status)
}

/// Checks whether a URL is reachable. Returns the HTTP status code, or 0
/// when no response could be obtained.
pub trait UrlProbe {
    fn probe(&mut self, url: &str) -> u16;
}

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub timeout_ms: u64,
    pub user_agent: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: crate::config::DEFAULT_PROBE_TIMEOUT_MS,
            user_agent: crate::config::DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Blocking HEAD probe: follows redirects, never fetches a body, and bounds
/// both connect and overall time with the configured timeout. Transport
/// failures of any kind collapse to status 0; the sweep has no retry policy
/// for dead links.
pub struct HttpProbe {
    client: Client,
    user_agent: String,
}

impl HttpProbe {
    pub fn new(config: &ProbeConfig) -> Result<Self> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .redirect(Policy::limited(10))
            .build()
            .context("failed to build probe HTTP client")?;
        Ok(Self {
            client,
            user_agent: config.user_agent.clone(),
        })
    }
}

impl UrlProbe for HttpProbe {
    fn probe(&mut self, url: &str) -> u16 {
        match self
            .client
            .head(url)
            .header("User-Agent", self.user_agent.clone())
            .send()
        {
            Ok(response) => response.status().as_u16(),
            Err(_) => 0,
        }
    }
}
