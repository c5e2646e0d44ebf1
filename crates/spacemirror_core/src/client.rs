use std::fmt;
use std::thread::sleep;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde_json::Value;
use tracing::debug;

use crate::config::ExportConfig;

/// Read-only access to the Confluence REST API. Fetch logic is generic over
/// this so it can run against an in-memory double.
pub trait ConfluenceReadApi {
    fn get_json(&mut self, url: &Url) -> Result<Value>;
    fn request_count(&self) -> usize;
}

#[derive(Clone)]
pub struct ConfluenceClientConfig {
    pub username: String,
    pub token: String,
    pub user_agent: String,
    pub timeout_ms: Option<u64>,
    pub request_delay_ms: u64,
}

impl fmt::Debug for ConfluenceClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfluenceClientConfig")
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .field("user_agent", &self.user_agent)
            .field("timeout_ms", &self.timeout_ms)
            .field("request_delay_ms", &self.request_delay_ms)
            .finish()
    }
}

impl ConfluenceClientConfig {
    pub fn from_export_config(config: &ExportConfig) -> Self {
        Self {
            username: config.username.clone(),
            token: config.token.clone(),
            user_agent: config.user_agent.clone(),
            timeout_ms: config.timeout_ms,
            request_delay_ms: config.request_delay_ms,
        }
    }
}

/// Blocking HTTP session: basic auth and JSON accept header on every call,
/// with a fixed courtesy delay between consecutive requests.
pub struct ConfluenceClient {
    client: Client,
    config: ConfluenceClientConfig,
    last_request_at: Option<Instant>,
    request_count: usize,
}

impl ConfluenceClient {
    pub fn new(config: ConfluenceClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let mut builder = Client::builder()
            .default_headers(headers)
            .user_agent(config.user_agent.clone());
        if let Some(timeout_ms) = config.timeout_ms {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }
        let client = builder
            .build()
            .context("failed to build Confluence HTTP client")?;

        Ok(Self {
            client,
            config,
            last_request_at: None,
            request_count: 0,
        })
    }

    fn apply_rate_limit(&mut self) {
        let delay = Duration::from_millis(self.config.request_delay_ms);
        if let Some(last) = self.last_request_at {
            let elapsed = last.elapsed();
            if elapsed < delay {
                sleep(delay - elapsed);
            }
        }
        self.last_request_at = Some(Instant::now());
        self.request_count += 1;
    }
}

impl ConfluenceReadApi for ConfluenceClient {
    fn get_json(&mut self, url: &Url) -> Result<Value> {
        self.apply_rate_limit();
        debug!(%url, request = self.request_count, "GET");

        let response = self
            .client
            .get(url.clone())
            .basic_auth(&self.config.username, Some(&self.config.token))
            .send()
            .with_context(|| format!("failed to call Confluence API at {url}"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("Confluence API request to {url} failed with HTTP {status}");
        }

        response
            .json::<Value>()
            .with_context(|| format!("failed to decode Confluence API JSON from {url}"))
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}
