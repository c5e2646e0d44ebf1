use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Result, anyhow, bail};
use reqwest::Url;
use serde_json::Value;

use crate::client::ConfluenceReadApi;

pub(crate) const BASE_URL: &str = "https://example.atlassian.net/wiki";

/// Serves canned JSON keyed by full request URL and records every request.
#[derive(Default)]
pub(crate) struct MockApi {
    responses: BTreeMap<String, Value>,
    failures: BTreeSet<String>,
    pub(crate) requested: Vec<String>,
}

impl MockApi {
    pub(crate) fn respond(&mut self, url: &Url, body: Value) {
        self.responses.insert(url.to_string(), body);
    }

    pub(crate) fn fail(&mut self, url: &Url) {
        self.failures.insert(url.to_string());
    }

    pub(crate) fn requests_to(&self, url: &Url) -> usize {
        let key = url.to_string();
        self.requested.iter().filter(|item| **item == key).count()
    }
}

impl ConfluenceReadApi for MockApi {
    fn get_json(&mut self, url: &Url) -> Result<Value> {
        let key = url.to_string();
        self.requested.push(key.clone());
        if self.failures.contains(&key) {
            bail!("Confluence API request to {key} failed with HTTP 500 Internal Server Error");
        }
        self.responses
            .get(&key)
            .cloned()
            .ok_or_else(|| anyhow!("unexpected request: {key}"))
    }

    fn request_count(&self) -> usize {
        self.requested.len()
    }
}
