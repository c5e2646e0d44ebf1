use std::collections::HashSet;

use anyhow::{Context, Result, bail};
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::client::ConfluenceReadApi;

pub const SEARCH_PAGE_LIMIT: usize = 200;
pub const SEARCH_EXPAND: &str = "content.body.export_view";
pub const CONTENT_EXPAND: &str = "body.export_view";
pub const UNTITLED: &str = "Untitled";

/// One page as returned by the search listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRecord {
    pub id: Option<String>,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodySource {
    Embedded,
    Fallback,
    Missing,
    FallbackFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBody {
    pub html: String,
    pub source: BodySource,
    pub warning: Option<String>,
}

/// Content search for every page in `space`, expanded with the export view.
pub fn search_url(base_url: &str, space: &str) -> Result<Url> {
    let mut url = api_url(base_url, "/rest/api/search")?;
    url.query_pairs_mut()
        .append_pair("cql", &format!("space=\"{space}\" AND type=page"))
        .append_pair("limit", &SEARCH_PAGE_LIMIT.to_string())
        .append_pair("expand", SEARCH_EXPAND);
    Ok(url)
}

pub fn content_url(base_url: &str, id: &str) -> Result<Url> {
    let mut url = api_url(base_url, &format!("/rest/api/content/{id}"))?;
    url.query_pairs_mut().append_pair("expand", CONTENT_EXPAND);
    Ok(url)
}

/// Continuation links are relative to the base URL including its context
/// path (`/wiki` on cloud instances), so they are appended rather than joined.
pub fn resolve_next_link(base_url: &str, next: &str) -> Result<Url> {
    let next = next.trim();
    if next.starts_with("http://") || next.starts_with("https://") {
        return Url::parse(next).with_context(|| format!("invalid continuation link: {next}"));
    }
    api_url(base_url, &format!("/{}", next.trim_start_matches('/')))
}

/// The search API does not always carry `expand` over into `_links.next`.
pub fn ensure_expand(mut url: Url, expand: &str) -> Url {
    if !url.query_pairs().any(|(key, _)| key == "expand") {
        url.query_pairs_mut().append_pair("expand", expand);
    }
    url
}

pub fn fetch_all_pages<A: ConfluenceReadApi>(
    api: &mut A,
    base_url: &str,
    space: &str,
) -> Result<Vec<PageRecord>> {
    let mut records = Vec::new();
    let mut visited = HashSet::new();
    let mut next_url = Some(search_url(base_url, space)?);

    while let Some(url) = next_url.take() {
        if !visited.insert(url.to_string()) {
            bail!("search for space {space} repeated continuation link {url}");
        }
        let response = api
            .get_json(&url)
            .with_context(|| format!("failed to list pages in space {space}"))?;
        let parsed: SearchResponse = serde_json::from_value(response)
            .with_context(|| format!("failed to decode search response for space {space}"))?;

        let batch = parsed.results.len();
        records.extend(parsed.results.into_iter().map(SearchResult::into_record));
        debug!(space, batch, total = records.len(), "fetched search page");

        next_url = match parsed
            .links
            .and_then(|links| links.next)
            .filter(|next| !next.trim().is_empty())
        {
            Some(next) => Some(ensure_expand(
                resolve_next_link(base_url, &next)?,
                SEARCH_EXPAND,
            )),
            None => None,
        };
    }

    Ok(records)
}

/// Prefer the embedded export view; otherwise fetch the page directly. A
/// failed direct fetch degrades to an empty body with a warning.
pub fn resolve_body<A: ConfluenceReadApi>(
    api: &mut A,
    base_url: &str,
    record: &PageRecord,
) -> ResolvedBody {
    if !record.body.is_empty() {
        return ResolvedBody {
            html: record.body.clone(),
            source: BodySource::Embedded,
            warning: None,
        };
    }
    let Some(id) = record.id.as_deref() else {
        return ResolvedBody {
            html: String::new(),
            source: BodySource::Missing,
            warning: None,
        };
    };

    match fetch_body_by_id(api, base_url, id) {
        Ok(Some(html)) => ResolvedBody {
            html,
            source: BodySource::Fallback,
            warning: None,
        },
        Ok(None) => ResolvedBody {
            html: String::new(),
            source: BodySource::Missing,
            warning: None,
        },
        Err(error) => {
            warn!(
                id,
                title = %record.title,
                error = %format!("{error:#}"),
                "could not fetch page body"
            );
            ResolvedBody {
                html: String::new(),
                source: BodySource::FallbackFailed,
                warning: Some(format!(
                    "could not fetch body for page {id} ({}): {error:#}",
                    record.title
                )),
            }
        }
    }
}

fn fetch_body_by_id<A: ConfluenceReadApi>(
    api: &mut A,
    base_url: &str,
    id: &str,
) -> Result<Option<String>> {
    let url = content_url(base_url, id)?;
    let response = api.get_json(&url)?;
    let parsed: ContentPayload =
        serde_json::from_value(response).context("failed to decode content response")?;
    Ok(parsed.export_view().filter(|body| !body.is_empty()))
}

fn api_url(base_url: &str, path: &str) -> Result<Url> {
    let raw = format!("{}{path}", base_url.trim_end_matches('/'));
    Url::parse(&raw).with_context(|| format!("invalid Confluence API URL: {raw}"))
}

#[derive(Debug, Deserialize, Default)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
    #[serde(default, rename = "_links")]
    links: Option<LinksPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct LinksPayload {
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    content: Option<ContentPayload>,
    #[serde(flatten)]
    inline: ContentPayload,
}

impl SearchResult {
    fn into_record(self) -> PageRecord {
        self.content.unwrap_or(self.inline).into_record()
    }
}

#[derive(Debug, Deserialize, Default)]
struct ContentPayload {
    id: Option<Value>,
    title: Option<String>,
    body: Option<BodyPayload>,
}

impl ContentPayload {
    fn export_view(&self) -> Option<String> {
        self.body
            .as_ref()
            .and_then(|body| body.export_view.as_ref())
            .and_then(|view| view.value.clone())
    }

    fn into_record(self) -> PageRecord {
        let body = self.export_view().unwrap_or_default();
        let id = match self.id {
            Some(Value::String(id)) if !id.trim().is_empty() => Some(id),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        };
        PageRecord {
            id,
            title: self.title.unwrap_or_else(|| UNTITLED.to_string()),
            body,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct BodyPayload {
    export_view: Option<ExportViewPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct ExportViewPayload {
    value: Option<String>,
}
