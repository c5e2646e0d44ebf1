use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILENAME: &str = "spacemirror.toml";
pub const DEFAULT_OUT_DIR: &str = "docs";
pub const DEFAULT_SITE_TITLE: &str = "Confluence export";
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 200;
pub const DEFAULT_USER_AGENT: &str = concat!("spacemirror/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct FileConfig {
    #[serde(default)]
    pub confluence: ConfluenceSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ConfluenceSection {
    pub base_url: Option<String>,
    pub username: Option<String>,
    pub token: Option<String>,
    #[serde(default)]
    pub spaces: Vec<String>,
    pub out_dir: Option<PathBuf>,
    pub site_title: Option<String>,
    pub request_delay_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
    pub user_agent: Option<String>,
}

/// Values supplied on the command line. They win over env and file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub out_dir: Option<PathBuf>,
    pub site_title: Option<String>,
    pub spaces: Option<Vec<String>>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct ExportConfig {
    pub base_url: String,
    pub username: String,
    pub token: String,
    pub spaces: Vec<String>,
    pub out_dir: PathBuf,
    pub site_title: String,
    pub request_delay_ms: u64,
    pub timeout_ms: Option<u64>,
    pub user_agent: String,
}

impl fmt::Debug for ExportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .field("spaces", &self.spaces)
            .field("out_dir", &self.out_dir)
            .field("site_title", &self.site_title)
            .field("request_delay_ms", &self.request_delay_ms)
            .field("timeout_ms", &self.timeout_ms)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl ExportConfig {
    /// Resolve every setting: flag > env > config file > default.
    pub fn resolve(file: &FileConfig, overrides: &ConfigOverrides) -> Result<Self> {
        Self::resolve_with_lookup(file, overrides, |key| env::var(key).ok())
    }

    pub fn resolve_with_lookup<F>(
        file: &FileConfig,
        overrides: &ConfigOverrides,
        lookup_env: F,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| non_blank(lookup_env(key).as_deref());
        let section = &file.confluence;

        let base_url = lookup("CONFLUENCE_BASE")
            .or_else(|| non_blank(section.base_url.as_deref()))
            .map(|value| value.trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty());
        let username = lookup("CONFLUENCE_USER").or_else(|| non_blank(section.username.as_deref()));
        let token = lookup("CONFLUENCE_TOKEN").or_else(|| non_blank(section.token.as_deref()));

        // A source only counts when it yields at least one key.
        let mut spaces = overrides
            .spaces
            .as_ref()
            .map(|spaces| normalize_space_list(spaces.iter().map(String::as_str)))
            .unwrap_or_default();
        for key in ["CONFLUENCE_SPACES", "CONFLUENCE_SPACE"] {
            if spaces.is_empty()
                && let Some(raw) = lookup(key)
            {
                spaces = parse_space_list(&raw);
            }
        }
        if spaces.is_empty() {
            spaces = normalize_space_list(section.spaces.iter().map(String::as_str));
        }

        let (base_url, username, token) = match (base_url, username, token) {
            (Some(base_url), Some(username), Some(token)) if !spaces.is_empty() => {
                (base_url, username, token)
            }
            (base_url, username, token) => {
                let mut missing = Vec::new();
                if base_url.is_none() {
                    missing.push("CONFLUENCE_BASE");
                }
                if username.is_none() {
                    missing.push("CONFLUENCE_USER");
                }
                if token.is_none() {
                    missing.push("CONFLUENCE_TOKEN");
                }
                if spaces.is_empty() {
                    missing.push("CONFLUENCE_SPACES");
                }
                bail!("missing required configuration: {}", missing.join(", "));
            }
        };

        let out_dir = overrides
            .out_dir
            .clone()
            .or_else(|| lookup("SPACEMIRROR_OUT_DIR").map(PathBuf::from))
            .or_else(|| section.out_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUT_DIR));
        let site_title = overrides
            .site_title
            .as_deref()
            .and_then(|value| non_blank(Some(value)))
            .or_else(|| lookup("SPACEMIRROR_SITE_TITLE"))
            .or_else(|| non_blank(section.site_title.as_deref()))
            .unwrap_or_else(|| DEFAULT_SITE_TITLE.to_string());
        let request_delay_ms = parse_u64(&lookup, "CONFLUENCE_REQUEST_DELAY_MS")?
            .or(section.request_delay_ms)
            .unwrap_or(DEFAULT_REQUEST_DELAY_MS);
        let timeout_ms = parse_u64(&lookup, "CONFLUENCE_HTTP_TIMEOUT_MS")?.or(section.timeout_ms);
        let user_agent = lookup("CONFLUENCE_USER_AGENT")
            .or_else(|| non_blank(section.user_agent.as_deref()))
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

        Ok(Self {
            base_url,
            username,
            token,
            spaces,
            out_dir,
            site_title,
            request_delay_ms,
            timeout_ms,
            user_agent,
        })
    }
}

/// Load the TOML config file. A missing file yields the default config
/// unless `required` is set.
pub fn load_config(config_path: &Path, required: bool) -> Result<FileConfig> {
    if !config_path.exists() {
        if required {
            bail!("config file not found: {}", config_path.display());
        }
        return Ok(FileConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: FileConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

/// Split a comma-separated space list, dropping blanks and repeats.
pub fn parse_space_list(raw: &str) -> Vec<String> {
    normalize_space_list(raw.split(','))
}

fn normalize_space_list<'a, I>(keys: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut spaces: Vec<String> = Vec::new();
    for key in keys {
        let key = key.trim();
        if !key.is_empty() && !spaces.iter().any(|existing| existing == key) {
            spaces.push(key.to_string());
        }
    }
    spaces
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

fn parse_u64<F>(lookup: &F, key: &str) -> Result<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| {
            value
                .parse::<u64>()
                .with_context(|| format!("{key} must be a non-negative integer, got `{value}`"))
        })
        .transpose()
}
