use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenPage {
    pub file_name: String,
    pub title: String,
    pub path: PathBuf,
}

/// Escapes `&`, `<`, `>` and both quote characters.
pub fn escape_html(text: &str) -> String {
    html_escape::encode_quoted_attribute(text).into_owned()
}

// Space keys and page ids are trusted to be filesystem-safe.
pub fn page_file_name(space: &str, id: &str) -> String {
    format!("{space}-{id}.html")
}

/// Standalone page document. The body is the upstream export view and is
/// embedded verbatim.
pub fn render_page(title: &str, body: &str) -> String {
    let title = escape_html(title);
    format!("<!doctype html><meta charset='utf-8'><title>{title}</title><h1>{title}</h1>{body}")
}

pub fn write_page(
    out_dir: &Path,
    space: &str,
    id: &str,
    title: &str,
    body: &str,
) -> Result<WrittenPage> {
    let file_name = page_file_name(space, id);
    let path = out_dir.join(&file_name);
    fs::write(&path, render_page(title, body))
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(WrittenPage {
        file_name,
        title: title.to_string(),
        path,
    })
}
