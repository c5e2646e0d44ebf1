use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::client::ConfluenceReadApi;
use crate::config::ExportConfig;
use crate::fetch::{BodySource, fetch_all_pages, resolve_body};
use crate::index::IndexBuilder;
use crate::render::write_page;

pub const INDEX_FILENAME: &str = "index.html";
pub const ROBOTS_FILENAME: &str = "robots.txt";
pub const ROBOTS_TXT: &str = "User-agent: *\nAllow: /\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceSummary {
    pub space: String,
    pub written: usize,
    pub skipped: usize,
    /// Pages whose body came from the by-id fallback request.
    pub fetched_bodies: usize,
}

#[derive(Debug, Clone)]
pub struct ExportReport {
    pub out_dir: PathBuf,
    pub spaces: Vec<SpaceSummary>,
    pub total_written: usize,
    pub warnings: Vec<String>,
    pub request_count: usize,
}

/// Mirror every configured space into `config.out_dir`. Any fetch or write
/// error aborts the run; files already written stay on disk.
pub fn export_spaces<A: ConfluenceReadApi>(
    config: &ExportConfig,
    api: &mut A,
) -> Result<ExportReport> {
    let out_dir = config.out_dir.as_path();
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    let mut index = IndexBuilder::new(&config.site_title);
    let mut report = ExportReport {
        out_dir: out_dir.to_path_buf(),
        spaces: Vec::with_capacity(config.spaces.len()),
        total_written: 0,
        warnings: Vec::new(),
        request_count: 0,
    };

    for space in &config.spaces {
        info!(space = %space, "fetching pages");
        let records = fetch_all_pages(api, &config.base_url, space)?;
        index.begin_space(space);

        let mut skipped = 0;
        let mut fetched_bodies = 0;
        for record in &records {
            let Some(id) = record.id.as_deref() else {
                warn!(space = %space, title = %record.title, "skipping page without id");
                report.warnings.push(format!(
                    "{space}: skipped page without id ({})",
                    record.title
                ));
                skipped += 1;
                continue;
            };

            let body = resolve_body(api, &config.base_url, record);
            if body.source == BodySource::Fallback {
                fetched_bodies += 1;
            }
            if let Some(warning) = body.warning {
                report.warnings.push(format!("{space}: {warning}"));
            }
            let written = write_page(out_dir, space, id, &record.title, &body.html)?;
            index.push_page(&written)?;
        }

        let written = index.finish_space();
        info!(space = %space, written, skipped, fetched_bodies, "space exported");
        report.spaces.push(SpaceSummary {
            space: space.clone(),
            written,
            skipped,
            fetched_bodies,
        });
    }

    report.total_written = index.total();
    write_text(&out_dir.join(INDEX_FILENAME), &index.finalize())?;
    write_text(&out_dir.join(ROBOTS_FILENAME), ROBOTS_TXT)?;
    report.request_count = api.request_count();
    info!(total = report.total_written, requests = report.request_count, "export finished");
    Ok(report)
}

fn write_text(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};
    use tempfile::tempdir;

    use super::*;
    use crate::fetch::{SEARCH_EXPAND, content_url, ensure_expand, resolve_next_link, search_url};
    use crate::test_support::{BASE_URL, MockApi};

    fn config(out_dir: &Path, spaces: &[&str]) -> ExportConfig {
        ExportConfig {
            base_url: BASE_URL.to_string(),
            username: "bot".to_string(),
            token: "secret".to_string(),
            spaces: spaces.iter().map(ToString::to_string).collect(),
            out_dir: out_dir.to_path_buf(),
            site_title: "Manual".to_string(),
            request_delay_ms: 0,
            timeout_ms: None,
            user_agent: "spacemirror-test".to_string(),
        }
    }

    fn hit(id: &str, title: &str, body: &str) -> Value {
        json!({
            "content": {
                "id": id,
                "title": title,
                "body": { "export_view": { "value": body } }
            }
        })
    }

    fn list_items_in_section(html: &str, list_id: &str) -> usize {
        let start = html
            .find(&format!("<ul id=\"{list_id}\">"))
            .expect("list start");
        let end = start + html[start..].find("</ul>").expect("list end");
        html[start..end].matches("<li>").count()
    }

    #[test]
    fn single_space_writes_pages_index_and_robots() {
        let temp = tempdir().expect("tempdir");
        let out_dir = temp.path().join("site");
        let mut api = MockApi::default();
        api.respond(
            &search_url(BASE_URL, "DOCS").expect("url"),
            json!({
                "results": [hit("1", "Intro", "<p>intro</p>"), hit("2", "Setup", "<p>setup</p>")]
            }),
        );

        let report = export_spaces(&config(&out_dir, &["DOCS"]), &mut api).expect("export");

        assert_eq!(report.total_written, 2);
        assert_eq!(
            report.spaces,
            vec![SpaceSummary {
                space: "DOCS".to_string(),
                written: 2,
                skipped: 0,
                fetched_bodies: 0,
            }]
        );
        assert!(report.warnings.is_empty());
        assert_eq!(report.request_count, 1);
        assert!(out_dir.join("DOCS-1.html").exists());
        assert!(out_dir.join("DOCS-2.html").exists());

        let index = fs::read_to_string(out_dir.join(INDEX_FILENAME)).expect("index");
        assert!(index.contains("<li><a href='DOCS-1.html'>Intro</a></li>"));
        assert!(index.contains("<li><a href='DOCS-2.html'>Setup</a></li>"));
        let robots = fs::read_to_string(out_dir.join(ROBOTS_FILENAME)).expect("robots");
        assert_eq!(robots, "User-agent: *\nAllow: /\n");
    }

    #[test]
    fn index_counts_match_files_per_space() {
        let temp = tempdir().expect("tempdir");
        let out_dir = temp.path().to_path_buf();
        let mut api = MockApi::default();
        api.respond(
            &search_url(BASE_URL, "DOCS").expect("url"),
            json!({ "results": [hit("1", "A", "a"), hit("2", "B", "b"), hit("3", "C", "c")] }),
        );
        api.respond(
            &search_url(BASE_URL, "OPS").expect("url"),
            json!({ "results": [hit("10", "Runbook", "r")] }),
        );

        let report = export_spaces(&config(&out_dir, &["DOCS", "OPS"]), &mut api).expect("export");

        let index = fs::read_to_string(out_dir.join(INDEX_FILENAME)).expect("index");
        for (position, summary) in report.spaces.iter().enumerate() {
            let prefix = format!("{}-", summary.space);
            let files = fs::read_dir(&out_dir)
                .expect("read dir")
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_name().to_string_lossy().starts_with(&prefix))
                .count();
            assert_eq!(files, summary.written);
            assert_eq!(
                list_items_in_section(&index, &format!("space-{position}")),
                summary.written
            );
        }
        let sum: usize = report.spaces.iter().map(|summary| summary.written).sum();
        assert_eq!(report.total_written, sum);
        assert!(index.contains("<p class=\"total\">4 pages in total</p>"));
    }

    #[test]
    fn paginated_results_are_all_written_in_request_order() {
        let temp = tempdir().expect("tempdir");
        let mut api = MockApi::default();
        let second_link = "/rest/api/search?cql=space%3D%22DOCS%22&cursor=2";
        let third_link = "/rest/api/search?cql=space%3D%22DOCS%22&cursor=3";
        api.respond(
            &search_url(BASE_URL, "DOCS").expect("url"),
            json!({ "results": [hit("1", "First", "1")], "_links": { "next": second_link } }),
        );
        api.respond(
            &ensure_expand(resolve_next_link(BASE_URL, second_link).expect("url"), SEARCH_EXPAND),
            json!({ "results": [hit("2", "Second", "2")], "_links": { "next": third_link } }),
        );
        api.respond(
            &ensure_expand(resolve_next_link(BASE_URL, third_link).expect("url"), SEARCH_EXPAND),
            json!({ "results": [hit("3", "Third", "3")], "_links": { "base": BASE_URL } }),
        );

        let report = export_spaces(&config(temp.path(), &["DOCS"]), &mut api).expect("export");

        assert_eq!(api.request_count(), 3);
        assert_eq!(report.total_written, 3);
        let index = fs::read_to_string(temp.path().join(INDEX_FILENAME)).expect("index");
        let first = index.find("DOCS-1.html").expect("first");
        let second = index.find("DOCS-2.html").expect("second");
        let third = index.find("DOCS-3.html").expect("third");
        assert!(first < second && second < third);
    }

    #[test]
    fn escaped_title_with_verbatim_body() {
        let temp = tempdir().expect("tempdir");
        let mut api = MockApi::default();
        api.respond(
            &search_url(BASE_URL, "DOCS").expect("url"),
            json!({ "results": [hit("5", "A & B <Test>", "<div class=\"x\">a & b</div>")] }),
        );

        export_spaces(&config(temp.path(), &["DOCS"]), &mut api).expect("export");

        let page = fs::read_to_string(temp.path().join("DOCS-5.html")).expect("page");
        assert!(page.contains("<title>A &amp; B &lt;Test&gt;</title>"));
        assert!(page.contains("<h1>A &amp; B &lt;Test&gt;</h1>"));
        assert!(page.ends_with("<div class=\"x\">a & b</div>"));
    }

    #[test]
    fn missing_body_uses_fallback_and_failures_only_warn() {
        let temp = tempdir().expect("tempdir");
        let mut api = MockApi::default();
        api.respond(
            &search_url(BASE_URL, "DOCS").expect("url"),
            json!({
                "results": [
                    hit("1", "Late", ""),
                    hit("2", "Broken", ""),
                    hit("3", "Fine", "<p>ok</p>")
                ]
            }),
        );
        let late = content_url(BASE_URL, "1").expect("url");
        let broken = content_url(BASE_URL, "2").expect("url");
        api.respond(
            &late,
            json!({ "body": { "export_view": { "value": "<p>late body</p>" } } }),
        );
        api.fail(&broken);

        let report = export_spaces(&config(temp.path(), &["DOCS"]), &mut api).expect("export");

        assert_eq!(api.requests_to(&late), 1);
        assert_eq!(api.requests_to(&broken), 1);
        assert_eq!(api.request_count(), 3);
        assert_eq!(report.total_written, 3);
        assert_eq!(report.spaces[0].fetched_bodies, 1);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("Broken"));

        let late_page = fs::read_to_string(temp.path().join("DOCS-1.html")).expect("late");
        assert!(late_page.ends_with("<h1>Late</h1><p>late body</p>"));
        let broken_page = fs::read_to_string(temp.path().join("DOCS-2.html")).expect("broken");
        assert!(broken_page.ends_with("<h1>Broken</h1>"));
    }

    #[test]
    fn records_without_id_are_skipped() {
        let temp = tempdir().expect("tempdir");
        let mut api = MockApi::default();
        api.respond(
            &search_url(BASE_URL, "DOCS").expect("url"),
            json!({ "results": [{ "content": { "title": "Ghost" } }, hit("1", "Real", "r")] }),
        );

        let report = export_spaces(&config(temp.path(), &["DOCS"]), &mut api).expect("export");

        assert_eq!(report.spaces[0].written, 1);
        assert_eq!(report.spaces[0].skipped, 1);
        assert!(report.warnings[0].contains("Ghost"));
        let index = fs::read_to_string(temp.path().join(INDEX_FILENAME)).expect("index");
        assert!(!index.contains("Ghost"));
    }

    #[test]
    fn http_failure_aborts_but_keeps_earlier_files() {
        let temp = tempdir().expect("tempdir");
        let mut api = MockApi::default();
        api.respond(
            &search_url(BASE_URL, "DOCS").expect("url"),
            json!({ "results": [hit("1", "Intro", "i")] }),
        );
        api.fail(&search_url(BASE_URL, "OPS").expect("url"));

        let error = export_spaces(&config(temp.path(), &["DOCS", "OPS"]), &mut api)
            .expect_err("must fail");

        assert!(error.to_string().contains("space OPS"));
        assert!(temp.path().join("DOCS-1.html").exists());
        assert!(!temp.path().join(INDEX_FILENAME).exists());
        assert!(!temp.path().join(ROBOTS_FILENAME).exists());
    }
}
