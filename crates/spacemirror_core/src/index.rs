use anyhow::{Result, bail};

use crate::render::{WrittenPage, escape_html};

const INDEX_STYLE: &str = "<style>\
body{font-family:sans-serif;max-width:60rem;margin:2rem auto;padding:0 1rem}\
input[type=search]{width:100%;padding:.4rem;margin:.5rem 0}\
li{margin:.2rem 0}\
</style>";

const FILTER_SCRIPT: &str = r#"<script>
function filterSpace(listId, query) {
  var needle = query.toLowerCase();
  var items = document.getElementById(listId).getElementsByTagName('li');
  for (var i = 0; i < items.length; i++) {
    var text = items[i].textContent.toLowerCase();
    items[i].style.display = text.indexOf(needle) === -1 ? 'none' : '';
  }
}
</script>"#;

/// Assembles `index.html` one space at a time. Each space gets a heading,
/// a filter box and a list of its pages in the order they were written.
#[derive(Debug)]
pub struct IndexBuilder {
    fragments: Vec<String>,
    preamble_len: usize,
    current: Option<SpaceSection>,
    spaces_seen: usize,
    total: usize,
}

#[derive(Debug)]
struct SpaceSection {
    key: String,
    list_id: String,
    entries: Vec<String>,
}

impl IndexBuilder {
    pub fn new(site_title: &str) -> Self {
        let title = escape_html(site_title);
        let fragments = vec![
            "<!doctype html>".to_string(),
            format!("<html><head><meta charset=\"utf-8\"><title>{title}</title>"),
            INDEX_STYLE.to_string(),
            FILTER_SCRIPT.to_string(),
            "</head><body>".to_string(),
            format!("<h1>{title}</h1>"),
        ];
        let preamble_len = fragments.len();
        Self {
            fragments,
            preamble_len,
            current: None,
            spaces_seen: 0,
            total: 0,
        }
    }

    /// Opens a section for `space`, closing any section still open.
    pub fn begin_space(&mut self, space: &str) {
        self.finish_space();
        // Positional ids keep space keys out of script context.
        let list_id = format!("space-{}", self.spaces_seen);
        self.spaces_seen += 1;
        self.current = Some(SpaceSection {
            key: space.to_string(),
            list_id,
            entries: Vec::new(),
        });
    }

    pub fn push_page(&mut self, page: &WrittenPage) -> Result<()> {
        let Some(section) = self.current.as_mut() else {
            bail!("no index section is open for {}", page.file_name);
        };
        section.entries.push(format!(
            "<li><a href='{}'>{}</a></li>",
            escape_html(&page.file_name),
            escape_html(&page.title)
        ));
        Ok(())
    }

    /// Closes the open section and returns its page count.
    pub fn finish_space(&mut self) -> usize {
        let Some(section) = self.current.take() else {
            return 0;
        };
        let count = section.entries.len();
        let key = escape_html(&section.key);
        self.fragments.push("<section>".to_string());
        self.fragments.push(format!("<h2>{key} ({})</h2>", pages_label(count)));
        self.fragments.push(format!(
            "<input type=\"search\" placeholder=\"Filter {key}\" oninput=\"filterSpace('{}', this.value)\">",
            section.list_id
        ));
        self.fragments.push(format!("<ul id=\"{}\">", section.list_id));
        self.fragments.extend(section.entries);
        self.fragments.push("</ul>".to_string());
        self.fragments.push("</section>".to_string());
        self.total += count;
        count
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn finalize(mut self) -> String {
        self.finish_space();
        let total_line = format!("<p class=\"total\">{} in total</p>", pages_label(self.total));
        self.fragments.insert(self.preamble_len, total_line);
        self.fragments.push("</body></html>".to_string());
        self.fragments.join("\n")
    }
}

fn pages_label(count: usize) -> String {
    if count == 1 {
        "1 page".to_string()
    } else {
        format!("{count} pages")
    }
}
