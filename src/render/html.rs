use crate::error::Result;
use crate::model::RepositoryRecord;
use chrono::{DateTime, Utc};
use log::info;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Debug, Clone, Copy)]
pub struct HtmlOptions {
    /// Add a column for every scalar field of the repository object. On unless the caller asks
    /// for the curated columns only.
    pub raw_fields: bool,
}

impl Default for HtmlOptions {
    fn default() -> Self {
        Self { raw_fields: true }
    }
}

impl HtmlOptions {
    pub fn curated_only() -> Self {
        Self { raw_fields: false }
    }
}

const STYLE: &str = r#"
body { font-family: -apple-system, "Segoe UI", Helvetica, Arial, sans-serif; margin: 1.5em; color: #24292f; }
h1 { font-size: 1.4em; }
.hint { color: #57606a; font-size: 0.9em; }
.table-wrap { max-height: 80vh; overflow: auto; border: 1px solid #d0d7de; }
table { border-collapse: separate; border-spacing: 0; font-size: 0.9em; }
th, td { padding: 4px 10px; border-bottom: 1px solid #d0d7de; white-space: nowrap; background: #fff; }
td.num { text-align: right; }
thead th { position: sticky; top: 0; z-index: 2; background: #f6f8fa; cursor: pointer; user-select: none; }
tbody td:first-child, thead th:first-child { position: sticky; left: 0; z-index: 1; background: #f6f8fa; }
thead th:first-child { z-index: 3; }
tbody tr:hover td { background: #eaeef2; }
th.asc::after { content: " \25B2"; }
th.desc::after { content: " \25BC"; }
.notes, .updated { color: #57606a; font-size: 0.85em; }
"#;

const SORT_SCRIPT: &str = r#"
(function () {
  var table = document.getElementById("summary");
  var headers = table.tHead.rows[0].cells;
  function key(cell) {
    var raw = cell.getAttribute("data-sort");
    var num = parseFloat(raw);
    return raw !== "" && !isNaN(num) && isFinite(raw) ? num : raw.toLowerCase();
  }
  Array.prototype.forEach.call(headers, function (th, index) {
    th.addEventListener("click", function () {
      var asc = !th.classList.contains("asc");
      Array.prototype.forEach.call(headers, function (h) { h.classList.remove("asc", "desc"); });
      th.classList.add(asc ? "asc" : "desc");
      var body = table.tBodies[0];
      var rows = Array.prototype.slice.call(body.rows);
      rows.sort(function (a, b) {
        var x = key(a.cells[index]), y = key(b.cells[index]);
        if (typeof x !== typeof y) { x = String(x); y = String(y); }
        return (x < y ? -1 : x > y ? 1 : 0) * (asc ? 1 : -1);
      });
      rows.forEach(function (row) { body.appendChild(row); });
    });
  });
})();
"#;

struct Cell {
    html: String,
    sort: String,
    numeric: bool,
}

impl Cell {
    fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            html: escape(&value),
            sort: value,
            numeric: false,
        }
    }

    fn number(value: u64) -> Self {
        Self {
            html: value.to_string(),
            sort: value.to_string(),
            numeric: true,
        }
    }

    /// Plain text when there is nothing to link to.
    fn link(href: &str, label: &str) -> Self {
        if href.is_empty() {
            return Self::text(label);
        }
        Self {
            html: format!("<a href=\"{}\">{}</a>", escape(href), escape(label)),
            sort: label.to_string(),
            numeric: false,
        }
    }

    fn date(at: Option<DateTime<Utc>>) -> Self {
        match at {
            Some(at) => Self::text(at.format("%Y-%m-%d").to_string()),
            None => Self::text("N/A"),
        }
    }

    fn render(&self) -> String {
        let class = if self.numeric { " class=\"num\"" } else { "" };
        format!("<td{class} data-sort=\"{}\">{}</td>", escape(&self.sort), self.html)
    }
}

enum Source {
    Derived(fn(&RepositoryRecord) -> Cell),
    Raw(String),
}

struct Column {
    title: String,
    source: Source,
}

impl Column {
    fn derived(title: &str, cell: fn(&RepositoryRecord) -> Cell) -> Self {
        Self {
            title: title.to_string(),
            source: Source::Derived(cell),
        }
    }
}

/// Where the release columns take their data from: the latest release, else the newest tag,
/// else the last commit.
struct Provenance<'a> {
    label: &'a str,
    href: &'a str,
    date: Option<DateTime<Utc>>,
    author: Option<&'a str>,
}

fn provenance(record: &RepositoryRecord) -> Option<Provenance<'_>> {
    if let Some(release) = &record.latest_release {
        return Some(Provenance {
            label: release.name.as_deref().filter(|n| !n.is_empty()).unwrap_or(&release.tag_name),
            href: &release.html_url,
            date: release.created_at,
            author: release.author.as_deref(),
        });
    }
    if let Some(tag) = &record.latest_tag {
        return Some(Provenance {
            label: &tag.name,
            href: &tag.commit.html_url,
            date: tag.commit.date,
            author: tag.commit.author.as_deref(),
        });
    }
    record.last_commit.as_ref().map(|commit| Provenance {
        label: "latest commit",
        href: &commit.html_url,
        date: commit.date,
        author: commit.author.as_deref(),
    })
}

fn default_columns() -> Vec<Column> {
    vec![
        Column::derived("Repository", |r| {
            let href = if r.info.html_url.is_empty() {
                format!("https://github.com/{}/{}", r.organization, r.name)
            } else {
                r.info.html_url.clone()
            };
            Cell::link(&href, &r.name)
        }),
        Column::derived("Archived", |r| Cell::text(if r.info.archived { "yes" } else { "no" })),
        Column::derived("Release/Tag/Commit", |r| match provenance(r) {
            Some(source) => Cell::link(source.href, source.label),
            None => Cell::text("N/A"),
        }),
        Column::derived("Last Released", |r| Cell::date(provenance(r).and_then(|source| source.date))),
        Column::derived("Author", |r| {
            Cell::text(provenance(r).and_then(|source| source.author).unwrap_or("N/A"))
        }),
        Column::derived("Last Commit", |r| Cell::date(r.last_commit.as_ref().and_then(|commit| commit.date))),
        Column::derived("Stars", |r| Cell::number(r.info.stargazers_count)),
        Column::derived("Forks", |r| Cell::number(r.info.forks_count)),
        Column::derived("Contributors", |r| Cell::number(r.contributors.total)),
        Column::derived("Top Contributors", |r| {
            let lines: Vec<String> = r
                .contributors
                .top
                .iter()
                .map(|c| format!("{}: {}", escape(&c.name), c.contributions))
                .collect();
            Cell {
                html: lines.join("<br>"),
                sort: r.contributors.top.first().map(|c| c.name.clone()).unwrap_or_default(),
                numeric: false,
            }
        }),
        Column::derived("License", |r| match &r.info.license {
            Some(license) if !license.name.is_empty() => Cell::text(license.name.clone()),
            _ => Cell::text("None Found"),
        }),
        Column::derived("Open Issues", |r| Cell::number(r.statistics.open_issue_count)),
        Column::derived("Closed Last Week", |r| Cell::number(r.statistics.issues_closed_week)),
        Column::derived("Closed Last Month", |r| Cell::number(r.statistics.issues_closed_month)),
        Column::derived("Avg Issue Time (days)", |r| Cell {
            html: format!("{:.1}", r.statistics.average_issue_days),
            sort: r.statistics.average_issue_days.to_string(),
            numeric: true,
        }),
        Column::derived("Open PRs", |r| Cell::number(r.statistics.open_pull_requests.len() as u64)),
        Column::derived("Commits Last Week", |r| Cell::number(r.statistics.commits_week)),
        Column::derived("Commits Last Month", |r| Cell::number(r.statistics.commits_month)),
    ]
}

/// Scalar field names across all records, in first-seen order.
fn raw_columns(raw: &[Map<String, Value>]) -> Vec<Column> {
    let mut seen = BTreeSet::new();
    let mut columns = Vec::new();
    for fields in raw {
        for (key, value) in fields {
            if is_scalar(value) && seen.insert(key.clone()) {
                columns.push(Column {
                    title: key.clone(),
                    source: Source::Raw(key.clone()),
                });
            }
        }
    }
    columns
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_))
}

fn raw_cell(value: Option<&Value>) -> Cell {
    match value {
        Some(Value::String(s)) => Cell::text(s.clone()),
        Some(Value::Bool(b)) => Cell::text(b.to_string()),
        Some(Value::Number(n)) => Cell {
            html: n.to_string(),
            sort: n.to_string(),
            numeric: true,
        },
        _ => Cell::text(""),
    }
}

/// Build the complete, self-contained HTML document.
pub fn html_document(records: &[RepositoryRecord], options: HtmlOptions, generated_at: DateTime<Utc>) -> String {
    let raw: Vec<Map<String, Value>> = if options.raw_fields {
        records.iter().map(|r| r.info.raw_fields()).collect()
    } else {
        Vec::new()
    };

    let mut columns = default_columns();
    columns.extend(raw_columns(&raw));

    let organizations: BTreeSet<&str> = records.iter().map(|r| r.organization.as_str()).collect();
    let title = if organizations.is_empty() {
        "Repository Summary".to_string()
    } else {
        format!(
            "Repository Summary: {}",
            organizations.into_iter().collect::<Vec<_>>().join(", ")
        )
    };

    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    out.push_str(&format!("<title>{}</title>\n", escape(&title)));
    out.push_str(&format!("<style>{STYLE}</style>\n</head>\n<body>\n"));
    out.push_str(&format!("<h1>{}</h1>\n", escape(&title)));
    out.push_str("<p class=\"hint\">Click a column header to sort by that column.</p>\n");
    out.push_str("<div class=\"table-wrap\">\n<table id=\"summary\">\n<thead>\n<tr>");
    for column in &columns {
        out.push_str(&format!("<th>{}</th>", escape(&column.title)));
    }
    out.push_str("</tr>\n</thead>\n<tbody>\n");

    for (index, record) in records.iter().enumerate() {
        out.push_str("<tr>");
        for column in &columns {
            let cell = match &column.source {
                Source::Derived(cell) => cell(record),
                Source::Raw(key) => raw_cell(raw.get(index).and_then(|fields| fields.get(key))),
            };
            out.push_str(&cell.render());
        }
        out.push_str("</tr>\n");
    }

    out.push_str("</tbody>\n</table>\n</div>\n");
    out.push_str("<ul class=\"notes\">\n");
    out.push_str(
        "<li>If there hasn't been any release or tag then the information is taken from the last commit to that repository.</li>\n",
    );
    out.push_str("<li>Issue counts exclude pull requests. Windows are the trailing 7 and 30 days.</li>\n");
    out.push_str("</ul>\n");
    out.push_str(&format!(
        "<p class=\"updated\">Last updated: {}</p>\n",
        generated_at.format("%a, %d %b %Y %H:%M:%S GMT")
    ));
    out.push_str(&format!("<script>{SORT_SCRIPT}</script>\n</body>\n</html>\n"));
    out
}

/// Write the summary table to `path`, replacing any existing file.
pub fn render_html(records: &[RepositoryRecord], path: &Path, options: HtmlOptions) -> Result<()> {
    let document = html_document(records, options, Utc::now());
    std::fs::write(path, document)?;
    info!("Wrote {} rows to {}", records.len(), path.display());
    Ok(())
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
