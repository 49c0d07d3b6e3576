use crate::model::{PullRequestSummary, StatisticsBlock};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
const TITLE_WIDTH: usize = 70;

/// Plain-text report for one repository's statistics.
pub fn render_text(label: &str, stats: &StatisticsBlock) -> String {
    let mut out = String::new();
    out.push_str(&format!("Report for {label}\n"));
    out.push_str(&format!("Open issues: {:3}\n", stats.open_issue_count));
    out.push_str(&format!("Closed issues this week: {:3}\n", stats.issues_closed_week));
    out.push_str(&format!("Closed issues this month: {:3}\n", stats.issues_closed_month));
    out.push_str(&format!("Commits in last week: {:3}\n", stats.commits_week));
    out.push_str(&format!("Commits in last month: {:3}\n", stats.commits_month));
    out.push('\n');

    if stats.open_pull_requests.is_empty() {
        out.push_str("No open pull requests\n");
        return out;
    }

    out.push_str(&format!(
        "Open Pull Requests: {:3}\n\n",
        stats.open_pull_requests.len()
    ));
    out.push_str(&pull_request_row("Number", "Title", "Created", "Last Updated"));
    for pr in &stats.open_pull_requests {
        out.push_str(&summary_row(pr));
    }
    out
}

fn summary_row(pr: &PullRequestSummary) -> String {
    pull_request_row(
        &pr.number.to_string(),
        &fit(&pr.title, TITLE_WIDTH - 1),
        &pr.created_at.format(TIMESTAMP_FORMAT).to_string(),
        &pr.updated_at.format(TIMESTAMP_FORMAT).to_string(),
    )
}

fn pull_request_row(number: &str, title: &str, created: &str, updated: &str) -> String {
    format!("{number:<7}{title:<70}{created:<22}{updated:22}\n")
}

/// Shorten `text` to at most `width` characters so the columns stay aligned.
fn fit(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut out: String = text.chars().take(width.saturating_sub(3)).collect();
    out.push_str("...");
    out
}
