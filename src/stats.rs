use crate::cli::CommonArgs;
use crate::error::Result;
use crate::github::Client;
use crate::model::{PullRequestSummary, StatisticsBlock, TimeWindow};
use crate::render::render_text;
use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use log::debug;
use serde::Deserialize;
use serde_json::Value;

const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
    #[serde(other)]
    Unknown,
}

/// An entry of the issues endpoint, which also lists pull requests.
#[derive(Debug, Clone, Deserialize)]
pub struct Issue {
    pub state: IssueState,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pull_request: Option<Value>,
}

impl Issue {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }
}

#[derive(Deserialize)]
struct CommitListing {
    commit: CommitDetail,
}

#[derive(Deserialize)]
struct CommitDetail {
    #[serde(default)]
    author: Option<Signature>,
    #[serde(default)]
    committer: Option<Signature>,
}

#[derive(Deserialize)]
struct Signature {
    #[serde(default)]
    date: Option<DateTime<Utc>>,
}

impl CommitListing {
    fn timestamp(&self) -> Option<DateTime<Utc>> {
        let author = self.commit.author.as_ref().and_then(|sig| sig.date);
        author.or_else(|| self.commit.committer.as_ref().and_then(|sig| sig.date))
    }
}

/// Raw items for one repository, before any counting.
#[derive(Debug, Clone, Default)]
pub struct RepositoryActivity {
    pub issues: Vec<Issue>,
    pub open_pull_requests: Vec<PullRequestSummary>,
    pub commit_times: Vec<DateTime<Utc>>,
}

pub fn get_statistics(client: &Client, org: &str, repo: &str) -> Result<StatisticsBlock> {
    let now = client.now();
    let activity = fetch_activity(client, org, repo, now)?;
    Ok(compute_statistics(&activity, now))
}

/// Issues (all states), open pull requests and default-branch commits of the last month.
pub fn fetch_activity(client: &Client, org: &str, repo: &str, now: DateTime<Utc>) -> Result<RepositoryActivity> {
    let base = format!("repos/{org}/{repo}");

    let issues: Vec<Issue> = client.get_all(
        &format!("{base}/issues"),
        &[("state", "all"), ("sort", "created")],
    )?;

    let open_pull_requests: Vec<PullRequestSummary> =
        client.get_all(&format!("{base}/pulls"), &[("state", "open")])?;

    let since = TimeWindow::month(now)
        .since
        .to_rfc3339_opts(SecondsFormat::Secs, true);
    let commits: Vec<CommitListing> = client.get_all(&format!("{base}/commits"), &[("since", since.as_str())])?;
    let commit_times: Vec<_> = commits.iter().filter_map(CommitListing::timestamp).collect();

    debug!(
        "{org}/{repo}: {} issues, {} open pull requests, {} commits since {since}",
        issues.len(),
        open_pull_requests.len(),
        commit_times.len()
    );

    Ok(RepositoryActivity {
        issues,
        open_pull_requests,
        commit_times,
    })
}

pub fn compute_statistics(activity: &RepositoryActivity, now: DateTime<Utc>) -> StatisticsBlock {
    let week = TimeWindow::week(now);
    let month = TimeWindow::month(now);
    let mut stats = StatisticsBlock::empty(now);

    let mut resolution_seconds = 0.0;
    let mut resolved = 0u64;
    for issue in activity.issues.iter().filter(|issue| !issue.is_pull_request()) {
        match issue.state {
            IssueState::Open => stats.open_issue_count += 1,
            IssueState::Closed => {
                let Some(closed_at) = issue.closed_at else {
                    continue;
                };
                if week.contains(&closed_at) {
                    stats.issues_closed_week += 1;
                }
                if month.contains(&closed_at) {
                    stats.issues_closed_month += 1;
                }
                resolution_seconds += (closed_at - issue.created_at).num_seconds() as f64;
                resolved += 1;
            }
            IssueState::Unknown => {}
        }
    }
    if resolved > 0 {
        stats.average_issue_days = resolution_seconds / (SECONDS_PER_DAY * resolved as f64);
    }

    for timestamp in &activity.commit_times {
        if week.contains(timestamp) {
            stats.commits_week += 1;
        }
        if month.contains(timestamp) {
            stats.commits_month += 1;
        }
    }

    stats.open_pull_requests = activity.open_pull_requests.clone();
    stats
}

pub fn exec(common: CommonArgs, repo: String) -> anyhow::Result<()> {
    let client = common.client()?;
    let org = common.organization()?;

    let stats = get_statistics(&client, org, &repo)
        .with_context(|| format!("Failed to gather statistics for {org}/{repo}"))?;

    print!("{}", render_text(&format!("{org}: {repo}"), &stats));
    Ok(())
}
