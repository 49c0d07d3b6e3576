use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const SCHEMA_VERSION: u32 = 1;

pub const WEEK_DAYS: i64 = 7;
pub const MONTH_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    pub name: String,
    pub organization: String,
    pub info: RepositoryInfo,
    pub statistics: StatisticsBlock,
    pub latest_release: Option<ReleaseSummary>,
    /// Most recent tag by commit date; only looked up when there is no release.
    #[serde(default)]
    pub latest_tag: Option<TagSummary>,
    /// Head of the default branch.
    #[serde(default)]
    pub last_commit: Option<CommitSummary>,
    pub contributors: ContributorSummary,
}

/// The repository object as returned by `GET /repos/{owner}/{repo}`.
///
/// Fields the reports use are typed; every other field lands in `extra` untouched so the
/// object survives a JSON round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    pub name: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub forks_count: u64,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub open_issues_count: u64,
    #[serde(default)]
    pub license: Option<License>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RepositoryInfo {
    /// Every top-level field, typed ones included.
    pub fn raw_fields(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct License {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub spdx_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsBlock {
    pub open_issue_count: u64,
    pub issues_closed_week: u64,
    pub issues_closed_month: u64,
    pub commits_week: u64,
    pub commits_month: u64,
    /// Mean open-to-close time of closed issues, in days.
    pub average_issue_days: f64,
    pub open_pull_requests: Vec<PullRequestSummary>,
    pub computed_at: DateTime<Utc>,
}

impl StatisticsBlock {
    pub fn empty(computed_at: DateTime<Utc>) -> Self {
        Self {
            open_issue_count: 0,
            issues_closed_week: 0,
            issues_closed_month: 0,
            commits_week: 0,
            commits_month: 0,
            average_issue_days: 0.0,
            open_pull_requests: Vec::new(),
            computed_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequestSummary {
    pub number: u64,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseSummary {
    pub name: Option<String>,
    pub tag_name: String,
    pub created_at: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub html_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagSummary {
    pub name: String,
    pub commit: CommitSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub sha: String,
    pub date: Option<DateTime<Utc>>,
    /// GitHub login when the commit is linked to an account, else the git author name.
    pub author: Option<String>,
    pub message: String,
    pub html_url: String,
}

impl CommitSummary {
    pub fn headline(&self) -> &str {
        self.message.lines().next().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContributorSummary {
    pub total: u64,
    pub top: Vec<Contributor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contributor {
    pub name: String,
    pub contributions: u64,
}

/// On-disk form of a run, see [`crate::persist`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordsOutput {
    pub version: u32,
    pub generated_at: DateTime<Utc>,
    pub records: Vec<RepositoryRecord>,
}

/// Trailing window ending at the moment it was measured from.
///
/// The lower bound is inclusive: a timestamp exactly `days * 24h` old is inside. Timestamps
/// after `now` are inside as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub since: DateTime<Utc>,
}

impl TimeWindow {
    pub fn trailing(now: DateTime<Utc>, days: i64) -> Self {
        Self {
            since: now - Duration::days(days),
        }
    }

    pub fn week(now: DateTime<Utc>) -> Self {
        Self::trailing(now, WEEK_DAYS)
    }

    pub fn month(now: DateTime<Utc>) -> Self {
        Self::trailing(now, MONTH_DAYS)
    }

    pub fn contains(&self, timestamp: &DateTime<Utc>) -> bool {
        timestamp >= &self.since
    }
}
