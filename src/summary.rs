use crate::cli::CommonArgs;
use crate::enumerate::{resolve_repositories, Visibility};
use crate::error::{RepostatsError, Result};
use crate::github::Client;
use crate::model::{
    CommitSummary, Contributor, ContributorSummary, ReleaseSummary, RepositoryInfo, RepositoryRecord, TagSummary,
};
use crate::persist::write_json;
use crate::render::{render_html, HtmlOptions};
use crate::stats::get_statistics;
use anyhow::Context;
use chrono::{DateTime, Utc};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;

const TOP_CONTRIBUTORS: usize = 2;

/// What to do when one repository cannot be collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Record the failure and carry on with the next repository.
    #[default]
    Skip,
    Abort,
}

#[derive(Debug, Clone)]
pub struct InfoRequest {
    pub organization: String,
    /// Explicit selection; empty means "list the organization".
    pub repositories: Vec<String>,
    pub limit: u32,
    pub visibility: Visibility,
    pub on_error: FailurePolicy,
}

impl InfoRequest {
    pub fn new(organization: impl Into<String>) -> Self {
        Self {
            organization: organization.into(),
            repositories: Vec::new(),
            limit: 50,
            visibility: Visibility::Public,
            on_error: FailurePolicy::Skip,
        }
    }
}

#[derive(Debug)]
pub struct RepositoryFailure {
    pub repository: String,
    pub error: RepostatsError,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub records: Vec<RepositoryRecord>,
    pub failures: Vec<RepositoryFailure>,
}

#[derive(Deserialize)]
struct ReleaseListing {
    #[serde(default)]
    name: Option<String>,
    tag_name: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    author: Option<Account>,
    #[serde(default)]
    html_url: String,
}

#[derive(Deserialize)]
struct Account {
    login: String,
}

#[derive(Deserialize)]
struct TagListing {
    name: String,
    commit: TagTarget,
}

#[derive(Deserialize)]
struct TagTarget {
    url: String,
}

/// A commit as returned by the commits endpoint. `author` is null for commits not linked to an account.
#[derive(Deserialize)]
struct CommitEntry {
    #[serde(default)]
    sha: String,
    #[serde(default)]
    html_url: String,
    commit: CommitBody,
    #[serde(default)]
    author: Option<Account>,
}

#[derive(Deserialize)]
struct CommitBody {
    #[serde(default)]
    author: Option<GitSignature>,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct GitSignature {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    date: Option<DateTime<Utc>>,
}

impl CommitEntry {
    fn into_summary(self) -> CommitSummary {
        let (name, date) = match self.commit.author {
            Some(signature) => (signature.name, signature.date),
            None => (None, None),
        };
        CommitSummary {
            sha: self.sha,
            date,
            author: self.author.map(|account| account.login).or(name),
            message: self.commit.message,
            html_url: self.html_url,
        }
    }
}

/// An entry of the contributors endpoint. Anonymous entries carry `name` instead of `login`.
#[derive(Deserialize)]
struct ContributorListing {
    #[serde(default)]
    login: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    contributions: u64,
}

pub fn get_repository_info(client: &Client, request: &InfoRequest) -> Result<BatchReport> {
    get_repository_info_with_progress(client, request, |_, _, _| {})
}

/// Collect a record per repository, in input order. `progress` is called before each one.
pub fn get_repository_info_with_progress<F>(client: &Client, request: &InfoRequest, mut progress: F) -> Result<BatchReport>
where
    F: FnMut(usize, usize, &str),
{
    let org = request.organization.as_str();
    let names = resolve_repositories(client, org, &request.repositories, request.limit, request.visibility)?;
    info!("Collecting {} repositories from {org}", names.len());

    let mut report = BatchReport::default();
    for (index, name) in names.iter().enumerate() {
        progress(index, names.len(), name);

        match fetch_record(client, org, name) {
            Ok(record) => report.records.push(record),
            Err(e) if e.is_fatal() || request.on_error == FailurePolicy::Abort => return Err(e),
            Err(e) => {
                warn!("Skipping {org}/{name}: {e}");
                report.failures.push(RepositoryFailure {
                    repository: name.clone(),
                    error: e,
                });
            }
        }
    }
    Ok(report)
}

pub fn fetch_record(client: &Client, org: &str, name: &str) -> Result<RepositoryRecord> {
    let base = format!("repos/{org}/{name}");
    let info: RepositoryInfo = client.get_json(&base, &[])?;
    let statistics = get_statistics(client, org, name)?;
    let latest_release = latest_release(client, &base)?;
    let latest_tag = match latest_release {
        Some(_) => None,
        None => latest_tag(client, &base)?,
    };
    let last_commit = last_commit(client, &base)?;
    let contributors = contributors(client, &base)?;

    Ok(RepositoryRecord {
        name: name.to_string(),
        organization: org.to_string(),
        info,
        statistics,
        latest_release,
        latest_tag,
        last_commit,
        contributors,
    })
}

fn latest_release(client: &Client, base: &str) -> Result<Option<ReleaseSummary>> {
    let listing: ReleaseListing = match client.get_json(&format!("{base}/releases/latest"), &[]) {
        Ok(listing) => listing,
        Err(RepostatsError::NotFound { .. }) => return Ok(None),
        Err(e) => return Err(e),
    };

    Ok(Some(ReleaseSummary {
        name: listing.name,
        tag_name: listing.tag_name,
        created_at: listing.created_at,
        author: listing.author.map(|account| account.login),
        html_url: listing.html_url,
    }))
}

/// Tags carry no date, so each tag's commit is looked up and the newest one wins.
fn latest_tag(client: &Client, base: &str) -> Result<Option<TagSummary>> {
    let tags: Vec<TagListing> = client.get_all(&format!("{base}/tags"), &[])?;

    let mut latest: Option<TagSummary> = None;
    for tag in tags {
        let commit: CommitEntry = client.get_json(&tag.commit.url, &[])?;
        let candidate = TagSummary {
            name: tag.name,
            commit: commit.into_summary(),
        };
        if latest.as_ref().map_or(true, |current| candidate.commit.date > current.commit.date) {
            latest = Some(candidate);
        }
    }
    Ok(latest)
}

fn last_commit(client: &Client, base: &str) -> Result<Option<CommitSummary>> {
    let page = match client.get(&format!("{base}/commits"), &[("per_page", "1")]) {
        Ok(page) => page,
        Err(RepostatsError::Transient { status: 409, .. }) => return Ok(None),
        Err(e) => return Err(e),
    };
    let entries: Vec<CommitEntry> = match page.body {
        Value::Null => Vec::new(),
        body => serde_json::from_value(body).map_err(|e| RepostatsError::malformed(&page.url, e))?,
    };
    Ok(entries.into_iter().next().map(CommitEntry::into_summary))
}

/// Every page is read so `total` is exact. Empty repositories answer 204 or 409.
fn contributors(client: &Client, base: &str) -> Result<ContributorSummary> {
    let listings: Vec<ContributorListing> = client.get_all(&format!("{base}/contributors"), &[("anon", "1")])?;

    let mut ranked: Vec<Contributor> = listings
        .into_iter()
        .map(|entry| Contributor {
            name: entry.login.or(entry.name).unwrap_or_else(|| "anonymous".to_string()),
            contributions: entry.contributions,
        })
        .collect();
    let total = ranked.len() as u64;
    ranked.sort_by(|a, b| b.contributions.cmp(&a.contributions));
    ranked.truncate(TOP_CONTRIBUTORS);

    Ok(ContributorSummary { total, top: ranked })
}

#[allow(clippy::too_many_arguments)]
pub fn exec(
    common: CommonArgs,
    repos: Vec<String>,
    limit: u32,
    include_private: bool,
    output: PathBuf,
    json: Option<PathBuf>,
    curated_only: bool,
    fail_fast: bool,
) -> anyhow::Result<()> {
    let client = common.client()?;
    let org = common.organization()?;

    let request = InfoRequest {
        organization: org.to_string(),
        repositories: repos,
        limit,
        visibility: Visibility::from_include_private(include_private),
        on_error: if fail_fast { FailurePolicy::Abort } else { FailurePolicy::Skip },
    };

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(format!("Listing repositories in {org}..."));

    let result = get_repository_info_with_progress(&client, &request, |index, total, name| {
        pb.set_message(format!("[{}/{total}] {org}/{name}", index + 1));
        pb.tick();
    });
    pb.finish_and_clear();
    let report = result.with_context(|| format!("Failed to collect repositories for {org}"))?;

    render_html(&report.records, &output, HtmlOptions { raw_fields: !curated_only })
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "{} {} repositories to {}",
        style("Wrote").bold(),
        style(report.records.len()).cyan(),
        style(output.display()).green()
    );

    if let Some(path) = json {
        write_json(&report.records, &path).with_context(|| format!("Failed to write {}", path.display()))?;
        println!("{} records to {}", style("Saved").bold(), style(path.display()).green());
    }

    if !report.failures.is_empty() {
        println!("{} {} repositories:", style("Skipped").yellow().bold(), report.failures.len());
        for failure in &report.failures {
            println!("  {}: {}", style(&failure.repository).yellow(), failure.error);
        }
    }
    Ok(())
}
