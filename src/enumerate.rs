use crate::cli::CommonArgs;
use crate::config::MAX_PER_PAGE;
use crate::error::{RepostatsError, Result};
use crate::github::Client;
use anyhow::Context;
use console::style;
use log::info;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Public,
    All,
}

impl Visibility {
    pub fn from_include_private(include_private: bool) -> Self {
        if include_private {
            Visibility::All
        } else {
            Visibility::Public
        }
    }

    pub fn as_query(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::All => "all",
        }
    }

    pub fn admits(&self, private: bool) -> bool {
        matches!(self, Visibility::All) || !private
    }
}

#[derive(Deserialize)]
struct RepositoryListing {
    name: String,
    #[serde(default)]
    private: bool,
}

/// Names of the organization's repositories in API order. `limit` is the page size.
pub fn list_org_repositories(client: &Client, org: &str, limit: u32, visibility: Visibility) -> Result<Vec<String>> {
    if org.trim().is_empty() {
        return Err(RepostatsError::Config(
            "Please supply the name of a GitHub organization".to_string(),
        ));
    }

    let per_page = limit.clamp(1, MAX_PER_PAGE).to_string();
    info!("Listing {} repositories for {org}", visibility.as_query());
    let listings: Vec<RepositoryListing> = client.get_all(
        &format!("orgs/{org}/repos"),
        &[("type", visibility.as_query()), ("per_page", per_page.as_str())],
    )?;

    Ok(listings
        .into_iter()
        .filter(|repo| visibility.admits(repo.private))
        .map(|repo| repo.name)
        .collect())
}

/// An explicit, non-empty selection is used verbatim; otherwise the organization is listed.
pub fn resolve_repositories(
    client: &Client,
    org: &str,
    explicit: &[String],
    limit: u32,
    visibility: Visibility,
) -> Result<Vec<String>> {
    if !explicit.is_empty() {
        return Ok(explicit.to_vec());
    }
    list_org_repositories(client, org, limit, visibility)
}

pub fn exec(common: CommonArgs, limit: u32, include_private: bool) -> anyhow::Result<()> {
    let client = common.client()?;
    let org = common.organization()?;

    let names = list_org_repositories(&client, org, limit, Visibility::from_include_private(include_private))
        .with_context(|| format!("Failed to list repositories for {org}"))?;

    println!(
        "{} {} repositories in {}",
        style("Found").bold(),
        style(names.len()).cyan(),
        style(org).yellow()
    );
    for name in names {
        println!("  {name}");
    }
    Ok(())
}
