//! Repository statistics for GitHub organizations.
//!
//! The library half lists an organization's repositories, gathers issue, pull request and
//! commit activity per repository, and writes the results as an HTML table, a text report
//! or JSON. The `repostats` binary wraps it in a small CLI.

pub mod cli;
pub mod config;
pub mod enumerate;
pub mod error;
pub mod github;
pub mod model;
pub mod persist;
pub mod render;
pub mod stats;
pub mod summary;

pub use config::ClientConfig;
pub use enumerate::{list_org_repositories, Visibility};
pub use error::{RepostatsError, Result};
pub use github::Client;
pub use model::{RepositoryRecord, StatisticsBlock};
pub use persist::{read_json, write_json};
pub use render::{render_html, render_text, HtmlOptions};
pub use stats::get_statistics;
pub use summary::{get_repository_info, BatchReport, FailurePolicy, InfoRequest};
