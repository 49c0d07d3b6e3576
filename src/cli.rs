use crate::config::{discover_token, ClientConfig, DEFAULT_API_URL};
use crate::github::Client;
use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use log::{warn, LevelFilter};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "repostats")]
#[command(about = "Collect issue, pull request and commit statistics for a GitHub organization")]
#[command(version)]
pub struct Cli {
    #[clap(flatten)]
    pub common: CommonArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Clone)]
pub struct CommonArgs {
    #[arg(short, long, global = true, help = "GitHub organization to report on")]
    pub org: Option<String>,

    #[arg(long, global = true, env = "REPOSTATS_TOKEN", hide_env_values = true, help = "API token (otherwise discovered from GH_TOKEN, GITHUB_TOKEN, .repostats-key or gh)")]
    pub token: Option<String>,

    #[arg(long, global = true, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL, help = "Base URL of the GitHub REST API")]
    pub api_url: String,

    #[arg(long, global = true, value_parser = humantime::parse_duration, default_value = "1h", help = "Longest rate-limit wait before giving up (e.g. 90s, 15m)")]
    pub max_wait: Duration,

    #[arg(short, long, global = true, action = ArgAction::Count, help = "Increase log verbosity (-v, -vv)")]
    pub verbose: u8,
}

impl CommonArgs {
    pub fn organization(&self) -> Result<&str> {
        self.org
            .as_deref()
            .map(str::trim)
            .filter(|org| !org.is_empty())
            .context("Please supply the name of a GitHub organization with --org")
    }

    pub fn client(&self) -> Result<Client> {
        let mut config = ClientConfig::new(self.api_url.trim_end_matches('/')).with_max_rate_limit_wait(self.max_wait);

        let explicit = self.token.as_deref().map(str::trim).filter(|token| !token.is_empty());
        let token = match explicit {
            Some(token) => Some(token.to_string()),
            None => {
                let host = config.host()?;
                let dir = std::env::current_dir().context("Failed to read current directory")?;
                discover_token(&host, &dir).context("Failed to look up an API token")?
            }
        };
        match token {
            Some(token) => config = config.with_token(token),
            None => warn!("No API token found; unauthenticated requests are limited to 60 per hour"),
        }

        Client::new(config).context("Failed to create HTTP client")
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the organization's repositories
    List {
        #[arg(short, long, default_value_t = 50, help = "Repositories per page (1-100)")]
        limit: u32,

        #[arg(long, help = "Include private repositories")]
        include_private: bool,
    },
    /// Build the HTML summary table for many repositories
    Summary {
        #[arg(short = 'r', long = "repos", num_args = 1.., help = "Only these repositories (default: all in the organization)")]
        repos: Vec<String>,

        #[arg(short, long, default_value_t = 50, help = "Repositories per page when listing (1-100)")]
        limit: u32,

        #[arg(long, help = "Include private repositories")]
        include_private: bool,

        #[arg(short = 'u', long, default_value = "repository_summary.html", help = "HTML output file")]
        output: PathBuf,

        #[arg(long, help = "Also save the collected records as JSON")]
        json: Option<PathBuf>,

        #[arg(long, help = "Leave out the per-field columns of the repository object")]
        curated_only: bool,

        #[arg(long, help = "Stop at the first repository that fails")]
        fail_fast: bool,
    },
    /// Print the statistics report for one repository
    Stats {
        #[arg(help = "Repository name within the organization")]
        repo: String,
    },
    /// Render a saved JSON file as HTML without calling the API
    Render {
        #[arg(short, long, help = "JSON file written by `summary --json`")]
        input: PathBuf,

        #[arg(short = 'u', long, default_value = "repository_summary.html", help = "HTML output file")]
        output: PathBuf,

        #[arg(long, help = "Leave out the per-field columns of the repository object")]
        curated_only: bool,
    },
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn execute(self) -> Result<()> {
        match self.command {
            Commands::List { limit, include_private } => crate::enumerate::exec(self.common, limit, include_private),
            Commands::Summary {
                repos,
                limit,
                include_private,
                output,
                json,
                curated_only,
                fail_fast,
            } => crate::summary::exec(
                self.common,
                repos,
                limit,
                include_private,
                output,
                json,
                curated_only,
                fail_fast,
            ),
            Commands::Stats { repo } => crate::stats::exec(self.common, repo),
            Commands::Render {
                input,
                output,
                curated_only,
            } => crate::render::exec(input, output, curated_only),
        }
    }
}

/// Warnings by default; `-v` adds info, `-vv` debug. `RUST_LOG` overrides both.
pub fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .try_init();
}
