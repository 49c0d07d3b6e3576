use crate::error::{RepostatsError, Result};
use log::debug;
use reqwest::Url;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const TOKEN_FILE: &str = ".repostats-key";
pub const MAX_PER_PAGE: u32 = 100;

/// Everything a [`crate::github::Client`] needs to talk to the API.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub token: Option<String>,
    pub user_agent: String,
    pub per_page: u32,
    pub max_rate_limit_wait: Duration,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token: None,
            user_agent: format!("repostats/{}", env!("CARGO_PKG_VERSION")),
            per_page: MAX_PER_PAGE,
            max_rate_limit_wait: Duration::from_secs(3600),
            timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ..Self::default()
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page.clamp(1, MAX_PER_PAGE);
        self
    }

    pub fn with_max_rate_limit_wait(mut self, wait: Duration) -> Self {
        self.max_rate_limit_wait = wait;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Web host the API belongs to; `api.github.com` maps to `github.com`.
    pub fn host(&self) -> Result<String> {
        let url = Url::parse(&self.api_url)
            .map_err(|e| RepostatsError::Config(format!("Invalid API URL '{}': {e}", self.api_url)))?;
        let host = url
            .host_str()
            .ok_or_else(|| RepostatsError::Config(format!("API URL '{}' has no host", self.api_url)))?;
        Ok(match host {
            "api.github.com" => "github.com".to_string(),
            other => other.to_string(),
        })
    }
}

/// Look for a token in the environment, then in `dir/.repostats-key`, then via `gh auth token`.
pub fn discover_token(host: &str, dir: &Path) -> Result<Option<String>> {
    if let Some(token) = token_from_env(host) {
        debug!("Using token from environment for {host}");
        return Ok(Some(token));
    }
    if let Some(token) = token_from_file(&dir.join(TOKEN_FILE))? {
        debug!("Using token from {TOKEN_FILE}");
        return Ok(Some(token));
    }
    if let Some(token) = token_from_gh(host)? {
        debug!("Using token from gh CLI for {host}");
        return Ok(Some(token));
    }
    Ok(None)
}

fn token_from_env(host: &str) -> Option<String> {
    let keys = if host.eq_ignore_ascii_case("github.com") {
        ["GH_TOKEN", "GITHUB_TOKEN"]
    } else {
        ["GH_ENTERPRISE_TOKEN", "GITHUB_ENTERPRISE_TOKEN"]
    };

    keys.iter()
        .filter_map(|key| std::env::var(key).ok())
        .map(|token| token.trim().to_string())
        .find(|token| !token.is_empty())
}

fn token_from_file(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let token = contents.trim();
            Ok(if token.is_empty() { None } else { Some(token.to_string()) })
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn token_from_gh(host: &str) -> Result<Option<String>> {
    let output = match std::process::Command::new("gh")
        .args(["auth", "token", "--hostname", host])
        .output()
    {
        Ok(output) => output,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    if !output.status.success() {
        return Ok(None);
    }
    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Ok(if token.is_empty() { None } else { Some(token) })
}
