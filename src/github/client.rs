use super::clock::{Clock, SystemClock};
use super::link::next_link;
use super::transport::{HttpResponse, ReqwestTransport, Transport};
use crate::config::ClientConfig;
use crate::error::{RepostatsError, Result};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::cell::Cell;

pub const MAX_PAGES: usize = 1000;
const API_VERSION: &str = "2022-11-28";
const RATE_LIMIT_RETRIES: usize = 3;

/// Quota state as last reported by the `x-ratelimit-*` headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub limit: Option<u64>,
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
}

impl RateLimit {
    pub fn from_response(response: &HttpResponse) -> Option<Self> {
        let remaining = response.header("x-ratelimit-remaining")?.trim().parse().ok()?;
        let reset = response.header("x-ratelimit-reset")?.trim().parse::<i64>().ok()?;
        let reset_at = DateTime::from_timestamp(reset, 0)?;
        let limit = response
            .header("x-ratelimit-limit")
            .and_then(|value| value.trim().parse().ok());
        Some(Self {
            limit,
            remaining,
            reset_at,
        })
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

/// One decoded response plus its pagination cursor.
#[derive(Debug, Clone)]
pub struct Page {
    pub url: String,
    pub body: Value,
    pub next: Option<String>,
    pub rate_limit: Option<RateLimit>,
}

pub struct Client {
    config: ClientConfig,
    transport: Box<dyn Transport>,
    clock: Box<dyn Clock>,
    rate_limit: Cell<Option<RateLimit>>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(config.timeout)?;
        Ok(Self::with_parts(config, Box::new(transport), Box::new(SystemClock)))
    }

    pub fn with_parts(config: ClientConfig, transport: Box<dyn Transport>, clock: Box<dyn Clock>) -> Self {
        Self {
            config,
            transport,
            clock,
            rate_limit: Cell::new(None),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn rate_limit(&self) -> Option<RateLimit> {
        self.rate_limit.get()
    }

    /// Absolute URL for `path` (relative to the API base, or already absolute) with `query` appended.
    pub fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<String> {
        let raw = if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!(
                "{}/{}",
                self.config.api_url.trim_end_matches('/'),
                path.trim_start_matches('/')
            )
        };
        let mut url = Url::parse(&raw)
            .map_err(|e| RepostatsError::Config(format!("Invalid request URL '{raw}': {e}")))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url.to_string())
    }

    pub fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Page> {
        let url = self.endpoint(path, query)?;
        self.fetch(&url)
    }

    pub fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let page = self.get(path, query)?;
        serde_json::from_value(page.body).map_err(|e| RepostatsError::malformed(&page.url, e))
    }

    /// Follow `rel="next"` links from `path`, concatenating array items in the order received.
    ///
    /// A 409 on the first page is GitHub's answer for an empty repository and yields no items.
    pub fn get_paginated(&self, path: &str, query: &[(&str, &str)]) -> Result<Vec<Value>> {
        let per_page = self.config.per_page.to_string();
        let mut params: Vec<(&str, &str)> = query.to_vec();
        if !params.iter().any(|(key, _)| *key == "per_page") {
            params.push(("per_page", per_page.as_str()));
        }

        let mut url = self.endpoint(path, &params)?;
        let mut items = Vec::new();

        for index in 0..MAX_PAGES {
            let page = match self.fetch(&url) {
                Ok(page) => page,
                Err(RepostatsError::Transient { status: 409, .. }) if index == 0 => {
                    debug!("{url} reported an empty repository");
                    return Ok(items);
                }
                Err(e) => return Err(e),
            };

            match page.body {
                Value::Array(values) => items.extend(values),
                Value::Null => {}
                other => {
                    return Err(RepostatsError::malformed(
                        &page.url,
                        format!("expected a JSON array, found {}", json_kind(&other)),
                    ))
                }
            }

            match page.next {
                Some(next) => url = next,
                None => return Ok(items),
            }
        }

        warn!("Stopped following {path} after {MAX_PAGES} pages");
        Ok(items)
    }

    pub fn get_all<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<Vec<T>> {
        self.get_paginated(path, query)?
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(|e| RepostatsError::malformed(path, e)))
            .collect()
    }

    fn fetch(&self, url: &str) -> Result<Page> {
        let mut rejections = 0;
        loop {
            self.wait_for_quota()?;

            debug!("GET {url}");
            let response = self.transport.get(url, &self.request_headers())?;
            let rate_limit = RateLimit::from_response(&response);
            if rate_limit.is_some() {
                self.rate_limit.set(rate_limit);
            }

            if let Some(until) = self.rejected_until(&response, rate_limit) {
                rejections += 1;
                if rejections > RATE_LIMIT_RETRIES {
                    return Err(RepostatsError::RateLimitExceeded { reset_at: until });
                }
                let earliest = self.clock.now() + chrono::Duration::seconds(1);
                self.sleep_until(until.max(earliest))?;
                continue;
            }

            check_status(url, &response)?;
            let body = decode_body(url, &response.body)?;
            let next = response.header("link").and_then(next_link);
            return Ok(Page {
                url: url.to_string(),
                body,
                next,
                rate_limit,
            });
        }
    }

    fn wait_for_quota(&self) -> Result<()> {
        if let Some(limit) = self.rate_limit.get() {
            if limit.is_exhausted() && limit.reset_at > self.clock.now() {
                self.sleep_until(limit.reset_at)?;
            }
        }
        Ok(())
    }

    fn sleep_until(&self, until: DateTime<Utc>) -> Result<()> {
        let Ok(wait) = (until - self.clock.now()).to_std() else {
            return Ok(());
        };
        if wait.is_zero() {
            return Ok(());
        }
        if wait > self.config.max_rate_limit_wait {
            return Err(RepostatsError::RateLimitExceeded { reset_at: until });
        }
        warn!(
            "Rate limit reached, waiting {} (until {until})",
            humantime::format_duration(wait)
        );
        self.clock.sleep(wait);
        Ok(())
    }

    /// When a 403/429 is a quota rejection rather than a permission problem, the time to retry at.
    fn rejected_until(&self, response: &HttpResponse, rate_limit: Option<RateLimit>) -> Option<DateTime<Utc>> {
        if !matches!(response.status, 403 | 429) {
            return None;
        }
        if let Some(seconds) = response
            .header("retry-after")
            .and_then(|value| value.trim().parse::<i64>().ok())
        {
            let until = chrono::Duration::try_seconds(seconds).and_then(|wait| self.clock.now().checked_add_signed(wait));
            // Out of range is treated as "never", which the wait cap turns into RateLimitExceeded.
            return Some(until.unwrap_or(DateTime::<Utc>::MAX_UTC));
        }
        rate_limit
            .filter(RateLimit::is_exhausted)
            .map(|limit| limit.reset_at)
    }

    fn request_headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("accept", "application/vnd.github+json".to_string()),
            ("x-github-api-version", API_VERSION.to_string()),
            ("user-agent", self.config.user_agent.clone()),
        ];
        if let Some(token) = &self.config.token {
            headers.push(("authorization", format!("Bearer {token}")));
        }
        headers
    }
}

fn check_status(url: &str, response: &HttpResponse) -> Result<()> {
    if response.is_success() {
        return Ok(());
    }
    let message = api_message(&response.body);
    Err(match response.status {
        401 | 403 => RepostatsError::Authentication {
            status: response.status,
            url: url.to_string(),
            message,
        },
        404 => RepostatsError::NotFound { url: url.to_string() },
        status => RepostatsError::Transient {
            status,
            url: url.to_string(),
            message,
        },
    })
}

fn api_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().chars().take(200).collect())
}

fn decode_body(url: &str, body: &str) -> Result<Value> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body).map_err(|e| RepostatsError::malformed(url, e))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::testing::{client, fixed_now, paged, FakeClock, MockTransport, BASE};
    use serde_json::json;
    use std::time::Duration;

    fn numbered(count: usize) -> Vec<Value> {
        (1..=count).map(|n| json!({ "n": n })).collect()
    }

    #[test]
    fn pagination_preserves_every_item_in_order() {
        let items = numbered(7);
        for page_size in 1..=8 {
            let clock = FakeClock::at(fixed_now());
            let transport = paged(MockTransport::new(&clock), "/orgs/acme/repos", &items, page_size);
            let requests = transport.requests();
            let client = client(transport, &clock);

            let fetched = client.get_paginated("orgs/acme/repos", &[]).unwrap();

            assert_eq!(fetched, items, "page size {page_size}");
            assert_eq!(requests.borrow().len(), items.len().div_ceil(page_size));
        }
    }

    #[test]
    fn pagination_adds_per_page_and_token() {
        let clock = FakeClock::at(fixed_now());
        let transport = MockTransport::new(&clock).json("/orgs/acme/repos", json!([]));
        let requests = transport.requests();
        let client = client(transport, &clock);

        client.get_paginated("orgs/acme/repos", &[("type", "public")]).unwrap();

        let requests = requests.borrow();
        assert_eq!(requests[0].url, format!("{BASE}/orgs/acme/repos?type=public&per_page=100"));
        assert_eq!(requests[0].authorization.as_deref(), Some("Bearer test-token"));
    }

    #[test]
    fn exhausted_quota_blocks_until_reset() {
        let clock = FakeClock::at(fixed_now());
        let reset = fixed_now() + chrono::Duration::seconds(90);
        let transport = MockTransport::new(&clock)
            .route(
                "/rate",
                HttpResponse::new(200, "{}")
                    .with_header("x-ratelimit-remaining", "0")
                    .with_header("x-ratelimit-reset", reset.timestamp().to_string()),
            )
            .json("/rate", json!({}));
        let requests = transport.requests();
        let client = client(transport, &clock);

        client.get("rate", &[]).unwrap();
        assert_eq!(client.rate_limit().map(|limit| limit.remaining), Some(0));
        client.get("rate", &[]).unwrap();

        let requests = requests.borrow();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].at >= reset);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(90)]);
    }

    #[test]
    fn quota_rejection_waits_and_retries_same_request() {
        let clock = FakeClock::at(fixed_now());
        let reset = fixed_now() + chrono::Duration::seconds(30);
        let transport = MockTransport::new(&clock)
            .route(
                "/repos/acme/widgets",
                HttpResponse::new(403, r#"{"message":"API rate limit exceeded"}"#)
                    .with_header("x-ratelimit-remaining", "0")
                    .with_header("x-ratelimit-reset", reset.timestamp().to_string()),
            )
            .route(
                "/repos/acme/widgets",
                HttpResponse::new(200, r#"{"name":"widgets"}"#)
                    .with_header("x-ratelimit-remaining", "4999")
                    .with_header("x-ratelimit-reset", reset.timestamp().to_string()),
            );
        let requests = transport.requests();
        let client = client(transport, &clock);

        let page = client.get("repos/acme/widgets", &[]).unwrap();

        assert_eq!(page.body["name"], "widgets");
        let requests = requests.borrow();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].url, requests[1].url);
        assert!(requests[1].at >= reset);
    }

    #[test]
    fn retry_after_is_honoured() {
        let clock = FakeClock::at(fixed_now());
        let transport = MockTransport::new(&clock)
            .route("/busy", HttpResponse::new(429, "").with_header("Retry-After", "5"))
            .json("/busy", json!({ "ok": true }));
        let client = client(transport, &clock);

        let page = client.get("busy", &[]).unwrap();

        assert_eq!(page.body["ok"], true);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(5)]);
    }

    #[test]
    fn huge_retry_after_fails_without_sleeping() {
        let clock = FakeClock::at(fixed_now());
        let transport = MockTransport::new(&clock)
            .route("/busy", HttpResponse::new(429, "").with_header("Retry-After", "100000000000000"));
        let requests = transport.requests();
        let client = client(transport, &clock);

        let err = client.get("busy", &[]).unwrap_err();

        assert!(matches!(err, RepostatsError::RateLimitExceeded { .. }));
        assert_eq!(requests.borrow().len(), 1);
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn wait_beyond_limit_is_reported_instead_of_slept() {
        let clock = FakeClock::at(fixed_now());
        let reset = fixed_now() + chrono::Duration::hours(2);
        let transport = MockTransport::new(&clock)
            .route(
                "/rate",
                HttpResponse::new(403, "{}")
                    .with_header("x-ratelimit-remaining", "0")
                    .with_header("x-ratelimit-reset", reset.timestamp().to_string()),
            )
            .json("/rate", json!({}));
        let requests = transport.requests();
        let client = client(transport, &clock);

        let err = client.get("rate", &[]).unwrap_err();

        assert!(matches!(err, RepostatsError::RateLimitExceeded { reset_at } if reset_at == reset));
        assert_eq!(requests.borrow().len(), 1);
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn forbidden_with_quota_left_is_authentication() {
        let clock = FakeClock::at(fixed_now());
        let transport = MockTransport::new(&clock).route(
            "/orgs/acme/repos",
            HttpResponse::new(403, r#"{"message":"Resource not accessible by integration"}"#)
                .with_header("x-ratelimit-remaining", "4000")
                .with_header("x-ratelimit-reset", "1740830400"),
        );
        let client = client(transport, &clock);

        let err = client.get("orgs/acme/repos", &[]).unwrap_err();

        match err {
            RepostatsError::Authentication { status, message, .. } => {
                assert_eq!(status, 403);
                assert_eq!(message, "Resource not accessible by integration");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn status_codes_map_to_error_kinds() {
        let clock = FakeClock::at(fixed_now());
        let transport = MockTransport::new(&clock)
            .route("/unauthorized", HttpResponse::new(401, r#"{"message":"Bad credentials"}"#))
            .route("/flaky", HttpResponse::new(502, "Bad Gateway"))
            .route("/garbled", HttpResponse::new(200, "{not json"));
        let client = client(transport, &clock);

        assert!(matches!(
            client.get("unauthorized", &[]),
            Err(RepostatsError::Authentication { status: 401, .. })
        ));
        assert!(matches!(client.get("missing", &[]), Err(RepostatsError::NotFound { .. })));
        assert!(matches!(
            client.get("flaky", &[]),
            Err(RepostatsError::Transient { status: 502, ref message, .. }) if message == "Bad Gateway"
        ));
        assert!(matches!(
            client.get("garbled", &[]),
            Err(RepostatsError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn empty_repository_conflict_yields_no_items() {
        let clock = FakeClock::at(fixed_now());
        let transport = MockTransport::new(&clock).route(
            "/repos/acme/empty/commits",
            HttpResponse::new(409, r#"{"message":"Git Repository is empty."}"#),
        );
        let client = client(transport, &clock);

        let items = client.get_paginated("repos/acme/empty/commits", &[]).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn non_array_page_is_malformed() {
        let clock = FakeClock::at(fixed_now());
        let transport = MockTransport::new(&clock).json("/orgs/acme/repos", json!({ "message": "hi" }));
        let client = client(transport, &clock);

        let err = client.get_paginated("orgs/acme/repos", &[]).unwrap_err();
        assert!(err.to_string().contains("expected a JSON array, found an object"));
    }

    #[test]
    fn endpoint_accepts_absolute_urls() {
        let clock = FakeClock::at(fixed_now());
        let client = client(MockTransport::new(&clock), &clock);

        assert_eq!(
            client.endpoint("https://other.test/x?page=2", &[]).unwrap(),
            "https://other.test/x?page=2"
        );
        assert_eq!(
            client.endpoint("/repos/a/b", &[("state", "all")]).unwrap(),
            format!("{BASE}/repos/a/b?state=all")
        );
    }
}
