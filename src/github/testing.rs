//! Scripted transport and clock for exercising the fetcher without a network.

use super::clock::Clock;
use super::transport::{HttpResponse, Transport};
use super::Client;
use crate::config::ClientConfig;
use crate::error::Result;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

pub(crate) const BASE: &str = "https://api.test";

pub(crate) fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

#[derive(Clone)]
pub(crate) struct FakeClock {
    now: Rc<Cell<DateTime<Utc>>>,
    sleeps: Rc<RefCell<Vec<Duration>>>,
}

impl FakeClock {
    pub(crate) fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Rc::new(Cell::new(now)),
            sleeps: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub(crate) fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
        let step = chrono::Duration::from_std(duration).unwrap();
        self.now.set(self.now.get() + step);
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Request {
    pub url: String,
    pub at: DateTime<Utc>,
    pub authorization: Option<String>,
}

/// Answers by URL path. Each path replays its queued responses in order and repeats the last one;
/// unknown paths get a 404.
pub(crate) struct MockTransport {
    routes: RefCell<Vec<(String, VecDeque<HttpResponse>)>>,
    requests: Rc<RefCell<Vec<Request>>>,
    clock: FakeClock,
}

impl MockTransport {
    pub(crate) fn new(clock: &FakeClock) -> Self {
        Self {
            routes: RefCell::new(Vec::new()),
            requests: Rc::new(RefCell::new(Vec::new())),
            clock: clock.clone(),
        }
    }

    pub(crate) fn route(self, path: &str, response: HttpResponse) -> Self {
        {
            let mut routes = self.routes.borrow_mut();
            match routes.iter_mut().find(|(known, _)| known == path) {
                Some((_, queue)) => queue.push_back(response),
                None => routes.push((path.to_string(), VecDeque::from([response]))),
            }
        }
        self
    }

    pub(crate) fn json(self, path: &str, body: Value) -> Self {
        self.route(path, HttpResponse::new(200, body.to_string()))
    }

    pub(crate) fn requests(&self) -> Rc<RefCell<Vec<Request>>> {
        Rc::clone(&self.requests)
    }
}

impl Transport for MockTransport {
    fn get(&self, url: &str, headers: &[(&str, String)]) -> Result<HttpResponse> {
        self.requests.borrow_mut().push(Request {
            url: url.to_string(),
            at: self.clock.now(),
            authorization: headers
                .iter()
                .find(|(name, _)| *name == "authorization")
                .map(|(_, value)| value.clone()),
        });

        let path = url
            .strip_prefix(BASE)
            .unwrap_or(url)
            .split('?')
            .next()
            .unwrap_or_default()
            .to_string();

        let mut routes = self.routes.borrow_mut();
        let response = routes
            .iter_mut()
            .find(|(known, _)| *known == path)
            .and_then(|(_, queue)| {
                if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                }
            });
        Ok(response.unwrap_or_else(|| HttpResponse::new(404, r#"{"message":"Not Found"}"#)))
    }
}

/// Queue `items` on `path` as pages of `page_size`, chained with `Link` headers.
pub(crate) fn paged(transport: MockTransport, path: &str, items: &[Value], page_size: usize) -> MockTransport {
    let chunks: Vec<&[Value]> = items.chunks(page_size).collect();
    if chunks.is_empty() {
        return transport.json(path, Value::Array(Vec::new()));
    }

    let total = chunks.len();
    let mut transport = transport;
    for (index, chunk) in chunks.iter().enumerate() {
        let mut response = HttpResponse::new(200, Value::Array(chunk.to_vec()).to_string());
        if index + 1 < total {
            response = response.with_header(
                "link",
                format!(
                    r#"<{BASE}{path}?page={}>; rel="next", <{BASE}{path}?page={total}>; rel="last""#,
                    index + 2
                ),
            );
        }
        transport = transport.route(path, response);
    }
    transport
}

pub(crate) fn client(transport: MockTransport, clock: &FakeClock) -> Client {
    Client::with_parts(
        ClientConfig::new(BASE).with_token("test-token"),
        Box::new(transport),
        Box::new(clock.clone()),
    )
}
