//! Scripted transport and collaborators for testing
//!
//! [`MockTransport`] answers requests from a list of routes matched by method
//! and URL substring, records every request it sees, and can delay or fail
//! individual routes. It lets the provider adapters be exercised end to end
//! without network access or real credentials.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::sleep;

use crate::error::{ProviderError, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};
use crate::link_card::{LinkCard, LinkCardFetcher};
use crate::token::{Token, TokenStore};

/// Build a JSON response with the given status
pub fn json_response(status: u16, body: Value) -> HttpResponse {
    HttpResponse::new(
        status,
        vec![("content-type".to_string(), "application/json".to_string())],
        body.to_string().into_bytes(),
    )
}

#[derive(Debug, Clone)]
enum Reply {
    Response(HttpResponse),
    Failure(String),
}

#[derive(Debug)]
struct Route {
    method: HttpMethod,
    pattern: String,
    /// Replies in order; the last one repeats
    replies: VecDeque<Reply>,
    delay: Duration,
}

impl Route {
    fn matches(&self, method: HttpMethod, target: &str) -> bool {
        self.method == method && target.contains(&self.pattern)
    }

    fn next_reply(&mut self) -> Option<Reply> {
        if self.replies.len() > 1 {
            self.replies.pop_front()
        } else {
            self.replies.front().cloned()
        }
    }
}

/// Transport answering from scripted routes
///
/// Routes are checked in registration order; the first whose method matches
/// and whose pattern occurs in the URL (query string included) answers.
/// Unmatched requests get a 404.
#[derive(Debug, Default)]
pub struct MockTransport {
    routes: Mutex<Vec<Route>>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `method` requests to URLs containing `pattern`
    ///
    /// Registering the same method and pattern again queues another reply.
    pub fn on(self, method: HttpMethod, pattern: &str, response: HttpResponse) -> Self {
        self.push(method, pattern, Reply::Response(response));
        self
    }

    /// Fail matching requests at the transport level
    pub fn fail(self, method: HttpMethod, pattern: &str, message: &str) -> Self {
        self.push(method, pattern, Reply::Failure(message.to_string()));
        self
    }

    /// Delay every answer of an already registered route
    pub fn delay(self, method: HttpMethod, pattern: &str, delay: Duration) -> Self {
        if let Ok(mut routes) = self.routes.lock() {
            for route in routes
                .iter_mut()
                .filter(|r| r.method == method && r.pattern == pattern)
            {
                route.delay = delay;
            }
        }
        self
    }

    fn push(&self, method: HttpMethod, pattern: &str, reply: Reply) {
        let Ok(mut routes) = self.routes.lock() else {
            return;
        };
        match routes
            .iter_mut()
            .find(|r| r.method == method && r.pattern == pattern)
        {
            Some(route) => route.replies.push_back(reply),
            None => routes.push(Route {
                method,
                pattern: pattern.to_string(),
                replies: VecDeque::from([reply]),
                delay: Duration::ZERO,
            }),
        }
    }

    /// Every request received, in order
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Requests with `method` whose URL (query included) contains `pattern`
    pub fn requests_to(&self, method: HttpMethod, pattern: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && target_of(r).contains(pattern))
            .collect()
    }

    pub fn count(&self, method: HttpMethod, pattern: &str) -> usize {
        self.requests_to(method, pattern).len()
    }
}

fn target_of(request: &HttpRequest) -> String {
    if request.query.is_empty() {
        return request.url.clone();
    }
    let query: Vec<String> = request
        .query
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    format!("{}?{}", request.url, query.join("&"))
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, ProviderError> {
        let target = target_of(&request);
        let method = request.method;

        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        let matched = match self.routes.lock() {
            Ok(mut routes) => routes
                .iter_mut()
                .find(|r| r.matches(method, &target))
                .and_then(|route| route.next_reply().map(|reply| (reply, route.delay))),
            Err(_) => None,
        };

        let Some((reply, delay)) = matched else {
            return Ok(json_response(
                404,
                serde_json::json!({ "message": format!("no mock route for {} {}", method, target) }),
            ));
        };

        if !delay.is_zero() {
            sleep(delay).await;
        }

        match reply {
            Reply::Response(response) => Ok(response),
            Reply::Failure(message) => Err(ProviderError::Transport(message)),
        }
    }
}

/// Token store remembering every update
#[derive(Debug, Default, Clone)]
pub struct RecordingTokenStore {
    updates: Arc<Mutex<Vec<Token>>>,
}

impl RecordingTokenStore {
    pub fn updates(&self) -> usize {
        self.updates.lock().map(|u| u.len()).unwrap_or(0)
    }

    pub fn last(&self) -> Option<Token> {
        self.updates.lock().ok().and_then(|u| u.last().cloned())
    }
}

impl TokenStore for RecordingTokenStore {
    fn update_token(&self, token: &Token) -> Result<()> {
        if let Ok(mut updates) = self.updates.lock() {
            updates.push(token.clone());
        }
        Ok(())
    }
}

/// Link card fetcher returning a fixed card
#[derive(Debug, Default, Clone)]
pub struct StaticLinkCards {
    card: LinkCard,
    fetched: Arc<Mutex<Vec<String>>>,
}

impl StaticLinkCards {
    pub fn new(card: LinkCard) -> Self {
        Self {
            card,
            fetched: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// URLs fetched so far
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().map(|f| f.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LinkCardFetcher for StaticLinkCards {
    async fn fetch(&self, url: &str) -> LinkCard {
        if let Ok(mut fetched) = self.fetched.lock() {
            fetched.push(url.to_string());
        }
        self.card.clone()
    }
}
