//! Shared test utilities for the navigation engine.
//!
//! Provides a [`MockFetcher`] that serves scripted responses per URL and
//! records every request it receives, plus a [`RecordingOpener`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;

use capsule_net::fetch::{FetchRequest, Fetcher};
use capsule_types::error::{CapsuleError, Result};
use capsule_types::response::{GeminiResponse, Header, Response, Status};

use crate::opener::ExternalOpener;

/// Build a Gemini response as if `header` (without CRLF) and `body` had
/// come off the wire for `url`.
pub fn gemini_response(url: &str, header: &str, body: &str) -> Response {
    let header = Header::parse(format!("{header}\r\n").as_bytes()).unwrap();
    let body = if header.status == Status::Success {
        body.as_bytes().to_vec()
    } else {
        Vec::new()
    };
    Response::Gemini(GeminiResponse {
        header,
        url: url.to_string(),
        body,
    })
}

type Reply = Box<dyn Fn(&FetchRequest) -> Result<Response> + Send + Sync>;

struct Route {
    delay: Duration,
    reply: Reply,
}

/// A [`Fetcher`] serving canned replies keyed by exact URL.
#[derive(Default)]
pub struct MockFetcher {
    routes: HashMap<String, Route>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `header` + `body` for `url` immediately.
    pub fn gemini(self, url: &str, header: &str, body: &str) -> Self {
        self.gemini_after(url, Duration::ZERO, header, body)
    }

    /// Serve `header` + `body` for `url` after `delay`.
    pub fn gemini_after(self, url: &str, delay: Duration, header: &str, body: &str) -> Self {
        let (header, body) = (header.to_string(), body.to_string());
        self.route(url, delay, move |req| {
            Ok(gemini_response(req.url.as_str(), &header, &body))
        })
    }

    /// Fail `url` with the error built by `make`.
    pub fn error(self, url: &str, make: fn() -> CapsuleError) -> Self {
        self.route(url, Duration::ZERO, move |_| Err(make()))
    }

    pub fn route(
        mut self,
        url: &str,
        delay: Duration,
        reply: impl Fn(&FetchRequest) -> Result<Response> + Send + Sync + 'static,
    ) -> Self {
        self.routes.insert(url.to_string(), Route {
            delay,
            reply: Box::new(reply),
        });
        self
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_urls(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.url.to_string()).collect()
    }
}

impl Fetcher for MockFetcher {
    fn fetch<'a>(&'a self, request: &'a FetchRequest) -> BoxFuture<'a, Result<Response>> {
        async move {
            self.requests.lock().unwrap().push(request.clone());
            let Some(route) = self.routes.get(request.url.as_str()) else {
                return Err(CapsuleError::Dial(format!("no route to {}", request.url)));
            };
            if !route.delay.is_zero() {
                tokio::time::sleep(route.delay).await;
            }
            (route.reply)(request)
        }
        .boxed()
    }
}

/// An [`ExternalOpener`] that remembers what it was asked to open.
#[derive(Default, Clone)]
pub struct RecordingOpener {
    pub opened: Arc<Mutex<Vec<String>>>,
}

impl ExternalOpener for RecordingOpener {
    fn open(&self, url: &str) -> Result<()> {
        self.opened.lock().unwrap().push(url.to_string());
        Ok(())
    }
}
