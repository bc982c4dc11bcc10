//! In-memory transport that answers from a script and records what it was asked.

use async_trait::async_trait;
use bytes::Bytes;
use campus_client::transport::{HttpRequest, HttpResponse, Transport, TransportError};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Responder =
    dyn Fn(&HttpRequest, usize) -> Result<HttpResponse, TransportError> + Send + Sync + 'static;
type Delay = dyn Fn(&HttpRequest) -> Duration + Send + Sync + 'static;

/// Answers every request with `responder(request, call_index)`, optionally after a delay.
pub struct ScriptedTransport {
    calls: AtomicUsize,
    requests: Mutex<Vec<HttpRequest>>,
    delay: Option<Box<Delay>>,
    responder: Box<Responder>,
}

impl ScriptedTransport {
    pub fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&HttpRequest, usize) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            delay: None,
            responder: Box::new(responder),
        })
    }

    /// Like `new`, but every answer takes `delay` (tokio time, so it honours a paused clock).
    pub fn delayed<F>(delay: Duration, responder: F) -> Arc<Self>
    where
        F: Fn(&HttpRequest, usize) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            delay: Some(Box::new(move |_: &HttpRequest| delay)),
            responder: Box::new(responder),
        })
    }

    /// Per-request delay, e.g. slow reads and fast writes.
    pub fn delayed_by<D, F>(delay: D, responder: F) -> Arc<Self>
    where
        D: Fn(&HttpRequest) -> Duration + Send + Sync + 'static,
        F: Fn(&HttpRequest, usize) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            delay: Some(Box::new(delay)),
            responder: Box::new(responder),
        })
    }

    /// Always answers 200 with `body`.
    pub fn always(body: Value) -> Arc<Self> {
        Self::new(move |_, _| Ok(json(200, &body)))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Option<HttpRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    /// Calls whose method is `method`.
    pub fn calls_with_method(&self, method: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method.as_str() == method)
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = &self.delay {
            let wait = delay(&request);
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
        }
        (self.responder)(&request, index)
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

pub fn json(status: u16, body: &Value) -> HttpResponse {
    HttpResponse {
        status,
        status_text: status_text(status).to_string(),
        content_type: Some("application/json".to_string()),
        body: Bytes::from(body.to_string()),
    }
}

pub fn html(status: u16, page: &str) -> HttpResponse {
    HttpResponse {
        status,
        status_text: status_text(status).to_string(),
        content_type: Some("text/html; charset=utf-8".to_string()),
        body: Bytes::from(page.to_string()),
    }
}

pub fn raw(status: u16, content_type: &str, body: &str) -> HttpResponse {
    HttpResponse {
        status,
        status_text: status_text(status).to_string(),
        content_type: Some(content_type.to_string()),
        body: Bytes::from(body.to_string()),
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        401 => "Unauthorized",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "",
    }
}
