//! Response classification: turns a raw [`HttpResponse`] into a JSON value or a typed error.

use crate::error::MarkupDiagnosis;
use crate::transport::HttpResponse;
use crate::{Error, ErrorContext, Result};
use serde_json::Value;

/// Text found on tunnel/proxy interstitial pages rather than on an application's own HTML.
const INTERSTITIAL_MARKERS: &[&str] = &[
    "ngrok",
    "browser-warning",
    "you are about to visit",
    "tunnel",
    "interstitial",
    "proxy",
];

/// Decode a response the way callers expect: 2xx JSON (or empty) succeeds, everything else maps
/// onto the error taxonomy.
pub(crate) fn classify_response(resp: &HttpResponse, endpoint: &str) -> Result<Value> {
    let context = || ErrorContext::new().with_endpoint(endpoint).with_source("executor");

    if !resp.is_success() {
        let message = server_message(&resp.text()).unwrap_or_else(|| {
            if resp.status_text.is_empty() {
                format!("HTTP {}", resp.status)
            } else {
                format!("HTTP {}: {}", resp.status, resp.status_text)
            }
        });
        return Err(Error::Http {
            status: resp.status,
            message,
            context: context(),
        });
    }

    if is_markup(resp.content_type.as_deref(), &resp.body) {
        return Err(Error::UnexpectedContentType {
            content_type: resp
                .content_type
                .clone()
                .unwrap_or_else(|| "text/html".to_string()),
            diagnosis: diagnose_markup(&resp.text()),
            context: context(),
        });
    }

    if resp.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }

    serde_json::from_slice(&resp.body).map_err(|e| {
        Error::decode(
            format!("malformed JSON body: {}", e),
            context().with_details(format!("http_status: {}", resp.status)),
        )
    })
}

/// A displayable message from a JSON error body: `message`, `error` (string or object with
/// `message`), or `detail`.
pub(crate) fn server_message(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;
    let non_empty = |v: &Value| {
        v.as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    json.get("message")
        .and_then(non_empty)
        .or_else(|| json.get("error").and_then(non_empty))
        .or_else(|| {
            json.get("error")
                .and_then(|e| e.get("message"))
                .and_then(non_empty)
        })
        .or_else(|| json.get("detail").and_then(non_empty))
}

pub(crate) fn is_markup(content_type: Option<&str>, body: &[u8]) -> bool {
    if let Some(ct) = content_type {
        let ct = ct.to_ascii_lowercase();
        if ct.contains("text/html") || ct.contains("application/xhtml") {
            return true;
        }
        if ct.contains("json") {
            return false;
        }
    }
    let head: String = String::from_utf8_lossy(&body[..body.len().min(64)])
        .trim_start()
        .to_ascii_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}

pub(crate) fn diagnose_markup(body: &str) -> MarkupDiagnosis {
    let lower = body.to_ascii_lowercase();
    if INTERSTITIAL_MARKERS.iter().any(|m| lower.contains(m)) {
        MarkupDiagnosis::InterceptedByProxy
    } else {
        MarkupDiagnosis::MisconfiguredEndpoint
    }
}
