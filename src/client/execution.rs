//! Request execution: one HTTP call against the currently configured origin.

use super::collaborators::{HeaderProvider, OriginResolver};
use super::error_classification::classify_response;
use crate::cache::Params;
use crate::config::{ApiFamily, OriginSlot};
use crate::transport::{HttpRequest, Method, Transport};
use crate::{Error, ErrorContext, Result};
use bytes::Bytes;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

/// Builds requests (origin, path, query, headers, body) and classifies what comes back.
///
/// Holds no per-request state; the origin and credentials are re-read on every call.
pub struct HttpExecutor {
    transport: Arc<dyn Transport>,
    origins: Arc<dyn OriginResolver>,
    headers: Arc<dyn HeaderProvider>,
    origin_slot: OriginSlot,
    default_headers: BTreeMap<String, String>,
}

impl HttpExecutor {
    pub fn new(
        family: &ApiFamily,
        transport: Arc<dyn Transport>,
        origins: Arc<dyn OriginResolver>,
        headers: Arc<dyn HeaderProvider>,
    ) -> Self {
        Self {
            transport,
            origins,
            headers,
            origin_slot: family.origin,
            default_headers: family.default_headers.clone(),
        }
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    fn base_url(&self) -> String {
        match self.origin_slot {
            OriginSlot::Primary => self.origins.base_url(),
            OriginSlot::Secondary => self.origins.secondary_base_url(),
        }
    }

    /// Assemble the wire request without sending it.
    pub fn build_request(
        &self,
        method: Method,
        endpoint: &str,
        params: Option<&Params>,
        body: Option<&Value>,
    ) -> Result<HttpRequest> {
        let ctx = || ErrorContext::new().with_endpoint(endpoint).with_source("executor");

        let base = self.base_url();
        let base = base.trim();
        if base.is_empty() {
            return Err(Error::configuration("no API base URL is configured", ctx()));
        }
        let joined = format!(
            "{}/{}",
            base.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        );
        let mut url = Url::parse(&joined).map_err(|e| {
            Error::configuration(
                format!("invalid request URL '{}': {}", joined, e),
                ctx(),
            )
        })?;
        if let Some(params) = params {
            let pairs: Vec<(&str, String)> = params.query_pairs().collect();
            if !pairs.is_empty() {
                url.query_pairs_mut().extend_pairs(pairs);
            }
        }

        // Family defaults first, provider headers override them.
        let mut merged: Vec<(String, String)> = self
            .default_headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (name, value) in self.headers.auth_headers() {
            merged.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
            merged.push((name, value));
        }
        if !merged.iter().any(|(k, _)| k.eq_ignore_ascii_case("accept")) {
            merged.push(("Accept".to_string(), "application/json".to_string()));
        }
        merged.push(("x-request-id".to_string(), Uuid::new_v4().to_string()));

        let body = match body {
            Some(value) => {
                let bytes = serde_json::to_vec(value).map_err(|e| {
                    Error::validation(format!("request body is not serializable: {}", e), ctx())
                })?;
                if !merged
                    .iter()
                    .any(|(k, _)| k.eq_ignore_ascii_case("content-type"))
                {
                    merged.push(("Content-Type".to_string(), "application/json".to_string()));
                }
                Some(Bytes::from(bytes))
            }
            None => None,
        };

        Ok(HttpRequest {
            method,
            url,
            headers: merged,
            body,
        })
    }

    /// Send one request and decode the JSON response. No retries.
    pub async fn execute(
        &self,
        method: Method,
        endpoint: &str,
        params: Option<&Params>,
        body: Option<&Value>,
    ) -> Result<Value> {
        let request = self.build_request(method, endpoint, params, body)?;
        let request_id = request.header("x-request-id").unwrap_or("").to_string();
        let started = Instant::now();

        let response = match self.transport.send(request).await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(
                    method = %method,
                    endpoint,
                    request_id = %request_id,
                    duration_ms = started.elapsed().as_millis() as u64,
                    error = %e,
                    "request failed before a response arrived"
                );
                return Err(Error::Transport(e));
            }
        };

        info!(
            method = %method,
            endpoint,
            request_id = %request_id,
            http_status = response.status,
            duration_ms = started.elapsed().as_millis() as u64,
            "request completed"
        );

        if response.status == 401 {
            warn!(endpoint, "credentials rejected, clearing them");
            self.headers.clear_credentials();
        }

        classify_response(&response, endpoint)
    }
}
