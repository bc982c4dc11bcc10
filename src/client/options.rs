use crate::cache::TenantContext;
use crate::{Error, ErrorContext, Result};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Per-call options for cached reads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    /// Freshness window for this call; the family default applies when unset.
    pub ttl: Option<Duration>,
    /// Skip the cache probe and go to the network (still deduplicated and throttled).
    pub force_refresh: bool,
    pub tenant: TenantContext,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawOptions {
    #[serde(default)]
    ttl_seconds: Option<f64>,
    #[serde(default)]
    force_refresh: bool,
    #[serde(default)]
    tenant_context: TenantContext,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    pub fn tenant(mut self, tenant: TenantContext) -> Self {
        self.tenant = tenant;
        self
    }

    /// Parse options from a loosely typed object such as
    /// `{"ttlSeconds": 60, "forceRefresh": true, "tenantContext": {"userId": "u1"}}`.
    pub fn from_json(value: &Value) -> Result<Self> {
        let raw: RawOptions = serde_json::from_value(value.clone()).map_err(|e| {
            Error::validation(
                format!("invalid request options: {}", e),
                ErrorContext::new().with_source("options"),
            )
        })?;
        let ttl = match raw.ttl_seconds {
            Some(secs) if secs.is_finite() && secs > 0.0 => Some(Duration::from_secs_f64(secs)),
            Some(secs) => {
                return Err(Error::validation(
                    format!("ttlSeconds must be a positive number, got {}", secs),
                    ErrorContext::new().with_source("options"),
                ))
            }
            None => None,
        };
        Ok(Self {
            ttl,
            force_refresh: raw.force_refresh,
            tenant: raw.tenant_context,
        })
    }
}
