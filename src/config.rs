//! Per-API-family engine configuration.
//!
//! One engine serves every API family; what differs between families (which origin, how long
//! responses live, which reads a write invalidates) is described here.

use crate::cache::endpoint_family;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Which of the origin resolver's base URLs a family talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginSlot {
    #[default]
    Primary,
    Secondary,
}

/// A write to an endpoint under `prefix` also invalidates reads under each of `invalidates`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InvalidationRule {
    pub prefix: String,
    pub invalidates: Vec<String>,
}

impl InvalidationRule {
    pub fn new(prefix: impl Into<String>, invalidates: &[&str]) -> Self {
        Self {
            prefix: prefix.into(),
            invalidates: invalidates.iter().map(|s| s.to_string()).collect(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_cooldown_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

/// Engine parameters for one API family.
///
/// Unknown keys are rejected when loading from YAML/JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiFamily {
    pub name: String,
    #[serde(default)]
    pub origin: OriginSlot,
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
    /// Bound on cached entries; unbounded when absent.
    #[serde(default)]
    pub max_entries: Option<usize>,
    /// Serve stale entries immediately and refresh them in the background.
    #[serde(default)]
    pub stale_while_revalidate: bool,
    /// Serve a stale entry when the network or the server (5xx) fails.
    #[serde(default = "default_true")]
    pub stale_on_error: bool,
    #[serde(default)]
    pub invalidation: Vec<InvalidationRule>,
    /// Sent with every request, beneath the header provider's headers.
    #[serde(default)]
    pub default_headers: BTreeMap<String, String>,
}

impl ApiFamily {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            origin: OriginSlot::Primary,
            default_ttl_secs: default_ttl_secs(),
            cooldown_ms: default_cooldown_ms(),
            cache_enabled: true,
            max_entries: None,
            stale_while_revalidate: false,
            stale_on_error: true,
            invalidation: Vec::new(),
            default_headers: BTreeMap::new(),
        }
    }

    /// Institutes, classes, subjects, homework, exams, organizations.
    pub fn general() -> Self {
        Self::new("general").with_invalidation(vec![
            InvalidationRule::new("/homework", &["/homework", "/submissions"]),
            InvalidationRule::new("/exams", &["/exams", "/results"]),
            InvalidationRule::new("/classes", &["/classes", "/subjects", "/students"]),
        ])
    }

    /// Attendance lives on the secondary backend and changes minute to minute.
    pub fn attendance() -> Self {
        Self::new("attendance")
            .with_origin(OriginSlot::Secondary)
            .with_default_ttl(Duration::from_secs(60))
    }

    /// Long-lived reference data, served stale while refreshing.
    pub fn enhanced() -> Self {
        Self::new("enhanced")
            .with_default_ttl(Duration::from_secs(1800))
            .with_stale_while_revalidate(true)
    }

    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let family: Self = serde_yaml::from_str(s).map_err(|e| {
            Error::configuration(
                format!("invalid API family config: {}", e),
                ErrorContext::new().with_source("config"),
            )
        })?;
        family.validate()?;
        Ok(family)
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let family: Self = serde_json::from_str(s).map_err(|e| {
            Error::configuration(
                format!("invalid API family config: {}", e),
                ErrorContext::new().with_source("config"),
            )
        })?;
        family.validate()?;
        Ok(family)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::configuration(
                "API family name must not be empty",
                ErrorContext::new().with_source("config"),
            ));
        }
        if self.default_ttl_secs == 0 && self.cache_enabled {
            return Err(Error::configuration(
                format!("family '{}': default_ttl_secs must be positive", self.name),
                ErrorContext::new().with_source("config"),
            ));
        }
        if let Some(rule) = self.invalidation.iter().find(|r| !r.prefix.starts_with('/')) {
            return Err(Error::configuration(
                format!("invalidation prefix '{}' must start with '/'", rule.prefix),
                ErrorContext::new().with_source("config"),
            ));
        }
        Ok(())
    }

    /// Apply environment overrides:
    /// - `CAMPUS_CACHE_TTL_SECS`
    /// - `CAMPUS_COOLDOWN_MS`
    /// - `CAMPUS_CACHE_DISABLED=1`
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(ttl) = std::env::var("CAMPUS_CACHE_TTL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|v| *v > 0)
        {
            self.default_ttl_secs = ttl;
        }
        if let Some(ms) = std::env::var("CAMPUS_COOLDOWN_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            self.cooldown_ms = ms;
        }
        if std::env::var("CAMPUS_CACHE_DISABLED").ok().as_deref() == Some("1") {
            self.cache_enabled = false;
        }
        self
    }

    pub fn with_origin(mut self, origin: OriginSlot) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl_secs = ttl.as_secs().max(1);
        self
    }

    pub fn with_cooldown(mut self, window: Duration) -> Self {
        self.cooldown_ms = window.as_millis() as u64;
        self
    }

    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }

    pub fn with_stale_while_revalidate(mut self, enabled: bool) -> Self {
        self.stale_while_revalidate = enabled;
        self
    }

    pub fn with_stale_on_error(mut self, enabled: bool) -> Self {
        self.stale_on_error = enabled;
        self
    }

    pub fn with_invalidation(mut self, rules: Vec<InvalidationRule>) -> Self {
        self.invalidation = rules;
        self
    }

    pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// Endpoint prefixes a write to `endpoint` invalidates according to the family's rules, or
    /// `None` when no rule covers it.
    pub fn invalidation_targets(&self, endpoint: &str) -> Option<Vec<&str>> {
        let family = endpoint_family(endpoint);
        let targets: Vec<&str> = self
            .invalidation
            .iter()
            .filter(|r| endpoint_family(&r.prefix) == family && endpoint.starts_with(&r.prefix))
            .flat_map(|r| r.invalidates.iter().map(String::as_str))
            .collect();
        if targets.is_empty() {
            None
        } else {
            Some(targets)
        }
    }
}

impl Default for ApiFamily {
    fn default() -> Self {
        Self::general()
    }
}
