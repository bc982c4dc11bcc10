//! Boundary traits for the pieces the engine does not own: credentials and backend origins.

use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Supplies request headers (bearer token, content type) and forgets credentials when the
/// server rejects them.
pub trait HeaderProvider: Send + Sync {
    fn auth_headers(&self) -> HashMap<String, String>;

    /// Called after a 401 response.
    fn clear_credentials(&self);
}

/// Resolves backend origins. Read on every request, never memoized: another part of the process
/// may retarget the backend at any time. An empty string means "not configured".
pub trait OriginResolver: Send + Sync {
    fn base_url(&self) -> String;

    /// Origin of the secondary backend. Resolvers without one report it unconfigured.
    fn secondary_base_url(&self) -> String {
        String::new()
    }
}

/// No credentials at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAuth;

impl HeaderProvider for NoAuth {
    fn auth_headers(&self) -> HashMap<String, String> {
        HashMap::new()
    }

    fn clear_credentials(&self) {}
}

/// Bearer token held in memory.
#[derive(Debug, Default)]
pub struct BearerTokenProvider {
    token: RwLock<Option<String>>,
}

impl BearerTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }

    pub fn set_token(&self, token: impl Into<String>) {
        if let Ok(mut t) = self.token.write() {
            *t = Some(token.into());
        }
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().ok().and_then(|t| t.clone())
    }
}

impl HeaderProvider for BearerTokenProvider {
    fn auth_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        if let Some(token) = self.token() {
            headers.insert("Authorization".to_string(), format!("Bearer {}", token));
        }
        headers
    }

    fn clear_credentials(&self) {
        if let Ok(mut t) = self.token.write() {
            *t = None;
        }
    }
}

/// Fixed origin(s).
#[derive(Debug, Clone, Default)]
pub struct StaticOrigin {
    primary: String,
    secondary: Option<String>,
}

impl StaticOrigin {
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: None,
        }
    }

    pub fn with_secondary(mut self, secondary: impl Into<String>) -> Self {
        self.secondary = Some(secondary.into());
        self
    }

    pub fn unconfigured() -> Self {
        Self::default()
    }
}

impl OriginResolver for StaticOrigin {
    fn base_url(&self) -> String {
        self.primary.clone()
    }

    fn secondary_base_url(&self) -> String {
        self.secondary.clone().unwrap_or_default()
    }
}

/// Origins that can be swapped at runtime without locking readers.
#[derive(Debug)]
pub struct SwitchableOrigin {
    primary: ArcSwap<String>,
    secondary: ArcSwap<String>,
}

impl SwitchableOrigin {
    pub fn new(primary: impl Into<String>, secondary: impl Into<String>) -> Self {
        Self {
            primary: ArcSwap::from_pointee(primary.into()),
            secondary: ArcSwap::from_pointee(secondary.into()),
        }
    }

    pub fn set_primary(&self, url: impl Into<String>) {
        self.primary.store(Arc::new(url.into()));
    }

    pub fn set_secondary(&self, url: impl Into<String>) {
        self.secondary.store(Arc::new(url.into()));
    }
}

impl Default for SwitchableOrigin {
    fn default() -> Self {
        Self::new("", "")
    }
}

impl OriginResolver for SwitchableOrigin {
    fn base_url(&self) -> String {
        (**self.primary.load()).clone()
    }

    fn secondary_base_url(&self) -> String {
        (**self.secondary.load()).clone()
    }
}
