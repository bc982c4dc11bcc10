use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorContext {
    /// Endpoint path the failing call targeted (e.g. "/courses")
    pub endpoint: Option<String>,
    /// Canonical cache key of the call, when one was derived
    pub cache_key: Option<String>,
    /// Additional context about the error
    pub details: Option<String>,
    /// Source of the error (e.g. "executor", "cooldown_gate")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Why the server answered with markup where JSON was expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkupDiagnosis {
    /// A tunnel, proxy or gateway served its own warning/interstitial page.
    InterceptedByProxy,
    /// The origin itself served HTML: the base URL most likely points at a web app, not the API.
    MisconfiguredEndpoint,
}

impl std::fmt::Display for MarkupDiagnosis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarkupDiagnosis::InterceptedByProxy => write!(
                f,
                "the request was intercepted by a proxy or gateway warning page"
            ),
            MarkupDiagnosis::MisconfiguredEndpoint => write!(
                f,
                "the configured endpoint serves HTML, check the API base URL"
            ),
        }
    }
}

/// Unified error type for the caching client.
///
/// `Clone` so that every caller joined onto one in-flight request observes the same failure.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Request for {key} is cooling down and no cached or pending data is available")]
    CooldownRejected { key: String },

    #[error("{message}")]
    Http {
        status: u16,
        message: String,
        context: ErrorContext,
    },

    #[error("Expected JSON but received {content_type}: {diagnosis}{}", format_context(.context))]
    UnexpectedContentType {
        content_type: String,
        diagnosis: MarkupDiagnosis,
        context: ErrorContext,
    },

    #[error("Decode error: {message}{}", format_context(.context))]
    Decode {
        message: String,
        context: ErrorContext,
    },

    #[error("Network transport error: {0}")]
    Transport(#[from] crate::transport::TransportError),

    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("Runtime error: {message}{}", format_context(.context))]
    Runtime {
        message: String,
        context: ErrorContext,
    },
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref endpoint) = ctx.endpoint {
        parts.push(format!("endpoint: {}", endpoint));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    pub fn configuration(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    pub fn decode(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Decode {
            message: msg.into(),
            context,
        }
    }

    pub fn validation(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    pub fn runtime(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Runtime {
            message: msg.into(),
            context,
        }
    }

    /// HTTP status code, for `Http` errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the backend could not be reached or failed on its side (5xx). Client errors
    /// (4xx) and local failures are not upstream failures.
    pub fn is_upstream_failure(&self) -> bool {
        match self {
            Error::Transport(_) => true,
            Error::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. }
            | Error::Http { context, .. }
            | Error::UnexpectedContentType { context, .. }
            | Error::Decode { context, .. }
            | Error::Validation { context, .. }
            | Error::Runtime { context, .. } => Some(context),
            Error::CooldownRejected { .. } | Error::Transport(_) => None,
        }
    }
}
