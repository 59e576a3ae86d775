//! Error types for name resolution

use std::fmt;
use std::time::Duration;

use serde::ser::{Serialize, SerializeStruct, Serializer};

/// Failure of the core resolution step (name ↔ address).
///
/// Enrichment failures never surface as this type; they are absorbed and
/// show up as absent fields on the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    /// Input was malformed and rejected before any I/O
    InvalidFormat(String),
    /// Provider answered but holds no mapping for the input
    NotFound(String),
    /// Provider did not answer within the budget
    Timeout(Duration),
    /// Transport or parse failure inside the provider
    Provider(String),
}

impl ResolutionError {
    /// Whether a caller-side retry could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Provider(_))
    }

    /// Short machine-readable kind, used in logs and serialized state
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidFormat(_) => "invalid_format",
            Self::NotFound(_) => "not_found",
            Self::Timeout(_) => "timeout",
            Self::Provider(_) => "provider_error",
        }
    }
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFormat(msg) => write!(f, "Invalid format: {msg}"),
            Self::NotFound(input) => write!(f, "No mapping found for {input}"),
            Self::Timeout(budget) => {
                write!(f, "Provider timed out after {}ms", budget.as_millis())
            }
            Self::Provider(msg) => write!(f, "Provider error: {msg}"),
        }
    }
}

impl std::error::Error for ResolutionError {}

// Surfaced through the state store, so observers get `{kind, message}`
impl Serialize for ResolutionError {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ResolutionError", 2)?;
        state.serialize_field("kind", self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

impl From<ProviderError> for ResolutionError {
    fn from(err: ProviderError) -> Self {
        Self::Provider(err.to_string())
    }
}

/// Errors raised by naming and enrichment transports
#[derive(Debug)]
pub enum ProviderError {
    /// HTTP request failed
    Http(reqwest::Error),
    /// Failed to parse JSON response
    Json(serde_json::Error),
    /// Backend answered with a non-success status
    Api(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(e) => write!(f, "HTTP error: {e}"),
            Self::Json(e) => write!(f, "JSON parse error: {e}"),
            Self::Api(msg) => write!(f, "API error: {msg}"),
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Http(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Api(_) => None,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err)
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}

pub type Result<T> = std::result::Result<T, ResolutionError>;
