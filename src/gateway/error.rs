//! Gateway error taxonomy

use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Rate limited by content API")]
    RateLimited { retry_after: Option<u64> },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Status code: {0}")]
    Status(u16),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("No more pages to fetch")]
    ExhaustedCursor,

    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("Gateway configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    /// Whether repeating the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimited { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Classify the error for the "load more" control.
    ///
    /// Any failure that is not a rate limit or a decoding problem is reported
    /// as a network failure, including unexpected status codes.
    pub fn load_failure(&self) -> LoadFailure {
        match self {
            Self::RateLimited { .. } => LoadFailure::RateLimited,
            Self::MalformedResponse(_) | Self::InvalidCursor(_) => LoadFailure::MalformedResponse,
            _ => LoadFailure::Network,
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        Self::MalformedResponse(e.to_string())
    }
}

/// Why a pagination fetch failed, as surfaced to readers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadFailure {
    Network,
    RateLimited,
    MalformedResponse,
}

impl LoadFailure {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Network => "Could not reach the server. Try again.",
            Self::RateLimited => "Too many requests. Wait a moment and try again.",
            Self::MalformedResponse => "The server sent an unexpected response.",
        }
    }
}
