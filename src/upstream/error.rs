use thiserror::Error;

/// Errors talking to the Automatic accounts and API hosts.
///
/// `is_retryable()` separates transient failures (transport errors, rate
/// limits, server errors) from permanent ones so callers can give up early.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Invalid response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid upstream URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl UpstreamError {
    pub fn is_retryable(&self) -> bool {
        match self {
            UpstreamError::Status { status, .. } => *status == 429 || *status >= 500,
            UpstreamError::Http { .. } => true,
            UpstreamError::Decode { .. } => false,
            UpstreamError::InvalidUrl { .. } => false,
            UpstreamError::Client(_) => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
