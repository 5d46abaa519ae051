use thiserror::Error;

use crate::store::StoreError;
use crate::upstream::UpstreamError;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Unable to refresh token {token_id} without a refresh token")]
    MissingRefreshToken { token_id: String },

    #[error("Malformed token record: {0}")]
    Malformed(String),

    #[error("No usable access token for account {account_id}: {}", .reasons.join(", "))]
    NoUsableToken {
        account_id: String,
        reasons: Vec<String>,
        /// Whether any candidate failed for a transient reason.
        retryable: bool,
    },

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TokenError {
    pub fn is_retryable(&self) -> bool {
        match self {
            TokenError::MissingRefreshToken { .. } => false,
            TokenError::Malformed(_) => false,
            TokenError::NoUsableToken { retryable, .. } => *retryable,
            TokenError::Upstream(e) => e.is_retryable(),
            TokenError::Store(e) => !e.is_condition_failed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_refresh_token_not_retryable() {
        let e = TokenError::MissingRefreshToken {
            token_id: "t".into(),
        };
        assert!(!e.is_retryable());
    }

    #[test]
    fn test_no_usable_token_lists_reasons() {
        let e = TokenError::NoUsableToken {
            account_id: "auid:1".into(),
            reasons: vec!["first: bad".into(), "second: worse".into()],
            retryable: true,
        };
        assert_eq!(
            e.to_string(),
            "No usable access token for account auid:1: first: bad, second: worse"
        );
        assert!(e.is_retryable());
    }

    #[test]
    fn test_upstream_classification_passes_through() {
        let e = TokenError::Upstream(UpstreamError::Status {
            status: 401,
            url: "x".into(),
        });
        assert!(!e.is_retryable());
        let e = TokenError::Upstream(UpstreamError::Status {
            status: 502,
            url: "x".into(),
        });
        assert!(e.is_retryable());
    }
}
