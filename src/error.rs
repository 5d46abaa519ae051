//! Errors surfaced by workflow steps and their public mapping.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreError;
use crate::token::TokenError;
use crate::upstream::UpstreamError;

pub const CODE_ALREADY_IN_PROGRESS: &str = "UPDATE_ALREADY_IN_PROGRESS";
pub const CODE_NOT_FOUND: &str = "RECORD_NOT_FOUND";
pub const CODE_MISSING_UPDATE_ID: &str = "EVENT_MISSING_UPDATE_ID";
pub const CODE_UNHANDLED: &str = "UNHANDLED_ERROR";

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("An update is already running for account {account_id}")]
    AlreadyInProgress { account_id: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Event has no update ID")]
    MissingUpdateId,

    #[error("Invalid resumption context {0:?}")]
    InvalidContext(String),

    #[error("Update interrupted by shutdown")]
    Interrupted,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl UpdateError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Stable machine-readable code reported to the step invoker.
    pub fn code(&self) -> &'static str {
        match self {
            UpdateError::AlreadyInProgress { .. } => CODE_ALREADY_IN_PROGRESS,
            UpdateError::NotFound { .. } => CODE_NOT_FOUND,
            UpdateError::MissingUpdateId => CODE_MISSING_UPDATE_ID,
            _ => CODE_UNHANDLED,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            UpdateError::AlreadyInProgress { .. } => 409,
            UpdateError::NotFound { .. } => 404,
            _ => 500,
        }
    }

    /// HTTP status returned by the upstream API, if that is what failed.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            UpdateError::Upstream(e) => e.status(),
            _ => None,
        }
    }

    /// Detail safe to show outside the process. Unhandled failures stay
    /// opaque; their full cause goes to the log.
    pub fn public_detail(&self) -> &'static str {
        match self {
            UpdateError::AlreadyInProgress { .. } => {
                "There is already an update running for this account."
            }
            UpdateError::NotFound { .. } => "The requested record could not be found.",
            UpdateError::MissingUpdateId => "Can't find an update without an ID.",
            _ => "Unhandled error",
        }
    }

    /// Whether re-running the failed step may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            UpdateError::AlreadyInProgress { .. }
            | UpdateError::NotFound { .. }
            | UpdateError::MissingUpdateId
            | UpdateError::InvalidContext(_)
            | UpdateError::Interrupted => false,
            UpdateError::Token(e) => e.is_retryable(),
            UpdateError::Upstream(e) => e.is_retryable(),
            UpdateError::Store(e) => !e.is_condition_failed(),
        }
    }

    pub fn to_failure(&self) -> UpdateFailure {
        if self.code() == CODE_UNHANDLED {
            tracing::error!(error = %self, "Unhandled update failure");
        }
        UpdateFailure {
            error: self.code().to_string(),
            cause: self.public_detail().to_string(),
        }
    }
}

/// Failure record handed back to the invoker (`{"Error": .., "Cause": ..}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateFailure {
    pub error: String,
    pub cause: String,
}

impl std::fmt::Display for UpdateFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.cause)
    }
}

impl From<&UpdateError> for UpdateFailure {
    fn from(err: &UpdateError) -> Self {
        err.to_failure()
    }
}
