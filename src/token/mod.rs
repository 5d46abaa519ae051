//! OAuth access tokens: the stored record, freshness, refresh and rotation.
//!
//! Tokens live under the owning account's hash key with sort key
//! `access-token/<token id>`. Token IDs are time-ordered, so the newest token
//! is the last one in sort order.

pub mod error;
pub mod lifecycle;

use chrono::{DateTime, TimeZone, Utc};
use reqwest::RequestBuilder;
use uuid::Uuid;

use crate::store::{AttributeValue, Item, PrimaryKey, GSI2_HASH_KEY, GSI2_SORT_KEY};
use crate::upstream::TokenResponse;

pub use error::TokenError;
pub use lifecycle::{find_current_token, refresh};

pub const TOKEN_SORT_KEY_PREFIX: &str = "access-token/";

/// Tokens are treated as expired this many seconds before their nominal expiry.
pub const EXPIRY_MARGIN_SECS: i64 = 5 * 60;

/// How long a token record outlives the token itself before the store may
/// reclaim it.
pub const RECORD_RETENTION_SECS: i64 = 90 * 24 * 60 * 60;

#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub id: String,
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub scopes: Vec<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_in: i64,
    pub token_type: String,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("scopes", &self.scopes)
            .field("issued_at", &self.issued_at)
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

impl AccessToken {
    /// Build a token from an access-token grant issued at `issued_at`, with a
    /// fresh time-ordered ID.
    pub fn from_response(response: TokenResponse, issued_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            user_id: response.user_id,
            access_token: response.access_token,
            refresh_token: response.refresh_token.filter(|r| !r.is_empty()),
            scopes: response
                .scope
                .split(' ')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            issued_at: Some(issued_at),
            expires_in: response.expires_in,
            token_type: response.token_type,
        }
    }

    pub fn key(&self, account_id: &str) -> PrimaryKey {
        PrimaryKey::new(account_id, format!("{TOKEN_SORT_KEY_PREFIX}{}", self.id))
    }

    /// True when the token is unusable at `now`: it carries no lifetime or no
    /// issue time, or it is within [`EXPIRY_MARGIN_SECS`] of expiring.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let Some(issued_at) = self.issued_at else {
            return true;
        };
        if self.expires_in == 0 {
            return true;
        }
        let usable_until = issued_at
            .timestamp()
            .saturating_add(self.expires_in)
            .saturating_sub(EXPIRY_MARGIN_SECS);
        usable_until <= now.timestamp()
    }

    /// When the stored record may be reclaimed.
    pub fn record_expires_at(&self) -> Option<DateTime<Utc>> {
        let issued_at = self.issued_at?;
        let expires_at = issued_at
            .timestamp()
            .saturating_add(self.expires_in)
            .saturating_add(RECORD_RETENTION_SECS);
        Utc.timestamp_opt(expires_at, 0).single()
    }

    /// Attach the bearer credential to an outbound request.
    pub fn sign(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.access_token)
    }

    pub fn to_item(&self, account_id: &str) -> Item {
        let mut item = Item::new(&self.key(account_id))
            .with("UserID", AttributeValue::string(&self.user_id))
            .with("AccessToken", AttributeValue::string(&self.access_token))
            .with("ExpiresIn", AttributeValue::number(self.expires_in))
            .with("TokenType", AttributeValue::string(&self.token_type))
            .with(
                GSI2_HASH_KEY,
                AttributeValue::string(format!("access_token/{}", self.user_id)),
            )
            .with(
                GSI2_SORT_KEY,
                AttributeValue::string(format!("token-for/{account_id}")),
            );
        if let Some(refresh) = &self.refresh_token {
            item.set("RefreshToken", AttributeValue::string(refresh));
        }
        if !self.scopes.is_empty() {
            item.set("Scopes", AttributeValue::string_set(self.scopes.iter().cloned()));
        }
        if let Some(issued_at) = self.issued_at {
            item.set("IssuedAt", AttributeValue::time(issued_at));
        }
        if let Some(expires_at) = self.record_expires_at() {
            item.set("ExpiresAt", AttributeValue::time(expires_at));
        }
        item
    }

    pub fn from_item(item: &Item) -> Result<Self, TokenError> {
        let key = item
            .key()
            .map_err(|e| TokenError::Malformed(e.to_string()))?;
        let sort_key = key.sort_key.as_str();
        let id = sort_key
            .strip_prefix(TOKEN_SORT_KEY_PREFIX)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| TokenError::Malformed(format!("unexpected sort key {sort_key}")))?;
        let access_token = item
            .string("AccessToken")
            .filter(|t| !t.is_empty())
            .ok_or_else(|| TokenError::Malformed(format!("token {id} has no access token")))?;

        Ok(Self {
            id: id.to_string(),
            user_id: item.string("UserID").unwrap_or_default().to_string(),
            access_token: access_token.to_string(),
            refresh_token: item
                .string("RefreshToken")
                .filter(|r| !r.is_empty())
                .map(str::to_string),
            scopes: item.string_set("Scopes").map(<[String]>::to_vec).unwrap_or_default(),
            issued_at: item.time("IssuedAt"),
            expires_in: item.number("ExpiresIn").unwrap_or(0),
            token_type: item.string("TokenType").unwrap_or_default().to_string(),
        })
    }

    #[cfg(test)]
    pub fn for_tests(id: &str, user_id: &str, access: &str, refresh: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            user_id: user_id.to_string(),
            access_token: access.to_string(),
            refresh_token: refresh.map(str::to_string),
            scopes: vec!["scope:trip".to_string()],
            issued_at: Some(Utc::now()),
            expires_in: 3600,
            token_type: "Bearer".to_string(),
        }
    }
}
