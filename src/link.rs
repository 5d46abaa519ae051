//! Account materialization after the OAuth authorization callback.
//!
//! The authorization code is exchanged for a token; the token's upstream user
//! either already has an account (found through GSI2) or gets a new one built
//! from the upstream profile. The account, the token and, for new accounts,
//! an email contact row are written in one transaction.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::account::{find_account_by_automatic_id, Account};
use crate::services::Services;
use crate::store::{AttributeValue, Item, PrimaryKey, StoreError, TransactOp};
use crate::token::AccessToken;
use crate::upstream::{TokenGrant, UpstreamError, UserProfile};

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Missing authorization code")]
    MissingCode,

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct LinkedAccount {
    pub account: Account,
    /// Whether the account was created by this link.
    pub created: bool,
}

pub fn contact_key(account_id: &str, email: &str) -> PrimaryKey {
    let digest = Sha256::digest(email.as_bytes());
    let hex = digest.iter().fold(String::with_capacity(64), |mut s, b| {
        use std::fmt::Write;
        let _ = write!(s, "{b:02x}");
        s
    });
    PrimaryKey::new(account_id, format!("contact/{hex}/_EMAIL"))
}

fn contact_item(account_id: &str, email: &str) -> Item {
    Item::new(&contact_key(account_id, email))
        .with("ContactValue", AttributeValue::string(email))
        .with("ContactType", AttributeValue::string("EMAIL"))
        .with("ReceiveContact", AttributeValue::number(1))
}

fn new_account(token: &AccessToken, profile: &UserProfile, now: DateTime<Utc>) -> Account {
    Account {
        id: Account::new_id(),
        first_name: profile.first_name.clone(),
        last_name: profile.last_name.clone(),
        created_at: Some(now),
        updated_at: Some(now),
        last_authenticated_at: Some(now),
        automatic_id: token.user_id.clone(),
        running_update_id: None,
        account_updated_at: None,
    }
}

/// Exchange `code` for a token and attach it to the upstream user's account,
/// creating the account on first link.
pub async fn link_account(
    services: &Services,
    code: &str,
    now: DateTime<Utc>,
) -> Result<LinkedAccount, LinkError> {
    let code = code.trim();
    if code.is_empty() {
        return Err(LinkError::MissingCode);
    }

    let response = services
        .upstream
        .request_token(TokenGrant::AuthorizationCode(code))
        .await?;
    let token = AccessToken::from_response(response, now);

    let (mut account, profile) =
        match find_account_by_automatic_id(services.store(), &token.user_id).await? {
            Some(existing) => (existing, None),
            None => {
                let profile = services.upstream.user_profile(&token.user_id, &token).await?;
                (new_account(&token, &profile, now), Some(profile))
            }
        };
    account.updated_at = Some(now);
    account.last_authenticated_at = Some(now);

    let mut ops = vec![
        account.profile_update(now).into(),
        TransactOp::put(token.to_item(&account.id)),
    ];
    if let Some(email) = profile
        .as_ref()
        .and_then(|p| p.email.as_deref())
        .filter(|email| !email.is_empty())
    {
        ops.push(TransactOp::put(contact_item(&account.id, email)));
    }
    services.store().transact_write(&ops).await?;

    let created = profile.is_some();
    tracing::info!(
        account_id = %account.id,
        automatic_id = %account.automatic_id,
        created,
        updating = account.is_updating(),
        "Linked account"
    );
    Ok(LinkedAccount { account, created })
}
