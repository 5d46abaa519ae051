use chrono::{DateTime, Utc};

use super::error::TokenError;
use super::{AccessToken, TOKEN_SORT_KEY_PREFIX};
use crate::account::Account;
use crate::services::Services;
use crate::store::{Condition, Index, Query, TransactOp, HASH_KEY};
use crate::upstream::TokenGrant;

/// How many stored tokens are considered when looking for a usable one.
const CANDIDATE_LIMIT: usize = 10;

/// Exchange `token`'s refresh credential for a new token and atomically
/// replace the stored row.
///
/// The new row is written and the old row deleted in one transaction, so the
/// account never has zero or two current tokens. The delete requires the old
/// row to still exist: if a concurrent refresh already replaced it, nothing is
/// written and the store's `ConditionFailed` is returned. Upstream and store
/// failures are returned unchanged.
pub async fn refresh(
    services: &Services,
    account: &Account,
    token: &AccessToken,
    now: DateTime<Utc>,
) -> Result<AccessToken, TokenError> {
    let refresh_token = token
        .refresh_token
        .as_deref()
        .ok_or_else(|| TokenError::MissingRefreshToken {
            token_id: token.id.clone(),
        })?;

    tracing::debug!(account_id = %account.id, token_id = %token.id, "Refreshing access token");
    let response = services
        .upstream
        .request_token(TokenGrant::RefreshToken(refresh_token))
        .await?;

    let mut fresh = AccessToken::from_response(response, now);
    // Servers that don't rotate refresh tokens omit them from the response.
    if fresh.refresh_token.is_none() {
        fresh.refresh_token = token.refresh_token.clone();
    }

    services
        .store()
        .transact_write(&[
            TransactOp::put(fresh.to_item(&account.id)),
            TransactOp::Delete {
                key: token.key(&account.id),
                conditions: vec![Condition::attribute_exists(HASH_KEY)],
            },
        ])
        .await
        .inspect_err(|e| {
            if e.is_condition_failed() {
                tracing::info!(
                    account_id = %account.id,
                    token_id = %token.id,
                    "Token already rotated by another refresh"
                );
            }
        })?;

    tracing::info!(
        account_id = %account.id,
        old_token_id = %token.id,
        new_token_id = %fresh.id,
        "Rotated access token"
    );
    Ok(fresh)
}

/// Find a usable token for the account, refreshing an expired one if needed.
///
/// Candidates are tried newest first. Undecodable rows and failed refreshes
/// are recorded and the next candidate is tried; when none yields a token the
/// recorded reasons are returned together.
pub async fn find_current_token(
    services: &Services,
    account: &Account,
    now: DateTime<Utc>,
) -> Result<AccessToken, TokenError> {
    let query = Query::new(Index::Primary, &account.id)
        .begins_with(TOKEN_SORT_KEY_PREFIX)
        .descending()
        .limit(CANDIDATE_LIMIT);
    let candidates = services.store().query(&query).await?;

    let mut reasons = Vec::new();
    let mut retryable = false;

    for item in &candidates {
        let token = match AccessToken::from_item(item) {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(account_id = %account.id, error = %e, "Skipping unreadable token record");
                reasons.push(e.to_string());
                continue;
            }
        };

        if !token.is_expired(now) {
            return Ok(token);
        }

        match refresh(services, account, &token, now).await {
            Ok(fresh) => return Ok(fresh),
            Err(TokenError::Store(e)) if e.is_condition_failed() => {
                if let Some(current) = newest_unexpired(services, account, now).await? {
                    return Ok(current);
                }
                reasons.push(format!("token {}: {}", token.id, e));
            }
            Err(e) => {
                tracing::warn!(
                    account_id = %account.id,
                    token_id = %token.id,
                    error = %e,
                    "Failed to refresh access token"
                );
                retryable |= e.is_retryable();
                reasons.push(format!("token {}: {}", token.id, e));
            }
        }
    }

    if candidates.is_empty() {
        reasons.push("no access tokens stored".to_string());
    }

    Err(TokenError::NoUsableToken {
        account_id: account.id.clone(),
        reasons,
        retryable,
    })
}

/// The newest stored token, if it is still valid. Used after losing a refresh
/// race, when the winner's row is newer than every candidate already read.
async fn newest_unexpired(
    services: &Services,
    account: &Account,
    now: DateTime<Utc>,
) -> Result<Option<AccessToken>, TokenError> {
    let query = Query::new(Index::Primary, &account.id)
        .begins_with(TOKEN_SORT_KEY_PREFIX)
        .descending()
        .limit(1);
    let newest = services.store().query(&query).await?;
    Ok(newest
        .first()
        .and_then(|item| AccessToken::from_item(item).ok())
        .filter(|token| !token.is_expired(now)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Item, PrimaryKey};
    use crate::testing;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const REFRESHED: &str = r#"{"user_id":"U_1","access_token":"fresh-access","refresh_token":"fresh-refresh","expires_in":3600,"scope":"scope:trip","token_type":"Bearer"}"#;

    async fn token_rows(services: &Services, account_id: &str) -> Vec<Item> {
        services
            .store()
            .query(&Query::new(Index::Primary, account_id).begins_with(TOKEN_SORT_KEY_PREFIX))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_fresh_token_needs_no_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
        let services = testing::services(&server);
        let account = testing::seed_account(&services, "auid:1").await;
        testing::seed_token(&services, &account, testing::fresh_token("t1")).await;

        let token = find_current_token(&services, &account, Utc::now()).await.unwrap();
        assert_eq!(token.id, "t1");
    }

    #[tokio::test]
    async fn test_expired_token_is_rotated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/access_token/"))
            .and(body_string_contains("refresh_token=refresh-t1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(REFRESHED))
            .expect(1)
            .mount(&server)
            .await;
        let services = testing::services(&server);
        let account = testing::seed_account(&services, "auid:1").await;
        testing::seed_token(&services, &account, testing::expired_token("t1", true)).await;

        let now = Utc::now();
        let token = find_current_token(&services, &account, now).await.unwrap();
        assert_eq!(token.access_token, "fresh-access");
        assert_ne!(token.id, "t1");
        assert_eq!(token.issued_at.map(|t| t.timestamp()), Some(now.timestamp()));

        let rows = token_rows(&services, "auid:1").await;
        assert_eq!(rows.len(), 1);
        assert_eq!(AccessToken::from_item(&rows[0]).unwrap(), token);
    }

    #[tokio::test]
    async fn test_refresh_keeps_refresh_token_when_not_rotated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"user_id":"U_1","access_token":"fresh-access","expires_in":3600}"#,
            ))
            .mount(&server)
            .await;
        let services = testing::services(&server);
        let account = testing::seed_account(&services, "auid:1").await;
        let old = testing::expired_token("t1", true);
        testing::seed_token(&services, &account, old.clone()).await;

        let fresh = refresh(&services, &account, &old, Utc::now()).await.unwrap();
        assert_eq!(fresh.refresh_token.as_deref(), Some("refresh-t1"));
    }

    #[tokio::test]
    async fn test_refreshing_same_token_twice_leaves_one_row() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(REFRESHED))
            .mount(&server)
            .await;
        let services = testing::services(&server);
        let account = testing::seed_account(&services, "auid:1").await;
        let old = testing::expired_token("t1", true);
        testing::seed_token(&services, &account, old.clone()).await;

        let first = refresh(&services, &account, &old, Utc::now()).await.unwrap();
        let err = refresh(&services, &account, &old, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(&err, TokenError::Store(e) if e.is_condition_failed()));

        let rows = token_rows(&services, "auid:1").await;
        assert_eq!(rows.len(), 1);
        assert_eq!(AccessToken::from_item(&rows[0]).unwrap().id, first.id);
    }

    #[tokio::test]
    async fn test_lost_refresh_race_uses_winning_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(REFRESHED))
            .mount(&server)
            .await;
        let services = testing::services(&server);
        let account = testing::seed_account(&services, "auid:1").await;
        let old = testing::expired_token("t1", true);
        testing::seed_token(&services, &account, old.clone()).await;
        let winner = refresh(&services, &account, &old, Utc::now()).await.unwrap();

        let err = refresh(&services, &account, &old, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(&err, TokenError::Store(e) if e.is_condition_failed()));
        let current = newest_unexpired(&services, &account, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.id, winner.id);
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token() {
        let server = MockServer::start().await;
        let services = testing::services(&server);
        let account = testing::seed_account(&services, "auid:1").await;
        let token = testing::expired_token("t1", false);

        let err = refresh(&services, &account, &token, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, TokenError::MissingRefreshToken { .. }));
    }

    #[tokio::test]
    async fn test_falls_back_to_older_candidate() {
        let server = MockServer::start().await;
        let services = testing::services(&server);
        let account = testing::seed_account(&services, "auid:1").await;
        testing::seed_token(&services, &account, testing::fresh_token("t1")).await;
        testing::seed_token(&services, &account, testing::expired_token("t2", false)).await;

        let token = find_current_token(&services, &account, Utc::now()).await.unwrap();
        assert_eq!(token.id, "t1");
    }

    #[tokio::test]
    async fn test_unreadable_candidate_is_skipped() {
        let server = MockServer::start().await;
        let services = testing::services(&server);
        let account = testing::seed_account(&services, "auid:1").await;
        testing::seed_token(&services, &account, testing::fresh_token("t1")).await;
        services
            .store()
            .put(&Item::new(&PrimaryKey::new("auid:1", "access-token/t2")))
            .await
            .unwrap();

        let token = find_current_token(&services, &account, Utc::now()).await.unwrap();
        assert_eq!(token.id, "t1");
    }

    #[tokio::test]
    async fn test_exhausted_candidates_aggregate_reasons() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let services = testing::services(&server);
        let account = testing::seed_account(&services, "auid:1").await;
        testing::seed_token(&services, &account, testing::expired_token("t1", true)).await;
        testing::seed_token(&services, &account, testing::expired_token("t2", false)).await;

        let err = find_current_token(&services, &account, Utc::now())
            .await
            .unwrap_err();
        match &err {
            TokenError::NoUsableToken {
                reasons, retryable, ..
            } => {
                assert_eq!(reasons.len(), 2);
                assert!(reasons[0].starts_with("token t2:"));
                assert!(reasons[1].contains("503"));
                assert!(*retryable);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // A failed refresh leaves the stored rows alone.
        assert_eq!(token_rows(&services, "auid:1").await.len(), 2);
    }

    #[tokio::test]
    async fn test_no_tokens_stored() {
        let server = MockServer::start().await;
        let services = testing::services(&server);
        let account = testing::seed_account(&services, "auid:1").await;

        let err = find_current_token(&services, &account, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TokenError::NoUsableToken { retryable: false, .. }
        ));
    }
}
