//! Fixtures shared by unit tests across modules.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use wiremock::MockServer;

use crate::account::{find_account, Account};
use crate::services::Services;
use crate::store::{EntityStore, SqliteStore};
use crate::token::AccessToken;
use crate::upstream::{ClientCredentials, Endpoints, UpstreamClient};

pub fn upstream(server: &MockServer) -> UpstreamClient {
    UpstreamClient::new(
        Endpoints::new(&server.uri(), &server.uri()).unwrap(),
        ClientCredentials {
            client_id: "client-id".into(),
            client_secret: "client-secret".into(),
        },
        Duration::from_secs(5),
    )
    .unwrap()
}

/// Services backed by a fresh in-memory store and the given mock server.
pub fn services(server: &MockServer) -> Services {
    services_with_store(server, Arc::new(SqliteStore::open_in_memory().unwrap()))
}

pub fn services_with_store(server: &MockServer, store: Arc<dyn EntityStore>) -> Services {
    Services::new(store, upstream(server))
}

pub async fn seed_account(services: &Services, account_id: &str) -> Account {
    let account = Account {
        id: account_id.to_string(),
        first_name: "Testy".into(),
        last_name: "Mc Testerson".into(),
        created_at: None,
        updated_at: None,
        last_authenticated_at: None,
        automatic_id: "U_1".into(),
        running_update_id: None,
        account_updated_at: None,
    };
    services
        .store()
        .conditional_update(&account.profile_update(Utc::now()))
        .await
        .unwrap();
    find_account(services.store(), account_id)
        .await
        .unwrap()
        .unwrap()
}

pub async fn seed_token(services: &Services, account: &Account, token: AccessToken) {
    services
        .store()
        .put(&token.to_item(&account.id))
        .await
        .unwrap();
}

pub fn fresh_token(id: &str) -> AccessToken {
    AccessToken {
        id: id.to_string(),
        user_id: "U_1".into(),
        access_token: format!("access-{id}"),
        refresh_token: Some(format!("refresh-{id}")),
        scopes: vec!["scope:trip".into()],
        issued_at: Some(Utc::now()),
        expires_in: 3600,
        token_type: "Bearer".into(),
    }
}

/// A token issued two hours ago with a one hour lifetime.
pub fn expired_token(id: &str, with_refresh: bool) -> AccessToken {
    AccessToken {
        issued_at: Some(Utc::now() - chrono::Duration::hours(2)),
        refresh_token: with_refresh.then(|| format!("refresh-{id}")),
        ..fresh_token(id)
    }
}
