use std::time::Duration;

use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

use super::endpoints::Endpoints;
use super::error::UpstreamError;
use super::responses::{TokenResponse, UserProfile};
use crate::token::AccessToken;

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// OAuth client credentials issued by Automatic.
#[derive(Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Grant presented to the access-token endpoint.
#[derive(Debug, Clone, Copy)]
pub enum TokenGrant<'a> {
    AuthorizationCode(&'a str),
    RefreshToken(&'a str),
}

/// HTTP client for the Automatic accounts and API hosts.
///
/// Every request carries the configured timeout; any non-2xx response is
/// surfaced as [`UpstreamError::Status`].
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: Client,
    endpoints: Endpoints,
    credentials: ClientCredentials,
}

impl UpstreamClient {
    pub fn new(
        endpoints: Endpoints,
        credentials: ClientCredentials,
        timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tripsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(UpstreamError::Client)?;
        Ok(Self {
            http,
            endpoints,
            credentials,
        })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Bearer-authenticated GET of a JSON resource.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        token: &AccessToken,
    ) -> Result<T, UpstreamError> {
        tracing::debug!("GET {}", url);
        let request = token.sign(self.http.get(url).header(ACCEPT, "application/json"));
        send_json(url, request).await
    }

    /// Exchange an authorization code or refresh token for a new access token.
    pub async fn request_token(&self, grant: TokenGrant<'_>) -> Result<TokenResponse, UpstreamError> {
        let url = self.endpoints.access_token();
        let (grant_type, grant_field, grant_value) = match grant {
            TokenGrant::AuthorizationCode(code) => ("authorization_code", "code", code),
            TokenGrant::RefreshToken(refresh) => ("refresh_token", "refresh_token", refresh),
        };
        let form = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("grant_type", grant_type),
            (grant_field, grant_value),
        ];

        tracing::debug!("POST {}", url);
        let request = self
            .http
            .post(&url)
            .header(ACCEPT, "application/json")
            .form(&form[..]);
        send_json(&url, request).await
    }

    pub async fn user_profile(
        &self,
        user_id: &str,
        token: &AccessToken,
    ) -> Result<UserProfile, UpstreamError> {
        self.get_json(&self.endpoints.user(user_id), token).await
    }
}

async fn send_json<T: DeserializeOwned>(
    url: &str,
    request: RequestBuilder,
) -> Result<T, UpstreamError> {
    let http_err = |source: reqwest::Error| UpstreamError::Http {
        url: url.to_string(),
        source,
    };

    let response = request.send().await.map_err(http_err)?;
    let status = response.status();
    if !status.is_success() {
        tracing::debug!(status = status.as_u16(), "Upstream request to {} failed", url);
        return Err(UpstreamError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }

    let body = response.text().await.map_err(http_err)?;
    serde_json::from_str(&body).map_err(|source| UpstreamError::Decode {
        url: url.to_string(),
        source,
    })
}
