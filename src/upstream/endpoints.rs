//! Base URLs for the Automatic accounts (OAuth) and API hosts.
//!
//! Both default to the public production hosts and can be pointed at a mock
//! server for tests or a proxy in deployment.

use chrono::{DateTime, Utc};
use url::Url;

use super::error::UpstreamError;

pub const DEFAULT_ACCOUNTS_URL: &str = "https://accounts.automatic.com";
pub const DEFAULT_API_URL: &str = "https://api.automatic.com";

/// Earliest trip start the history sync asks for (2012-01-01T00:00:00Z).
pub const TRIP_HISTORY_START: i64 = 1_325_376_000;

const TRIP_PAGE_SIZE: u32 = 100;
const VEHICLE_PAGE_SIZE: u32 = 50;

#[derive(Debug, Clone)]
pub struct Endpoints {
    pub accounts: String,
    pub api: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            accounts: DEFAULT_ACCOUNTS_URL.to_string(),
            api: DEFAULT_API_URL.to_string(),
        }
    }
}

impl Endpoints {
    /// Validate and normalize the two base URLs (trailing slashes removed).
    pub fn new(accounts: &str, api: &str) -> Result<Self, UpstreamError> {
        Ok(Self {
            accounts: normalize(accounts)?,
            api: normalize(api)?,
        })
    }

    pub fn access_token(&self) -> String {
        format!("{}/oauth/access_token/", self.accounts)
    }

    pub fn user(&self, user_id: &str) -> String {
        format!("{}/user/{}/", self.api, user_id)
    }

    /// First page of the account's full trip history, bounded above by `until`.
    pub fn first_trip_page(&self, until: DateTime<Utc>) -> String {
        format!(
            "{}/trip/?limit={}&started_at__gte={}&started_at__lte={}",
            self.api,
            TRIP_PAGE_SIZE,
            TRIP_HISTORY_START,
            until.timestamp()
        )
    }

    pub fn vehicles(&self) -> String {
        format!("{}/vehicle/?limit={}", self.api, VEHICLE_PAGE_SIZE)
    }

    /// Whether `url` is served by the API host (same scheme, host and port).
    /// Only such URLs are fetched with the account's bearer token.
    pub fn is_api_url(&self, url: &Url) -> bool {
        Url::parse(&self.api).is_ok_and(|api| api.origin() == url.origin())
    }
}

fn normalize(base: &str) -> Result<String, UpstreamError> {
    Url::parse(base).map_err(|e| UpstreamError::InvalidUrl {
        url: base.to_string(),
        source: e,
    })?;
    Ok(base.trim_end_matches('/').to_string())
}

/// Last non-empty path segment of a resource URL, e.g. the vehicle ID in
/// `https://api.automatic.com/vehicle/C_fd654624e3000000/`.
pub fn resource_id(resource_url: &str) -> Option<String> {
    let parsed = Url::parse(resource_url).ok()?;
    parsed
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(str::to_string)
}
