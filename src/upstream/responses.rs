use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// One page of a paginated resource listing:
/// `{ "_metadata": { "next": <url|null> }, "results": [...] }`.
#[derive(Debug, Deserialize)]
#[serde(bound = "T: DeserializeOwned")]
pub struct Page<T> {
    #[serde(rename = "_metadata", default)]
    pub metadata: PageMetadata,
    #[serde(default)]
    pub results: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageMetadata {
    #[serde(default)]
    pub next: Option<String>,
}

impl<T> Page<T> {
    /// The next page's URL; `None` on the last page.
    pub fn next(&self) -> Option<&str> {
        self.metadata.next.as_deref().filter(|next| !next.is_empty())
    }
}

/// A trip from `GET /trip/`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiTrip {
    pub id: String,
    #[serde(default)]
    pub duration_s: f64,
    #[serde(default)]
    pub distance_m: f64,
    /// Trips still being processed upstream may lack timestamps.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    /// Resource URL of the driving user.
    #[serde(default)]
    pub driver: String,
    /// Resource URL of the vehicle.
    #[serde(default)]
    pub vehicle: String,
}

/// A vehicle from `GET /vehicle/`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiVehicle {
    pub id: String,
    #[serde(default)]
    pub fuel_grade: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub make: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub submodel: Option<String>,
    #[serde(default)]
    pub year: Option<i64>,
}

/// Response from `POST /oauth/access_token/`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub user_id: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub token_type: String,
}

/// Response from `GET /user/<id>/`.
#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trip_page_deserialize() {
        let json = r#"{"_metadata":{"count":6136,"previous":null,"next":"https://api.automatic.com/trip/?page=3&cursor=478bcc28"},"results":[{"id":"T_68283fd78200000","url":"https://api.automatic.com/trip/T_68283fd782ddda5a/","driver":"https://api.automatic.com/user/U_cfdca00556000000/","vehicle":"https://api.automatic.com/vehicle/C_fd654624e3000000/","duration_s":415.0,"distance_m":2158.1,"started_at":"2019-09-15T16:32:48.200000Z","ended_at":"2019-09-15T16:39:43.200000Z","tags":[],"idling_time_s":0}]}"#;
        let page: Page<ApiTrip> = serde_json::from_str(json).unwrap();
        assert_eq!(
            page.next(),
            Some("https://api.automatic.com/trip/?page=3&cursor=478bcc28")
        );
        assert_eq!(page.results.len(), 1);
        let trip = &page.results[0];
        assert_eq!(trip.id, "T_68283fd78200000");
        assert_eq!(trip.duration_s, 415.0);
        assert_eq!(trip.started_at.map(|t| t.timestamp()), Some(1_568_565_168));
    }

    #[test]
    fn test_last_page_has_no_next() {
        let page: Page<ApiTrip> =
            serde_json::from_str(r#"{"_metadata":{"next":null},"results":[]}"#).unwrap();
        assert_eq!(page.next(), None);

        let page: Page<ApiTrip> =
            serde_json::from_str(r#"{"_metadata":{"next":""},"results":[]}"#).unwrap();
        assert_eq!(page.next(), None);

        let page: Page<ApiTrip> = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(page.next(), None);
        assert!(page.results.is_empty());
    }

    #[test]
    fn test_vehicle_page_deserialize_with_nulls() {
        let json = r#"{"_metadata":{"count":1,"next":null},"results":[{"active_dtcs":null,"battery_voltage":12.535,"created_at":"2016-08-25T00:45:22.787000Z","display_name":null,"fuel_grade":null,"id":"C_4a10259f5a000000","make":"Chevrolet","model":"Silverado 1500","submodel":null,"updated_at":"2017-09-22T16:38:57.545000Z","year":2016}]}"#;
        let page: Page<ApiVehicle> = serde_json::from_str(json).unwrap();
        let vehicle = &page.results[0];
        assert_eq!(vehicle.id, "C_4a10259f5a000000");
        assert_eq!(vehicle.make.as_deref(), Some("Chevrolet"));
        assert_eq!(vehicle.fuel_grade, None);
        assert_eq!(vehicle.submodel, None);
        assert_eq!(vehicle.year, Some(2016));
    }

    #[test]
    fn test_token_response_deserialize() {
        let json = r#"{"user_id":"U_1","access_token":"at","refresh_token":"rt","expires_in":31535999,"scope":"scope:public scope:trip","token_type":"Bearer"}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.user_id, "U_1");
        assert_eq!(token.refresh_token.as_deref(), Some("rt"));
        assert_eq!(token.expires_in, 31_535_999);
    }

    #[test]
    fn test_user_profile_deserialize() {
        let json = r#"{"id":"U_cfdca00556000000","url":"https://api.automatic.com/user/U_cfdca00556000000/","username":"test@email.test","first_name":"Testy","last_name":"Mc Testerson","email":"test@email.test","email_verified":true}"#;
        let user: UserProfile = serde_json::from_str(json).unwrap();
        assert_eq!(user.first_name, "Testy");
        assert_eq!(user.email.as_deref(), Some("test@email.test"));
        assert!(user.email_verified);
    }
}
