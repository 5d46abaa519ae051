//! Client for the Automatic OAuth accounts host and REST API.

pub mod client;
pub mod endpoints;
pub mod error;
pub mod responses;

pub use client::{ClientCredentials, TokenGrant, UpstreamClient, DEFAULT_TIMEOUT_SECS};
pub use endpoints::{resource_id, Endpoints};
pub use error::UpstreamError;
pub use responses::{ApiTrip, ApiVehicle, Page, TokenResponse, UserProfile};
