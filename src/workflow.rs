//! The four workflow steps, each a transition `(event) -> event'` over a
//! serializable [`UpdateAccountEvent`].
//!
//! Steps hold no state between invocations: everything the next step needs
//! (account, update ID, pagination cursor) travels in the event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::account::{find_account, Account};
use crate::error::{UpdateError, UpdateFailure};
use crate::services::Services;
use crate::sync::{update_trips_for_account, update_vehicles_for_account};
use crate::token::find_current_token;
use crate::types::Step;
use crate::update::{self, UpdateState};

/// Resumption context of a freshly created update.
pub const CONTEXT_STARTING: &str = "STARTING";
/// Resumption context once the trip history is exhausted.
pub const CONTEXT_DONE: &str = "DONE";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateAccountEvent {
    #[serde(rename = "AccountID")]
    pub account_id: String,
    #[serde(rename = "UpdateID", default, skip_serializing_if = "Option::is_none")]
    pub update_id: Option<String>,
    /// Epoch seconds at which the update was created.
    #[serde(default)]
    pub start_time: i64,
    #[serde(default)]
    pub context: UpdateContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_context: Option<UpdateFailure>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateContext {
    #[serde(default)]
    pub current: String,
}

impl UpdateAccountEvent {
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            ..Self::default()
        }
    }

    /// Whether the trip history has been fully paged through.
    pub fn trips_done(&self) -> bool {
        self.context.current == CONTEXT_DONE
    }
}

/// Run one step against `event`.
pub async fn run_step(
    services: &Services,
    step: Step,
    event: UpdateAccountEvent,
    now: DateTime<Utc>,
) -> Result<UpdateAccountEvent, UpdateError> {
    tracing::debug!(
        step = %step,
        account_id = %event.account_id,
        update_id = event.update_id.as_deref().unwrap_or("-"),
        "Running workflow step"
    );
    match step {
        Step::CreateUpdate => create_update(services, event, now).await,
        Step::UpdateTrips => update_trips(services, event, now).await,
        Step::UpdateVehicles => update_vehicles(services, event, now).await,
        Step::FinalizeUpdate => finalize_update(services, event, now).await,
    }
}

/// Lock the account and start a new update.
pub async fn create_update(
    services: &Services,
    mut event: UpdateAccountEvent,
    now: DateTime<Utc>,
) -> Result<UpdateAccountEvent, UpdateError> {
    let created = update::create_update(services.store(), &event.account_id, now).await?;
    event.update_id = Some(created.id);
    event.start_time = now.timestamp();
    event.context.current = CONTEXT_STARTING.to_string();
    Ok(event)
}

/// Sync one page of trips and advance the cursor.
///
/// `Context.Current` is `STARTING` for the first page, the next page's URL
/// afterwards, and becomes `DONE` once the history is exhausted. A `DONE`
/// event is returned unchanged.
pub async fn update_trips(
    services: &Services,
    mut event: UpdateAccountEvent,
    now: DateTime<Utc>,
) -> Result<UpdateAccountEvent, UpdateError> {
    if event.context.current == CONTEXT_DONE {
        return Ok(event);
    }

    let uri = match event.context.current.as_str() {
        CONTEXT_STARTING => services.upstream.endpoints().first_trip_page(now),
        current => resume_url(services, current)?,
    };

    update::advance_state(
        services.store(),
        event.update_id.as_deref(),
        &UpdateState::UpdatingTrips,
    )
    .await;

    let account = load_account(services, &event.account_id).await?;
    let token = find_current_token(services, &account, now).await?;
    let next = update_trips_for_account(services, &account, &token, &uri).await?;

    event.context.current = next.unwrap_or_else(|| CONTEXT_DONE.to_string());
    Ok(event)
}

/// Validate a resumption URL. It is fetched with the account's token, so it
/// must point at the configured API host.
fn resume_url(services: &Services, current: &str) -> Result<String, UpdateError> {
    let url = Url::parse(current)
        .map_err(|e| UpdateError::InvalidContext(format!("{current:?}: {e}")))?;
    if !services.upstream.endpoints().is_api_url(&url) {
        return Err(UpdateError::InvalidContext(format!(
            "{current:?}: not on the API host"
        )));
    }
    Ok(url.to_string())
}

/// Sync every vehicle visible to the account. The event is returned unchanged.
pub async fn update_vehicles(
    services: &Services,
    event: UpdateAccountEvent,
    now: DateTime<Utc>,
) -> Result<UpdateAccountEvent, UpdateError> {
    update::advance_state(
        services.store(),
        event.update_id.as_deref(),
        &UpdateState::UpdateVehicles,
    )
    .await;

    let account = load_account(services, &event.account_id).await?;
    let token = find_current_token(services, &account, now).await?;
    update_vehicles_for_account(services, &account, &token, now).await?;
    Ok(event)
}

/// Release the account's lock and complete the update record. Runs on both
/// the success and the failure path of the workflow.
pub async fn finalize_update(
    services: &Services,
    event: UpdateAccountEvent,
    now: DateTime<Utc>,
) -> Result<UpdateAccountEvent, UpdateError> {
    if let Some(failure) = &event.failure_context {
        tracing::warn!(
            account_id = %event.account_id,
            update_id = event.update_id.as_deref().unwrap_or("-"),
            failure = %failure,
            "Finalizing failed update"
        );
    }
    update::finish(
        services.store(),
        &event.account_id,
        event.update_id.as_deref(),
        event.start_time,
        now,
    )
    .await?;
    Ok(event)
}

async fn load_account(services: &Services, account_id: &str) -> Result<Account, UpdateError> {
    find_account(services.store(), account_id)
        .await?
        .ok_or_else(|| UpdateError::not_found("Account", account_id))
}
