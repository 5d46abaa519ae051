//! Local sequential invoker for the update workflow.
//!
//! Runs `create-update`, `update-trips` until the trip cursor is `DONE`,
//! `update-vehicles`, and `finalize-update` for one account, retrying
//! transient step failures. Once the lock is taken, every exit path goes
//! through `finalize-update` so the lock is released.

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::error::UpdateError;
use crate::retry::{retry_with_backoff, RetryAction, RetryConfig};
use crate::services::Services;
use crate::types::Step;
use crate::workflow::{run_step, UpdateAccountEvent};

fn classify(err: &UpdateError) -> RetryAction {
    if err.is_retryable() {
        RetryAction::Retry
    } else {
        RetryAction::Abort
    }
}

async fn run_step_with_retry(
    services: &Services,
    retry: &RetryConfig,
    step: Step,
    event: &UpdateAccountEvent,
) -> Result<UpdateAccountEvent, UpdateError> {
    retry_with_backoff(retry, classify, || {
        run_step(services, step, event.clone(), Utc::now())
    })
    .await
}

/// Like [`run_step_with_retry`], but gives up with
/// [`UpdateError::Interrupted`] as soon as `shutdown` is cancelled.
async fn run_interruptible(
    services: &Services,
    retry: &RetryConfig,
    shutdown: &CancellationToken,
    step: Step,
    event: &UpdateAccountEvent,
) -> Result<UpdateAccountEvent, UpdateError> {
    tokio::select! {
        result = run_step_with_retry(services, retry, step, event) => result,
        () = shutdown.cancelled() => Err(UpdateError::Interrupted),
    }
}

async fn sync_account(
    services: &Services,
    retry: &RetryConfig,
    shutdown: &CancellationToken,
    event: &mut UpdateAccountEvent,
) -> Result<(), UpdateError> {
    let mut pages = 0usize;
    while !event.trips_done() {
        let next = run_interruptible(services, retry, shutdown, Step::UpdateTrips, event).await?;
        *event = next;
        pages += 1;
    }
    tracing::debug!(account_id = %event.account_id, pages, "Trip history synced");

    let next = run_interruptible(services, retry, shutdown, Step::UpdateVehicles, event).await?;
    *event = next;
    Ok(())
}

/// Run a complete update for `account_id`.
///
/// Fails without finalizing when the update can't be created (including when
/// another update holds the lock). Any later failure is recorded in the
/// event's `FailureContext`, the update is finalized, and the failure is
/// returned.
pub async fn run_update(
    services: &Services,
    account_id: &str,
    retry: &RetryConfig,
    shutdown: &CancellationToken,
) -> Result<UpdateAccountEvent, UpdateError> {
    if shutdown.is_cancelled() {
        return Err(UpdateError::Interrupted);
    }

    let mut event = run_step_with_retry(
        services,
        retry,
        Step::CreateUpdate,
        &UpdateAccountEvent::new(account_id),
    )
    .await?;

    let outcome = sync_account(services, retry, shutdown, &mut event).await;
    if let Err(e) = &outcome {
        tracing::error!(
            account_id = %event.account_id,
            update_id = event.update_id.as_deref().unwrap_or("-"),
            error = %e,
            "Update failed"
        );
        event.failure_context = Some(e.to_failure());
    }

    let finalized = run_step_with_retry(services, retry, Step::FinalizeUpdate, &event).await?;
    outcome.map(|()| finalized)
}
