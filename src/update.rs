//! Per-account update lock and the account-update record lifecycle.
//!
//! An account is locked while its row carries `RunningUpdateID`. The lock is
//! taken with a compare-and-swap in the same transaction that creates the
//! AccountUpdate record, and released by the transaction that completes it.

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::account::{find_account, Account, ACCOUNT_UPDATED_AT, RUNNING_UPDATE_ID};
use crate::error::UpdateError;
use crate::store::types::HASH_KEY;
use crate::store::{
    AttributeValue, Condition, EntityStore, Index, Item, PrimaryKey, Query, StoreError,
    TransactOp, Update, GSI2_HASH_KEY, GSI2_SORT_KEY,
};

pub const UPDATE_SORT_KEY: &str = "_UPDATE_ACCOUNT_";
pub const CURRENT_STATE: &str = "CurrentState";

/// How long a completed update record is kept.
const COMPLETED_RETENTION_SECS: i64 = 14 * 24 * 60 * 60;

/// Progress of an account update. States only move forward; custom states
/// may be recorded between the built-in ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateState {
    Starting,
    UpdatingTrips,
    UpdateVehicles,
    Completed,
    Custom(String),
}

/// Built-in states in workflow order.
static BUILT_IN_STATES: [UpdateState; 4] = [
    UpdateState::Starting,
    UpdateState::UpdatingTrips,
    UpdateState::UpdateVehicles,
    UpdateState::Completed,
];

impl UpdateState {
    /// Position in the workflow; custom states have none.
    fn rank(&self) -> Option<usize> {
        BUILT_IN_STATES.iter().position(|s| s == self)
    }

    /// Built-in states that come after this one. An update in any of them
    /// must not be moved back here.
    fn later_states(&self) -> &'static [UpdateState] {
        match self.rank() {
            Some(rank) => &BUILT_IN_STATES[rank + 1..],
            None => &BUILT_IN_STATES[3..],
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Starting => "STARTING",
            Self::UpdatingTrips => "UPDATING_TRIPS",
            Self::UpdateVehicles => "UPDATE_VEHICLES",
            Self::Completed => "COMPLETED",
            Self::Custom(state) => state,
        }
    }
}

impl From<&str> for UpdateState {
    fn from(s: &str) -> Self {
        match s {
            "STARTING" => Self::Starting,
            "UPDATING_TRIPS" => Self::UpdatingTrips,
            "UPDATE_VEHICLES" => Self::UpdateVehicles,
            "COMPLETED" => Self::Completed,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl std::fmt::Display for UpdateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountUpdate {
    pub id: String,
    pub account_id: String,
    pub state: UpdateState,
    pub created_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccountUpdate {
    /// A new update ID. IDs are time-ordered.
    pub fn new_id() -> String {
        format!("uid:{}", Uuid::now_v7())
    }

    pub fn key_for(update_id: &str) -> PrimaryKey {
        PrimaryKey::new(update_id, UPDATE_SORT_KEY)
    }

    fn account_index_key(account_id: &str) -> String {
        format!("account-update/{account_id}")
    }

    /// The record written when an update starts.
    pub fn starting_record(update_id: &str, account_id: &str, now: DateTime<Utc>) -> Item {
        Item::new(&Self::key_for(update_id))
            .with("AccountID", AttributeValue::string(account_id))
            .with(CURRENT_STATE, AttributeValue::string(UpdateState::Starting.as_str()))
            .with("CreatedAt", AttributeValue::time(now))
            .with(
                GSI2_HASH_KEY,
                AttributeValue::string(Self::account_index_key(account_id)),
            )
            .with(
                GSI2_SORT_KEY,
                AttributeValue::string(format!("update/{update_id}")),
            )
    }

    pub fn from_item(item: &Item) -> Result<Self, StoreError> {
        Ok(Self {
            id: item.key()?.hash_key,
            account_id: item.string("AccountID").unwrap_or_default().to_string(),
            state: UpdateState::from(item.require_string(CURRENT_STATE)?),
            created_at: item.time("CreatedAt"),
            completed_at: item.time("CompletedAt"),
            duration_ms: item.number("UpdateDurationMS"),
            expires_at: item.time("ExpiresAt"),
        })
    }
}

/// Mutual exclusion of update workflows for one account.
///
/// Exclusion holds at the granularity of one store transaction; contenders
/// are neither queued nor ordered.
pub struct UpdateLock<'a> {
    store: &'a dyn EntityStore,
    account_key: PrimaryKey,
}

impl<'a> UpdateLock<'a> {
    pub fn new(store: &'a dyn EntityStore, account_id: &str) -> Self {
        Self {
            store,
            account_key: Account::key_for(account_id),
        }
    }

    /// Take the lock for `update_id`, writing `record` in the same
    /// transaction. Returns `false`, with nothing written, when another update
    /// holds the lock.
    pub async fn try_acquire(&self, update_id: &str, record: Item) -> Result<bool, StoreError> {
        let acquire = Update::new(self.account_key.clone())
            .set(RUNNING_UPDATE_ID, AttributeValue::string(update_id))
            .condition(Condition::attribute_exists(HASH_KEY))
            .condition(Condition::attribute_not_exists(RUNNING_UPDATE_ID));

        match self
            .store
            .transact_write(&[TransactOp::put(record), acquire.into()])
            .await
        {
            Ok(()) => Ok(true),
            Err(e) if e.is_condition_failed() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// The update currently holding the lock, if any.
    pub async fn holder(&self) -> Result<Option<String>, StoreError> {
        Ok(self
            .store
            .get(&self.account_key)
            .await?
            .and_then(|item| item.string(RUNNING_UPDATE_ID).map(str::to_string)))
    }

    /// Transaction operation that releases the lock and stamps the account's
    /// last update time.
    pub fn release_op(&self, now: DateTime<Utc>) -> TransactOp {
        Update::new(self.account_key.clone())
            .remove(RUNNING_UPDATE_ID)
            .set(ACCOUNT_UPDATED_AT, AttributeValue::time(now))
            .condition(Condition::attribute_exists(HASH_KEY))
            .into()
    }
}

/// Lock the account and record a new update in STARTING.
pub async fn create_update(
    store: &dyn EntityStore,
    account_id: &str,
    now: DateTime<Utc>,
) -> Result<AccountUpdate, UpdateError> {
    let account = find_account(store, account_id)
        .await?
        .ok_or_else(|| UpdateError::not_found("Account", account_id))?;

    let update_id = AccountUpdate::new_id();
    let record = AccountUpdate::starting_record(&update_id, &account.id, now);

    if !UpdateLock::new(store, &account.id)
        .try_acquire(&update_id, record)
        .await?
    {
        tracing::info!(account_id = %account.id, "Update already in progress");
        return Err(UpdateError::AlreadyInProgress {
            account_id: account.id,
        });
    }

    tracing::info!(account_id = %account.id, update_id = %update_id, "Started account update");
    Ok(AccountUpdate {
        id: update_id,
        account_id: account.id,
        state: UpdateState::Starting,
        created_at: Some(now),
        completed_at: None,
        duration_ms: None,
        expires_at: None,
    })
}

/// Best-effort progress marker. Never moves an update back to an earlier
/// built-in state (so never out of COMPLETED) and never creates a record;
/// failures are logged and swallowed.
pub async fn advance_state(store: &dyn EntityStore, update_id: Option<&str>, state: &UpdateState) {
    let Some(update_id) = update_id.filter(|id| !id.is_empty()) else {
        return;
    };

    let mut update = Update::new(AccountUpdate::key_for(update_id))
        .set(CURRENT_STATE, AttributeValue::string(state.as_str()))
        .condition(Condition::attribute_exists(CURRENT_STATE));
    for later in state.later_states() {
        update = update.condition(Condition::not_equals(
            CURRENT_STATE,
            AttributeValue::string(later.as_str()),
        ));
    }

    match store.conditional_update(&update).await {
        Ok(()) => tracing::debug!(update_id = %update_id, state = %state, "Recorded update state"),
        Err(e) => tracing::warn!(
            update_id = %update_id,
            state = %state,
            error = %e,
            "Failed to record update state"
        ),
    }
}

/// Release the account's lock and, when an update ID is given, complete the
/// update record, in one transaction.
///
/// `start_time` is the update's start in epoch seconds. A record that is
/// already COMPLETED is left alone and the call succeeds without writing, so
/// redelivered finalizations are harmless. An update ID with no record only
/// releases the lock.
pub async fn finish(
    store: &dyn EntityStore,
    account_id: &str,
    update_id: Option<&str>,
    start_time: i64,
    now: DateTime<Utc>,
) -> Result<(), UpdateError> {
    let account = find_account(store, account_id)
        .await?
        .ok_or_else(|| UpdateError::not_found("Account", account_id))?;
    let update_id = update_id.filter(|id| !id.is_empty());

    let mut ops = vec![UpdateLock::new(store, &account.id).release_op(now)];
    if let Some(update_id) = update_id {
        let duration_ms = if start_time > 0 {
            (now.timestamp_millis() - start_time.saturating_mul(1000)).max(0)
        } else {
            0
        };
        let expires_at = Utc
            .timestamp_opt(now.timestamp() + COMPLETED_RETENTION_SECS, 0)
            .single()
            .unwrap_or(now);

        ops.push(
            Update::new(AccountUpdate::key_for(update_id))
                .set(
                    CURRENT_STATE,
                    AttributeValue::string(UpdateState::Completed.as_str()),
                )
                .set("CompletedAt", AttributeValue::time(now))
                .set("UpdateDurationMS", AttributeValue::number(duration_ms))
                .set("ExpiresAt", AttributeValue::time(expires_at))
                .condition(Condition::attribute_exists(CURRENT_STATE))
                .condition(Condition::not_equals(
                    CURRENT_STATE,
                    AttributeValue::string(UpdateState::Completed.as_str()),
                ))
                .into(),
        );
    }

    match store.transact_write(&ops).await {
        Ok(()) => {
            tracing::info!(
                account_id = %account.id,
                update_id = update_id.unwrap_or("-"),
                "Finished account update"
            );
            Ok(())
        }
        Err(e) if e.is_condition_failed() => {
            let Some(update_id) = update_id else {
                return Err(UpdateError::not_found("Account", account_id));
            };
            match store.get(&AccountUpdate::key_for(update_id)).await? {
                Some(item) if AccountUpdate::from_item(&item)?.state == UpdateState::Completed => {
                    tracing::info!(
                        account_id = %account.id,
                        update_id = %update_id,
                        "Update already finalized"
                    );
                    Ok(())
                }
                Some(_) => Err(UpdateError::not_found("Account", account_id)),
                None => {
                    tracing::warn!(
                        account_id = %account.id,
                        update_id = %update_id,
                        "No record for update, releasing lock only"
                    );
                    let release = [UpdateLock::new(store, &account.id).release_op(now)];
                    store.transact_write(&release).await.map_err(|e| {
                        if e.is_condition_failed() {
                            UpdateError::not_found("Account", account_id)
                        } else {
                            e.into()
                        }
                    })
                }
            }
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn find_update(
    store: &dyn EntityStore,
    update_id: Option<&str>,
) -> Result<AccountUpdate, UpdateError> {
    let update_id = update_id
        .filter(|id| !id.is_empty())
        .ok_or(UpdateError::MissingUpdateId)?;
    let item = store
        .get(&AccountUpdate::key_for(update_id))
        .await?
        .ok_or_else(|| UpdateError::not_found("AccountUpdate", update_id))?;
    Ok(AccountUpdate::from_item(&item)?)
}

/// The account's most recent updates, newest first.
pub async fn recent_updates(
    store: &dyn EntityStore,
    account_id: &str,
    limit: usize,
) -> Result<Vec<AccountUpdate>, StoreError> {
    let query = Query::new(Index::Gsi2, AccountUpdate::account_index_key(account_id))
        .begins_with("update/")
        .descending()
        .limit(limit);
    store
        .query(&query)
        .await?
        .iter()
        .map(AccountUpdate::from_item)
        .collect()
}
