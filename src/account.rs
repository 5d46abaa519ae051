//! Account records and lookups.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::store::{
    AttributeValue, EntityStore, Index, Item, PrimaryKey, Query, StoreError, Update,
    GSI2_HASH_KEY, GSI2_SORT_KEY,
};

pub const ACCOUNT_SORT_KEY: &str = "_USER_ACCOUNT";
pub const AUTOMATIC_ACCOUNT_SORT_KEY: &str = "_AUTOMATIC_ACCOUNT";

/// Present on the account row exactly while an update workflow holds the lock.
pub const RUNNING_UPDATE_ID: &str = "RunningUpdateID";
pub const ACCOUNT_UPDATED_AT: &str = "AccountUpdatedAt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_authenticated_at: Option<DateTime<Utc>>,
    pub automatic_id: String,
    pub running_update_id: Option<String>,
    pub account_updated_at: Option<DateTime<Utc>>,
}

impl Account {
    /// A new account ID. IDs are time-ordered.
    pub fn new_id() -> String {
        format!("auid:{}", Uuid::now_v7())
    }

    pub fn key_for(account_id: &str) -> PrimaryKey {
        PrimaryKey::new(account_id, ACCOUNT_SORT_KEY)
    }

    pub fn key(&self) -> PrimaryKey {
        Self::key_for(&self.id)
    }

    pub fn automatic_index_key(automatic_id: &str) -> String {
        format!("automatic/{automatic_id}")
    }

    pub fn is_updating(&self) -> bool {
        self.running_update_id.is_some()
    }

    pub fn from_item(item: &Item) -> Result<Self, StoreError> {
        let key = item.key()?;
        Ok(Self {
            id: key.hash_key,
            first_name: item.string("FirstName").unwrap_or_default().to_string(),
            last_name: item.string("LastName").unwrap_or_default().to_string(),
            created_at: item.time("CreatedAt"),
            updated_at: item.time("UpdatedAt"),
            last_authenticated_at: item.time("LastAuthenticatedAt"),
            automatic_id: item.string("AutomaticID").unwrap_or_default().to_string(),
            running_update_id: item.string(RUNNING_UPDATE_ID).map(str::to_string),
            account_updated_at: item.time(ACCOUNT_UPDATED_AT),
        })
    }

    /// Upsert of the profile attributes. Leaves `RunningUpdateID` and the
    /// update bookkeeping untouched so re-linking never breaks a running update.
    pub fn profile_update(&self, now: DateTime<Utc>) -> Update {
        Update::new(self.key())
            .set("FirstName", AttributeValue::string(&self.first_name))
            .set("LastName", AttributeValue::string(&self.last_name))
            .set("AutomaticID", AttributeValue::string(&self.automatic_id))
            .set(
                GSI2_HASH_KEY,
                AttributeValue::string(Self::automatic_index_key(&self.automatic_id)),
            )
            .set(GSI2_SORT_KEY, AttributeValue::string(AUTOMATIC_ACCOUNT_SORT_KEY))
            .set_if_not_exists(
                "CreatedAt",
                AttributeValue::time(self.created_at.unwrap_or(now)),
            )
            .set("UpdatedAt", AttributeValue::time(now))
            .set("LastAuthenticatedAt", AttributeValue::time(now))
    }
}

pub async fn find_account(
    store: &dyn EntityStore,
    account_id: &str,
) -> Result<Option<Account>, StoreError> {
    store
        .get(&Account::key_for(account_id))
        .await?
        .map(|item| Account::from_item(&item))
        .transpose()
}

/// Find the account linked to an Automatic user through the GSI2 projection.
pub async fn find_account_by_automatic_id(
    store: &dyn EntityStore,
    automatic_id: &str,
) -> Result<Option<Account>, StoreError> {
    let query = Query::new(Index::Gsi2, Account::automatic_index_key(automatic_id))
        .sort_key_equals(AUTOMATIC_ACCOUNT_SORT_KEY)
        .limit(1);
    match store.query(&query).await?.first() {
        Some(item) => find_account(store, &item.key()?.hash_key).await,
        None => Ok(None),
    }
}
