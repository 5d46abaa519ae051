//! Entity store trait and SQLite implementation.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};

use super::error::StoreError;
use super::schema;
use super::types::{
    AttributeValue, Condition, Index, Item, PrimaryKey, Query, SortKeyCondition, SortOrder,
    TransactOp, Update, WriteRequest, HASH_KEY, MAX_BATCH_GET_ITEMS, MAX_BATCH_WRITE_ITEMS,
    MAX_TRANSACT_ITEMS, SORT_KEY,
};

/// Key-value store with conditional and transactional writes.
///
/// This trait is object-safe and can be used with `Arc<dyn EntityStore>` for
/// shared access across async tasks.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Fetch a single item by primary key.
    async fn get(&self, key: &PrimaryKey) -> Result<Option<Item>, StoreError>;

    /// Fetch several items by primary key. Missing keys are skipped; the
    /// result follows the order of `keys`.
    async fn batch_get(&self, keys: &[PrimaryKey]) -> Result<Vec<Item>, StoreError>;

    /// Run a key-condition query against the primary key or a secondary index.
    async fn query(&self, query: &Query) -> Result<Vec<Item>, StoreError>;

    /// Unconditionally write an item, replacing any item with the same key.
    async fn put(&self, item: &Item) -> Result<(), StoreError>;

    async fn delete(&self, key: &PrimaryKey) -> Result<(), StoreError>;

    /// Apply an update expression if all of its conditions hold.
    ///
    /// Returns [`StoreError::ConditionFailed`] and writes nothing otherwise.
    async fn conditional_update(&self, update: &Update) -> Result<(), StoreError>;

    /// Apply every operation or none of them.
    async fn transact_write(&self, ops: &[TransactOp]) -> Result<(), StoreError>;

    /// Apply a batch of puts and deletes. Batches are independent of each
    /// other; callers chunk larger workloads themselves.
    async fn batch_write(&self, requests: &[WriteRequest]) -> Result<(), StoreError>;
}

/// SQLite implementation of the entity store.
pub struct SqliteStore {
    /// Wrapped in Mutex because rusqlite::Connection is not Sync. Holding the
    /// lock for the whole of a transaction serializes conditional writes.
    conn: Mutex<Connection>,
    /// Path to the database file (for error messages).
    path: PathBuf,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open or create a database at the given path.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let path = path.to_path_buf();
        let path_clone = path.clone();

        let conn = tokio::task::spawn_blocking(move || {
            if let Some(parent) = path_clone.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::CreateDir {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }

            let conn = Connection::open(&path_clone).map_err(|e| StoreError::Open {
                path: path_clone.clone(),
                source: e,
            })?;

            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(StoreError::Migration)?;
            conn.pragma_update(None, "synchronous", "NORMAL")
                .map_err(StoreError::Migration)?;

            schema::migrate(&conn)?;

            Ok::<_, StoreError>(conn)
        })
        .await??;

        tracing::debug!(path = %path.display(), "Opened item store");

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Open an in-memory database (for testing).
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Open {
            path: PathBuf::from(":memory:"),
            source: e,
        })?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        })
    }

    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Query(e.to_string()))
    }
}

#[async_trait]
impl EntityStore for SqliteStore {
    async fn get(&self, key: &PrimaryKey) -> Result<Option<Item>, StoreError> {
        let conn = self.conn()?;
        load(&conn, key)
    }

    async fn batch_get(&self, keys: &[PrimaryKey]) -> Result<Vec<Item>, StoreError> {
        check_limit("batch_get", keys.len(), MAX_BATCH_GET_ITEMS)?;
        let conn = self.conn()?;
        let mut items = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(item) = load(&conn, key)? {
                items.push(item);
            }
        }
        Ok(items)
    }

    async fn query(&self, query: &Query) -> Result<Vec<Item>, StoreError> {
        let (hash_col, sort_col) = query.index.columns();
        let mut sql = format!("SELECT attributes FROM items WHERE {hash_col} = ?1");
        let mut params = vec![query.hash_key.clone()];

        match &query.sort_key {
            SortKeyCondition::Any => {}
            SortKeyCondition::Equals(value) => {
                sql.push_str(&format!(" AND {sort_col} = ?2"));
                params.push(value.clone());
            }
            SortKeyCondition::BeginsWith(prefix) => {
                sql.push_str(&format!(" AND substr({sort_col}, 1, length(?2)) = ?2"));
                params.push(prefix.clone());
            }
        }

        let direction = match query.order {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        };
        sql.push_str(&format!(" ORDER BY {sort_col} {direction}, pk {direction}"));
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(&sql).map_err(StoreError::query)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                row.get::<_, String>(0)
            })
            .map_err(StoreError::query)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::query)?;

        rows.iter()
            .map(|attributes| serde_json::from_str::<Item>(attributes).map_err(StoreError::from))
            .collect()
    }

    async fn put(&self, item: &Item) -> Result<(), StoreError> {
        let conn = self.conn()?;
        store_item(&conn, item)
    }

    async fn delete(&self, key: &PrimaryKey) -> Result<(), StoreError> {
        let conn = self.conn()?;
        remove_item(&conn, key)
    }

    async fn conditional_update(&self, update: &Update) -> Result<(), StoreError> {
        let conn = self.conn()?;
        in_transaction(&conn, || apply_update(&conn, update))
    }

    async fn transact_write(&self, ops: &[TransactOp]) -> Result<(), StoreError> {
        check_limit("transact_write", ops.len(), MAX_TRANSACT_ITEMS)?;
        if ops.is_empty() {
            return Ok(());
        }

        let conn = self.conn()?;
        in_transaction(&conn, || {
            for op in ops {
                apply_op(&conn, op)?;
            }
            Ok(())
        })
    }

    async fn batch_write(&self, requests: &[WriteRequest]) -> Result<(), StoreError> {
        check_limit("batch_write", requests.len(), MAX_BATCH_WRITE_ITEMS)?;
        if requests.is_empty() {
            return Ok(());
        }

        let conn = self.conn()?;
        in_transaction(&conn, || {
            for request in requests {
                match request {
                    WriteRequest::Put(item) => store_item(&conn, item)?,
                    WriteRequest::Delete(key) => remove_item(&conn, key)?,
                }
            }
            Ok(())
        })
    }
}

fn check_limit(operation: &'static str, count: usize, max: usize) -> Result<(), StoreError> {
    if count > max {
        return Err(StoreError::TooManyItems {
            operation,
            count,
            max,
        });
    }
    Ok(())
}

/// Run `body` inside BEGIN/COMMIT, rolling back if it fails.
fn in_transaction<T>(
    conn: &Connection,
    body: impl FnOnce() -> Result<T, StoreError>,
) -> Result<T, StoreError> {
    conn.execute("BEGIN TRANSACTION", [])
        .map_err(StoreError::query)?;

    let result = body().and_then(|value| {
        conn.execute("COMMIT", []).map_err(StoreError::query)?;
        Ok(value)
    });

    if result.is_err() && !conn.is_autocommit() {
        let _ = conn.execute("ROLLBACK", []);
    }
    result
}

fn load(conn: &Connection, key: &PrimaryKey) -> Result<Option<Item>, StoreError> {
    let attributes: Option<String> = conn
        .query_row(
            "SELECT attributes FROM items WHERE pk = ?1 AND sk = ?2",
            [&key.hash_key, &key.sort_key],
            |row| row.get(0),
        )
        .optional()
        .map_err(StoreError::query)?;

    match attributes {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

fn store_item(conn: &Connection, item: &Item) -> Result<(), StoreError> {
    let key = item.key()?;
    let gsi1 = item.index_key(Index::Gsi1);
    let gsi2 = item.index_key(Index::Gsi2);
    let attributes = serde_json::to_string(item)?;

    conn.execute(
        r#"
        INSERT OR REPLACE INTO items (pk, sk, gsi1pk, gsi1sk, gsi2pk, gsi2sk, attributes)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        rusqlite::params![
            key.hash_key,
            key.sort_key,
            gsi1.map(|(hash, _)| hash),
            gsi1.map(|(_, sort)| sort),
            gsi2.map(|(hash, _)| hash),
            gsi2.map(|(_, sort)| sort),
            attributes,
        ],
    )
    .map_err(StoreError::query)?;

    Ok(())
}

fn remove_item(conn: &Connection, key: &PrimaryKey) -> Result<(), StoreError> {
    conn.execute(
        "DELETE FROM items WHERE pk = ?1 AND sk = ?2",
        [&key.hash_key, &key.sort_key],
    )
    .map_err(StoreError::query)?;
    Ok(())
}

fn check_conditions(
    key: &PrimaryKey,
    conditions: &[Condition],
    existing: Option<&Item>,
) -> Result<(), StoreError> {
    if conditions.iter().all(|c| c.holds(existing)) {
        Ok(())
    } else {
        Err(StoreError::ConditionFailed {
            key: key.to_string(),
        })
    }
}

fn apply_update(conn: &Connection, update: &Update) -> Result<(), StoreError> {
    let existing = load(conn, &update.key)?;
    check_conditions(&update.key, &update.conditions, existing.as_ref())?;

    let mut item = existing.unwrap_or_else(|| Item::new(&update.key));
    for action in &update.actions {
        action.apply(&mut item);
    }
    // Key attributes are immutable.
    item.set(HASH_KEY, AttributeValue::string(&update.key.hash_key));
    item.set(SORT_KEY, AttributeValue::string(&update.key.sort_key));

    store_item(conn, &item)
}

fn apply_op(conn: &Connection, op: &TransactOp) -> Result<(), StoreError> {
    match op {
        TransactOp::Put { item, conditions } => {
            if !conditions.is_empty() {
                let key = item.key()?;
                let existing = load(conn, &key)?;
                check_conditions(&key, conditions, existing.as_ref())?;
            }
            store_item(conn, item)
        }
        TransactOp::Update(update) => apply_update(conn, update),
        TransactOp::Delete { key, conditions } => {
            if !conditions.is_empty() {
                let existing = load(conn, key)?;
                check_conditions(key, conditions, existing.as_ref())?;
            }
            remove_item(conn, key)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::{GSI1_HASH_KEY, GSI1_SORT_KEY};
    use std::fs;

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join("tripsync")
            .join("store_tests")
            .join(name);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn trip(trip_id: &str, vehicle_id: &str) -> Item {
        Item::new(&PrimaryKey::new(
            format!("trip/{trip_id}"),
            format!("vehicle/{vehicle_id}"),
        ))
        .with("TripID", AttributeValue::string(trip_id))
        .with(GSI1_HASH_KEY, AttributeValue::string(format!("vehicle/{vehicle_id}")))
        .with(GSI1_SORT_KEY, AttributeValue::string(format!("trip/{trip_id}")))
    }

    fn account_key() -> PrimaryKey {
        PrimaryKey::new("acct-1", "_USER_ACCOUNT")
    }

    #[tokio::test]
    async fn test_open_creates_db_and_parent_dir() {
        let dir = test_dir("open_creates");
        let path = dir.join("nested").join("items.db");
        let store = SqliteStore::open(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(store.path(), path);
    }

    #[tokio::test]
    async fn test_reopen_preserves_items() {
        let dir = test_dir("reopen");
        let path = dir.join("items.db");
        {
            let store = SqliteStore::open(&path).await.unwrap();
            store.put(&trip("T1", "V1")).await.unwrap();
        }
        let store = SqliteStore::open(&path).await.unwrap();
        let key = PrimaryKey::new("trip/T1", "vehicle/V1");
        assert!(store.get(&key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = SqliteStore::open_in_memory().unwrap();
        let key = PrimaryKey::new("trip/T1", "vehicle/V1");
        assert!(store.get(&key).await.unwrap().is_none());

        store.put(&trip("T1", "V1")).await.unwrap();
        let item = store.get(&key).await.unwrap().unwrap();
        assert_eq!(item.string("TripID"), Some("T1"));

        store.delete(&key).await.unwrap();
        assert!(store.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_replaces_existing_item() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .put(&trip("T1", "V1").with("DistanceM", AttributeValue::decimal(10.0, 2)))
            .await
            .unwrap();
        store
            .put(&trip("T1", "V1").with("DistanceM", AttributeValue::decimal(20.0, 2)))
            .await
            .unwrap();

        let rows = store
            .query(&Query::new(Index::Primary, "trip/T1"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("DistanceM"), Some(&AttributeValue::N("20.00".into())));
    }

    #[tokio::test]
    async fn test_query_prefix_order_and_limit() {
        let store = SqliteStore::open_in_memory().unwrap();
        for id in ["a1", "a3", "a2"] {
            let item = Item::new(&PrimaryKey::new("acct-1", format!("access-token/{id}")));
            store.put(&item).await.unwrap();
        }
        store.put(&Item::new(&account_key())).await.unwrap();

        let newest_first = store
            .query(
                &Query::new(Index::Primary, "acct-1")
                    .begins_with("access-token/")
                    .descending()
                    .limit(2),
            )
            .await
            .unwrap();
        let sort_keys: Vec<_> = newest_first
            .iter()
            .map(|i| i.string(SORT_KEY).unwrap())
            .collect();
        assert_eq!(sort_keys, vec!["access-token/a3", "access-token/a2"]);

        let all = store
            .query(&Query::new(Index::Primary, "acct-1"))
            .await
            .unwrap();
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn test_query_prefix_treats_wildcards_literally() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .put(&Item::new(&PrimaryKey::new("h", "a%b")))
            .await
            .unwrap();
        store
            .put(&Item::new(&PrimaryKey::new("h", "axb")))
            .await
            .unwrap();

        let rows = store
            .query(&Query::new(Index::Primary, "h").begins_with("a%"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_query_secondary_index() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put(&trip("T1", "V1")).await.unwrap();
        store.put(&trip("T2", "V1")).await.unwrap();
        store.put(&trip("T3", "V2")).await.unwrap();

        let rows = store
            .query(&Query::new(Index::Gsi1, "vehicle/V1").begins_with("trip/"))
            .await
            .unwrap();
        let ids: Vec<_> = rows.iter().map(|i| i.string("TripID").unwrap()).collect();
        assert_eq!(ids, vec!["T1", "T2"]);

        let exact = store
            .query(&Query::new(Index::Gsi1, "vehicle/V1").sort_key_equals("trip/T2"))
            .await
            .unwrap();
        assert_eq!(exact.len(), 1);
    }

    #[tokio::test]
    async fn test_item_without_index_attributes_is_not_indexed() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put(&Item::new(&account_key())).await.unwrap();
        let rows = store
            .query(&Query::new(Index::Gsi2, "acct-1"))
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_batch_get_skips_missing() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put(&trip("T1", "V1")).await.unwrap();
        store.put(&trip("T2", "V1")).await.unwrap();

        let keys = vec![
            PrimaryKey::new("trip/T2", "vehicle/V1"),
            PrimaryKey::new("trip/missing", "vehicle/V1"),
            PrimaryKey::new("trip/T1", "vehicle/V1"),
        ];
        let items = store.batch_get(&keys).await.unwrap();
        let ids: Vec<_> = items.iter().map(|i| i.string("TripID").unwrap()).collect();
        assert_eq!(ids, vec!["T2", "T1"]);
    }

    #[tokio::test]
    async fn test_conditional_update_lock_semantics() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put(&Item::new(&account_key())).await.unwrap();

        let acquire = |id: &str| {
            Update::new(account_key())
                .set("RunningUpdateID", AttributeValue::string(id))
                .condition(Condition::attribute_not_exists("RunningUpdateID"))
        };

        store.conditional_update(&acquire("uid:1")).await.unwrap();
        let err = store.conditional_update(&acquire("uid:2")).await.unwrap_err();
        assert!(err.is_condition_failed());

        let item = store.get(&account_key()).await.unwrap().unwrap();
        assert_eq!(item.string("RunningUpdateID"), Some("uid:1"));

        store
            .conditional_update(&Update::new(account_key()).remove("RunningUpdateID"))
            .await
            .unwrap();
        store.conditional_update(&acquire("uid:3")).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_creates_missing_item() {
        let store = SqliteStore::open_in_memory().unwrap();
        let key = PrimaryKey::new("vehicle/V1", "_VEHICLE_");
        store
            .conditional_update(
                &Update::new(key.clone())
                    .set_if_not_exists("MetersTraveled", AttributeValue::number(0))
                    .set("A_Make", AttributeValue::string("Honda")),
            )
            .await
            .unwrap();

        let item = store.get(&key).await.unwrap().unwrap();
        assert_eq!(item.key().unwrap(), key);
        assert_eq!(item.number("MetersTraveled"), Some(0));
        assert_eq!(item.string("A_Make"), Some("Honda"));
    }

    #[tokio::test]
    async fn test_update_preserves_first_write_fields() {
        let store = SqliteStore::open_in_memory().unwrap();
        let key = PrimaryKey::new("vehicle/V1", "_VEHICLE_");
        let upsert = |meters: i64, make: &str| {
            Update::new(key.clone())
                .set_if_not_exists("MetersTraveled", AttributeValue::number(meters))
                .set("A_Make", AttributeValue::string(make))
        };

        store.conditional_update(&upsert(0, "Honda")).await.unwrap();
        store.conditional_update(&upsert(999, "Acura")).await.unwrap();

        let item = store.get(&key).await.unwrap().unwrap();
        assert_eq!(item.number("MetersTraveled"), Some(0));
        assert_eq!(item.string("A_Make"), Some("Acura"));
    }

    #[tokio::test]
    async fn test_update_index_attributes_follow_item() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .conditional_update(
                &Update::new(PrimaryKey::new("trip/T1", "vehicle/V1"))
                    .set(GSI1_HASH_KEY, AttributeValue::string("vehicle/V1"))
                    .set(GSI1_SORT_KEY, AttributeValue::string("trip/T1")),
            )
            .await
            .unwrap();

        let rows = store
            .query(&Query::new(Index::Gsi1, "vehicle/V1"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_transact_write_is_all_or_nothing() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .put(&Item::new(&account_key()).with("RunningUpdateID", AttributeValue::string("uid:1")))
            .await
            .unwrap();

        let update_key = PrimaryKey::new("uid:2", "_UPDATE_ACCOUNT_");
        let ops = vec![
            TransactOp::put(Item::new(&update_key)),
            Update::new(account_key())
                .set("RunningUpdateID", AttributeValue::string("uid:2"))
                .condition(Condition::attribute_not_exists("RunningUpdateID"))
                .into(),
        ];

        let err = store.transact_write(&ops).await.unwrap_err();
        assert!(err.is_condition_failed());
        assert!(store.get(&update_key).await.unwrap().is_none());

        // The connection is usable after the rollback.
        store
            .conditional_update(&Update::new(account_key()).remove("RunningUpdateID"))
            .await
            .unwrap();
        store.transact_write(&ops).await.unwrap();
        assert!(store.get(&update_key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_transact_write_put_and_delete() {
        let store = SqliteStore::open_in_memory().unwrap();
        let old = PrimaryKey::new("acct-1", "access-token/old");
        let new = PrimaryKey::new("acct-1", "access-token/new");
        store.put(&Item::new(&old)).await.unwrap();

        store
            .transact_write(&[TransactOp::put(Item::new(&new)), TransactOp::delete(old.clone())])
            .await
            .unwrap();

        assert!(store.get(&old).await.unwrap().is_none());
        assert!(store.get(&new).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_conditional_delete() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put(&Item::new(&account_key())).await.unwrap();

        let op = TransactOp::Delete {
            key: account_key(),
            conditions: vec![Condition::attribute_exists("RunningUpdateID")],
        };
        assert!(store.transact_write(&[op]).await.unwrap_err().is_condition_failed());
        assert!(store.get(&account_key()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_transact_write_rejects_oversized() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ops: Vec<_> = (0..=MAX_TRANSACT_ITEMS)
            .map(|i| TransactOp::put(trip(&i.to_string(), "V1")))
            .collect();
        let err = store.transact_write(&ops).await.unwrap_err();
        assert!(matches!(err, StoreError::TooManyItems { count: 26, .. }));
        assert!(store
            .query(&Query::new(Index::Gsi1, "vehicle/V1"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_batch_write() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put(&trip("T0", "V1")).await.unwrap();

        let mut requests: Vec<_> = (1..=24)
            .map(|i| WriteRequest::Put(trip(&format!("T{i}"), "V1")))
            .collect();
        requests.push(WriteRequest::Delete(PrimaryKey::new("trip/T0", "vehicle/V1")));
        store.batch_write(&requests).await.unwrap();

        let rows = store
            .query(&Query::new(Index::Gsi1, "vehicle/V1"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 24);
    }

    #[tokio::test]
    async fn test_batch_write_rejects_oversized() {
        let store = SqliteStore::open_in_memory().unwrap();
        let requests: Vec<_> = (0..26)
            .map(|i| WriteRequest::Put(trip(&i.to_string(), "V1")))
            .collect();
        assert!(matches!(
            store.batch_write(&requests).await,
            Err(StoreError::TooManyItems { operation: "batch_write", .. })
        ));
    }
}
