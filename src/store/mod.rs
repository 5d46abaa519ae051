//! Entity store: one keyspace addressed by `(PK, SK)` with two secondary
//! indexes, conditional updates, transactional writes and batched writes.
//!
//! Every persisted entity (accounts, tokens, updates, trips, vehicles) is an
//! [`Item`] in this store; the modules that own those entities define their
//! key layout on top of it.

pub mod db;
pub mod error;
pub mod schema;
pub mod types;

pub use db::{EntityStore, SqliteStore};
pub use error::StoreError;
pub use types::{
    AttributeValue, Condition, Index, Item, PrimaryKey, Query, TransactOp, Update, WriteRequest,
    GSI1_HASH_KEY, GSI1_SORT_KEY, GSI2_HASH_KEY, GSI2_SORT_KEY, HASH_KEY, MAX_BATCH_WRITE_ITEMS,
    MAX_TRANSACT_ITEMS,
};
