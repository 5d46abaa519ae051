//! Item, key and expression types for the entity store.
//!
//! Items are flat maps of typed attributes. The primary key lives in the `PK`
//! and `SK` attributes; the two secondary indexes are projected from the
//! `GSI1PK`/`GSI1SK` and `GSI2PK`/`GSI2SK` attributes whenever both halves
//! are present as strings.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::error::StoreError;

pub const HASH_KEY: &str = "PK";
pub const SORT_KEY: &str = "SK";
pub const GSI1_HASH_KEY: &str = "GSI1PK";
pub const GSI1_SORT_KEY: &str = "GSI1SK";
pub const GSI2_HASH_KEY: &str = "GSI2PK";
pub const GSI2_SORT_KEY: &str = "GSI2SK";

/// Maximum number of operations in one `transact_write` call.
pub const MAX_TRANSACT_ITEMS: usize = 25;

/// Maximum number of requests in one `batch_write` call.
pub const MAX_BATCH_WRITE_ITEMS: usize = 25;

/// Maximum number of keys in one `batch_get` call.
pub const MAX_BATCH_GET_ITEMS: usize = 100;

/// A typed attribute value. Numbers are kept in their decimal string form so
/// integer timestamps and fixed-precision decimals round-trip exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeValue {
    #[serde(rename = "S")]
    S(String),
    #[serde(rename = "N")]
    N(String),
    #[serde(rename = "SS")]
    Ss(Vec<String>),
}

impl AttributeValue {
    pub fn string(value: impl Into<String>) -> Self {
        Self::S(value.into())
    }

    pub fn number(value: i64) -> Self {
        Self::N(value.to_string())
    }

    /// A decimal number rendered with a fixed number of fractional digits.
    pub fn decimal(value: f64, precision: usize) -> Self {
        Self::N(format!("{:.*}", precision, value))
    }

    /// Epoch-seconds representation of a timestamp.
    pub fn time(value: DateTime<Utc>) -> Self {
        Self::number(value.timestamp())
    }

    pub fn string_set<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Ss(values.into_iter().map(Into::into).collect())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::S(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::N(n) => n
                .parse::<i64>()
                .ok()
                .or_else(|| n.parse::<f64>().ok().map(|f| f as i64)),
            _ => None,
        }
    }

    pub fn as_string_set(&self) -> Option<&[String]> {
        match self {
            Self::Ss(values) => Some(values),
            _ => None,
        }
    }

    /// Interpret an epoch-seconds number as a UTC timestamp.
    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        self.as_i64()
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
    }
}

/// Composite primary key of an item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrimaryKey {
    pub hash_key: String,
    pub sort_key: String,
}

impl PrimaryKey {
    pub fn new(hash_key: impl Into<String>, sort_key: impl Into<String>) -> Self {
        Self {
            hash_key: hash_key.into(),
            sort_key: sort_key.into(),
        }
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.hash_key, self.sort_key)
    }
}

/// A stored item: a map of attribute names to typed values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Item(BTreeMap<String, AttributeValue>);

impl Item {
    /// Create an item carrying only its primary key attributes.
    pub fn new(key: &PrimaryKey) -> Self {
        Self::default()
            .with(HASH_KEY, AttributeValue::string(&key.hash_key))
            .with(SORT_KEY, AttributeValue::string(&key.sort_key))
    }

    pub fn with(mut self, name: &str, value: AttributeValue) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: AttributeValue) {
        self.0.insert(name.to_string(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<AttributeValue> {
        self.0.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(AttributeValue::as_str)
    }

    /// Like [`Item::string`], but a missing attribute is an error.
    pub fn require_string(&self, name: &str) -> Result<&str, StoreError> {
        self.string(name)
            .ok_or_else(|| StoreError::MissingAttribute(name.to_string()))
    }

    pub fn number(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(AttributeValue::as_i64)
    }

    pub fn time(&self, name: &str) -> Option<DateTime<Utc>> {
        self.get(name).and_then(AttributeValue::as_time)
    }

    pub fn string_set(&self, name: &str) -> Option<&[String]> {
        self.get(name).and_then(AttributeValue::as_string_set)
    }

    pub fn key(&self) -> Result<PrimaryKey, StoreError> {
        Ok(PrimaryKey::new(
            self.require_string(HASH_KEY)?,
            self.require_string(SORT_KEY)?,
        ))
    }

    /// The (hash, sort) pair this item projects into the given index, if any.
    pub fn index_key(&self, index: Index) -> Option<(&str, &str)> {
        let (hash, sort) = index.attributes();
        Some((self.string(hash)?, self.string(sort)?))
    }
}

/// Which key space a query runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Index {
    Primary,
    Gsi1,
    Gsi2,
}

impl Index {
    /// Attribute names holding this index's (hash, sort) key.
    pub fn attributes(&self) -> (&'static str, &'static str) {
        match self {
            Self::Primary => (HASH_KEY, SORT_KEY),
            Self::Gsi1 => (GSI1_HASH_KEY, GSI1_SORT_KEY),
            Self::Gsi2 => (GSI2_HASH_KEY, GSI2_SORT_KEY),
        }
    }

    /// Table columns holding this index's (hash, sort) key.
    pub(crate) fn columns(&self) -> (&'static str, &'static str) {
        match self {
            Self::Primary => ("pk", "sk"),
            Self::Gsi1 => ("gsi1pk", "gsi1sk"),
            Self::Gsi2 => ("gsi2pk", "gsi2sk"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortKeyCondition {
    Any,
    Equals(String),
    BeginsWith(String),
}

/// A key-condition query against one index.
#[derive(Debug, Clone)]
pub struct Query {
    pub index: Index,
    pub hash_key: String,
    pub sort_key: SortKeyCondition,
    pub limit: Option<usize>,
    pub order: SortOrder,
}

impl Query {
    pub fn new(index: Index, hash_key: impl Into<String>) -> Self {
        Self {
            index,
            hash_key: hash_key.into(),
            sort_key: SortKeyCondition::Any,
            limit: None,
            order: SortOrder::Ascending,
        }
    }

    pub fn begins_with(mut self, prefix: impl Into<String>) -> Self {
        self.sort_key = SortKeyCondition::BeginsWith(prefix.into());
        self
    }

    pub fn sort_key_equals(mut self, value: impl Into<String>) -> Self {
        self.sort_key = SortKeyCondition::Equals(value.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn descending(mut self) -> Self {
        self.order = SortOrder::Descending;
        self
    }
}

/// A predicate over an item's existing attributes. A missing item is
/// evaluated as an empty attribute map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    AttributeExists(String),
    AttributeNotExists(String),
    NotEquals(String, AttributeValue),
}

impl Condition {
    pub fn attribute_exists(name: &str) -> Self {
        Self::AttributeExists(name.to_string())
    }

    pub fn attribute_not_exists(name: &str) -> Self {
        Self::AttributeNotExists(name.to_string())
    }

    pub fn not_equals(name: &str, value: AttributeValue) -> Self {
        Self::NotEquals(name.to_string(), value)
    }

    pub fn holds(&self, item: Option<&Item>) -> bool {
        let attr = |name: &str| item.and_then(|i| i.get(name));
        match self {
            Self::AttributeExists(name) => attr(name).is_some(),
            Self::AttributeNotExists(name) => attr(name).is_none(),
            Self::NotEquals(name, value) => attr(name) != Some(value),
        }
    }
}

/// One clause of an update expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateAction {
    Set(String, AttributeValue),
    SetIfNotExists(String, AttributeValue),
    Remove(String),
}

impl UpdateAction {
    pub(crate) fn apply(&self, item: &mut Item) {
        match self {
            Self::Set(name, value) => item.set(name, value.clone()),
            Self::SetIfNotExists(name, value) => {
                if !item.contains(name) {
                    item.set(name, value.clone());
                }
            }
            Self::Remove(name) => {
                item.remove(name);
            }
        }
    }
}

/// An update of a single item. Applying it to a missing item creates the
/// item from its key plus the `SET` clauses.
#[derive(Debug, Clone)]
pub struct Update {
    pub key: PrimaryKey,
    pub actions: Vec<UpdateAction>,
    pub conditions: Vec<Condition>,
}

impl Update {
    pub fn new(key: PrimaryKey) -> Self {
        Self {
            key,
            actions: Vec::new(),
            conditions: Vec::new(),
        }
    }

    pub fn set(mut self, name: &str, value: AttributeValue) -> Self {
        self.actions.push(UpdateAction::Set(name.to_string(), value));
        self
    }

    pub fn set_if_not_exists(mut self, name: &str, value: AttributeValue) -> Self {
        self.actions
            .push(UpdateAction::SetIfNotExists(name.to_string(), value));
        self
    }

    pub fn remove(mut self, name: &str) -> Self {
        self.actions.push(UpdateAction::Remove(name.to_string()));
        self
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }
}

/// One operation of an all-or-nothing transaction.
#[derive(Debug, Clone)]
pub enum TransactOp {
    Put {
        item: Item,
        conditions: Vec<Condition>,
    },
    Update(Update),
    Delete {
        key: PrimaryKey,
        conditions: Vec<Condition>,
    },
}

impl TransactOp {
    pub fn put(item: Item) -> Self {
        Self::Put {
            item,
            conditions: Vec::new(),
        }
    }

    pub fn delete(key: PrimaryKey) -> Self {
        Self::Delete {
            key,
            conditions: Vec::new(),
        }
    }
}

impl From<Update> for TransactOp {
    fn from(update: Update) -> Self {
        Self::Update(update)
    }
}

/// One request of a non-transactional batch write.
#[derive(Debug, Clone)]
pub enum WriteRequest {
    Put(Item),
    Delete(PrimaryKey),
}
