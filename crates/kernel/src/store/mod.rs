//! Content persistence.
//!
//! The kernel talks to storage only through [`Store`]. Records are JSON
//! objects keyed by `<type>:<id>`; each type has a timestamp-sorted index
//! (`<type>__sorted`) for paging, and a store-wide slug index maps slugs to
//! keys.

mod memory;
mod postgres;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Persistence errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("record serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

/// Sort direction by timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = std::convert::Infallible;

    /// `asc` (any case) is ascending; everything else is descending.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("asc") {
            Ok(SortOrder::Asc)
        } else {
            Ok(SortOrder::Desc)
        }
    }
}

/// Paging window over a type's sorted collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// Records to return; `-1` for all remaining.
    pub count: i64,
    /// Records to skip.
    pub offset: i64,
    pub order: SortOrder,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            count: 10,
            offset: 0,
            order: SortOrder::Desc,
        }
    }
}

impl QueryOptions {
    /// Build options, rejecting `count < -1` and `offset < 0`.
    pub fn new(count: i64, offset: i64, order: SortOrder) -> Result<Self, StoreError> {
        if count < -1 {
            return Err(StoreError::InvalidRecord(format!(
                "count must be -1 or greater, got {count}"
            )));
        }
        if offset < 0 {
            return Err(StoreError::InvalidRecord(format!(
                "offset must be 0 or greater, got {offset}"
            )));
        }
        Ok(Self {
            count,
            offset,
            order,
        })
    }

    /// `count` as a SQL limit; `None` means unbounded.
    pub fn limit(&self) -> Option<i64> {
        (self.count >= 0).then_some(self.count)
    }

    /// Apply the window to records already in the requested order.
    pub fn window<T>(&self, sorted: impl Iterator<Item = T>) -> Vec<T> {
        let skipped = sorted.skip(usize::try_from(self.offset).unwrap_or(usize::MAX));
        match self.limit() {
            Some(limit) => skipped
                .take(usize::try_from(limit).unwrap_or(usize::MAX))
                .collect(),
            None => skipped.collect(),
        }
    }
}

/// Key of one record: `<type>:<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentKey {
    pub type_name: String,
    pub id: i64,
}

impl ContentKey {
    pub fn new(type_name: impl Into<String>, id: i64) -> Self {
        Self {
            type_name: type_name.into(),
            id,
        }
    }

    /// Name of the sorted index bucket for `type_name`.
    pub fn sorted_bucket(type_name: &str) -> String {
        format!("{type_name}__sorted")
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.type_name, self.id)
    }
}

impl FromStr for ContentKey {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (type_name, id) = s
            .rsplit_once(':')
            .ok_or_else(|| StoreError::InvalidRecord(format!("malformed key '{s}'")))?;
        let id = id
            .parse()
            .map_err(|_| StoreError::InvalidRecord(format!("malformed key '{s}'")))?;
        Ok(Self::new(type_name, id))
    }
}

/// Content persistence used by the request handlers.
///
/// Implementations must tolerate concurrent calls; the kernel adds no
/// locking of its own.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch one record.
    async fn get(&self, type_name: &str, id: i64) -> Result<Option<Value>, StoreError>;

    /// Insert (`id = None`, next id allocated) or replace a record.
    ///
    /// The stored record has its `id` set, and its `slug` made unique
    /// across the store (suffixed `-1`, `-2`, ... on collision, or derived
    /// from the key when blank). Returns the id.
    async fn put(&self, type_name: &str, id: Option<i64>, record: Value) -> Result<i64, StoreError>;

    /// Remove one record. Returns whether it existed.
    async fn delete(&self, type_name: &str, id: i64) -> Result<bool, StoreError>;

    /// Page through a type's records ordered by `timestamp`, then `id`.
    async fn query(&self, type_name: &str, opts: &QueryOptions) -> Result<Vec<Value>, StoreError>;

    /// Resolve a slug to its type and record.
    async fn content_by_slug(&self, slug: &str) -> Result<Option<(String, Value)>, StoreError>;

    /// Write a configuration value.
    async fn put_config(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Read a configuration value.
    async fn config(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Whether the backend is reachable.
    async fn healthy(&self) -> bool;
}

/// `timestamp` of a record, 0 when absent.
pub(crate) fn record_timestamp(record: &Value) -> i64 {
    record.get("timestamp").and_then(Value::as_i64).unwrap_or(0)
}

/// Requested slug of a record, or one derived from its key.
pub(crate) fn requested_slug(record: &Value, key: &ContentKey) -> String {
    let slug = record
        .get("slug")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if slug.is_empty() {
        format!("{}-{}", key.type_name.to_lowercase(), key.id)
    } else {
        slug.to_string()
    }
}

/// Candidate slugs in the order they are tried.
pub(crate) fn slug_candidates(base: &str) -> impl Iterator<Item = String> + '_ {
    std::iter::once(base.to_string()).chain((1..).map(move |n| format!("{base}-{n}")))
}

/// Require an object record and stamp its id and slug.
pub(crate) fn stamp(record: &mut Value, id: i64, slug: &str) -> Result<(), StoreError> {
    let Value::Object(map) = record else {
        return Err(StoreError::InvalidRecord("record is not a JSON object".into()));
    };
    map.insert("id".into(), Value::from(id));
    map.insert("slug".into(), Value::from(slug));
    Ok(())
}
