//! In-process store.
//!
//! Used when no database is configured, and by tests.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use super::{
    ContentKey, QueryOptions, SortOrder, Store, StoreError, record_timestamp, requested_slug,
    slug_candidates, stamp,
};

/// Store keeping everything in memory.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    /// `<type>` -> id -> record.
    buckets: HashMap<String, BTreeMap<i64, Value>>,
    /// `<type>__sorted` -> (timestamp, id).
    sorted: HashMap<String, BTreeSet<(i64, i64)>>,
    /// slug -> key.
    slugs: HashMap<String, ContentKey>,
    /// Last id handed out per type.
    last_ids: HashMap<String, i64>,
    config: HashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoryState {
    fn unlink(&mut self, key: &ContentKey) -> Option<Value> {
        let old = self.buckets.get_mut(&key.type_name)?.remove(&key.id)?;
        if let Some(sorted) = self.sorted.get_mut(&ContentKey::sorted_bucket(&key.type_name)) {
            sorted.remove(&(record_timestamp(&old), key.id));
        }
        if let Some(slug) = old.get("slug").and_then(Value::as_str)
            && self.slugs.get(slug) == Some(key)
        {
            self.slugs.remove(slug);
        }
        Some(old)
    }

    fn unique_slug(&self, base: &str, key: &ContentKey) -> String {
        slug_candidates(base)
            .find(|candidate| match self.slugs.get(candidate) {
                Some(owner) => owner == key,
                None => true,
            })
            .unwrap_or_else(|| base.to_string())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, type_name: &str, id: i64) -> Result<Option<Value>, StoreError> {
        let state = self.inner.read();
        Ok(state
            .buckets
            .get(type_name)
            .and_then(|bucket| bucket.get(&id))
            .cloned())
    }

    async fn put(
        &self,
        type_name: &str,
        id: Option<i64>,
        mut record: Value,
    ) -> Result<i64, StoreError> {
        if !record.is_object() {
            return Err(StoreError::InvalidRecord("record is not a JSON object".into()));
        }
        if let Some(id) = id.filter(|id| *id <= 0) {
            return Err(StoreError::InvalidRecord(format!("invalid id {id}")));
        }
        let mut state = self.inner.write();

        let last = state.last_ids.entry(type_name.to_string()).or_insert(0);
        let id = match id {
            Some(id) => {
                *last = (*last).max(id);
                id
            }
            None => {
                *last += 1;
                *last
            }
        };

        let key = ContentKey::new(type_name, id);
        state.unlink(&key);

        let slug = state.unique_slug(&requested_slug(&record, &key), &key);
        stamp(&mut record, id, &slug)?;

        state
            .sorted
            .entry(ContentKey::sorted_bucket(type_name))
            .or_default()
            .insert((record_timestamp(&record), id));
        state.slugs.insert(slug, key);
        state
            .buckets
            .entry(type_name.to_string())
            .or_default()
            .insert(id, record);

        Ok(id)
    }

    async fn delete(&self, type_name: &str, id: i64) -> Result<bool, StoreError> {
        let mut state = self.inner.write();
        Ok(state.unlink(&ContentKey::new(type_name, id)).is_some())
    }

    async fn query(&self, type_name: &str, opts: &QueryOptions) -> Result<Vec<Value>, StoreError> {
        let state = self.inner.read();
        let (Some(sorted), Some(bucket)) = (
            state.sorted.get(&ContentKey::sorted_bucket(type_name)),
            state.buckets.get(type_name),
        ) else {
            return Ok(Vec::new());
        };

        let ids: Box<dyn Iterator<Item = &(i64, i64)>> = match opts.order {
            SortOrder::Asc => Box::new(sorted.iter()),
            SortOrder::Desc => Box::new(sorted.iter().rev()),
        };
        Ok(opts
            .window(ids.filter_map(|(_, id)| bucket.get(id)))
            .into_iter()
            .cloned()
            .collect())
    }

    async fn content_by_slug(&self, slug: &str) -> Result<Option<(String, Value)>, StoreError> {
        let state = self.inner.read();
        Ok(state.slugs.get(slug).and_then(|key| {
            state
                .buckets
                .get(&key.type_name)
                .and_then(|bucket| bucket.get(&key.id))
                .map(|record| (key.type_name.clone(), record.clone()))
        }))
    }

    async fn put_config(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.inner.write().config.insert(key.to_string(), value);
        Ok(())
    }

    async fn config(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.inner.read().config.get(key).cloned())
    }

    async fn healthy(&self) -> bool {
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn seed(store: &MemoryStore, n: i64) {
        for ts in 1..=n {
            store
                .put("Post", None, json!({"timestamp": ts * 100, "slug": format!("p{ts}")}))
                .await
                .unwrap();
        }
    }

    fn ids(records: &[Value]) -> Vec<i64> {
        records.iter().map(|r| r["id"].as_i64().unwrap()).collect()
    }

    // =========================================================================
    // put / get / delete
    // =========================================================================

    #[tokio::test]
    async fn ids_are_sequential_per_type() {
        let store = MemoryStore::new();
        assert_eq!(store.put("Post", None, json!({})).await.unwrap(), 1);
        assert_eq!(store.put("Post", None, json!({})).await.unwrap(), 2);
        assert_eq!(store.put("Event", None, json!({})).await.unwrap(), 1);

        let record = store.get("Post", 2).await.unwrap().unwrap();
        assert_eq!(record["id"], 2);
        assert_eq!(record["slug"], "post-2");
    }

    #[tokio::test]
    async fn replace_keeps_id_and_reindexes() {
        let store = MemoryStore::new();
        let id = store
            .put("Post", None, json!({"slug": "old", "timestamp": 1}))
            .await
            .unwrap();
        store
            .put("Post", Some(id), json!({"slug": "new", "timestamp": 1}))
            .await
            .unwrap();

        assert!(store.content_by_slug("old").await.unwrap().is_none());
        let (type_name, record) = store.content_by_slug("new").await.unwrap().unwrap();
        assert_eq!(type_name, "Post");
        assert_eq!(record["id"], id);
        assert_eq!(
            store.query("Post", &QueryOptions::default()).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn explicit_id_advances_counter() {
        let store = MemoryStore::new();
        store.put("Post", Some(5), json!({})).await.unwrap();
        assert_eq!(store.put("Post", None, json!({})).await.unwrap(), 6);
        assert!(store.put("Post", Some(0), json!({})).await.is_err());
    }

    #[tokio::test]
    async fn non_object_record_is_rejected() {
        let store = MemoryStore::new();
        let err = store.put("Post", None, json!([1, 2])).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecord(_)));
    }

    #[tokio::test]
    async fn rejected_replace_leaves_store_untouched() {
        let store = MemoryStore::new();
        let id = store
            .put("Post", None, json!({"slug": "kept", "timestamp": 3}))
            .await
            .unwrap();

        assert!(store.put("Post", Some(id), json!("oops")).await.is_err());
        assert!(store.put("Post", Some(40), json!(null)).await.is_err());
        assert!(store.put("Post", None, json!([1])).await.is_err());

        let record = store.get("Post", id).await.unwrap().unwrap();
        assert_eq!(record["slug"], "kept");
        let (_, by_slug) = store.content_by_slug("kept").await.unwrap().unwrap();
        assert_eq!(by_slug["id"], id);
        assert_eq!(
            store.query("Post", &QueryOptions::default()).await.unwrap().len(),
            1
        );
        assert_eq!(store.put("Post", None, json!({})).await.unwrap(), id + 1);
    }

    #[tokio::test]
    async fn delete_removes_indexes() {
        let store = MemoryStore::new();
        let id = store.put("Post", None, json!({"slug": "gone"})).await.unwrap();
        assert!(store.delete("Post", id).await.unwrap());
        assert!(!store.delete("Post", id).await.unwrap());
        assert!(store.get("Post", id).await.unwrap().is_none());
        assert!(store.content_by_slug("gone").await.unwrap().is_none());
        assert!(store.query("Post", &QueryOptions::default()).await.unwrap().is_empty());
    }

    // =========================================================================
    // Slugs
    // =========================================================================

    #[tokio::test]
    async fn duplicate_slugs_get_suffixes() {
        let store = MemoryStore::new();
        store.put("Post", None, json!({"slug": "hello"})).await.unwrap();
        store.put("Event", None, json!({"slug": "hello"})).await.unwrap();
        store.put("Post", None, json!({"slug": "hello"})).await.unwrap();

        assert_eq!(store.content_by_slug("hello").await.unwrap().unwrap().0, "Post");
        assert_eq!(store.content_by_slug("hello-1").await.unwrap().unwrap().0, "Event");
        let (_, third) = store.content_by_slug("hello-2").await.unwrap().unwrap();
        assert_eq!(third["id"], 2);
    }

    #[tokio::test]
    async fn resaving_keeps_own_slug() {
        let store = MemoryStore::new();
        let id = store.put("Post", None, json!({"slug": "mine"})).await.unwrap();
        store.put("Post", Some(id), json!({"slug": "mine"})).await.unwrap();
        let record = store.get("Post", id).await.unwrap().unwrap();
        assert_eq!(record["slug"], "mine");
    }

    // =========================================================================
    // Query
    // =========================================================================

    #[tokio::test]
    async fn query_orders_by_timestamp() {
        let store = MemoryStore::new();
        seed(&store, 12).await;

        let desc = store.query("Post", &QueryOptions::default()).await.unwrap();
        assert_eq!(desc.len(), 10);
        assert_eq!(ids(&desc)[..3], [12, 11, 10]);

        let asc = QueryOptions::new(3, 0, SortOrder::Asc).unwrap();
        assert_eq!(ids(&store.query("Post", &asc).await.unwrap()), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn query_offset_and_unbounded_count() {
        let store = MemoryStore::new();
        seed(&store, 5).await;

        let opts = QueryOptions::new(-1, 2, SortOrder::Desc).unwrap();
        assert_eq!(ids(&store.query("Post", &opts).await.unwrap()), vec![3, 2, 1]);

        let past_end = QueryOptions::new(10, 50, SortOrder::Desc).unwrap();
        assert!(store.query("Post", &past_end).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn equal_timestamps_order_by_id() {
        let store = MemoryStore::new();
        for _ in 0..3 {
            store.put("Post", None, json!({"timestamp": 7})).await.unwrap();
        }
        let asc = QueryOptions::new(-1, 0, SortOrder::Asc).unwrap();
        assert_eq!(ids(&store.query("Post", &asc).await.unwrap()), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn unknown_type_queries_empty() {
        let store = MemoryStore::new();
        assert!(store.query("Nope", &QueryOptions::default()).await.unwrap().is_empty());
    }

    // =========================================================================
    // Config
    // =========================================================================

    #[tokio::test]
    async fn config_round_trip() {
        let store = MemoryStore::new();
        assert!(store.config("http_port").await.unwrap().is_none());
        store.put_config("http_port", json!(8080)).await.unwrap();
        assert_eq!(store.config("http_port").await.unwrap(), Some(json!(8080)));
        assert!(store.healthy().await);
    }
}
