//! Metadata records for stored uploads.
//!
//! Each upload gets a record under [`UPLOADS_TYPE`], slugged from its file
//! name, so it can be looked up with `GET /api/uploads?slug=...`. The type
//! is never registered with the type registry, so the content API does not
//! list or write it.

use serde::{Deserialize, Serialize};
use vivaio_sdk::slug::slugify;
use vivaio_sdk::types::Item;

use super::StoredFile;
use crate::store::{Store, StoreError};

/// Store type upload records are kept under.
pub const UPLOADS_TYPE: &str = "__uploads";

/// Metadata of one stored upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadRecord {
    #[serde(flatten)]
    pub item: Item,

    /// File name as submitted.
    pub name: String,

    /// URL the file is served from.
    pub path: String,

    pub content_type: String,
    pub content_length: usize,
}

impl UploadRecord {
    pub fn new(filename: &str, content_type: Option<&str>, stored: &StoredFile, now: i64) -> Self {
        Self {
            item: Item {
                uuid: uuid::Uuid::now_v7(),
                slug: slugify(filename),
                timestamp: now,
                updated: now,
                ..Item::default()
            },
            name: filename.to_string(),
            path: stored.url.clone(),
            content_type: content_type
                .filter(|t| !t.is_empty())
                .unwrap_or("application/octet-stream")
                .to_string(),
            content_length: stored.size,
        }
    }

    /// Persist the record; returns it with the stored id and final slug.
    pub async fn save(mut self, store: &dyn Store) -> Result<Self, StoreError> {
        let id = store.put(UPLOADS_TYPE, None, serde_json::to_value(&self)?).await?;
        if let Some(stored) = store.get(UPLOADS_TYPE, id).await? {
            self = serde_json::from_value(stored)?;
        }
        Ok(self)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn stored(url: &str) -> StoredFile {
        StoredFile {
            uri: "local://2026/10/abc_cover.png".into(),
            url: url.into(),
            size: 42,
        }
    }

    #[test]
    fn record_from_stored_file() {
        let record = UploadRecord::new(
            "Cover Photo.png",
            Some("image/png"),
            &stored("/api/uploads/2026/10/abc_cover.png"),
            1_000,
        );
        assert_eq!(record.item.slug, "cover-photo-png");
        assert_eq!(record.item.timestamp, 1_000);
        assert_eq!(record.path, "/api/uploads/2026/10/abc_cover.png");
        assert_eq!(record.content_length, 42);

        let untyped = UploadRecord::new("x", None, &stored("/x"), 1);
        assert_eq!(untyped.content_type, "application/octet-stream");
    }

    #[tokio::test]
    async fn same_name_uploads_get_distinct_slugs() {
        let store = MemoryStore::new();
        let first = UploadRecord::new("a.png", None, &stored("/1"), 1)
            .save(&store)
            .await
            .unwrap();
        let second = UploadRecord::new("a.png", None, &stored("/2"), 2)
            .save(&store)
            .await
            .unwrap();

        assert_eq!(first.item.id, 1);
        assert_eq!(first.item.slug, "a-png");
        assert_eq!(second.item.slug, "a-png-1");
        let (type_name, found) = store.content_by_slug("a-png-1").await.unwrap().unwrap();
        assert_eq!(type_name, UPLOADS_TYPE);
        assert_eq!(found["path"], "/2");
    }
}
