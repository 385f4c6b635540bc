//! File storage backends.

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// A file written by [`FileStorage::store`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Storage URI, e.g. `local://2026/10/0192ab34_photo.jpg`.
    pub uri: String,
    /// URL the file is served from.
    pub url: String,
    pub size: usize,
}

/// File storage backend trait.
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Write data to storage at the given URI.
    async fn write(&self, uri: &str, data: &[u8]) -> Result<()>;

    /// Delete a file from storage.
    async fn delete(&self, uri: &str) -> Result<()>;

    /// Check if a file exists.
    async fn exists(&self, uri: &str) -> Result<bool>;

    /// Generate a storage URI for a new file.
    fn generate_uri(&self, filename: &str) -> String;

    /// Get the public URL for a file.
    fn public_url(&self, uri: &str) -> String;

    /// Store an upload under a fresh URI.
    async fn store(&self, filename: &str, data: &[u8]) -> Result<StoredFile> {
        let uri = self.generate_uri(filename);
        self.write(&uri, data).await?;
        Ok(StoredFile {
            url: self.public_url(&uri),
            uri,
            size: data.len(),
        })
    }
}

/// Local filesystem storage.
#[derive(Debug, Clone)]
pub struct LocalFileStorage {
    /// Base path for file storage.
    base_path: PathBuf,
    /// Base URL for public file access.
    base_url: String,
}

impl LocalFileStorage {
    /// Create a new local file storage.
    pub fn new(base_path: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            base_url: base_url.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Parse a local:// URI to get the path on disk.
    ///
    /// Rejects paths containing `..` components.
    fn parse_uri(&self, uri: &str) -> Result<PathBuf> {
        let path = uri
            .strip_prefix("local://")
            .context("invalid local URI, must start with local://")?;
        for component in Path::new(path).components() {
            if matches!(component, Component::ParentDir | Component::RootDir) {
                anyhow::bail!("directory traversal not allowed in storage URI");
            }
        }
        Ok(self.base_path.join(path))
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn write(&self, uri: &str, data: &[u8]) -> Result<()> {
        let path = self.parse_uri(uri)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("failed to create directories")?;
        }

        let mut file = fs::File::create(&path)
            .await
            .context("failed to create file")?;
        file.write_all(data).await.context("failed to write file")?;
        file.flush().await.context("failed to flush file")?;

        debug!(uri = %uri, path = ?path, size = data.len(), "file written");
        Ok(())
    }

    async fn delete(&self, uri: &str) -> Result<()> {
        let path = self.parse_uri(uri)?;

        if fs::try_exists(&path).await.unwrap_or(false) {
            fs::remove_file(&path)
                .await
                .context("failed to delete file")?;
            debug!(uri = %uri, "file deleted");
        } else {
            warn!(uri = %uri, "file not found for deletion");
        }

        Ok(())
    }

    async fn exists(&self, uri: &str) -> Result<bool> {
        let path = self.parse_uri(uri)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    fn generate_uri(&self, filename: &str) -> String {
        let now = chrono::Utc::now();
        let unique_id = uuid::Uuid::now_v7().simple().to_string();
        format!(
            "local://{}/{}_{}",
            now.format("%Y/%m"),
            &unique_id[..8],
            sanitize_filename(filename)
        )
    }

    fn public_url(&self, uri: &str) -> String {
        let path = uri.strip_prefix("local://").unwrap_or(uri);
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Reduce an uploaded name to a safe final path component.
pub fn sanitize_filename(filename: &str) -> String {
    let name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename);

    let safe: String = name
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' => c,
            _ => '_',
        })
        .take(200)
        .collect();

    if safe.trim_matches('.').is_empty() {
        "upload".to_string()
    } else {
        safe
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_paths_and_odd_characters() {
        assert_eq!(sanitize_filename("test.jpg"), "test.jpg");
        assert_eq!(sanitize_filename("my file.jpg"), "my_file.jpg");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("test<script>.jpg"), "test_script_.jpg");
        assert_eq!(sanitize_filename(".."), "upload");
    }

    #[test]
    fn generated_uri_shape() {
        let storage = LocalFileStorage::new("/tmp/uploads", "/api/uploads");
        let uri = storage.generate_uri("cover photo.png");

        assert!(uri.starts_with("local://"));
        assert!(uri.ends_with("_cover_photo.png"));
        assert_eq!(uri.matches('/').count(), 4);
    }

    #[test]
    fn public_url_joins_base() {
        let storage = LocalFileStorage::new("/tmp/uploads", "/api/uploads/");
        assert_eq!(
            storage.public_url("local://2026/10/abc123_test.jpg"),
            "/api/uploads/2026/10/abc123_test.jpg"
        );
    }

    #[test]
    fn traversal_uri_is_rejected() {
        let storage = LocalFileStorage::new("/tmp/uploads", "/api/uploads");
        assert!(storage.parse_uri("local://../secret").is_err());
        assert!(storage.parse_uri("local:///etc/passwd").is_err());
        assert!(storage.parse_uri("file://x").is_err());
    }

    #[tokio::test]
    async fn store_writes_and_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(dir.path(), "/api/uploads");

        let stored = storage.store("notes.txt", b"hello").await.unwrap();
        assert_eq!(stored.size, 5);
        assert!(stored.url.starts_with("/api/uploads/"));
        assert!(storage.exists(&stored.uri).await.unwrap());

        let on_disk = storage.parse_uri(&stored.uri).unwrap();
        assert_eq!(std::fs::read(on_disk).unwrap(), b"hello");

        storage.delete(&stored.uri).await.unwrap();
        assert!(!storage.exists(&stored.uri).await.unwrap());
    }
}
