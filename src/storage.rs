//! Ephemeral storage for uploaded reference images.
//!
//! An upload is first *staged* into a private directory, then *published*
//! (copied into a directory this service serves over HTTP) so the remote
//! backend can fetch it. *Releasing* deletes both copies and is idempotent.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use uuid::Uuid;

use crate::error::StorageError;

/// Reference to a staged input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedInput {
    /// Bare file name (no directory components).
    pub file_name: String,
}

/// A published file read back for serving.
#[derive(Debug, Clone)]
pub struct PublishedFile {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Staging area for per-job input files.
#[async_trait]
pub trait EphemeralStorage: Send + Sync {
    /// Write `bytes` to a fresh staged file.
    async fn stage(
        &self,
        owner_id: &str,
        extension: &str,
        bytes: &[u8],
    ) -> Result<StagedInput, StorageError>;

    /// Make a staged file publicly fetchable and return its URL.
    async fn publish(&self, input: &StagedInput) -> Result<String, StorageError>;

    /// Delete a staged file and its published copy. Deleting twice is not an error.
    async fn release(&self, input: &StagedInput) -> Result<(), StorageError>;

    /// Read a published file by name.
    async fn open_published(&self, file_name: &str) -> Result<PublishedFile, StorageError>;
}

/// Filesystem-backed storage.
pub struct LocalStorage {
    upload_dir: PathBuf,
    public_dir: PathBuf,
    public_url_prefix: String,
}

impl LocalStorage {
    /// `public_url_prefix` is the URL under which `public_dir` is served,
    /// e.g. `http://localhost:8001/runway-gen3/public`.
    pub fn new(
        upload_dir: PathBuf,
        public_dir: PathBuf,
        public_url_prefix: impl Into<String>,
    ) -> Self {
        Self {
            upload_dir,
            public_dir,
            public_url_prefix: public_url_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    /// Ensure the staging and public directories exist.
    pub async fn ensure_dirs(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.upload_dir).await?;
        fs::create_dir_all(&self.public_dir).await?;
        Ok(())
    }

    fn staged_path(&self, input: &StagedInput) -> Result<PathBuf, StorageError> {
        Ok(self.upload_dir.join(checked_name(&input.file_name)?))
    }

    fn public_path(&self, file_name: &str) -> Result<PathBuf, StorageError> {
        Ok(self.public_dir.join(checked_name(file_name)?))
    }
}

#[async_trait]
impl EphemeralStorage for LocalStorage {
    async fn stage(
        &self,
        owner_id: &str,
        extension: &str,
        bytes: &[u8],
    ) -> Result<StagedInput, StorageError> {
        fs::create_dir_all(&self.upload_dir).await?;
        let owner: String = owner_id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .take(32)
            .collect();
        let input = StagedInput {
            file_name: format!(
                "runway_{owner}_{}.{}",
                Uuid::new_v4().simple(),
                sanitize_extension(extension)
            ),
        };
        fs::write(self.staged_path(&input)?, bytes).await?;
        tracing::debug!(file = %input.file_name, size = bytes.len(), "Staged upload");
        Ok(input)
    }

    async fn publish(&self, input: &StagedInput) -> Result<String, StorageError> {
        let source = self.staged_path(input)?;
        if !source.exists() {
            return Err(StorageError::FileNotFound(input.file_name.clone()));
        }
        fs::create_dir_all(&self.public_dir).await?;
        fs::copy(&source, self.public_path(&input.file_name)?).await?;

        let url = format!("{}/{}", self.public_url_prefix, input.file_name);
        tracing::info!(url = %url, "Published staged input");
        Ok(url)
    }

    async fn release(&self, input: &StagedInput) -> Result<(), StorageError> {
        remove_if_present(&self.staged_path(input)?).await?;
        remove_if_present(&self.public_path(&input.file_name)?).await?;
        tracing::info!(file = %input.file_name, "Released staged input");
        Ok(())
    }

    async fn open_published(&self, file_name: &str) -> Result<PublishedFile, StorageError> {
        let path = self.public_path(file_name)?;
        if !path.exists() {
            return Err(StorageError::FileNotFound(file_name.to_string()));
        }
        let bytes = fs::read(&path).await?;
        let content_type = mime_guess::from_path(&path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Ok(PublishedFile {
            bytes,
            content_type,
        })
    }
}

/// Reject anything that is not a single plain path component.
fn checked_name(file_name: &str) -> Result<&str, StorageError> {
    let plain = !file_name.is_empty()
        && !file_name.starts_with('.')
        && !file_name.contains(['/', '\\'])
        && Path::new(file_name).file_name().and_then(|n| n.to_str()) == Some(file_name);
    if plain {
        Ok(file_name)
    } else {
        Err(StorageError::InvalidName(file_name.to_string()))
    }
}

/// Keep short alphanumeric extensions, fall back to `jpg`.
pub fn sanitize_extension(extension: &str) -> String {
    let ext = extension.trim_start_matches('.').to_ascii_lowercase();
    if !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        ext
    } else {
        "jpg".to_string()
    }
}

async fn remove_if_present(path: &Path) -> Result<(), StorageError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_storage() -> (LocalStorage, TempDir) {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(
            dir.path().join("uploads"),
            dir.path().join("public"),
            "http://relay.test/runway-gen3/public/",
        );
        (storage, dir)
    }

    #[tokio::test]
    async fn stage_publish_release() {
        let (storage, dir) = test_storage();
        storage.ensure_dirs().await.unwrap();

        let input = storage.stage("user-1", "png", b"\x89PNG").await.unwrap();
        assert!(input.file_name.starts_with("runway_user-1_"));
        assert!(input.file_name.ends_with(".png"));
        assert!(dir.path().join("uploads").join(&input.file_name).exists());

        let url = storage.publish(&input).await.unwrap();
        assert_eq!(
            url,
            format!("http://relay.test/runway-gen3/public/{}", input.file_name)
        );

        let published = storage.open_published(&input.file_name).await.unwrap();
        assert_eq!(published.bytes, b"\x89PNG");
        assert_eq!(published.content_type, "image/png");

        storage.release(&input).await.unwrap();
        assert!(!dir.path().join("uploads").join(&input.file_name).exists());
        assert!(!dir.path().join("public").join(&input.file_name).exists());
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let (storage, _dir) = test_storage();
        let input = storage.stage("user-1", "jpg", b"data").await.unwrap();
        storage.release(&input).await.unwrap();
        storage.release(&input).await.unwrap();
    }

    #[tokio::test]
    async fn publish_missing_file_fails() {
        let (storage, _dir) = test_storage();
        let input = StagedInput {
            file_name: "runway_nobody.jpg".to_string(),
        };
        assert!(matches!(
            storage.publish(&input).await,
            Err(StorageError::FileNotFound(_))
        ));
    }

    #[tokio::test]
    async fn open_published_rejects_traversal() {
        let (storage, _dir) = test_storage();
        for name in ["../secret", "a/b.png", "..", ".hidden", ""] {
            assert!(
                matches!(
                    storage.open_published(name).await,
                    Err(StorageError::InvalidName(_))
                ),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn extension_sanitized() {
        assert_eq!(sanitize_extension(".PNG"), "png");
        assert_eq!(sanitize_extension("webp"), "webp");
        assert_eq!(sanitize_extension("../sh"), "jpg");
        assert_eq!(sanitize_extension(""), "jpg");
        assert_eq!(sanitize_extension("toolongext"), "jpg");
    }
}
