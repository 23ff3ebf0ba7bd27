//! Blob storage for avatar images.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::StorageSettings;

pub const MAX_AVATAR_BYTES: usize = 2 * 1024 * 1024;
pub const ACCEPTED_IMAGE_TYPES: [&str; 3] = ["image/png", "image/jpeg", "image/webp"];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("unsupported content type '{0}'")]
    UnsupportedContentType(String),

    #[error("object too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("empty upload")]
    Empty,

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Accepts a blob and returns the URL it can be fetched from.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, StorageError>;
}

/// Reject anything that is not a small png/jpeg/webp image.
pub fn validate_image(bytes: &[u8], content_type: &str) -> Result<(), StorageError> {
    if !ACCEPTED_IMAGE_TYPES.contains(&content_type) {
        return Err(StorageError::UnsupportedContentType(content_type.to_string()));
    }
    if bytes.is_empty() {
        return Err(StorageError::Empty);
    }
    if bytes.len() > MAX_AVATAR_BYTES {
        return Err(StorageError::TooLarge {
            size: bytes.len(),
            max: MAX_AVATAR_BYTES,
        });
    }
    Ok(())
}

pub fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/webp" => "webp",
        _ => "jpg",
    }
}

/// Dev/test storage; keeps blobs in a map.
#[derive(Debug)]
pub struct InMemoryObjectStorage {
    public_base: String,
    bucket: String,
    objects: RwLock<HashMap<String, (String, Vec<u8>)>>,
}

impl InMemoryObjectStorage {
    pub fn new(public_base: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            public_base: public_base.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            objects: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<(String, Vec<u8>)> {
        self.objects.read().ok()?.get(key).cloned()
    }
}

#[async_trait]
impl ObjectStorage for InMemoryObjectStorage {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, StorageError> {
        validate_image(&bytes, content_type)?;
        self.objects
            .write()
            .map_err(|_| StorageError::Backend("lock poisoned".to_string()))?
            .insert(key.to_string(), (content_type.to_string(), bytes));
        Ok(format!("{}/{}/{}", self.public_base, self.bucket, key))
    }
}

/// Storage service speaking the hosted bucket REST API.
#[derive(Debug, Clone)]
pub struct HttpObjectStorage {
    client: reqwest::Client,
    settings: StorageSettings,
}

impl HttpObjectStorage {
    pub fn new(settings: StorageSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
        }
    }

    fn upload_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.settings.base_url, self.settings.bucket, key
        )
    }

    fn public_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.settings.base_url, self.settings.bucket, key
        )
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    #[tracing::instrument(skip(self, bytes), fields(size = bytes.len()), err)]
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, StorageError> {
        validate_image(&bytes, content_type)?;

        let response = self
            .client
            .post(self.upload_url(key))
            .bearer_auth(&self.settings.service_key)
            .header("x-upsert", "true")
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Backend(format!("upload failed with {status}: {body}")));
        }

        Ok(self.public_url(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_returns_bucket_url() {
        let storage = InMemoryObjectStorage::new("http://localhost/storage/", "avatars");
        let url = storage
            .put("a/avatar.png", vec![1, 2, 3], "image/png")
            .await
            .unwrap();
        assert_eq!(url, "http://localhost/storage/avatars/a/avatar.png");
        assert_eq!(storage.get("a/avatar.png").unwrap().0, "image/png");
    }

    #[test]
    fn rejects_non_images_and_oversized_uploads() {
        assert!(matches!(
            validate_image(b"<svg/>", "image/svg+xml"),
            Err(StorageError::UnsupportedContentType(_))
        ));
        assert!(matches!(validate_image(&[], "image/png"), Err(StorageError::Empty)));
        let big = vec![0u8; MAX_AVATAR_BYTES + 1];
        assert!(matches!(
            validate_image(&big, "image/jpeg"),
            Err(StorageError::TooLarge { .. })
        ));
    }

    #[test]
    fn http_urls_follow_bucket_layout() {
        let storage = HttpObjectStorage::new(StorageSettings {
            base_url: "https://db.example.com".to_string(),
            service_key: "k".to_string(),
            bucket: "avatars".to_string(),
        });
        assert_eq!(
            storage.upload_url("x.png"),
            "https://db.example.com/storage/v1/object/avatars/x.png"
        );
        assert_eq!(
            storage.public_url("x.png"),
            "https://db.example.com/storage/v1/object/public/avatars/x.png"
        );
    }
}
