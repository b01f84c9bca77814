use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{ArtifactStorage, PutResult, StorageError, StoredArtifactRef, hash_bytes};

/// In-memory storage for unit and route tests, grounded on the
/// put/delete-call-counting idiom used across this crate's mock clients.
#[derive(Default)]
pub struct InMemoryArtifactStorage {
    data: Mutex<HashMap<String, Vec<u8>>>,
    put_calls: AtomicUsize,
}

impl InMemoryArtifactStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_count(&self) -> usize {
        self.put_calls.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl ArtifactStorage for InMemoryArtifactStorage {
    async fn put(&self, bytes: &[u8], extension: &str) -> Result<PutResult, StorageError> {
        self.put_calls.fetch_add(1, Ordering::Relaxed);
        let hash = hash_bytes(bytes);
        let path = format!("{hash}.{extension}");
        self.data
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(path.clone(), bytes.to_vec());
        Ok(PutResult {
            disk_path: Some(path),
            content_hash: hash,
            size_bytes: bytes.len() as u64,
        })
    }

    async fn read(&self, artifact: &StoredArtifactRef) -> Result<Vec<u8>, StorageError> {
        artifact
            .disk_path
            .as_ref()
            .and_then(|p| {
                self.data
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .get(p)
                    .cloned()
            })
            .ok_or_else(|| StorageError::Unavailable("key not found in mock store".to_string()))
    }

    async fn delete_disk_copy(&self, artifact: &StoredArtifactRef) -> Result<(), StorageError> {
        if let Some(path) = &artifact.disk_path {
            self.data
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .remove(path);
        }
        Ok(())
    }

    async fn disk_copy_exists(&self, artifact: &StoredArtifactRef) -> bool {
        artifact.disk_path.as_ref().is_some_and(|p| {
            self.data
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .contains_key(p)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_read_round_trips() {
        let storage = InMemoryArtifactStorage::new();
        let result = storage.put(b"hello", "pdf").await.unwrap();
        let bytes = storage
            .read(&StoredArtifactRef {
                id: uuid::Uuid::new_v4(),
                disk_path: result.disk_path,
                has_blob: false,
            })
            .await
            .unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[tokio::test]
    async fn put_count_tracks_calls() {
        let storage = InMemoryArtifactStorage::new();
        storage.put(b"a", "pdf").await.unwrap();
        storage.put(b"b", "pdf").await.unwrap();
        assert_eq!(storage.put_count(), 2);
    }
}
