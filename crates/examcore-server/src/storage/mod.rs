//! Dual-backed blob storage: disk first, database
//! `bytea` column as the failover read path.

pub mod disk_blob;
pub mod mock;

use examcore_common::parsing::content_hash;

/// Returned by [`ArtifactStorage::put`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutResult {
    /// Relative path under the upload directory, e.g. `"ab/ab12...ef.pdf"`.
    pub disk_path: Option<String>,
    pub content_hash: String,
    pub size_bytes: u64,
}

/// Enough information about a stored artifact for [`ArtifactStorage::read`]
/// to locate its bytes without needing the full `Artifact` row.
#[derive(Debug, Clone)]
pub struct StoredArtifactRef {
    pub id: uuid::Uuid,
    pub disk_path: Option<String>,
    pub has_blob: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage unavailable: both disk and blob backends failed ({0})")]
    Unavailable(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Abstraction over the dual disk+blob backend so handlers and the
/// orchestrator can be tested against an in-memory fake.
#[async_trait::async_trait]
pub trait ArtifactStorage: Send + Sync {
    /// Writes bytes to disk (best-effort) and returns enough metadata for the
    /// caller to also persist the blob. The content hash and canonical disk
    /// path are computed here; the inline blob write into the `artifacts` row
    /// is the caller's responsibility (it happens inside the same insert
    /// transaction as the rest of the artifact row — see
    /// `artifacts::repository`).
    async fn put(&self, bytes: &[u8], extension: &str) -> Result<PutResult, StorageError>;

    /// Reads bytes back, trying disk first and falling back to the database
    /// blob column on any I/O failure (missing file, permission denied, zero
    /// length read).
    async fn read(&self, artifact: &StoredArtifactRef) -> Result<Vec<u8>, StorageError>;

    /// Best-effort delete of the on-disk copy. Blob deletion is the
    /// repository's responsibility (it's a column update, not a file op).
    async fn delete_disk_copy(&self, artifact: &StoredArtifactRef) -> Result<(), StorageError>;

    async fn disk_copy_exists(&self, artifact: &StoredArtifactRef) -> bool;
}

/// Computes the canonical relative path `{hash[..2]}/{hash}.{ext}` used by
/// both the disk backend and tests asserting on stored paths.
#[must_use]
pub fn canonical_relative_path(hash: &str, extension: &str) -> String {
    let prefix = &hash[..2.min(hash.len())];
    format!("{prefix}/{hash}.{extension}")
}

#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> String {
    content_hash(bytes)
}
