// ============================
// crates/gateway-lib/src/blob.rs
// ============================
//! Blob store abstraction for attachment bytes.
use crate::error::AppError;
use async_trait::async_trait;
use std::{
    fs,
    path::{Path, PathBuf},
};
use uuid::Uuid;

/// Stores decoded attachment bytes and hands back an opaque reference.
/// The gateway never serves file bytes itself.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes, returning the storage reference
    async fn store(&self, bytes: &[u8], name: &str, mime_type: &str) -> Result<String, AppError>;

    /// Public URL for a stored reference
    fn url_of(&self, storage_ref: &str) -> String;
}

/// Flat-file implementation under `<root>/blobs`
#[derive(Clone)]
pub struct FlatFileBlobStore {
    root: PathBuf,
}

impl FlatFileBlobStore {
    pub fn new<P: AsRef<Path>>(root: P) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("blobs"))?;
        Ok(Self { root })
    }
}

#[async_trait]
impl BlobStore for FlatFileBlobStore {
    async fn store(&self, bytes: &[u8], name: &str, _mime_type: &str) -> Result<String, AppError> {
        // Reference embeds the original name for operator-friendly listings;
        // the uuid prefix keeps it collision-free.
        let storage_ref = format!("{}-{}", Uuid::new_v4(), name);
        let path = self.root.join("blobs").join(&storage_ref);

        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| AppError::Blob(format!("failed to write {storage_ref}: {e}")))?;

        Ok(storage_ref)
    }

    fn url_of(&self, storage_ref: &str) -> String {
        format!("/files/{storage_ref}")
    }
}
