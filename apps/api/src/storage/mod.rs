//! Artifact store — put/get/list against an S3-compatible object store.
//!
//! The client is pure infrastructure: callers always pass fully qualified
//! keys (see [`keys::KeyLayout`]). Errors are split into transient
//! (`Unavailable`, retry with backoff) and terminal (`NotFound`, `Rejected`).

pub mod keys;
pub mod memory;
pub mod s3;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub use memory::MemoryArtifactStore;
pub use s3::S3ArtifactStore;

pub const CONTENT_TYPE_TEX: &str = "text/x-tex";
pub const CONTENT_TYPE_ZIP: &str = "application/zip";
pub const CONTENT_TYPE_PDF: &str = "application/pdf";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object store unavailable for '{key}': {message}")]
    Unavailable { key: String, message: String },

    #[error("object '{key}' not found")]
    NotFound { key: String },

    /// The store refused the request (access denied, missing bucket, ...).
    #[error("object store rejected request for '{key}' ({status}): {message}")]
    Rejected {
        key: String,
        status: u16,
        message: String,
    },
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. })
    }
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Writes `bytes` at `key`, replacing any existing object.
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Bytes, StoreError>;

    /// Keys under `prefix`, sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}
