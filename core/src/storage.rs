//! Object storage port.
//!
//! The engine never moves file bytes. It asks storage for a presigned, time-boxed write
//! capability scoped to one key, and later asks storage what actually landed at that key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors from a storage backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The backend could not be reached or answered with an error.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// A presigned URL could not be produced.
    #[error("Signing failed: {0}")]
    Signing(String),

    /// The backend answered with something we could not interpret.
    #[error("Unexpected storage response: {0}")]
    InvalidResponse(String),
}

/// Parameters of one upload slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSlot {
    /// Object key the capability is scoped to.
    pub key: String,
    /// Content type the client must send.
    pub content_type: String,
    /// Maximum object size in bytes.
    pub max_size_bytes: u64,
    /// When the capability stops working.
    pub expires_at: DateTime<Utc>,
}

/// A presigned write capability handed to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresignedUpload {
    /// URL the client uploads to with `PUT`.
    pub url: String,
    /// Headers the client must send with the upload.
    pub headers: BTreeMap<String, String>,
}

/// What storage reports about an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Size in bytes.
    pub size_bytes: u64,
    /// Content type recorded by storage, if any.
    pub content_type: Option<String>,
    /// Hex SHA-256 recorded by storage, if any.
    pub checksum_sha256: Option<String>,
}

/// Boxed future returned by [`ObjectStorage`].
pub type StorageFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StorageError>> + Send + 'a>>;

/// Presigned-URL object storage.
pub trait ObjectStorage: Send + Sync {
    /// Issue a write capability for exactly `slot.key`.
    ///
    /// # Errors
    ///
    /// [`StorageError::Signing`] if the URL cannot be produced.
    fn presign_upload(&self, slot: UploadSlot) -> StorageFuture<'_, PresignedUpload>;

    /// Look up the object at `key`; `Ok(None)` when nothing has been uploaded.
    ///
    /// # Errors
    ///
    /// [`StorageError`] if the backend cannot answer.
    fn head(&self, key: String) -> StorageFuture<'_, Option<StoredObject>>;
}
