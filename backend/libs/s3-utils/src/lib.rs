//! Object storage capability for the thumbnail pipeline
//!
//! The pipeline only needs two calls against storage: read an object and
//! write an object. They are exposed through the [`ObjectStorage`] trait so
//! the worker can be constructed with the S3-backed implementation in
//! production and with [`InMemoryObjectStorage`] in tests and local runs.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;

pub mod config;
pub mod error;
pub mod memory;
pub mod operations;

pub use config::S3Config;
pub use error::{StorageError, StorageResult};
pub use memory::InMemoryObjectStorage;
pub use operations::S3ObjectStorage;

/// An object read back from storage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredObject {
    pub body: Bytes,
    /// Declared content type, if the object carries one
    pub content_type: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// A write request. Writing overwrites any existing object at the key.
#[derive(Debug, Clone, PartialEq)]
pub struct PutObjectRequest {
    pub body: Bytes,
    pub content_type: String,
    pub metadata: HashMap<String, String>,
}

/// Read/write access to an object store, addressed by (bucket, key)
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Fetch an object's payload and content type.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] when the object is absent and
    /// [`StorageError::AccessDenied`] when it cannot be read.
    async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<StoredObject>;

    /// Store an object, replacing whatever was at `key`.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        request: PutObjectRequest,
    ) -> StorageResult<()>;
}
