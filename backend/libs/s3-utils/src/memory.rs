//! In-memory object storage
//!
//! Keeps objects in a map keyed by (bucket, key) and records every write so
//! tests can assert how many times the pipeline touched storage.

use crate::error::{StorageError, StorageResult};
use crate::{ObjectStorage, PutObjectRequest, StoredObject};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryObjectStorage {
    objects: RwLock<HashMap<(String, String), StoredObject>>,
    reads: RwLock<Vec<(String, String)>>,
    writes: RwLock<Vec<(String, String)>>,
    put_failure: RwLock<Option<StorageError>>,
}

impl InMemoryObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without recording a write
    pub async fn insert(
        &self,
        bucket: &str,
        key: &str,
        body: impl Into<Bytes>,
        content_type: Option<&str>,
    ) {
        self.objects.write().await.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                body: body.into(),
                content_type: content_type.map(str::to_string),
                metadata: HashMap::new(),
            },
        );
    }

    pub async fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .read()
            .await
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Every (bucket, key) passed to `get_object`, in call order
    pub async fn reads(&self) -> Vec<(String, String)> {
        self.reads.read().await.clone()
    }

    /// Every (bucket, key) successfully written through `put_object`
    pub async fn writes(&self) -> Vec<(String, String)> {
        self.writes.read().await.clone()
    }

    /// Make subsequent `put_object` calls fail with `error`
    pub async fn fail_writes_with(&self, error: Option<StorageError>) {
        *self.put_failure.write().await = error;
    }
}

#[async_trait]
impl ObjectStorage for InMemoryObjectStorage {
    async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<StoredObject> {
        self.reads
            .write()
            .await
            .push((bucket.to_string(), key.to_string()));

        self.object(bucket, key)
            .await
            .ok_or_else(|| StorageError::not_found(bucket, key))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        request: PutObjectRequest,
    ) -> StorageResult<()> {
        if let Some(err) = self.put_failure.read().await.clone() {
            return Err(err);
        }

        let location = (bucket.to_string(), key.to_string());
        self.objects.write().await.insert(
            location.clone(),
            StoredObject {
                body: request.body,
                content_type: Some(request.content_type),
                metadata: request.metadata,
            },
        );
        self.writes.write().await.push(location);

        Ok(())
    }
}
