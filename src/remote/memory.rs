//! In-memory object store
//!
//! Maps keys to byte bodies plus their content fingerprint. Backs the test
//! suite and doubles as a throwaway backend for single-process runs where no
//! bucket is configured.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;

use crate::error::{StratusError, StratusResult};
use crate::remote::etag::fingerprint;
use crate::remote::{ByteStream, ObjectStore};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    etag: String,
}

/// Object store backed by a process-local map
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, StoredObject>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects currently stored
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the store holds no objects
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All keys currently stored, for inspection in tests
    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Raw bytes stored at `key`, if any
    pub fn data(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().get(key).map(|o| o.data.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, StoredObject>> {
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn read_all(mut data: ByteStream) -> StratusResult<Vec<u8>> {
        let mut buf = Vec::new();
        data.read_to_end(&mut buf)
            .await
            .map_err(|e| StratusError::io("reading object body", e))?;
        Ok(buf)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &str) -> StratusResult<(ByteStream, u64)> {
        let data = self.get_data(key).await?;
        let size = data.len() as u64;
        Ok((Box::new(Cursor::new(data)), size))
    }

    async fn get_data(&self, key: &str) -> StratusResult<Vec<u8>> {
        self.lock()
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| StratusError::not_found(key))
    }

    async fn put(&self, key: &str, data: ByteStream) -> StratusResult<()> {
        let data = Self::read_all(data).await?;
        let etag = fingerprint(&data);
        self.lock()
            .insert(key.to_string(), StoredObject { data, etag });
        Ok(())
    }

    async fn put_cond(
        &self,
        key: &str,
        content_hash: &str,
        data: ByteStream,
    ) -> StratusResult<bool> {
        let data = Self::read_all(data).await?;
        let etag = fingerprint(&data);
        // Check and insert under one lock so concurrent identical uploads
        // resolve to exactly one write.
        let mut objects = self.lock();
        if let Some(existing) = objects.get(key) {
            if existing.etag == content_hash {
                return Ok(false);
            }
        }
        objects.insert(key.to_string(), StoredObject { data, etag });
        Ok(true)
    }

    async fn close(&self) -> StratusResult<()> {
        // Nothing to release; mirrors object-store clients whose close is
        // a no-op.
        Ok(())
    }
}
