//! Test doubles shared by the unit tests.

use crate::{BlobStore, BlobWriter, Result, SliceError};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Wraps a real store and fails selected calls by path.
pub struct FaultyBlobStore {
    inner: Arc<dyn BlobStore>,
    failing_puts: Mutex<HashSet<String>>,
    failing_gets: Mutex<HashSet<String>>,
    failing_deletes: Mutex<HashSet<String>>,
    failing_lists: Mutex<HashSet<String>>,
    failing_commits: Arc<Mutex<HashSet<String>>>,
}

impl FaultyBlobStore {
    pub fn new(inner: Arc<dyn BlobStore>) -> Self {
        Self {
            inner,
            failing_puts: Mutex::default(),
            failing_gets: Mutex::default(),
            failing_deletes: Mutex::default(),
            failing_lists: Mutex::default(),
            failing_commits: Arc::default(),
        }
    }

    pub fn fail_put(&self, path: &str) {
        self.failing_puts.lock().unwrap().insert(path.to_string());
    }

    pub fn fail_get(&self, path: &str) {
        self.failing_gets.lock().unwrap().insert(path.to_string());
    }

    pub fn fail_delete(&self, path: &str) {
        self.failing_deletes.lock().unwrap().insert(path.to_string());
    }

    pub fn fail_list(&self, prefix: &str) {
        self.failing_lists.lock().unwrap().insert(prefix.to_string());
    }

    pub fn fail_commit(&self, path: &str) {
        self.failing_commits.lock().unwrap().insert(path.to_string());
    }

    fn injected(set: &Mutex<HashSet<String>>, key: &str) -> bool {
        set.lock().unwrap().contains(key)
    }
}

#[async_trait]
impl BlobStore for FaultyBlobStore {
    async fn put(&self, path: &str, body: Bytes) -> Result<()> {
        if Self::injected(&self.failing_puts, path) {
            return Err(SliceError::StoreWrite {
                path: path.to_string(),
                message: "injected write failure".to_string(),
            });
        }
        self.inner.put(path, body).await
    }

    async fn get(&self, path: &str) -> Result<Bytes> {
        if Self::injected(&self.failing_gets, path) {
            return Err(SliceError::StoreRead {
                path: path.to_string(),
                message: "injected read failure".to_string(),
            });
        }
        self.inner.get(path).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        if Self::injected(&self.failing_lists, prefix) {
            return Err(SliceError::StoreList {
                prefix: prefix.to_string(),
                message: "injected list failure".to_string(),
            });
        }
        self.inner.list(prefix).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        if Self::injected(&self.failing_deletes, path) {
            return Err(SliceError::StoreDelete {
                path: path.to_string(),
                message: "injected delete failure".to_string(),
            });
        }
        self.inner.delete(path).await
    }

    async fn sign(&self, path: &str, ttl: Duration) -> Result<String> {
        self.inner.sign(path, ttl).await
    }

    async fn open_writer(&self, path: &str) -> Result<Box<dyn BlobWriter>> {
        let inner = self.inner.open_writer(path).await?;
        Ok(Box::new(FaultyWriter {
            path: path.to_string(),
            inner,
            failing_commits: self.failing_commits.clone(),
        }))
    }
}

struct FaultyWriter {
    path: String,
    inner: Box<dyn BlobWriter>,
    failing_commits: Arc<Mutex<HashSet<String>>>,
}

#[async_trait]
impl BlobWriter for FaultyWriter {
    async fn write(&mut self, data: Bytes) -> Result<()> {
        self.inner.write(data).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let Self {
            path,
            inner,
            failing_commits,
        } = *self;

        let fail = failing_commits.lock().unwrap().contains(&path);
        if fail {
            inner.abort().await?;
            return Err(SliceError::StoreWrite {
                path,
                message: "injected commit failure".to_string(),
            });
        }
        inner.commit().await
    }

    async fn abort(self: Box<Self>) -> Result<()> {
        self.inner.abort().await
    }
}
