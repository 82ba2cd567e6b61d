use super::BlobStore;
use super::layout::{chunk_path, chunk_prefix, parse_chunk_index};
use crate::{Result, SliceError};
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Deletes issued concurrently during chunk cleanup.
const CLEANUP_CONCURRENCY: usize = 8;

/// ChunkRepository keeps the per-upload chunks in the object store.
/// Chunks are stored at chunks/{identifier}/chunk_{index}; there is no other
/// bookkeeping, the listing is the source of truth.
#[derive(Clone)]
pub struct ChunkRepository {
    store: Arc<dyn BlobStore>,
}

/// Outcome of a best-effort chunk cleanup.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub deleted: usize,
    pub failures: Vec<CleanupFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanupFailure {
    pub path: String,
    pub error: String,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl ChunkRepository {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    /// Store a chunk, replacing whatever was uploaded before at the same index.
    pub async fn put_chunk(&self, identifier: &str, index: u32, data: Bytes) -> Result<()> {
        let path = chunk_path(identifier, index);
        let len = data.len();

        self.store.put(&path, data).await?;

        tracing::debug!(
            "Stored chunk {} for upload {} ({} bytes)",
            index,
            identifier,
            len
        );
        Ok(())
    }

    /// Indices of all chunks currently stored for an upload.
    pub async fn list_chunks(&self, identifier: &str) -> Result<BTreeSet<u32>> {
        let keys = self.store.list(&chunk_prefix(identifier)).await?;

        let mut indices = BTreeSet::new();
        for key in keys {
            match parse_chunk_index(&key) {
                Some(index) => {
                    indices.insert(index);
                }
                None => {
                    tracing::warn!("Ignoring unexpected object {} under upload {}", key, identifier);
                }
            }
        }

        Ok(indices)
    }

    pub async fn get_chunk(&self, identifier: &str, index: u32) -> Result<Bytes> {
        match self.store.get(&chunk_path(identifier, index)).await {
            Err(SliceError::ObjectNotFound(_)) => Err(SliceError::ChunkNotFound {
                identifier: identifier.to_string(),
                index,
            }),
            other => other,
        }
    }

    /// Delete every object under the upload's chunk prefix.
    ///
    /// Never fails: a delete that goes wrong is recorded in the report and the
    /// remaining chunks are still deleted.
    pub async fn delete_all_chunks(&self, identifier: &str) -> CleanupReport {
        let prefix = chunk_prefix(identifier);
        let keys = match self.store.list(&prefix).await {
            Ok(keys) => keys,
            Err(error) => {
                tracing::warn!("Chunk cleanup for upload {} could not list chunks: {}", identifier, error);
                return CleanupReport {
                    deleted: 0,
                    failures: vec![CleanupFailure {
                        path: prefix,
                        error: error.to_string(),
                    }],
                };
            }
        };

        let store = &self.store;
        let results: Vec<(String, Result<()>)> = stream::iter(keys)
            .map(|key| async move {
                let result = store.delete(&key).await;
                (key, result)
            })
            .buffer_unordered(CLEANUP_CONCURRENCY)
            .collect()
            .await;

        let mut report = CleanupReport::default();
        for (key, result) in results {
            match result {
                Ok(()) => report.deleted += 1,
                Err(error) => {
                    tracing::warn!("Failed to delete chunk {}: {}", key, error);
                    report.failures.push(CleanupFailure {
                        path: key,
                        error: error.to_string(),
                    });
                }
            }
        }

        tracing::debug!(
            "Cleaned up upload {}: deleted={} failed={}",
            identifier,
            report.deleted,
            report.failures.len()
        );
        report
    }
}
