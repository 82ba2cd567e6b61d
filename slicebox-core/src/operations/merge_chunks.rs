use crate::storage::{merged_file_name, merged_file_path, validate_identifier};
use crate::{BlobWriter, ChunkRepository, CleanupReport, Result, SliceError};
use sha2::{Digest, Sha256};

/// Merges the chunks of an upload into a single object.
///
/// Order of work: check every index is present, stream chunks 0..N into a
/// multipart write, commit, then clean up the chunks. The merged object is
/// either absent or complete; chunks are only removed after the commit.
#[derive(Clone)]
pub struct MergeChunksOperation {
    repository: ChunkRepository,
}

#[derive(Debug, Clone)]
pub struct MergeChunksOperationRequest {
    pub identifier: String,
    pub name: String,
    pub file_type: String,
    pub total_chunks: u32,
}

#[derive(Debug, Clone)]
pub struct MergeChunksOperationResult {
    pub path: String,
    pub file_name: String,
    pub size_bytes: u64,
    pub sha256: String,
    /// Non-fatal: the merged object is committed regardless of what is in here.
    pub cleanup: CleanupReport,
}

impl MergeChunksOperation {
    pub fn new(repository: ChunkRepository) -> Self {
        Self { repository }
    }

    pub async fn run(
        &self,
        request: MergeChunksOperationRequest,
    ) -> Result<MergeChunksOperationResult> {
        let MergeChunksOperationRequest {
            identifier,
            name,
            file_type,
            total_chunks,
        } = request;

        validate_identifier(&identifier)?;
        let file_name = merged_file_name(&name, &file_type)?;
        if total_chunks == 0 {
            return Err(SliceError::InvalidRequest(
                "total_chunks must be at least 1".to_string(),
            ));
        }

        let present = self.repository.list_chunks(&identifier).await?;
        let missing: Vec<u32> = (0..total_chunks)
            .filter(|index| !present.contains(index))
            .collect();
        if !missing.is_empty() {
            let found = total_chunks - missing.len() as u32;
            tracing::info!(
                "Refusing merge of upload {}: expected={} found={} missing={:?}",
                identifier,
                total_chunks,
                found,
                missing
            );
            return Err(SliceError::IncompleteUpload {
                expected: total_chunks,
                found,
                missing,
            });
        }

        let path = merged_file_path(&identifier, &file_name);
        let mut writer = self.repository.store().open_writer(&path).await?;

        let (size_bytes, sha256) = match self
            .copy_chunks(&identifier, total_chunks, &mut writer)
            .await
        {
            Ok(copied) => copied,
            Err(error) => {
                tracing::warn!("Merge of upload {} aborted: {}", identifier, error);
                if let Err(abort_error) = writer.abort().await {
                    tracing::warn!("Failed to abort write of {}: {}", path, abort_error);
                }
                return Err(error);
            }
        };

        writer.commit().await?;

        tracing::info!(
            "Merged upload {} into {} ({} chunks, {} bytes)",
            identifier,
            path,
            total_chunks,
            size_bytes
        );

        let cleanup = self.repository.delete_all_chunks(&identifier).await;
        if !cleanup.is_clean() {
            tracing::warn!(
                "Upload {} merged but {} chunk(s) could not be removed",
                identifier,
                cleanup.failures.len()
            );
        }

        Ok(MergeChunksOperationResult {
            path,
            file_name,
            size_bytes,
            sha256,
            cleanup,
        })
    }

    async fn copy_chunks(
        &self,
        identifier: &str,
        total_chunks: u32,
        writer: &mut Box<dyn BlobWriter>,
    ) -> Result<(u64, String)> {
        let mut hasher = Sha256::new();
        let mut size_bytes = 0u64;

        for index in 0..total_chunks {
            let bytes = self
                .repository
                .get_chunk(identifier, index)
                .await
                .map_err(|source| SliceError::ChunkFetch {
                    index,
                    source: Box::new(source),
                })?;

            size_bytes += bytes.len() as u64;
            hasher.update(&bytes);
            writer.write(bytes).await?;
        }

        Ok((size_bytes, hex::encode(hasher.finalize())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FaultyBlobStore;
    use crate::{BlobStore, ObjectStoreBlobStore};
    use bytes::Bytes;
    use std::sync::Arc;

    fn request(identifier: &str, total_chunks: u32) -> MergeChunksOperationRequest {
        MergeChunksOperationRequest {
            identifier: identifier.to_string(),
            name: "doc".to_string(),
            file_type: "txt".to_string(),
            total_chunks,
        }
    }

    async fn upload(repository: &ChunkRepository, identifier: &str, chunks: &[(u32, &str)]) {
        for (index, data) in chunks {
            repository
                .put_chunk(identifier, *index, Bytes::from(data.to_string()))
                .await
                .unwrap();
        }
    }

    fn memory_repository() -> ChunkRepository {
        ChunkRepository::new(Arc::new(ObjectStoreBlobStore::in_memory()))
    }

    #[tokio::test]
    async fn test_merge_end_to_end() {
        let repository = memory_repository();
        upload(&repository, "abc", &[(0, "foo"), (1, "bar"), (2, "baz")]).await;

        let operation = MergeChunksOperation::new(repository.clone());
        let result = operation.run(request("abc", 3)).await.unwrap();

        assert_eq!(result.path, "files/abc/doc.txt");
        assert_eq!(result.file_name, "doc.txt");
        assert_eq!(result.size_bytes, 9);
        assert_eq!(result.sha256, hex::encode(Sha256::digest(b"foobarbaz")));
        assert!(result.cleanup.is_clean());
        assert_eq!(result.cleanup.deleted, 3);

        let merged = repository.store().get("files/abc/doc.txt").await.unwrap();
        assert_eq!(merged, Bytes::from("foobarbaz"));
        assert!(repository.list_chunks("abc").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_merge_cleans_up_identifiers_with_escaped_characters() {
        let repository = memory_repository();
        let operation = MergeChunksOperation::new(repository.clone());

        for identifier in ["report~v2", "50%off", "a#b[1]"] {
            upload(&repository, identifier, &[(0, "x"), (1, "y")]).await;

            let result = operation.run(request(identifier, 2)).await.unwrap();
            assert!(result.cleanup.is_clean(), "{}", identifier);
            assert_eq!(result.cleanup.deleted, 2, "{}", identifier);
            assert!(
                repository.list_chunks(identifier).await.unwrap().is_empty(),
                "chunks left behind for {}",
                identifier
            );
            assert_eq!(
                repository.store().get(&result.path).await.unwrap(),
                Bytes::from("xy")
            );
        }
    }

    #[tokio::test]
    async fn test_merge_uses_index_order() {
        let repository = memory_repository();
        upload(&repository, "ord", &[(2, "C"), (0, "A"), (1, "B")]).await;

        let operation = MergeChunksOperation::new(repository.clone());
        operation.run(request("ord", 3)).await.unwrap();

        let merged = repository.store().get("files/ord/doc.txt").await.unwrap();
        assert_eq!(merged, Bytes::from("ABC"));
    }

    #[tokio::test]
    async fn test_reupload_before_merge_keeps_latest() {
        let repository = memory_repository();
        upload(&repository, "re", &[(0, "old"), (1, "-tail")]).await;
        upload(&repository, "re", &[(0, "new")]).await;

        let operation = MergeChunksOperation::new(repository.clone());
        operation.run(request("re", 2)).await.unwrap();

        let merged = repository.store().get("files/re/doc.txt").await.unwrap();
        assert_eq!(merged, Bytes::from("new-tail"));
    }

    #[tokio::test]
    async fn test_incomplete_upload_is_rejected() {
        let repository = memory_repository();
        upload(&repository, "inc", &[(0, "a"), (2, "c")]).await;

        let operation = MergeChunksOperation::new(repository.clone());
        let error = operation.run(request("inc", 4)).await.unwrap_err();

        match error {
            SliceError::IncompleteUpload {
                expected,
                found,
                missing,
            } => {
                assert_eq!(expected, 4);
                assert_eq!(found, 2);
                assert_eq!(missing, vec![1, 3]);
            }
            other => panic!("unexpected error: {}", other),
        }

        // Nothing merged, nothing cleaned up.
        assert!(matches!(
            repository.store().get("files/inc/doc.txt").await,
            Err(SliceError::ObjectNotFound(_))
        ));
        assert_eq!(repository.list_chunks("inc").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_gap_is_rejected_even_when_count_matches() {
        let repository = memory_repository();
        upload(&repository, "gap", &[(0, "a"), (2, "c"), (3, "d")]).await;

        let operation = MergeChunksOperation::new(repository.clone());
        let error = operation.run(request("gap", 3)).await.unwrap_err();

        assert!(matches!(
            error,
            SliceError::IncompleteUpload { expected: 3, found: 2, ref missing } if missing == &vec![1]
        ));
    }

    #[tokio::test]
    async fn test_extra_chunks_are_ignored_and_cleaned() {
        let repository = memory_repository();
        upload(&repository, "extra", &[(0, "a"), (1, "b"), (5, "zzz")]).await;

        let operation = MergeChunksOperation::new(repository.clone());
        let result = operation.run(request("extra", 2)).await.unwrap();

        assert_eq!(result.size_bytes, 2);
        assert_eq!(result.cleanup.deleted, 3);
        assert!(repository.list_chunks("extra").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_commits_nothing() {
        let faulty = Arc::new(FaultyBlobStore::new(Arc::new(ObjectStoreBlobStore::in_memory())));
        let repository = ChunkRepository::new(faulty.clone());
        upload(&repository, "nf", &[(0, "a"), (1, "b"), (2, "c")]).await;
        faulty.fail_get("chunks/nf/chunk_1");

        let operation = MergeChunksOperation::new(repository.clone());
        let error = operation.run(request("nf", 3)).await.unwrap_err();

        assert!(matches!(error, SliceError::ChunkFetch { index: 1, .. }));
        assert!(matches!(
            faulty.get("files/nf/doc.txt").await,
            Err(SliceError::ObjectNotFound(_))
        ));
        assert_eq!(repository.list_chunks("nf").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_chunk_vanishing_after_listing() {
        let faulty = Arc::new(FaultyBlobStore::new(Arc::new(ObjectStoreBlobStore::in_memory())));
        let repository = ChunkRepository::new(faulty.clone());
        upload(&repository, "race", &[(0, "a"), (1, "b")]).await;

        // Simulate a concurrent merge deleting the chunk between list and get.
        faulty.fail_get("chunks/race/chunk_0");
        let operation = MergeChunksOperation::new(repository.clone());
        let error = operation.run(request("race", 2)).await.unwrap_err();
        assert!(matches!(error, SliceError::ChunkFetch { index: 0, .. }));
    }

    #[tokio::test]
    async fn test_commit_failure_keeps_chunks() {
        let faulty = Arc::new(FaultyBlobStore::new(Arc::new(ObjectStoreBlobStore::in_memory())));
        let repository = ChunkRepository::new(faulty.clone());
        upload(&repository, "cf", &[(0, "a"), (1, "b")]).await;
        faulty.fail_commit("files/cf/doc.txt");

        let operation = MergeChunksOperation::new(repository.clone());
        let error = operation.run(request("cf", 2)).await.unwrap_err();

        assert!(matches!(error, SliceError::StoreWrite { .. }));
        assert_eq!(repository.list_chunks("cf").await.unwrap().len(), 2);
        assert!(faulty.get("files/cf/doc.txt").await.is_err());
    }

    #[tokio::test]
    async fn test_cleanup_failure_does_not_fail_merge() {
        let faulty = Arc::new(FaultyBlobStore::new(Arc::new(ObjectStoreBlobStore::in_memory())));
        let repository = ChunkRepository::new(faulty.clone());
        upload(&repository, "cl", &[(0, "a"), (1, "b"), (2, "c")]).await;
        faulty.fail_delete("chunks/cl/chunk_2");

        let operation = MergeChunksOperation::new(repository.clone());
        let result = operation.run(request("cl", 3)).await.unwrap();

        assert_eq!(result.cleanup.deleted, 2);
        assert_eq!(result.cleanup.failures.len(), 1);
        assert_eq!(
            faulty.get("files/cl/doc.txt").await.unwrap(),
            Bytes::from("abc")
        );
    }

    #[tokio::test]
    async fn test_remerge_overwrites() {
        let repository = memory_repository();
        let operation = MergeChunksOperation::new(repository.clone());

        upload(&repository, "twice", &[(0, "first")]).await;
        operation.run(request("twice", 1)).await.unwrap();

        upload(&repository, "twice", &[(0, "sec"), (1, "ond")]).await;
        operation.run(request("twice", 2)).await.unwrap();

        let merged = repository.store().get("files/twice/doc.txt").await.unwrap();
        assert_eq!(merged, Bytes::from("second"));
    }

    #[tokio::test]
    async fn test_invalid_requests() {
        let operation = MergeChunksOperation::new(memory_repository());

        let error = operation.run(request("abc", 0)).await.unwrap_err();
        assert!(matches!(error, SliceError::InvalidRequest(_)));

        let mut bad_name = request("abc", 1);
        bad_name.name = "../escape".to_string();
        assert!(matches!(
            operation.run(bad_name).await,
            Err(SliceError::InvalidRequest(_))
        ));

        let error = operation.run(request("", 1)).await.unwrap_err();
        assert!(error.is_client_error());
    }
}
