//! Slicebox Core - resumable chunked uploads on top of object storage
//!
//! Clients upload numbered chunks for an upload identifier, then ask for a
//! merge. All upload state lives in the object store itself:
//! - chunks at `chunks/<identifier>/chunk_<index>`
//! - merged files at `files/<identifier>/<name>.<file_type>`

pub mod error;
pub mod operations;
pub mod storage;
#[cfg(test)]
pub(crate) mod testutil;

pub use error::{Result, SliceError};
pub use operations::{
    DownloadLinkOperation, DownloadLinkOperationRequest, DownloadLinkOperationResult,
    MergeChunksOperation, MergeChunksOperationRequest, MergeChunksOperationResult,
    PutChunkOperation, PutChunkOperationRequest, PutChunkOperationResult, UploadStatusOperation,
    UploadStatusOperationRequest, UploadStatusOperationResult,
};
pub use storage::{
    BlobStore, BlobStoreBuilder, BlobWriter, ChunkRepository, CleanupFailure, CleanupReport,
    DEFAULT_LINK_TTL, LinkIssuer, ObjectStoreBlobStore, chunk_path, chunk_prefix,
    merged_file_name, merged_file_path, parse_chunk_index, validate_download_path,
    validate_identifier,
};
