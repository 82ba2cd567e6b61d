//! Storage modules for Slicebox
//!
//! Provides the object store adapter, the path layout, and the chunk repository.

pub mod blob_store;
pub mod chunk_repository;
pub mod factory;
pub mod layout;

pub use blob_store::{BlobStore, BlobWriter, DEFAULT_LINK_TTL, LinkIssuer, ObjectStoreBlobStore};
pub use chunk_repository::{ChunkRepository, CleanupFailure, CleanupReport};
pub use factory::BlobStoreBuilder;
pub use layout::{
    chunk_path, chunk_prefix, merged_file_name, merged_file_path, parse_chunk_index,
    validate_download_path, validate_identifier,
};
