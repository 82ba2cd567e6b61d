pub mod download_link;
pub mod merge_chunks;
pub mod put_chunk;
pub mod upload_status;

pub use download_link::{
    DownloadLinkOperation, DownloadLinkOperationRequest, DownloadLinkOperationResult,
};
pub use merge_chunks::{
    MergeChunksOperation, MergeChunksOperationRequest, MergeChunksOperationResult,
};
pub use put_chunk::{PutChunkOperation, PutChunkOperationRequest, PutChunkOperationResult};
pub use upload_status::{
    UploadStatusOperation, UploadStatusOperationRequest, UploadStatusOperationResult,
};
