use crate::storage::validate_identifier;
use crate::{ChunkRepository, Result};
use bytes::Bytes;

#[derive(Clone)]
pub struct PutChunkOperation {
    repository: ChunkRepository,
}

#[derive(Debug, Clone)]
pub struct PutChunkOperationRequest {
    pub identifier: String,
    pub index: u32,
    pub body: Bytes,
}

#[derive(Debug, Clone)]
pub struct PutChunkOperationResult {
    /// `<identifier>_<index>`, echoed back to the client.
    pub chunk: String,
    pub size_bytes: u64,
}

impl PutChunkOperation {
    pub fn new(repository: ChunkRepository) -> Self {
        Self { repository }
    }

    pub async fn run(&self, request: PutChunkOperationRequest) -> Result<PutChunkOperationResult> {
        let PutChunkOperationRequest {
            identifier,
            index,
            body,
        } = request;

        validate_identifier(&identifier)?;

        let size_bytes = body.len() as u64;
        self.repository.put_chunk(&identifier, index, body).await?;

        Ok(PutChunkOperationResult {
            chunk: format!("{}_{}", identifier, index),
            size_bytes,
        })
    }
}
