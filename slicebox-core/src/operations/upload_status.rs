use crate::storage::validate_identifier;
use crate::{ChunkRepository, Result};
use serde::Serialize;

#[derive(Clone)]
pub struct UploadStatusOperation {
    repository: ChunkRepository,
}

#[derive(Debug, Clone)]
pub struct UploadStatusOperationRequest {
    pub identifier: String,
    pub total_chunks: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadStatusOperationResult {
    pub identifier: String,
    pub uploaded_chunks: Vec<u32>,
    pub total_uploaded: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_chunks: Option<Vec<u32>>,
}

impl UploadStatusOperation {
    pub fn new(repository: ChunkRepository) -> Self {
        Self { repository }
    }

    pub async fn run(
        &self,
        request: UploadStatusOperationRequest,
    ) -> Result<UploadStatusOperationResult> {
        let UploadStatusOperationRequest {
            identifier,
            total_chunks,
        } = request;

        validate_identifier(&identifier)?;

        let present = self.repository.list_chunks(&identifier).await?;
        let total_uploaded = present.len();

        // A declared total of zero carries no information.
        let (progress, missing_chunks) = match total_chunks.filter(|total| *total > 0) {
            Some(total) => {
                let progress = round2(total_uploaded as f64 / total as f64 * 100.0);
                let missing: Vec<u32> = (0..total).filter(|index| !present.contains(index)).collect();
                (Some(progress), Some(missing))
            }
            None => (None, None),
        };

        Ok(UploadStatusOperationResult {
            identifier,
            uploaded_chunks: present.into_iter().collect(),
            total_uploaded,
            progress,
            missing_chunks,
        })
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
