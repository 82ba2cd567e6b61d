use crate::storage::validate_download_path;
use crate::{BlobStore, DEFAULT_LINK_TTL, Result};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct DownloadLinkOperation {
    store: Arc<dyn BlobStore>,
    default_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct DownloadLinkOperationRequest {
    pub path: String,
    pub ttl: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct DownloadLinkOperationResult {
    pub path: String,
    pub download_url: String,
    pub expires_in: Duration,
}

impl DownloadLinkOperation {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self::with_default_ttl(store, DEFAULT_LINK_TTL)
    }

    pub fn with_default_ttl(store: Arc<dyn BlobStore>, default_ttl: Duration) -> Self {
        Self { store, default_ttl }
    }

    pub async fn run(
        &self,
        request: DownloadLinkOperationRequest,
    ) -> Result<DownloadLinkOperationResult> {
        let DownloadLinkOperationRequest { path, ttl } = request;

        validate_download_path(&path)?;

        let expires_in = ttl.unwrap_or(self.default_ttl);
        let download_url = self.store.sign(&path, expires_in).await?;

        tracing::debug!("Issued download link for {} (ttl {:?})", path, expires_in);
        Ok(DownloadLinkOperationResult {
            path,
            download_url,
            expires_in,
        })
    }
}
