use super::{BlobStore, LinkIssuer, ObjectStoreBlobStore};
use crate::{Result, SliceError};
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct BlobStoreBuilder {
    backend: Option<String>,
    bucket: Option<String>,
    region: Option<String>,
    endpoint: Option<String>,
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
    allow_http: bool,
    root: Option<PathBuf>,
    public_base_url: Option<String>,
}

impl BlobStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn access_key_id(mut self, access_key_id: impl Into<String>) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self
    }

    pub fn secret_access_key(mut self, secret_access_key: impl Into<String>) -> Self {
        self.secret_access_key = Some(secret_access_key.into());
        self
    }

    pub fn allow_http(mut self, allow_http: bool) -> Self {
        self.allow_http = allow_http;
        self
    }

    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn public_base_url(mut self, url: impl Into<String>) -> Self {
        self.public_base_url = Some(url.into());
        self
    }

    fn resolve_backend(&self) -> Result<String> {
        let backend = self
            .backend
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if backend.is_empty() {
            return Err(SliceError::Config(
                "store backend cannot be empty".to_string(),
            ));
        }

        Ok(backend)
    }

    fn public_base_url_or(&self, fallback: String) -> String {
        non_empty(self.public_base_url.as_deref())
            .map(str::to_string)
            .unwrap_or(fallback)
    }

    pub fn build(&self) -> Result<Arc<dyn BlobStore>> {
        let backend = self.resolve_backend()?;

        match backend.as_str() {
            "s3" => {
                let bucket = non_empty(self.bucket.as_deref()).ok_or_else(|| {
                    SliceError::Config("bucket is required for s3 backend".to_string())
                })?;

                let mut builder = AmazonS3Builder::new()
                    .with_bucket_name(bucket)
                    .with_allow_http(self.allow_http);

                if let Some(region) = non_empty(self.region.as_deref()) {
                    builder = builder.with_region(region);
                }
                if let Some(endpoint) = non_empty(self.endpoint.as_deref()) {
                    builder = builder.with_endpoint(endpoint);
                }
                if let Some(key) = non_empty(self.access_key_id.as_deref()) {
                    builder = builder.with_access_key_id(key);
                }
                if let Some(secret) = non_empty(self.secret_access_key.as_deref()) {
                    builder = builder.with_secret_access_key(secret);
                }

                let s3 = Arc::new(
                    builder
                        .build()
                        .map_err(|error| SliceError::Config(format!("s3 backend: {}", error)))?,
                );

                tracing::info!("Using s3 store backend, bucket={}", bucket);
                Ok(Arc::new(ObjectStoreBlobStore::new(
                    s3.clone(),
                    LinkIssuer::Presigned(s3),
                )))
            }
            "local" => {
                let root = self.root.clone().ok_or_else(|| {
                    SliceError::Config("root is required for local backend".to_string())
                })?;

                std::fs::create_dir_all(&root).map_err(|error| {
                    SliceError::Config(format!(
                        "failed to create local store root {:?}: {}",
                        root, error
                    ))
                })?;

                let local = LocalFileSystem::new_with_prefix(&root)
                    .map_err(|error| SliceError::Config(format!("local backend: {}", error)))?;
                let base_url = self.public_base_url_or(format!("file://{}", root.display()));

                tracing::info!("Using local store backend, root={:?}", root);
                Ok(Arc::new(ObjectStoreBlobStore::new(
                    Arc::new(local),
                    LinkIssuer::Plain { base_url },
                )))
            }
            "memory" => {
                let base_url = self.public_base_url_or("memory://slicebox".to_string());

                tracing::warn!("Using in-memory store backend; uploads are lost on restart");
                Ok(Arc::new(ObjectStoreBlobStore::new(
                    Arc::new(InMemory::new()),
                    LinkIssuer::Plain { base_url },
                )))
            }
            other => Err(SliceError::Config(format!(
                "unsupported store backend: {}",
                other
            ))),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
