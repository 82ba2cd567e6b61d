use crate::{Result, SliceError};
use async_trait::async_trait;
use bytes::Bytes;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::signer::Signer;
use object_store::{ObjectStore, WriteMultipart};
use percent_encoding::percent_decode_str;
use reqwest::Method;
use std::sync::Arc;
use std::time::Duration;

/// Default lifetime of a download link.
pub const DEFAULT_LINK_TTL: Duration = Duration::from_secs(3600);

/// Parts allowed in flight while streaming a multipart write.
const MAX_INFLIGHT_PARTS: usize = 4;

/// The object store as seen by the upload core.
///
/// Every call is atomic on its own; nothing is coordinated across calls.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `body` at `path`, replacing any previous object.
    async fn put(&self, path: &str, body: Bytes) -> Result<()>;

    /// Fetch the object at `path`. A missing object is `SliceError::ObjectNotFound`.
    async fn get(&self, path: &str) -> Result<Bytes>;

    /// Keys of the objects directly under `prefix` (non-recursive).
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    async fn delete(&self, path: &str) -> Result<()>;

    /// Time-limited GET link for `path`.
    async fn sign(&self, path: &str, ttl: Duration) -> Result<String>;

    /// Start a streaming write. Nothing is visible at `path` until `commit`.
    async fn open_writer(&self, path: &str) -> Result<Box<dyn BlobWriter>>;
}

#[async_trait]
pub trait BlobWriter: Send {
    async fn write(&mut self, data: Bytes) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn abort(self: Box<Self>) -> Result<()>;
}

/// How download links are produced for a backend.
#[derive(Debug, Clone)]
pub enum LinkIssuer {
    /// Presigned GET urls from the backend itself (S3 and compatibles).
    Presigned(Arc<dyn Signer>),
    /// `<base_url>/<path>?expires=<unix>` for backends without request signing.
    Plain { base_url: String },
}

impl LinkIssuer {
    async fn issue(&self, location: &ObjectPath, ttl: Duration) -> Result<String> {
        match self {
            Self::Presigned(signer) => signer
                .signed_url(Method::GET, location, ttl)
                .await
                .map(|url| url.to_string())
                .map_err(|error| SliceError::StoreSign {
                    path: location.to_string(),
                    message: error.to_string(),
                }),
            Self::Plain { base_url } => {
                let expires_at = chrono::Utc::now().timestamp() + ttl.as_secs() as i64;
                Ok(format!(
                    "{}/{}?expires={}",
                    base_url.trim_end_matches('/'),
                    location,
                    expires_at
                ))
            }
        }
    }
}

/// Turn a listed location back into the key it was written under.
///
/// `ObjectPath::from` percent-encodes characters such as `~` or `%` in each
/// segment, so the display form of a listed location must not be fed back
/// into `ObjectPath::from`.
fn decode_location(location: &ObjectPath) -> String {
    location
        .parts()
        .map(|part| percent_decode_str(part.as_ref()).decode_utf8_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// `BlobStore` over any `object_store` backend.
#[derive(Debug, Clone)]
pub struct ObjectStoreBlobStore {
    store: Arc<dyn ObjectStore>,
    links: LinkIssuer,
}

impl ObjectStoreBlobStore {
    pub fn new(store: Arc<dyn ObjectStore>, links: LinkIssuer) -> Self {
        Self { store, links }
    }

    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemory::new()),
            LinkIssuer::Plain {
                base_url: "memory://slicebox".to_string(),
            },
        )
    }
}

#[async_trait]
impl BlobStore for ObjectStoreBlobStore {
    async fn put(&self, path: &str, body: Bytes) -> Result<()> {
        self.store
            .put(&ObjectPath::from(path), body.into())
            .await
            .map_err(|error| SliceError::StoreWrite {
                path: path.to_string(),
                message: error.to_string(),
            })?;

        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Bytes> {
        let read_error = |error: object_store::Error| SliceError::StoreRead {
            path: path.to_string(),
            message: error.to_string(),
        };

        match self.store.get(&ObjectPath::from(path)).await {
            Ok(result) => result.bytes().await.map_err(read_error),
            Err(object_store::Error::NotFound { .. }) => {
                Err(SliceError::ObjectNotFound(path.to_string()))
            }
            Err(error) => Err(read_error(error)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let listing = self
            .store
            .list_with_delimiter(Some(&ObjectPath::from(prefix)))
            .await
            .map_err(|error| SliceError::StoreList {
                prefix: prefix.to_string(),
                message: error.to_string(),
            })?;

        Ok(listing
            .objects
            .into_iter()
            .map(|meta| decode_location(&meta.location))
            .collect())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.store
            .delete(&ObjectPath::from(path))
            .await
            .map_err(|error| SliceError::StoreDelete {
                path: path.to_string(),
                message: error.to_string(),
            })
    }

    async fn sign(&self, path: &str, ttl: Duration) -> Result<String> {
        self.links.issue(&ObjectPath::from(path), ttl).await
    }

    async fn open_writer(&self, path: &str) -> Result<Box<dyn BlobWriter>> {
        let upload = self
            .store
            .put_multipart(&ObjectPath::from(path))
            .await
            .map_err(|error| SliceError::StoreWrite {
                path: path.to_string(),
                message: error.to_string(),
            })?;

        Ok(Box::new(MultipartBlobWriter {
            path: path.to_string(),
            inner: WriteMultipart::new(upload),
        }))
    }
}

struct MultipartBlobWriter {
    path: String,
    inner: WriteMultipart,
}

impl MultipartBlobWriter {
    fn write_error(path: &str, error: object_store::Error) -> SliceError {
        SliceError::StoreWrite {
            path: path.to_string(),
            message: error.to_string(),
        }
    }
}

#[async_trait]
impl BlobWriter for MultipartBlobWriter {
    async fn write(&mut self, data: Bytes) -> Result<()> {
        self.inner
            .wait_for_capacity(MAX_INFLIGHT_PARTS)
            .await
            .map_err(|error| Self::write_error(&self.path, error))?;
        self.inner.write(&data);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let Self { path, inner } = *self;
        inner
            .finish()
            .await
            .map_err(|error| Self::write_error(&path, error))?;
        Ok(())
    }

    async fn abort(self: Box<Self>) -> Result<()> {
        let Self { path, inner } = *self;
        inner
            .abort()
            .await
            .map_err(|error| Self::write_error(&path, error))
    }
}
