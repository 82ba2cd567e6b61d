use serde::{Deserialize, Serialize};
use slicebox_core::{BlobStoreBuilder, DEFAULT_LINK_TTL, Result, SliceError};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub links: LinksConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Upper bound for the bytes of one chunk. The request body may exceed it
    /// by the multipart framing.
    #[serde(default = "default_max_chunk_bytes")]
    pub max_chunk_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_chunk_bytes: default_max_chunk_bytes(),
        }
    }
}

fn default_bind_addr() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_max_chunk_bytes() -> usize {
    64 * 1024 * 1024
}

/// Object store backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub allow_http: bool,
    /// Root directory for the local backend.
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Base of download links for backends that cannot presign.
    #[serde(default)]
    pub public_base_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    S3,
    Local,
    Memory,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S3 => "s3",
            Self::Local => "local",
            Self::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinksConfig {
    #[serde(default = "default_link_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for LinksConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_link_ttl_secs(),
        }
    }
}

fn default_link_ttl_secs() -> u64 {
    DEFAULT_LINK_TTL.as_secs()
}

impl Config {
    /// Load from an optional config file, then `SLICEBOX_*` environment variables
    /// (`SLICEBOX_STORE__BUCKET=uploads` sets `store.bucket`).
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(path).required(false))
            .add_source(
                ::config::Environment::with_prefix("SLICEBOX")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| SliceError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| SliceError::Config(e.to_string()))?;

        Ok(config)
    }

    pub fn blob_store_builder(&self) -> BlobStoreBuilder {
        let store = &self.store;
        let mut builder = BlobStoreBuilder::new()
            .backend(store.backend.as_str())
            .allow_http(store.allow_http);

        if let Some(bucket) = &store.bucket {
            builder = builder.bucket(bucket.as_str());
        }
        if let Some(region) = &store.region {
            builder = builder.region(region.as_str());
        }
        if let Some(endpoint) = &store.endpoint {
            builder = builder.endpoint(endpoint.as_str());
        }
        if let Some(key) = &store.access_key_id {
            builder = builder.access_key_id(key.as_str());
        }
        if let Some(secret) = &store.secret_access_key {
            builder = builder.secret_access_key(secret.as_str());
        }
        if let Some(root) = &store.root {
            builder = builder.root(root.clone());
        }
        if let Some(url) = &store.public_base_url {
            builder = builder.public_base_url(url.as_str());
        }

        builder
    }

    pub fn link_ttl(&self) -> Duration {
        Duration::from_secs(self.links.ttl_secs)
    }
}
