use thiserror::Error;

#[derive(Debug, Error)]
pub enum SliceError {
    #[error("store write failed: path={path} error={message}")]
    StoreWrite { path: String, message: String },

    #[error("store list failed: prefix={prefix} error={message}")]
    StoreList { prefix: String, message: String },

    #[error("store read failed: path={path} error={message}")]
    StoreRead { path: String, message: String },

    #[error("store delete failed: path={path} error={message}")]
    StoreDelete { path: String, message: String },

    #[error("url signing failed: path={path} error={message}")]
    StoreSign { path: String, message: String },

    #[error("object not found: {0}")]
    ObjectNotFound(String),

    #[error("chunk not found: identifier={identifier} index={index}")]
    ChunkNotFound { identifier: String, index: u32 },

    #[error(
        "missing chunks: expected {expected}, found {found}, missing {}",
        missing.len()
    )]
    IncompleteUpload {
        expected: u32,
        found: u32,
        missing: Vec<u32>,
    },

    #[error("failed to fetch chunk {index}: {source}")]
    ChunkFetch {
        index: u32,
        #[source]
        source: Box<SliceError>,
    },

    #[error("invalid file path: {0}")]
    InvalidPath(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("config error: {0}")]
    Config(String),
}

impl SliceError {
    /// Errors the caller can fix by changing the request.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SliceError::IncompleteUpload { .. }
                | SliceError::InvalidPath(_)
                | SliceError::InvalidRequest(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SliceError>;
