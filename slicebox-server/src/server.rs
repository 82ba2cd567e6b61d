use crate::config::Config;
use anyhow::Context;
use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use slicebox_core::{
    BlobStore, ChunkRepository, CleanupFailure, DownloadLinkOperation,
    DownloadLinkOperationRequest, MergeChunksOperation, MergeChunksOperationRequest,
    PutChunkOperation, PutChunkOperationRequest, SliceError, UploadStatusOperation,
    UploadStatusOperationRequest,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Room for multipart boundaries and the small text fields around a chunk.
const MULTIPART_ALLOWANCE: usize = 64 * 1024;

pub struct ServerState {
    pub max_chunk_bytes: usize,
    pub put_chunk: PutChunkOperation,
    pub merge_chunks: MergeChunksOperation,
    pub upload_status: UploadStatusOperation,
    pub download_link: DownloadLinkOperation,
}

impl ServerState {
    pub fn new(store: Arc<dyn BlobStore>, link_ttl: Duration, max_chunk_bytes: usize) -> Self {
        let repository = ChunkRepository::new(store.clone());

        Self {
            max_chunk_bytes,
            put_chunk: PutChunkOperation::new(repository.clone()),
            merge_chunks: MergeChunksOperation::new(repository.clone()),
            upload_status: UploadStatusOperation::new(repository),
            download_link: DownloadLinkOperation::with_default_ttl(store, link_ttl),
        }
    }
}

/// Success envelope: `{"code": 1, ...fields}`.
#[derive(Debug, Serialize)]
struct ApiResponse<T> {
    code: u8,
    #[serde(flatten)]
    data: T,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Response {
        (StatusCode::OK, Json(ApiResponse { code: 1, data })).into_response()
    }
}

/// Failure envelope: `{"code": 0, "message": ...}`.
#[derive(Debug, Serialize)]
struct ApiError {
    code: u8,
    message: String,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    incomplete: Option<IncompleteDetail>,
}

#[derive(Debug, Serialize)]
struct IncompleteDetail {
    expected: u32,
    found: u32,
    missing_chunks: Vec<u32>,
}

#[derive(Debug, Serialize)]
struct ChunkUploadResponse {
    chunk: String,
    message: &'static str,
}

#[derive(Debug, Deserialize)]
struct MergeFileBody {
    name: String,
    file_type: String,
    identifier: String,
    total_chunks: u32,
}

#[derive(Debug, Serialize)]
struct MergeFileResponse {
    file_path: String,
    download_url: String,
    file_name: String,
    size_bytes: u64,
    sha256: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    cleanup_failures: Vec<CleanupFailure>,
}

#[derive(Debug, Deserialize)]
struct UploadStatusQuery {
    #[serde(default)]
    total_chunks: Option<u32>,
}

#[derive(Debug, Serialize)]
struct DownloadResponse {
    download_url: String,
}

pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let store = config
        .blob_store_builder()
        .build()
        .context("failed to build object store")?;

    let state = Arc::new(ServerState::new(
        store,
        config.link_ttl(),
        config.server.max_chunk_bytes,
    ));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind_addr))?;
    tracing::info!("Server listening on {}", config.server.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

pub fn build_router(state: Arc<ServerState>) -> Router {
    let body_limit = state.max_chunk_bytes.saturating_add(MULTIPART_ALLOWANCE);

    Router::new()
        .route("/health", get(health_handler))
        .route("/file-slice", post(upload_chunk).put(merge_file))
        .route("/file-slice/*file_path", get(download_file))
        .route("/upload-status/:identifier", get(upload_status))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}

fn error_response(context: &str, error: SliceError) -> Response {
    let status = if error.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        tracing::error!("{}: {}", context, error);
        StatusCode::INTERNAL_SERVER_ERROR
    };

    let message = format!("{}: {}", context, error);
    let incomplete = match error {
        SliceError::IncompleteUpload {
            expected,
            found,
            missing,
        } => Some(IncompleteDetail {
            expected,
            found,
            missing_chunks: missing,
        }),
        _ => None,
    };

    let body = ApiError {
        code: 0,
        message,
        incomplete,
    };
    (status, Json(body)).into_response()
}

fn bad_request(status: StatusCode, message: String) -> Response {
    let body = ApiError {
        code: 0,
        message,
        incomplete: None,
    };
    (status, Json(body)).into_response()
}

async fn health_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({ "code": 1, "status": "ok" })),
    )
}

struct ChunkForm {
    identifier: String,
    number: u32,
    file: Bytes,
}

async fn read_chunk_form(multipart: &mut Multipart) -> Result<ChunkForm, (StatusCode, String)> {
    let mut identifier = None;
    let mut number = None;
    let mut file = None;

    let malformed = |error: axum::extract::multipart::MultipartError| {
        (error.status(), format!("malformed multipart body: {}", error.body_text()))
    };

    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "identifier" => identifier = Some(field.text().await.map_err(malformed)?),
            "number" => {
                let text = field.text().await.map_err(malformed)?;
                let parsed = text.trim().parse::<u32>().map_err(|_| {
                    (
                        StatusCode::BAD_REQUEST,
                        format!("invalid chunk number: {:?}", text),
                    )
                })?;
                number = Some(parsed);
            }
            "file" => file = Some(field.bytes().await.map_err(malformed)?),
            _ => {}
        }
    }

    let missing = |field: &str| (StatusCode::BAD_REQUEST, format!("missing form field: {}", field));

    Ok(ChunkForm {
        identifier: identifier.ok_or_else(|| missing("identifier"))?,
        number: number.ok_or_else(|| missing("number"))?,
        file: file.ok_or_else(|| missing("file"))?,
    })
}

async fn upload_chunk(State(state): State<Arc<ServerState>>, mut multipart: Multipart) -> Response {
    let form = match read_chunk_form(&mut multipart).await {
        Ok(form) => form,
        Err((status, message)) => return bad_request(status, message),
    };

    if form.file.len() > state.max_chunk_bytes {
        return bad_request(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!(
                "chunk of {} bytes exceeds the limit of {} bytes",
                form.file.len(),
                state.max_chunk_bytes
            ),
        );
    }

    let request = PutChunkOperationRequest {
        identifier: form.identifier,
        index: form.number,
        body: form.file,
    };

    match state.put_chunk.run(request).await {
        Ok(result) => ApiResponse::ok(ChunkUploadResponse {
            chunk: result.chunk,
            message: "chunk uploaded",
        }),
        Err(error) => error_response("chunk upload failed", error),
    }
}

async fn merge_file(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<MergeFileBody>, JsonRejection>,
) -> Response {
    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => return bad_request(StatusCode::BAD_REQUEST, rejection.body_text()),
    };

    tracing::info!(
        "Merge requested: identifier={} name={} file_type={} total_chunks={}",
        body.identifier,
        body.name,
        body.file_type,
        body.total_chunks
    );

    let merged = match state
        .merge_chunks
        .run(MergeChunksOperationRequest {
            identifier: body.identifier,
            name: body.name,
            file_type: body.file_type,
            total_chunks: body.total_chunks,
        })
        .await
    {
        Ok(merged) => merged,
        Err(error) => return error_response("file merge failed", error),
    };

    let link = match state
        .download_link
        .run(DownloadLinkOperationRequest {
            path: merged.path.clone(),
            ttl: None,
        })
        .await
    {
        Ok(link) => link,
        Err(error) => return error_response("file merged but link signing failed", error),
    };

    ApiResponse::ok(MergeFileResponse {
        file_path: merged.path,
        download_url: link.download_url,
        file_name: merged.file_name,
        size_bytes: merged.size_bytes,
        sha256: merged.sha256,
        cleanup_failures: merged.cleanup.failures,
    })
}

async fn upload_status(
    State(state): State<Arc<ServerState>>,
    Path(identifier): Path<String>,
    query: Result<Query<UploadStatusQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => return bad_request(StatusCode::BAD_REQUEST, rejection.body_text()),
    };

    match state
        .upload_status
        .run(UploadStatusOperationRequest {
            identifier,
            total_chunks: query.total_chunks,
        })
        .await
    {
        Ok(result) => ApiResponse::ok(result),
        Err(error) => error_response("failed to get upload status", error),
    }
}

async fn download_file(
    State(state): State<Arc<ServerState>>,
    Path(file_path): Path<String>,
) -> Response {
    match state
        .download_link
        .run(DownloadLinkOperationRequest {
            path: file_path,
            ttl: None,
        })
        .await
    {
        Ok(link) => ApiResponse::ok(DownloadResponse {
            download_url: link.download_url,
        }),
        Err(error) => error_response("failed to get download link", error),
    }
}
