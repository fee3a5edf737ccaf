//! # HTTP Server Implementation
//!
//! REST API for Ridgeline. CPU-bound work (search, rebuild) runs on the
//! blocking pool; a panic there is reported as a search failure instead of
//! tearing down the connection.

use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use ridgeline_core::metrics::MetricsSnapshot;
use ridgeline_core::{BuildStats, Error, FeatureVector, IndexStats, SearchResult};

use crate::engine::SearchEngine;

// ========== API Types ==========

/// Exactly one of `vector` or `image` (base64)
#[derive(Debug, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub vector: Option<Vec<f64>>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub total_results: usize,
}

/// Body of `/extract` and `/preprocess`: one base64 image
#[derive(Debug, Serialize, Deserialize)]
pub struct ImageRequest {
    pub image: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExtractResponse {
    pub vector: FeatureVector,
    pub dimension: usize,
}

/// The image the extractor would see, pixels base64-encoded
#[derive(Debug, Serialize, Deserialize)]
pub struct PreprocessResponse {
    pub width: u32,
    pub height: u32,
    pub pixels: String,
    pub original_bytes: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EncodedImage {
    pub filename: String,
    pub content_type: String,
    pub image: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImageBatchRequest {
    pub filenames: Vec<String>,
}

/// One requested file; `image` is set only when `found`
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchImage {
    pub filename: String,
    pub found: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImageBatchResponse {
    pub total: usize,
    pub images: Vec<BatchImage>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub indexed: bool,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub index: IndexStats,
    pub index_type: &'static str,
    pub normalization: &'static str,
    pub similarity: String,
    pub metrics: MetricsSnapshot,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(err: Error) -> ApiError {
    let status = match &err {
        Error::NotIndexed => StatusCode::CONFLICT,
        Error::Extraction { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        e if e.is_client_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!(code = err.error_code(), "Request failed: {}", err);
    }
    (
        status,
        Json(ErrorBody {
            error: err.to_string(),
            code: err.error_code().to_string(),
        }),
    )
}

fn decode_image(encoded: &str) -> Result<Vec<u8>, ApiError> {
    BASE64.decode(encoded.trim()).map_err(|e| {
        api_error(Error::MalformedQuery {
            message: format!("image is not valid base64: {}", e),
        })
    })
}

// ========== Server State ==========

pub struct AppState {
    pub engine: Arc<SearchEngine>,
    pub images_dir: Option<PathBuf>,
}

impl AppState {
    pub fn new(engine: SearchEngine) -> Self {
        let images_dir = engine.config().dataset.images_dir.clone();
        Self {
            engine: Arc::new(engine),
            images_dir,
        }
    }
}

// ========== Routes ==========

pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state.engine.config().api.max_request_size;
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/search", post(search))
        .route("/extract", post(extract))
        .route("/preprocess", post(preprocess))
        .route("/rebuild", post(rebuild))
        .route("/images/:filename", get(image))
        .route("/image-base64/:filename", get(image_base64))
        .route("/images-batch", post(images_batch))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        indexed: state.engine.is_indexed(),
        version: ridgeline_core::VERSION.to_string(),
    })
}

async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        index: state.engine.stats(),
        index_type: "flat-l2",
        normalization: "min-max [0, 1]",
        similarity: format!("exp(-d / {})", state.engine.config().search.similarity_scale),
        metrics: state.engine.metrics().snapshot(),
    })
}

async fn search(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let top_k = req
        .top_k
        .unwrap_or(state.engine.config().search.default_top_k);

    let (vector, image_bytes) = match (req.vector, req.image) {
        (Some(vector), None) => (vector, None),
        (None, Some(encoded)) => {
            let bytes = decode_image(&encoded)?;
            let vector = state.engine.extract_features(&bytes).await.map_err(api_error)?;
            (vector, Some(bytes.len()))
        }
        _ => {
            return Err(api_error(Error::MalformedQuery {
                message: "request needs exactly one of 'vector' or 'image'".to_string(),
            }))
        }
    };

    let engine = state.engine.clone();
    let results = tokio::task::spawn_blocking(move || match image_bytes {
        Some(bytes) => engine.search_extracted(&vector, top_k, bytes),
        None => engine.search_by_vector(&vector, top_k),
    })
    .await
    .map_err(|e| {
        state.engine.metrics().record_search_error();
        api_error(Error::Search {
            message: format!("search task failed: {}", e),
        })
    })?
    .map_err(api_error)?;

    Ok(Json(SearchResponse {
        total_results: results.len(),
        results,
    }))
}

async fn extract(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ImageRequest>,
) -> Result<Json<ExtractResponse>, ApiError> {
    let bytes = decode_image(&req.image)?;
    let vector = state.engine.extract_features(&bytes).await.map_err(api_error)?;
    Ok(Json(ExtractResponse {
        dimension: vector.len(),
        vector,
    }))
}

async fn preprocess(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ImageRequest>,
) -> Result<Json<PreprocessResponse>, ApiError> {
    let bytes = decode_image(&req.image)?;
    let image = state.engine.preprocess_image(&bytes).await.map_err(api_error)?;
    Ok(Json(PreprocessResponse {
        width: image.width,
        height: image.height,
        pixels: BASE64.encode(&image.pixels),
        original_bytes: bytes.len(),
    }))
}

async fn rebuild(State(state): State<Arc<AppState>>) -> Result<Json<BuildStats>, ApiError> {
    let engine = state.engine.clone();
    let stats = tokio::task::spawn_blocking(move || engine.rebuild())
        .await
        .map_err(|e| {
            api_error(Error::Search {
                message: format!("rebuild task failed: {}", e),
            })
        })?
        .map_err(api_error)?;
    Ok(Json(stats))
}

async fn read_image(
    state: &AppState,
    filename: &str,
) -> Result<(&'static str, Vec<u8>), (StatusCode, String)> {
    let dir = state
        .images_dir
        .as_ref()
        .ok_or((StatusCode::NOT_FOUND, "image serving is not configured".to_string()))?;
    if !is_plain_file_name(filename) {
        return Err((StatusCode::BAD_REQUEST, "invalid image name".to_string()));
    }

    let path = dir.join(filename);
    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        debug!("Image {:?} not served: {}", path, e);
        (StatusCode::NOT_FOUND, format!("image {} not found", filename))
    })?;
    Ok((content_type(&path), bytes))
}

async fn image(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let (content_type, bytes) = read_image(&state, &filename).await?;
    Ok(([(header::CONTENT_TYPE, content_type)], bytes))
}

async fn image_base64(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<Json<EncodedImage>, (StatusCode, String)> {
    let (content_type, bytes) = read_image(&state, &filename).await?;
    Ok(Json(EncodedImage {
        filename,
        content_type: content_type.to_string(),
        image: BASE64.encode(bytes),
    }))
}

/// Missing or unsafe names come back with `found: false`
async fn images_batch(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ImageBatchRequest>,
) -> Result<Json<ImageBatchResponse>, ApiError> {
    if req.filenames.is_empty() {
        return Err(api_error(Error::MalformedQuery {
            message: "no filenames given".to_string(),
        }));
    }

    let mut images = Vec::with_capacity(req.filenames.len());
    for filename in req.filenames {
        let image = read_image(&state, &filename)
            .await
            .ok()
            .map(|(_, bytes)| BASE64.encode(bytes));
        images.push(BatchImage {
            filename,
            found: image.is_some(),
            image,
        });
    }

    Ok(Json(ImageBatchResponse {
        total: images.len(),
        images,
    }))
}

/// A single path component, no traversal, no hidden files
fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0'])
}

fn content_type(path: &FsPath) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("bmp") => "image/bmp",
        Some("tif") | Some("tiff") => "image/tiff",
        _ => "application/octet-stream",
    }
}
