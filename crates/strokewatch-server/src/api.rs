//! HTTP API: predictions, community board, health checks and metrics

use axum::{
    extract::{
        multipart::MultipartError,
        rejection::{JsonRejection, PathRejection},
        DefaultBodyLimit, Multipart, Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use strokewatch_lib::{
    artifacts::{ArtifactManager, ArtifactStore},
    community::CommunityStore,
    error::{error_chain, ArtifactError, GatewayError, StoreError},
    gateway::{InferenceGateway, IMAGE_BACKEND, TABULAR_BACKEND},
    health::{ComponentStatus, HealthRegistry},
    models::{Category, PredictionRequest, PredictionResult, TabularInput, UploadedArtifact},
    observability::{ServiceMetrics, StructuredLogger},
};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{error, info};

/// Multipart field carrying the uploaded image
pub const UPLOAD_FIELD: &str = "userPhoto";

/// Lifetime settings applied to every upload
#[derive(Debug, Clone, Copy)]
pub struct UploadPolicy {
    pub delete_delay: Duration,
    pub ttl_secs: u64,
    pub max_bytes: usize,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: ServiceMetrics,
    pub logger: StructuredLogger,
    pub gateway: Arc<InferenceGateway>,
    pub artifacts: Arc<ArtifactManager>,
    pub artifact_store: ArtifactStore,
    pub community: Arc<CommunityStore>,
    pub upload_policy: UploadPolicy,
}

/// Errors surfaced by handlers, rendered as `{"error": "..."}`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Multipart(#[from] MultipartError),

    #[error(transparent)]
    Json(#[from] JsonRejection),

    #[error(transparent)]
    Path(#[from] PathRejection),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ApiError::Gateway(GatewayError::Validation(msg)) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Gateway(e @ GatewayError::BackendUnavailable { .. }) => {
                (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
            }
            ApiError::Gateway(GatewayError::Inference(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Prediction failed".to_string())
            }
            ApiError::Store(StoreError::NotFound { .. }) => {
                (StatusCode::NOT_FOUND, "Post not found".to_string())
            }
            ApiError::Store(StoreError::Validation(msg)) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Store(StoreError::Persistence(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to access community posts".to_string(),
            ),
            ApiError::Artifact(ArtifactError::Storage(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to store upload".to_string(),
            ),
            ApiError::Artifact(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Multipart(e) => (e.status(), e.body_text()),
            // Well-formed JSON with missing or out-of-range fields is still a bad request
            ApiError::Json(JsonRejection::JsonDataError(e)) => (StatusCode::BAD_REQUEST, e.body_text()),
            ApiError::Json(e) => (e.status(), e.body_text()),
            ApiError::Path(e) => (e.status(), e.body_text()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %format!("{:#}", anyhow::Error::new(self)), "Request failed");
        }
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

fn parse_category(raw: &str) -> Result<Category, ApiError> {
    raw.parse::<Category>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// Run a gateway prediction off the async workers and record its outcome
async fn run_prediction(
    state: &AppState,
    backend: &'static str,
    request: PredictionRequest,
) -> Result<PredictionResult, ApiError> {
    let gateway = Arc::clone(&state.gateway);
    let start = Instant::now();
    let result = tokio::task::spawn_blocking(move || gateway.predict(&request))
        .await
        .map_err(|e| ApiError::Internal(format!("prediction task failed: {}", e)))?;
    let elapsed = start.elapsed();

    match result {
        Ok(prediction) => {
            state.metrics.observe_prediction(backend, elapsed.as_secs_f64());
            state.logger.log_prediction(
                backend,
                prediction.risk_percentage,
                prediction.label.as_deref(),
                elapsed.as_millis(),
            );
            Ok(prediction)
        }
        Err(e) => {
            let kind = match &e {
                GatewayError::Validation(_) => "validation",
                GatewayError::BackendUnavailable { .. } => "unavailable",
                GatewayError::Inference(_) => "inference",
            };
            state.metrics.inc_prediction_errors(backend, kind);
            state.logger.log_prediction_failed(backend, &error_chain(&e));
            Err(e.into())
        }
    }
}

async fn predict_tabular(
    State(state): State<Arc<AppState>>,
    input: Result<Json<TabularInput>, JsonRejection>,
) -> Result<Json<PredictionResult>, ApiError> {
    let Json(input) = input?;
    let result = run_prediction(&state, TABULAR_BACKEND, PredictionRequest::Tabular(input)).await?;
    Ok(Json(result))
}

async fn predict_image(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<PredictionResult>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        upload = Some((filename, bytes));
        break;
    }

    let (filename, bytes) =
        upload.ok_or_else(|| ApiError::BadRequest(format!("Missing file field {:?}", UPLOAD_FIELD)))?;
    if filename.is_empty() {
        return Err(ApiError::BadRequest("No file selected".to_string()));
    }

    // Reject bad names before anything is written
    state.artifact_store.validate(&filename)?;

    let store = state.artifact_store.clone();
    let size = bytes.len();
    let original = filename.clone();
    let path: PathBuf = tokio::task::spawn_blocking(move || store.save(&original, &bytes))
        .await
        .map_err(|e| ApiError::Internal(format!("upload task failed: {}", e)))??;

    state.metrics.inc_artifacts_stored();
    state.logger.log_artifact_stored(&path, &filename, size);
    state.artifacts.register(UploadedArtifact::new(
        path.clone(),
        filename,
        state.upload_policy.ttl_secs,
    ));

    // Armed on every exit, including a client that disconnects mid-inference
    let _pending = state
        .artifacts
        .delete_on_drop(path.clone(), state.upload_policy.delete_delay);

    let result = run_prediction(
        &state,
        IMAGE_BACKEND,
        PredictionRequest::Image { artifact_path: path },
    )
    .await?;

    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    category: Option<String>,
}

async fn list_posts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let category = query.category.as_deref().map(parse_category).transpose()?;
    let posts = state.community.list(category).await?;
    Ok(Json(posts))
}

#[derive(Debug, Deserialize)]
struct NewPost {
    title: String,
    #[serde(default)]
    content: String,
    category: String,
}

async fn create_post(
    State(state): State<Arc<AppState>>,
    new_post: Result<Json<NewPost>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(new_post) = new_post?;
    let category = parse_category(&new_post.category)?;
    let post = state
        .community
        .create(&new_post.title, &new_post.content, category)
        .await?;
    Ok((StatusCode::CREATED, Json(post)))
}

async fn get_post(
    State(state): State<Arc<AppState>>,
    post_path: Result<Path<(String, u64)>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path((category, id)) = post_path?;
    let category = parse_category(&category)?;
    Ok(Json(state.community.get_by_id(category, id).await?))
}

async fn delete_post(
    State(state): State<Arc<AppState>>,
    post_path: Result<Path<(String, u64)>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path((category, id)) = post_path?;
    let category = parse_category(&category)?;
    state.community.delete(category, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
struct LikesResponse {
    likes: u64,
}

async fn like_post(
    State(state): State<Arc<AppState>>,
    post_path: Result<Path<(String, u64)>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path((category, id)) = post_path?;
    let category = parse_category(&category)?;
    let likes = state.community.like(category, id).await?;
    state.metrics.inc_post_likes();
    Ok(Json(LikesResponse { likes }))
}

#[derive(Serialize)]
struct CategorySummary {
    id: Category,
    label: &'static str,
    posts: usize,
}

async fn list_categories(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let counts = state.community.counts().await?;
    let summaries: Vec<CategorySummary> = counts
        .into_iter()
        .map(|(id, posts)| CategorySummary {
            id,
            label: id.label(),
            posts,
        })
        .collect();
    Ok(Json(summaries))
}

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint; gauges are refreshed from the components first
async fn metrics(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    state.metrics.set_artifact_stats(&state.artifacts.stats());
    if let Ok(counts) = state.community.counts().await {
        state.metrics.set_post_counts(&counts);
    }

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| ApiError::Internal(format!("failed to encode metrics: {}", e)))?;

    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    ))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state.upload_policy.max_bytes;

    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/predict/tabular", post(predict_tabular))
        .route("/api/v1/predict/image", post(predict_image))
        .route("/api/v1/posts", get(list_posts).post(create_post))
        .route("/api/v1/posts/:category/:id", get(get_post).delete(delete_post))
        .route("/api/v1/posts/:category/:id/like", post(like_post))
        .route("/api/v1/categories", get(list_categories))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Serve the API until a shutdown signal is received
pub async fn serve(
    addr: String,
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = create_router(state);

    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    Ok(())
}
