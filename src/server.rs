//! HTTP server.
//!
//! Exposes the regeneration queue, run statistics and ad-hoc detection as
//! a JSON API for the FAQ pipeline and dashboards.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/queue?limit=N` | Regeneration queue, highest priority first |
//! | `GET`  | `/queue?all=true` | The whole regeneration queue |
//! | `GET`  | `/runs` | Statistics for every recorded run |
//! | `GET`  | `/runs/{id}` | Statistics for one run |
//! | `GET`  | `/content/{id}/baseline` | Current baseline entry (or `null`) |
//! | `GET`  | `/content/{id}/history` | Full change log for one content id |
//! | `POST` | `/detect` | Ad-hoc detection for a registered content id |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "invalid_checksum_format", "message": "content 7: ..." } }
//! ```
//!
//! Rejected input is `400`, unknown content or runs `404`. Version and
//! run-id conflicts and detections on inactive content are `409`. Storage
//! failures are `500`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use content_sentinel_core::error::EngineError;
use content_sentinel_core::models::{ChangeLogEntry, ContentMetadata};
use content_sentinel_core::queue::{QueueLimit, QueueSnapshot};
use content_sentinel_core::stats::RunStats;

use crate::config::Config;
use crate::engine::{DetectInput, Engine};

#[derive(Clone)]
struct AppState {
    engine: Arc<Engine>,
}

/// Starts the HTTP server on `[server].bind`. Runs until the process ends.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let engine = Arc::new(Engine::open(config).await?);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(bind = %bind_addr, "HTTP server listening");
    axum::serve(listener, router(engine)).await?;

    Ok(())
}

/// All routes over a shared engine.
pub fn router(engine: Arc<Engine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/queue", get(handle_queue))
        .route("/runs", get(handle_runs))
        .route("/runs/{id}", get(handle_run))
        .route("/content/{id}/baseline", get(handle_baseline))
        .route("/content/{id}/history", get(handle_history))
        .route("/detect", post(handle_detect))
        .layer(cors)
        .with_state(AppState { engine })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        let status = match &err {
            EngineError::InvalidChecksumFormat { .. }
            | EngineError::MissingModificationTimestamp { .. } => StatusCode::BAD_REQUEST,
            EngineError::UnknownContent { .. } | EngineError::UnknownRun { .. } => {
                StatusCode::NOT_FOUND
            }
            EngineError::RunIdCollision { .. }
            | EngineError::VersionConflict { .. }
            | EngineError::InactiveContent { .. }
            | EngineError::DuplicateLocation { .. }
            | EngineError::BaselineContention { .. } => StatusCode::CONFLICT,
            EngineError::FaqStoreUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /queue ============

#[derive(Deserialize)]
struct QueueParams {
    limit: Option<usize>,
    #[serde(default)]
    all: bool,
}

async fn handle_queue(
    State(state): State<AppState>,
    Query(params): Query<QueueParams>,
) -> Result<Json<QueueSnapshot>, AppError> {
    let limit = match (params.limit, params.all) {
        (Some(_), true) => return Err(bad_request("limit and all are exclusive")),
        (Some(0), false) => return Err(bad_request("limit must be >= 1")),
        (Some(n), false) => QueueLimit::At(n),
        (None, true) => QueueLimit::All,
        (None, false) => QueueLimit::Default,
    };
    Ok(Json(state.engine.queue(limit).await?))
}

// ============ GET /runs, /runs/{id} ============

#[derive(Serialize)]
struct RunsResponse {
    runs: Vec<RunStats>,
}

async fn handle_runs(State(state): State<AppState>) -> Result<Json<RunsResponse>, AppError> {
    let runs = state.engine.runs().list_runs().await?;
    Ok(Json(RunsResponse { runs }))
}

async fn handle_run(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RunStats>, AppError> {
    Ok(Json(state.engine.runs().run_stats(&id).await?))
}

// ============ GET /content/{id}/... ============

#[derive(Serialize)]
struct BaselineResponse {
    content_id: i64,
    baseline: Option<ChangeLogEntry>,
}

async fn handle_baseline(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<BaselineResponse>, AppError> {
    state.engine.location(id).await?;
    let baseline = state.engine.baseline(id).await?;
    Ok(Json(BaselineResponse {
        content_id: id,
        baseline,
    }))
}

#[derive(Serialize)]
struct HistoryResponse {
    content_id: i64,
    entries: Vec<ChangeLogEntry>,
}

async fn handle_history(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<HistoryResponse>, AppError> {
    state.engine.location(id).await?;
    let entries = state.engine.history(id).await?;
    Ok(Json(HistoryResponse {
        content_id: id,
        entries,
    }))
}

// ============ POST /detect ============

#[derive(Deserialize)]
struct DetectBody {
    content_id: i64,
    checksum: String,
    #[serde(default)]
    source_modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    metadata: Option<ContentMetadata>,
}

async fn handle_detect(
    State(state): State<AppState>,
    Json(body): Json<DetectBody>,
) -> Result<Json<ChangeLogEntry>, AppError> {
    let entry = state
        .engine
        .detect_ad_hoc(DetectInput {
            content_id: body.content_id,
            checksum: body.checksum,
            source_modified_at: body.source_modified_at,
            metadata: body.metadata,
        })
        .await?;
    Ok(Json(entry))
}
