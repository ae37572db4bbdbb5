//! HTTP server for submitting audits and polling their progress.
//!
//! `uxaudit serve` starts the [`WorkerPool`] and this axum app side by side.
//! Submitted audits are stored as pending and handed to the pool.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/audits` | Create an audit for a local video and enqueue it |
//! | `GET`  | `/audits/{id}/progress` | Status, stage, and percentage |
//! | `GET`  | `/audits/{id}` | Audit with report and screenshot metadata |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "audit not found: ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use uxaudit_core::error::AuditError;
use uxaudit_core::models::{Audit, AuditStatus, NewAudit, ProcessingStage, Report};
use uxaudit_core::progress::{compute_progress, AuditProgress};
use uxaudit_core::store::AuditStore;

use crate::audit_cmd::build_services;
use crate::config::Config;
use crate::jobs::{JobQueue, WorkerPool};
use crate::progress::NoProgress;

/// Shared state for route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AuditStore>,
    pub queue: JobQueue,
}

/// Start the worker pool and serve until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let services = build_services(config, Arc::new(NoProgress)).await?;
    let pool = WorkerPool::start(services.orchestrator.clone(), &config.jobs);

    let state = AppState {
        store: services.store.clone(),
        queue: pool.queue(),
    };

    let bind_addr = config.server.bind.clone();
    info!(bind = %bind_addr, "uxaudit server listening");
    println!("uxaudit server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, router(state)).await?;

    pool.shutdown().await;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/audits", post(handle_create_audit))
        .route("/audits/{id}", get(handle_get_audit))
        .route("/audits/{id}/progress", get(handle_progress))
        .layer(cors)
        .with_state(state)
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
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<AuditError> for AppError {
    fn from(err: AuditError) -> Self {
        error!(error = %err, "request failed");
        internal("internal error")
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

async fn load_audit(store: &dyn AuditStore, id: &str) -> Result<Audit, AppError> {
    store
        .get_audit(id)
        .await?
        .ok_or_else(|| not_found(format!("audit not found: {}", id)))
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

// ============ POST /audits ============

#[derive(Deserialize)]
struct CreateAuditRequest {
    video_path: PathBuf,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Serialize)]
struct CreateAuditResponse {
    id: String,
    status: AuditStatus,
    stage: ProcessingStage,
}

async fn handle_create_audit(
    State(state): State<AppState>,
    Json(req): Json<CreateAuditRequest>,
) -> Result<(StatusCode, Json<CreateAuditResponse>), AppError> {
    if !req.video_path.is_file() {
        return Err(bad_request(format!(
            "video not found: {}",
            req.video_path.display()
        )));
    }

    let audit = state
        .store
        .create_audit(&NewAudit {
            user_id: req.user_id,
            title: req.title,
            description: req.description,
            video_path: req.video_path,
        })
        .await?;

    state
        .queue
        .enqueue(audit.id.clone())
        .await
        .map_err(|e| internal(e.to_string()))?;
    info!(audit_id = %audit.id, "audit enqueued");

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateAuditResponse {
            id: audit.id,
            status: audit.status,
            stage: audit.stage,
        }),
    ))
}

// ============ GET /audits/{id}/progress ============

async fn handle_progress(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AuditProgress>, AppError> {
    let audit = load_audit(state.store.as_ref(), &id).await?;
    let partials = state.store.list_partials(&id).await?;
    Ok(Json(compute_progress(&audit, &partials)))
}

// ============ GET /audits/{id} ============

#[derive(Serialize)]
struct ScreenshotView {
    issue_index: usize,
    frame_number: u32,
    frame_sequence: usize,
    is_primary: bool,
}

#[derive(Serialize)]
struct AuditView {
    id: String,
    title: Option<String>,
    description: Option<String>,
    status: AuditStatus,
    stage: ProcessingStage,
    score: Option<f64>,
    error: Option<String>,
    report: Option<Report>,
    screenshots: Vec<ScreenshotView>,
    created_at: i64,
    updated_at: i64,
}

async fn handle_get_audit(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AuditView>, AppError> {
    let audit = load_audit(state.store.as_ref(), &id).await?;
    let screenshots = state
        .store
        .list_screenshots(&id)
        .await?
        .into_iter()
        .map(|s| ScreenshotView {
            issue_index: s.issue_index,
            frame_number: s.frame_number,
            frame_sequence: s.frame_sequence,
            is_primary: s.is_primary,
        })
        .collect();

    Ok(Json(AuditView {
        id: audit.id,
        title: audit.title,
        description: audit.description,
        status: audit.status,
        stage: audit.stage,
        score: audit.score,
        error: audit.error_message,
        report: audit.report,
        screenshots,
        created_at: audit.created_at,
        updated_at: audit.updated_at,
    }))
}
