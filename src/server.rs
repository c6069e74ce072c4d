//! HTTP server.
//!
//! Exposes ingest and ask over a small JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health`, `/healthz` | Health check (version, whether an index is loaded) |
//! | `POST` | `/ingest` | Multipart upload; file field `csv` |
//! | `POST` | `/ask` | `{ "question": "..." }` → answer + cited rows |
//! | `GET`  | `/index` | Metadata of the live index |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "CSV is empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `index_not_built` (422),
//! `embedding_failed` (502), `internal` (500).
//!
//! Completion failures are not errors here: `/ask` still returns 200 with
//! `degraded: true` and a diagnostic answer.

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::models::IndexMetadata;
use crate::pipeline::{AskResponse, IngestReport, Rag, RagError};

const UPLOAD_LIMIT_BYTES: usize = 32 * 1024 * 1024;

/// Build the router around a shared pipeline.
pub fn router(rag: Arc<Rag>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/healthz", get(handle_health))
        .route("/ingest", post(handle_ingest))
        .route("/ask", post(handle_ask))
        .route("/index", get(handle_index))
        .layer(DefaultBodyLimit::max(UPLOAD_LIMIT_BYTES))
        .layer(cors)
        .with_state(rag)
}

/// Restore any persisted index, then serve on `[server].bind` until terminated.
pub async fn run_server(rag: Arc<Rag>) -> anyhow::Result<()> {
    rag.restore().await;
    let bind_addr = rag.config().server.bind.clone();
    let app = router(rag);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "listening");
    println!("csvrag listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
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

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let (status, code) = match &err {
            RagError::EmptyTable | RagError::Csv(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            RagError::NoIndex => (StatusCode::UNPROCESSABLE_ENTITY, "index_not_built"),
            RagError::Embedding(_) => (StatusCode::BAD_GATEWAY, "embedding_failed"),
            RagError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status.is_server_error() {
            tracing::error!(code, error = %err, "request failed");
        }
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    version: String,
    indexed: bool,
}

async fn handle_health(State(rag): State<Arc<Rag>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        indexed: rag.has_index().await,
    })
}

// ============ POST /ingest ============

/// Accepts a multipart form whose `csv` field carries the upload.
async fn handle_ingest(
    State(rag): State<Arc<Rag>>,
    mut multipart: Multipart,
) -> Result<Json<IngestReport>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        if field.name() != Some("csv") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        if !filename.to_lowercase().ends_with(".csv") {
            return Err(bad_request("Upload a CSV"));
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("failed to read upload: {}", e)))?;
        let report = rag.ingest_csv(&bytes, &filename).await?;
        return Ok(Json(report));
    }

    Err(bad_request("missing multipart field: csv"))
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    question: String,
}

/// Body rejections (missing `question`, malformed JSON, wrong content type)
/// are reported through the JSON error contract.
async fn handle_ask(
    State(rag): State<Arc<Rag>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, AppError> {
    let Json(req) = payload.map_err(|e| bad_request(e.body_text()))?;
    Ok(Json(rag.ask(&req.question).await?))
}

// ============ GET /index ============

async fn handle_index(State(rag): State<Arc<Rag>>) -> Result<Json<IndexMetadata>, AppError> {
    rag.metadata().await.map(Json).ok_or_else(|| AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: "no index loaded".to_string(),
    })
}
