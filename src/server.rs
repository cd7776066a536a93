//! HTTP front end.
//!
//! # Endpoints
//!
//! | Method | Path | Body | Response |
//! |--------|------|------|----------|
//! | `POST` | `/upload` | multipart, one or more `files` parts | `{"status", "num_chunks"}` |
//! | `POST` | `/ask` | `question` form field (urlencoded or multipart) | `{"answer", "context"}` |
//! | `GET`  | `/health` | | `{"status": "ok", "version"}` |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "no_index", "message": "no index available at ..." } }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `bad_request` | 400 |
//! | `no_index` | 404 |
//! | `extraction_failed` | 422 |
//! | `index_load_failed` | 500 |
//! | `internal` | 500 |
//! | `embedding_failed` | 502 |
//! | `generation_failed` | 502 |
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser front end on
//! another port can call the API.

use axum::{
    extract::{
        multipart::MultipartError, DefaultBodyLimit, FromRequest, Multipart, Request, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::Error;
use crate::models::{AskResponse, IngestReport, UploadedFile};
use crate::service::QaService;

/// Shared state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    service: Arc<QaService>,
}

/// Start the server with the backends named in `config`.
///
/// Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let service = QaService::from_config(config.clone())?;
    run_server_with(Arc::new(service)).await
}

/// Start the server around an existing service, e.g. one built with custom
/// [`Embedder`](crate::embedding::Embedder) or
/// [`ChatModel`](crate::generate::ChatModel) implementations.
pub async fn run_server_with(service: Arc<QaService>) -> anyhow::Result<()> {
    let bind_addr = service.config().server.bind.clone();
    let app = router(service);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("docqa listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the application router.
pub fn router(service: Arc<QaService>) -> Router {
    let max_upload_bytes = service.config().server.max_upload_bytes;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/upload", post(handle_upload))
        .route("/ask", post(handle_ask))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { service })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"no_index"`).
    code: &'static str,
    message: String,
}

/// Error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = self.code, "{}", self.message);
        } else {
            tracing::warn!(code = self.code, "{}", self.message);
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
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

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let (status, code) = match &err {
            Error::Validation(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Error::NoIndex(_) => (StatusCode::NOT_FOUND, "no_index"),
            Error::Extraction { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "extraction_failed"),
            Error::Embedding(_) => (StatusCode::BAD_GATEWAY, "embedding_failed"),
            Error::Generation(_) => (StatusCode::BAD_GATEWAY, "generation_failed"),
            Error::IndexLoad(_) => (StatusCode::INTERNAL_SERVER_ERROR, "index_load_failed"),
            Error::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError {
            status: err.status(),
            code: "bad_request",
            message: err.body_text(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ POST /upload ============

/// Collects every `files` part (or the single-file `file` part) in order and
/// ingests them together. Other parts are ignored.
async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<IngestReport>, AppError> {
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        if !matches!(name.as_deref(), Some("files") | Some("file")) {
            tracing::debug!(field = ?name, "ignoring multipart field");
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let bytes = field.bytes().await?;
        files.push(UploadedFile::new(file_name, bytes.to_vec()));
    }

    if files.is_empty() {
        return Err(bad_request("multipart body must contain at least one `files` part"));
    }

    let report = state.service.ingest(files).await?;
    Ok(Json(report))
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskForm {
    question: Option<String>,
}

/// The `question` field of an `/ask` body, sent either urlencoded or as
/// `multipart/form-data`. `None` when the field is absent.
struct AskQuestion(Option<String>);

impl<S> FromRequest<S> for AskQuestion
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("multipart/form-data"))
            .unwrap_or(false);

        if !is_multipart {
            let Form(form) = Form::<AskForm>::from_request(req, state)
                .await
                .map_err(|e| bad_request(e.body_text()))?;
            return Ok(AskQuestion(form.question));
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| bad_request(e.body_text()))?;
        while let Some(field) = multipart.next_field().await? {
            if field.name() == Some("question") {
                return Ok(AskQuestion(Some(field.text().await?)));
            }
        }
        Ok(AskQuestion(None))
    }
}

async fn handle_ask(
    State(state): State<AppState>,
    AskQuestion(question): AskQuestion,
) -> Result<Json<AskResponse>, AppError> {
    let question = question.ok_or_else(|| bad_request("missing form field: question"))?;

    let response = state.service.ask(&question).await?;
    Ok(Json(response))
}
