//! HTTP server.
//!
//! Exposes the question-answering pipeline via a JSON HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/ask` | Answer a question (JSON, or SSE when `stream: true`) |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Request
//!
//! ```json
//! {
//!   "query": "what is the Q1 revenue?",
//!   "userId": "u-123",
//!   "conversationId": "c-456",
//!   "scope": ["doc-1", "doc-2"],
//!   "answerLength": "medium",
//!   "stream": false
//! }
//! ```
//!
//! `scope` accepts a single document ID string or an array of IDs.
//!
//! # Streaming
//!
//! With `stream: true` the response is an SSE stream of typed events —
//! `connected`, `content`, `heartbeat`, then exactly one `done` or
//! `error` — each carrying a monotonic `seq`.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400) and `upstream_error` (502).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support
//! browser-based clients.

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::error::DocentError;
use crate::models::{AnswerLength, Query, QueryScope};
use crate::pipeline::Pipeline;
use crate::stream::StreamSession;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
}

/// Starts the HTTP server on the configured bind address.
///
/// Runs until the process is terminated.
pub async fn run_server(pipeline: Arc<Pipeline>) -> anyhow::Result<()> {
    let bind_addr = pipeline.config().server.bind.clone();
    let state = AppState { pipeline };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/ask", post(handle_ask))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    info!("docent server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Request / response shapes ============

/// `scope` accepts a bare document ID or an array of IDs.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScopeParam {
    One(String),
    Many(Vec<String>),
}

impl From<ScopeParam> for QueryScope {
    fn from(param: ScopeParam) -> Self {
        match param {
            ScopeParam::One(id) => QueryScope::Document(id),
            ScopeParam::Many(mut ids) if ids.len() == 1 => match ids.pop() {
                Some(id) => QueryScope::Document(id),
                None => QueryScope::All,
            },
            ScopeParam::Many(ids) => QueryScope::Documents(ids),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AskRequest {
    query: String,
    user_id: String,
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    scope: Option<ScopeParam>,
    #[serde(default)]
    answer_length: Option<AnswerLength>,
    #[serde(default)]
    stream: bool,
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

/// Inner error detail with a machine-readable code and human-readable
/// message.
#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an HTTP response.
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

/// Constructs a 400 Bad Request error.
fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

/// Constructs a 502 error for upstream adapter failures. The body
/// carries the user-facing message, never the upstream detail.
fn upstream_error(err: &DocentError) -> AppError {
    AppError {
        status: StatusCode::BAD_GATEWAY,
        code: "upstream_error".to_string(),
        message: err.user_message(),
    }
}

// ============ Handlers ============

async fn handle_ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Response, AppError> {
    if request.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    if request.user_id.trim().is_empty() {
        return Err(bad_request("userId must not be empty"));
    }

    let mut query = Query::new(request.query, request.user_id);
    query.conversation_id = request.conversation_id.unwrap_or_default();
    query.scope = request.scope.map(QueryScope::from).unwrap_or_default();
    query.answer_length = request.answer_length.unwrap_or_default();

    if request.stream {
        return Ok(stream_response(state.pipeline, query).into_response());
    }

    match state.pipeline.answer(&query, &[]).await {
        Ok(result) => Ok(Json(result).into_response()),
        Err(err) => Err(upstream_error(&err)),
    }
}

/// Run the pipeline into a stream session and forward its events as SSE.
///
/// Dropping the response (client disconnect) drops the receiver, which
/// deactivates the session on its next write — the heartbeat stops and
/// no further events are produced.
fn stream_response(
    pipeline: Arc<Pipeline>,
    query: Query,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (session, mut rx) = StreamSession::new();

    tokio::spawn(async move {
        pipeline.answer_stream(&query, &[], session).await;
    });

    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            let done = event.is_terminal();
            let payload = serde_json::to_string(&event).unwrap_or_default();
            yield Ok(Event::default().event(event.event_name()).data(payload));
            if done {
                break;
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
