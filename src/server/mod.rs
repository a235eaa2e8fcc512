// HTTP front end: answers questions posted as JSON


use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::RagError;
use crate::retrieval::QueryEngine;

/// Shared state for the request handlers
#[derive(Debug, Clone)]
pub struct AppState {
    pub engine: QueryEngine,
    /// Context budget for answers served over HTTP
    pub max_context_chars: usize,
}

#[derive(Debug, Deserialize)]
pub struct QuestionRequest {
    pub question: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub answer: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("{message}")]
    PermissionDenied { message: String, help: &'static str },
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<RagError> for ApiError {
    #[inline]
    fn from(error: RagError) -> Self {
        match error {
            RagError::InvalidArgument(message) => Self::BadRequest(message),
            RagError::Provider(provider) => match provider.remediation() {
                Some(help) => Self::PermissionDenied {
                    message: provider.to_string(),
                    help,
                },
                None => Self::Upstream(provider.to_string()),
            },
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    #[inline]
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, json!({ "error": message })),
            Self::PermissionDenied { message, help } => (
                StatusCode::FORBIDDEN,
                json!({ "error": message, "help": help }),
            ),
            Self::Upstream(message) => (StatusCode::BAD_GATEWAY, json!({ "error": message })),
            Self::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": message }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

/// Routes for the question endpoint and health check, with `static_dir`
/// served at `/` when given
#[inline]
pub fn router(state: AppState, static_dir: Option<&Path>) -> Router {
    let router = Router::new()
        .route("/health", get(health))
        .route("/submit-question", post(submit_question))
        .with_state(Arc::new(state));

    let router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router.layer(TraceLayer::new_for_http())
}

/// Bind `addr` and serve until Ctrl-C
#[inline]
pub async fn serve(addr: &str, app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("Invalid bind address {}", addr))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn submit_question(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QuestionRequest>,
) -> Result<Json<AnswerResponse>, ApiError> {
    let question = request.question.trim();
    if question.is_empty() {
        return Err(ApiError::BadRequest("question must not be empty".to_string()));
    }

    let answer = state
        .engine
        .answer(question, state.max_context_chars, |_| {})
        .await
        .map_err(|e| {
            warn!("Failed to answer question: {}", e);
            ApiError::from(e)
        })?;

    Ok(Json(AnswerResponse { answer }))
}
