//! HTTP surface for on-demand watermarking.
//!
//! `POST /api/watermark` with `{"imagePath": "/uploads/x.jpg", "text": "..."}`.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::processor::ImageProcessor;
use crate::sandbox::{SandboxError, SandboxPolicy};

/// Generic message for any processing failure; details stay in the log.
pub const PROCESS_FAILURE_MESSAGE: &str = "Failed to add watermark";

/// Errors that can occur when running the HTTP server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[from] io::Error),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatermarkRequest {
    #[serde(default)]
    pub image_path: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WatermarkResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Shared state for the handlers.
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<dyn ImageProcessor>,
    pub policy: SandboxPolicy,
    pub default_text: Arc<str>,
}

impl AppState {
    pub fn new(processor: Arc<dyn ImageProcessor>, policy: SandboxPolicy, default_text: impl Into<Arc<str>>) -> Self {
        Self {
            processor,
            policy,
            default_text: default_text.into(),
        }
    }
}

/// Rejections returned by the handler.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Forbidden(String),
    Internal,
}

impl From<SandboxError> for ApiError {
    fn from(e: SandboxError) -> Self {
        match e {
            SandboxError::OutsideSandbox => ApiError::Forbidden(e.to_string()),
            _ => ApiError::BadRequest(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, PROCESS_FAILURE_MESSAGE.to_string()),
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

/// Handler for POST /api/watermark
async fn post_watermark(
    State(state): State<AppState>,
    payload: Result<Json<WatermarkRequest>, JsonRejection>,
) -> Result<Json<WatermarkResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::debug!(error = %rejection.body_text(), "rejected request body");
        ApiError::BadRequest("Invalid JSON body".to_string())
    })?;

    let image_path = request.image_path.unwrap_or_default();
    let resolved = state.policy.validate(&image_path)?;

    let text = match request.text {
        Some(text) if text.is_empty() => {
            return Err(ApiError::BadRequest("Watermark text must not be empty".to_string()))
        }
        Some(text) => text,
        None => state.default_text.to_string(),
    };

    let processor = state.processor.clone();
    let job_text = text.clone();
    let result = tokio::task::spawn_blocking(move || processor.process(&resolved, &job_text)).await;

    match result {
        Ok(Ok(_)) => Ok(Json(WatermarkResponse {
            success: true,
            message: format!("Watermark \"{}\" added to {}", text, image_path),
        })),
        Ok(Err(e)) => {
            tracing::error!(image_path = %image_path, error = %e, "watermark request failed");
            Err(ApiError::Internal)
        }
        Err(e) => {
            tracing::error!(image_path = %image_path, error = %e, "watermark task panicked");
            Err(ApiError::Internal)
        }
    }
}

/// Creates the axum Router with the watermark endpoint
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/watermark", post(post_watermark))
        .with_state(state)
}

/// Serve on `bind` until `shutdown` resolves, then drain in-flight requests.
pub async fn run_server<F>(bind: &str, state: AppState, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|source| ServerError::Bind {
            addr: bind.to_string(),
            source,
        })?;

    tracing::info!(addr = %bind, "listening");
    serve(listener, state, shutdown).await
}

/// Serve on an already bound listener.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
