use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::http::HttpError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Scrape(#[from] ScrapeError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure modes of a single company scrape. Carried into the
/// scraping_logs row; never propagated past the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("Unsupported platform for {url}: known platforms are {supported}")]
    UnsupportedPlatform { url: String, supported: String },

    #[error("Could not determine board token from {0}")]
    MissingBoardToken(String),

    #[error("Browser session bootstrap failed for {0}")]
    SessionBootstrap(String),

    #[error("Unexpected response shape: {0}")]
    Parse(String),
}

impl ScrapeError {
    /// Whether retrying the whole scrape later could plausibly succeed.
    /// Bootstrap and parse failures are terminal for this attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ScrapeError::Http(e) => e.is_retryable(),
            ScrapeError::UnsupportedPlatform { .. }
            | ScrapeError::MissingBoardToken(_)
            | ScrapeError::SessionBootstrap(_)
            | ScrapeError::Parse(_) => false,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Database(e) => {
                if let sqlx::Error::Database(db_err) = e
                    && db_err.is_unique_violation()
                {
                    return (
                        StatusCode::CONFLICT,
                        axum::Json(json!({ "error": "Resource already exists" })),
                    )
                        .into_response();
                }
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Scrape(e) => (StatusCode::BAD_GATEWAY, e.to_string()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = axum::Json(json!({ "error": message }));
        (status, body).into_response()
    }
}
