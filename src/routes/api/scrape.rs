use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::scrape_session::ScrapeSession;
use crate::models::scraping_log::ScrapingLog;
use crate::routes::api::AppState;

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub status: &'static str,
}

/// POST /api/v1/scrape
///
/// Kick off a batch scrape of all active companies. Returns immediately;
/// progress is visible through the session endpoints. 409 when a run is
/// already in progress.
pub async fn trigger(State(state): State<AppState>) -> Result<Json<TriggerResponse>, AppError> {
    state.scheduler.trigger_manual_refresh().await?;
    Ok(Json(TriggerResponse { status: "started" }))
}

#[derive(Debug, Deserialize)]
pub struct SessionListQuery {
    pub limit: Option<i64>,
}

pub async fn sessions(
    State(state): State<AppState>,
    Query(query): Query<SessionListQuery>,
) -> Result<Json<Vec<ScrapeSession>>, AppError> {
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let sessions = ScrapeSession::recent(&state.pool, limit).await?;
    Ok(Json(sessions))
}

#[derive(Debug, Serialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: ScrapeSession,
    pub logs: Vec<ScrapingLog>,
}

pub async fn session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionDetail>, AppError> {
    let session = ScrapeSession::get(&state.pool, id).await?;
    let logs = ScrapingLog::for_session(&state.pool, id).await?;
    Ok(Json(SessionDetail { session, logs }))
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub stopped: bool,
}

/// POST /api/v1/scrape/sessions/{id}/stop
///
/// Request an in-progress session to stop. In-flight companies finish;
/// the batch abandons the rest at its next checkpoint.
pub async fn stop(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<StopResponse>, AppError> {
    // 404 for unknown ids, false for sessions already terminal.
    ScrapeSession::get(&state.pool, id).await?;
    let stopped = ScrapeSession::stop(&state.pool, id).await?;
    Ok(Json(StopResponse { stopped }))
}

pub async fn platforms(State(state): State<AppState>) -> Json<Vec<&'static str>> {
    Json(state.orchestrator.registry().supported())
}
