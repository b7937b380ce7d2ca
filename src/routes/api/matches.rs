use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::matcher::{self, MatchOptions};
use crate::models::match_log::MatchLog;
use crate::models::match_session::MatchSession;
use crate::routes::api::AppState;

#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    pub job_ids: Vec<i32>,
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub status: &'static str,
    pub jobs: usize,
}

/// POST /api/v1/matches
///
/// Score the given jobs in the background. The created match session is
/// the handle for watching progress.
pub async fn trigger(
    State(state): State<AppState>,
    Json(input): Json<TriggerRequest>,
) -> Result<Json<TriggerResponse>, AppError> {
    if input.job_ids.is_empty() {
        return Err(AppError::BadRequest("No job ids provided".to_string()));
    }

    let jobs = input.job_ids.len();
    let pool = state.pool.clone();
    let http = state.orchestrator.http().clone();
    let api_key = state.orchestrator.ai_api_key().map(String::from);
    tokio::spawn(async move {
        let result = matcher::match_with_tracking(
            &pool,
            &http,
            api_key.as_deref(),
            &input.job_ids,
            MatchOptions {
                trigger_source: "manual".to_string(),
                company_id: None,
                on_progress: None,
            },
        )
        .await;
        if let Err(e) = result {
            tracing::error!("Manual match run failed: {e}");
        }
    });

    Ok(Json(TriggerResponse {
        status: "started",
        jobs,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SessionListQuery {
    pub limit: Option<i64>,
}

pub async fn sessions(
    State(state): State<AppState>,
    Query(query): Query<SessionListQuery>,
) -> Result<Json<Vec<MatchSession>>, AppError> {
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let sessions = MatchSession::recent(&state.pool, limit).await?;
    Ok(Json(sessions))
}

#[derive(Debug, Serialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: MatchSession,
    pub logs: Vec<MatchLog>,
}

pub async fn session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionDetail>, AppError> {
    let session = MatchSession::get(&state.pool, id).await?;
    let logs = MatchLog::for_session(&state.pool, id).await?;
    Ok(Json(SessionDetail { session, logs }))
}
