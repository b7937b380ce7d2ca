use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::error::AppError;
use crate::routes::api::AppState;
use crate::scheduler::SchedulerStatus;

pub async fn status(State(state): State<AppState>) -> Result<Json<SchedulerStatus>, AppError> {
    Ok(Json(state.scheduler.status().await?))
}

#[derive(Debug, Serialize)]
pub struct LifecycleResponse {
    pub status: &'static str,
}

pub async fn start(State(state): State<AppState>) -> Result<Json<LifecycleResponse>, AppError> {
    state.scheduler.start().await?;
    Ok(Json(LifecycleResponse { status: "started" }))
}

pub async fn stop(State(state): State<AppState>) -> Json<LifecycleResponse> {
    state.scheduler.stop().await;
    Json(LifecycleResponse { status: "stopped" })
}

pub async fn restart(State(state): State<AppState>) -> Result<Json<LifecycleResponse>, AppError> {
    state.scheduler.restart().await?;
    Ok(Json(LifecycleResponse { status: "restarted" }))
}
