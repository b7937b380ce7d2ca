use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::error::AppError;
use crate::models::job::{Job, JobListFilters};
use crate::routes::api::AppState;

pub async fn list(
    State(state): State<AppState>,
    Query(filters): Query<JobListFilters>,
) -> Result<Json<Vec<Job>>, AppError> {
    let jobs = Job::list(&state.pool, &filters).await?;
    Ok(Json(jobs))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Job>, AppError> {
    let job = Job::get(&state.pool, id).await?;
    Ok(Json(job))
}

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub status: String,
}

pub async fn set_status(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(input): Json<SetStatusRequest>,
) -> Result<Json<Job>, AppError> {
    let job = Job::set_status(&state.pool, id, &input.status).await?;
    Ok(Json(job))
}
