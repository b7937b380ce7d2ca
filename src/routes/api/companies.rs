use axum::extract::{Path, State};
use axum::Json;

use crate::error::AppError;
use crate::models::company::{Company, CreateCompany, UpdateCompany};
use crate::orchestrator::CompanyScrapeReport;
use crate::routes::api::AppState;

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Company>>, AppError> {
    let companies = Company::list(&state.pool).await?;
    Ok(Json(companies))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Company>, AppError> {
    let company = Company::get(&state.pool, id).await?;
    Ok(Json(company))
}

pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<CreateCompany>,
) -> Result<Json<Company>, AppError> {
    // Reject URLs no scraper understands up front, so a bad row does not
    // sit around failing every scheduled run.
    state
        .orchestrator
        .registry()
        .resolve(&input.careers_url, input.platform.as_deref())?;
    let company = Company::create(&state.pool, input).await?;
    Ok(Json(company))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(input): Json<UpdateCompany>,
) -> Result<Json<Company>, AppError> {
    if let Some(url) = &input.careers_url {
        state
            .orchestrator
            .registry()
            .resolve(url, input.platform.as_deref())?;
    }
    let company = Company::update(&state.pool, id, input).await?;
    Ok(Json(company))
}

/// POST /api/v1/companies/{id}/scrape
///
/// Synchronous single-company refresh. Runs under its own one-company
/// session and returns the per-company report.
pub async fn scrape(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<CompanyScrapeReport>, AppError> {
    let report = state
        .orchestrator
        .fetch_jobs_for_company(id, "company_refresh")
        .await?;
    Ok(Json(report))
}
