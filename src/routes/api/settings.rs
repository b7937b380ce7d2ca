use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use crate::error::AppError;
use crate::models::setting::Setting;
use crate::routes::api::AppState;

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Setting>>, AppError> {
    let settings = Setting::list(&state.pool).await?;
    Ok(Json(settings))
}

#[derive(Debug, Deserialize)]
pub struct UpdateSetting {
    pub value: Option<String>,
}

/// PUT /api/v1/settings/{key}
///
/// Upsert one setting. Scheduler keys take effect immediately via a
/// restart; everything else is read fresh on the next run anyway.
pub async fn update(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(input): Json<UpdateSetting>,
) -> Result<Json<Setting>, AppError> {
    if key == "scheduler_lock" {
        return Err(AppError::BadRequest(
            "scheduler_lock is managed internally".to_string(),
        ));
    }

    Setting::set(&state.pool, &key, input.value.as_deref()).await?;

    if key.starts_with("scheduler_") {
        state.scheduler.restart().await?;
    }

    let setting = Setting::get_row(&state.pool, &key)
        .await?
        .ok_or_else(|| AppError::Internal(format!("Setting '{key}' vanished after write")))?;
    Ok(Json(setting))
}
