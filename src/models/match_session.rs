use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;

/// Mirror of ScrapeSession for the matching pipeline.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct MatchSession {
    pub id: Uuid,
    pub trigger_source: String,
    pub company_id: Option<i32>,
    pub status: String,
    pub jobs_total: i32,
    pub jobs_succeeded: i32,
    pub jobs_failed: i32,
    pub error_count: i32,
    pub model: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl MatchSession {
    pub async fn create(
        pool: &PgPool,
        trigger_source: &str,
        company_id: Option<i32>,
        jobs_total: i32,
        model: &str,
    ) -> Result<MatchSession, AppError> {
        let session = sqlx::query_as::<_, MatchSession>(
            "INSERT INTO match_sessions (id, trigger_source, company_id, jobs_total, model) VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(trigger_source)
        .bind(company_id)
        .bind(jobs_total)
        .bind(model)
        .fetch_one(pool)
        .await?;
        Ok(session)
    }

    pub async fn get(pool: &PgPool, id: Uuid) -> Result<MatchSession, AppError> {
        sqlx::query_as::<_, MatchSession>("SELECT * FROM match_sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Match session {id} not found")))
    }

    pub async fn recent(pool: &PgPool, limit: i64) -> Result<Vec<MatchSession>, AppError> {
        let sessions = sqlx::query_as::<_, MatchSession>(
            "SELECT * FROM match_sessions ORDER BY started_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(pool)
        .await?;
        Ok(sessions)
    }

    pub async fn finalize(
        pool: &PgPool,
        id: Uuid,
        status: &str,
        jobs_succeeded: i32,
        jobs_failed: i32,
        error_count: i32,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE match_sessions SET status = $2, jobs_succeeded = $3, jobs_failed = $4, error_count = $5, finished_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(status)
        .bind(jobs_succeeded)
        .bind(jobs_failed)
        .bind(error_count)
        .execute(pool)
        .await?;
        Ok(())
    }
}
