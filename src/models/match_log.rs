use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;

/// One job-attempt within a match session.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct MatchLog {
    pub id: i32,
    pub session_id: Uuid,
    pub job_id: i32,
    pub status: String,
    pub score: Option<i32>,
    pub attempts: i32,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub duration_ms: i64,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

pub struct NewMatchLog<'a> {
    pub session_id: Uuid,
    pub job_id: i32,
    pub status: &'a str,
    pub score: Option<i32>,
    pub attempts: i32,
    pub error_type: Option<&'a str>,
    pub error_message: Option<&'a str>,
    pub duration_ms: i64,
    pub model: &'a str,
}

impl MatchLog {
    pub async fn insert(pool: &PgPool, log: NewMatchLog<'_>) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO match_logs (session_id, job_id, status, score, attempts, error_type, error_message, duration_ms, model) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(log.session_id)
        .bind(log.job_id)
        .bind(log.status)
        .bind(log.score)
        .bind(log.attempts)
        .bind(log.error_type)
        .bind(log.error_message)
        .bind(log.duration_ms)
        .bind(log.model)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn for_session(pool: &PgPool, session_id: Uuid) -> Result<Vec<MatchLog>, AppError> {
        let logs = sqlx::query_as::<_, MatchLog>(
            "SELECT * FROM match_logs WHERE session_id = $1 ORDER BY created_at",
        )
        .bind(session_id)
        .fetch_all(pool)
        .await?;
        Ok(logs)
    }
}
