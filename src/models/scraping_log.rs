use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;

/// One company-attempt within a scrape session. Matching runs as a
/// continuation of a successful scrape, so its progress is mirrored
/// here in the matcher_* fields.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ScrapingLog {
    pub id: i32,
    pub session_id: Uuid,
    pub company_id: i32,
    pub platform: Option<String>,
    pub status: String,
    pub jobs_found: i32,
    pub jobs_added: i32,
    pub jobs_filtered: i32,
    pub jobs_archived: i32,
    pub error: Option<String>,
    pub duration_ms: i64,
    pub matcher_status: String,
    pub matcher_jobs_total: i32,
    pub matcher_jobs_completed: i32,
    pub matcher_jobs_failed: i32,
    pub matcher_error_count: i32,
    pub matcher_duration_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}

pub struct NewScrapingLog<'a> {
    pub session_id: Uuid,
    pub company_id: i32,
    pub platform: Option<&'a str>,
    pub status: &'a str,
    pub jobs_found: i32,
    pub jobs_added: i32,
    pub jobs_filtered: i32,
    pub jobs_archived: i32,
    pub error: Option<&'a str>,
    pub duration_ms: i64,
}

impl ScrapingLog {
    pub async fn insert(pool: &PgPool, log: NewScrapingLog<'_>) -> Result<ScrapingLog, AppError> {
        let row = sqlx::query_as::<_, ScrapingLog>(
            "INSERT INTO scraping_logs (session_id, company_id, platform, status, jobs_found, jobs_added, jobs_filtered, jobs_archived, error, duration_ms) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING *",
        )
        .bind(log.session_id)
        .bind(log.company_id)
        .bind(log.platform)
        .bind(log.status)
        .bind(log.jobs_found)
        .bind(log.jobs_added)
        .bind(log.jobs_filtered)
        .bind(log.jobs_archived)
        .bind(log.error)
        .bind(log.duration_ms)
        .fetch_one(pool)
        .await?;
        Ok(row)
    }

    pub async fn for_session(pool: &PgPool, session_id: Uuid) -> Result<Vec<ScrapingLog>, AppError> {
        let logs = sqlx::query_as::<_, ScrapingLog>(
            "SELECT * FROM scraping_logs WHERE session_id = $1 ORDER BY created_at",
        )
        .bind(session_id)
        .fetch_all(pool)
        .await?;
        Ok(logs)
    }

    /// Mirror matcher progress into the originating log row.
    pub async fn update_matcher(
        pool: &PgPool,
        id: i32,
        status: &str,
        jobs_total: i32,
        jobs_completed: i32,
        jobs_failed: i32,
        error_count: i32,
        duration_ms: Option<i64>,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE scraping_logs SET matcher_status = $2, matcher_jobs_total = $3, matcher_jobs_completed = $4, matcher_jobs_failed = $5, matcher_error_count = $6, matcher_duration_ms = $7 WHERE id = $1",
        )
        .bind(id)
        .bind(status)
        .bind(jobs_total)
        .bind(jobs_completed)
        .bind(jobs_failed)
        .bind(error_count)
        .bind(duration_ms)
        .execute(pool)
        .await?;
        Ok(())
    }
}
