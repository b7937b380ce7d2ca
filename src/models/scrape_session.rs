use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;

/// One auditable batch run. Single-company refreshes get their own
/// one-company session so every scrape is traceable the same way.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ScrapeSession {
    pub id: Uuid,
    pub trigger_source: String,
    pub status: String,
    pub companies_total: i32,
    pub companies_completed: i32,
    pub jobs_found: i32,
    pub jobs_added: i32,
    pub jobs_filtered: i32,
    pub jobs_archived: i32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ScrapeSession {
    pub async fn create(
        pool: &PgPool,
        trigger_source: &str,
        companies_total: i32,
    ) -> Result<ScrapeSession, AppError> {
        let session = sqlx::query_as::<_, ScrapeSession>(
            "INSERT INTO scrape_sessions (id, trigger_source, companies_total) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(trigger_source)
        .bind(companies_total)
        .fetch_one(pool)
        .await?;
        Ok(session)
    }

    pub async fn get(pool: &PgPool, id: Uuid) -> Result<ScrapeSession, AppError> {
        sqlx::query_as::<_, ScrapeSession>("SELECT * FROM scrape_sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Scrape session {id} not found")))
    }

    pub async fn recent(pool: &PgPool, limit: i64) -> Result<Vec<ScrapeSession>, AppError> {
        let sessions = sqlx::query_as::<_, ScrapeSession>(
            "SELECT * FROM scrape_sessions ORDER BY started_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(pool)
        .await?;
        Ok(sessions)
    }

    /// Fold one company's results into the aggregate counters. Runs for
    /// failed companies too, with zero counts, so companies_completed
    /// always ends equal to the number attempted.
    pub async fn add_company_result(
        pool: &PgPool,
        id: Uuid,
        found: i32,
        added: i32,
        filtered: i32,
        archived: i32,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE scrape_sessions SET companies_completed = companies_completed + 1, jobs_found = jobs_found + $2, jobs_added = jobs_added + $3, jobs_filtered = jobs_filtered + $4, jobs_archived = jobs_archived + $5 WHERE id = $1",
        )
        .bind(id)
        .bind(found)
        .bind(added)
        .bind(filtered)
        .bind(archived)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Transition to a terminal status. A session stopped from outside
    /// is already terminal and is left alone.
    pub async fn finalize(pool: &PgPool, id: Uuid, status: &str) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE scrape_sessions SET status = $2, finished_at = NOW() WHERE id = $1 AND status = 'in_progress'",
        )
        .bind(id)
        .bind(status)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// External stop: flips the session to failed. In-flight per-company
    /// work notices at its next checkpoint.
    pub async fn stop(pool: &PgPool, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE scrape_sessions SET status = 'failed', finished_at = NOW() WHERE id = $1 AND status = 'in_progress'",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn is_stopped(pool: &PgPool, id: Uuid) -> Result<bool, AppError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT status FROM scrape_sessions WHERE id = $1")
                .bind(id)
                .fetch_optional(pool)
                .await?;
        Ok(row.is_none_or(|(status,)| status != "in_progress"))
    }
}
