use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::error::AppError;
use crate::scrapers::ScrapedJob;

pub const STATUSES: &[&str] = &["new", "viewed", "interested", "applied", "rejected", "archived"];

/// Statuses the archive pass must not touch: the user acted on the job
/// (or it is already archived), so a disappearing listing is irrelevant.
const ARCHIVE_EXEMPT: &[&str] = &["applied", "rejected", "archived"];

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct Job {
    pub id: i32,
    pub company_id: i32,
    pub external_id: String,
    pub title: String,
    pub url: Option<String>,
    pub location: Option<String>,
    pub location_type: Option<String>,
    pub department: Option<String>,
    pub description: Option<String>,
    pub description_format: Option<String>,
    pub employment_type: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub status: String,
    pub match_score: Option<i32>,
    pub match_metadata: Option<serde_json::Value>,
    pub archived_at: Option<DateTime<Utc>>,
    pub archive_source: Option<String>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct JobListFilters {
    pub company_id: Option<i32>,
    pub status: Option<String>,
    pub search: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl Job {
    pub async fn list(pool: &PgPool, filters: &JobListFilters) -> Result<Vec<Job>, AppError> {
        let per_page = filters.per_page.unwrap_or(50).min(100);
        let offset = (filters.page.unwrap_or(1) - 1).max(0) * per_page;

        let jobs = sqlx::query_as::<_, Job>(
            "SELECT * FROM jobs WHERE ($1::int IS NULL OR company_id = $1) AND ($2::text IS NULL OR status = $2) AND ($3::text IS NULL OR title ILIKE '%' || $3 || '%') ORDER BY first_seen_at DESC LIMIT $4 OFFSET $5",
        )
        .bind(filters.company_id)
        .bind(&filters.status)
        .bind(&filters.search)
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool)
        .await?;
        Ok(jobs)
    }

    pub async fn get(pool: &PgPool, id: i32) -> Result<Job, AppError> {
        sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {id} not found")))
    }

    pub async fn set_status(pool: &PgPool, id: i32, status: &str) -> Result<Job, AppError> {
        if !STATUSES.contains(&status) {
            return Err(AppError::BadRequest(format!("Unknown status '{status}'")));
        }
        let job = sqlx::query_as::<_, Job>(
            "UPDATE jobs SET status = $2, archived_at = CASE WHEN $2 = 'archived' THEN NOW() ELSE NULL END, archive_source = CASE WHEN $2 = 'archived' THEN 'manual' ELSE NULL END, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job {id} not found")))?;
        Ok(job)
    }

    /// External ids already stored for a company; the scrapers' early
    /// dedup set.
    pub async fn existing_external_ids(
        pool: &PgPool,
        company_id: i32,
    ) -> Result<HashSet<String>, AppError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT external_id FROM jobs WHERE company_id = $1")
                .bind(company_id)
                .fetch_all(pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Insert freshly scraped jobs. A concurrent scrape may have landed
    /// the same external id first, so conflicts are skipped rather than
    /// errored. Returns the number actually inserted.
    pub async fn insert_scraped(
        pool: &PgPool,
        company_id: i32,
        jobs: &[ScrapedJob],
    ) -> Result<i32, AppError> {
        let mut inserted = 0;
        for job in jobs {
            let result = sqlx::query(
                "INSERT INTO jobs (company_id, external_id, title, url, location, location_type, department, description, description_format, employment_type, posted_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) ON CONFLICT (external_id) DO NOTHING",
            )
            .bind(company_id)
            .bind(&job.external_id)
            .bind(&job.title)
            .bind(&job.url)
            .bind(&job.location)
            .bind(job.location_type.as_str())
            .bind(&job.department)
            .bind(&job.description)
            .bind(job.description_format.as_str())
            .bind(&job.employment_type)
            .bind(job.posted_at)
            .execute(pool)
            .await?;
            inserted += result.rows_affected() as i32;
        }
        Ok(inserted)
    }

    /// Refresh mutable listing fields on jobs seen again in a re-scrape
    /// and bump their last_seen_at.
    pub async fn update_from_scrape(
        pool: &PgPool,
        company_id: i32,
        jobs: &[ScrapedJob],
    ) -> Result<(), AppError> {
        for job in jobs {
            sqlx::query(
                "UPDATE jobs SET title = $3, url = COALESCE($4, url), location = $5, location_type = $6, description = COALESCE($7, description), description_format = CASE WHEN $7 IS NULL THEN description_format ELSE $8 END, last_seen_at = NOW(), updated_at = NOW() WHERE company_id = $1 AND external_id = $2",
            )
            .bind(company_id)
            .bind(&job.external_id)
            .bind(&job.title)
            .bind(&job.url)
            .bind(&job.location)
            .bind(job.location_type.as_str())
            .bind(&job.description)
            .bind(job.description_format.as_str())
            .execute(pool)
            .await?;
        }
        Ok(())
    }

    /// Archive stored jobs whose external id is absent from the current
    /// open set, unless the user already acted on them.
    pub async fn archive_missing(
        pool: &PgPool,
        company_id: i32,
        open_external_ids: &[String],
        source: &str,
    ) -> Result<i32, AppError> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'archived', archived_at = NOW(), archive_source = $3, updated_at = NOW() WHERE company_id = $1 AND external_id <> ALL($2) AND status <> ALL($4)",
        )
        .bind(company_id)
        .bind(open_external_ids)
        .bind(source)
        .bind(ARCHIVE_EXEMPT)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() as i32)
    }

    /// Re-open archived jobs that reappeared in the current open set,
    /// clearing the archive bookkeeping fields.
    pub async fn reopen_archived(
        pool: &PgPool,
        company_id: i32,
        open_external_ids: &[String],
    ) -> Result<i32, AppError> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'new', archived_at = NULL, archive_source = NULL, last_seen_at = NOW(), updated_at = NOW() WHERE company_id = $1 AND status = 'archived' AND external_id = ANY($2)",
        )
        .bind(company_id)
        .bind(open_external_ids)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() as i32)
    }

    /// Database ids for freshly inserted external ids; what the matcher
    /// dispatch works from.
    pub async fn ids_for_external_ids(
        pool: &PgPool,
        company_id: i32,
        external_ids: &[String],
    ) -> Result<Vec<i32>, AppError> {
        if external_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<(i32,)> = sqlx::query_as(
            "SELECT id FROM jobs WHERE company_id = $1 AND external_id = ANY($2) ORDER BY id",
        )
        .bind(company_id)
        .bind(external_ids)
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Of the given job ids, those eligible for matching: a job with no
    /// description gives the scorer nothing to work with.
    pub async fn matchable_ids(pool: &PgPool, ids: &[i32]) -> Result<Vec<i32>, AppError> {
        let rows: Vec<(i32,)> = sqlx::query_as(
            "SELECT id FROM jobs WHERE id = ANY($1) AND description IS NOT NULL AND length(trim(description)) > 0 ORDER BY id",
        )
        .bind(ids)
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn set_match_result(
        pool: &PgPool,
        id: i32,
        score: i32,
        metadata: &serde_json::Value,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE jobs SET match_score = $2, match_metadata = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(score)
        .bind(metadata)
        .execute(pool)
        .await?;
        Ok(())
    }
}
