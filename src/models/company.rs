use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Company {
    pub id: i32,
    pub name: String,
    pub careers_url: String,
    /// Platform name; inferred from the URL by the registry when absent.
    pub platform: Option<String>,
    /// Manual board-token override for ambiguous careers URLs.
    pub board_token: Option<String>,
    pub active: bool,
    pub last_scraped_at: Option<DateTime<Utc>>,
    /// Scheduler hint: how often this board is worth re-scraping.
    pub scrape_frequency_hours: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCompany {
    pub name: String,
    pub careers_url: String,
    pub platform: Option<String>,
    pub board_token: Option<String>,
    pub scrape_frequency_hours: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCompany {
    pub name: Option<String>,
    pub careers_url: Option<String>,
    pub platform: Option<String>,
    pub board_token: Option<String>,
    pub active: Option<bool>,
    pub scrape_frequency_hours: Option<i32>,
}

impl Company {
    pub async fn list(pool: &PgPool) -> Result<Vec<Company>, AppError> {
        let companies = sqlx::query_as::<_, Company>("SELECT * FROM companies ORDER BY name")
            .fetch_all(pool)
            .await?;
        Ok(companies)
    }

    pub async fn list_active(pool: &PgPool) -> Result<Vec<Company>, AppError> {
        let companies = sqlx::query_as::<_, Company>(
            "SELECT * FROM companies WHERE active ORDER BY name",
        )
        .fetch_all(pool)
        .await?;
        Ok(companies)
    }

    pub async fn get(pool: &PgPool, id: i32) -> Result<Company, AppError> {
        sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Company {id} not found")))
    }

    pub async fn create(pool: &PgPool, input: CreateCompany) -> Result<Company, AppError> {
        let company = sqlx::query_as::<_, Company>(
            "INSERT INTO companies (name, careers_url, platform, board_token, scrape_frequency_hours) VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(&input.name)
        .bind(&input.careers_url)
        .bind(&input.platform)
        .bind(&input.board_token)
        .bind(input.scrape_frequency_hours)
        .fetch_one(pool)
        .await?;
        Ok(company)
    }

    pub async fn update(pool: &PgPool, id: i32, input: UpdateCompany) -> Result<Company, AppError> {
        let existing = Self::get(pool, id).await?;
        let company = sqlx::query_as::<_, Company>(
            "UPDATE companies SET name = $2, careers_url = $3, platform = $4, board_token = $5, active = $6, scrape_frequency_hours = $7, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(input.name.unwrap_or(existing.name))
        .bind(input.careers_url.unwrap_or(existing.careers_url))
        .bind(input.platform.or(existing.platform))
        .bind(input.board_token.or(existing.board_token))
        .bind(input.active.unwrap_or(existing.active))
        .bind(input.scrape_frequency_hours.or(existing.scrape_frequency_hours))
        .fetch_one(pool)
        .await?;
        Ok(company)
    }

    pub async fn record_scraped(pool: &PgPool, id: i32) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE companies SET last_scraped_at = NOW(), updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Whether enough time has elapsed since the last scrape, per the
    /// company's own frequency hint. Companies never scraped are due.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        let Some(last) = self.last_scraped_at else {
            return true;
        };
        let hours = i64::from(self.scrape_frequency_hours.unwrap_or(24).max(1));
        now - last >= chrono::Duration::hours(hours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn company(last: Option<DateTime<Utc>>, freq: Option<i32>) -> Company {
        Company {
            id: 1,
            name: "Acme".into(),
            careers_url: "https://boards.greenhouse.io/acme".into(),
            platform: None,
            board_token: None,
            active: true,
            last_scraped_at: last,
            scrape_frequency_hours: freq,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn never_scraped_is_due() {
        assert!(company(None, Some(24)).is_due(Utc::now()));
    }

    #[test]
    fn due_follows_frequency_hint() {
        let now = Utc::now();
        let recent = company(Some(now - chrono::Duration::hours(2)), Some(24));
        assert!(!recent.is_due(now));

        let stale = company(Some(now - chrono::Duration::hours(30)), Some(24));
        assert!(stale.is_due(now));

        let weekly = company(Some(now - chrono::Duration::hours(30)), Some(168));
        assert!(!weekly.is_due(now));
    }
}
