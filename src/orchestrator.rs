//! Drives scrape sessions: per company, scrape -> filter -> dedupe ->
//! persist -> archive/reopen -> log, with aggregate session counters and
//! optional fire-and-forget matcher dispatch.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sqlx::PgPool;
use uuid::Uuid;

use crate::dedup;
use crate::error::AppError;
use crate::filter::JobFilters;
use crate::http::{jitter, HttpClient};
use crate::matcher::{self, MatchOptions};
use crate::models::company::Company;
use crate::models::job::Job;
use crate::models::scrape_session::ScrapeSession;
use crate::models::scraping_log::{NewScrapingLog, ScrapingLog};
use crate::models::setting::Setting;
use crate::scrapers::registry::ScraperRegistry;
use crate::scrapers::ScrapeOptions;

/// Pause between companies so boards on shared infrastructure do not see
/// correlated bursts.
const INTER_COMPANY_DELAY_MS: u64 = 2000;
const INTER_COMPANY_JITTER_MS: u64 = 1000;

#[derive(Clone)]
pub struct Orchestrator {
    pool: PgPool,
    http: HttpClient,
    registry: Arc<ScraperRegistry>,
    ai_api_key: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CompanyScrapeReport {
    pub session_id: Uuid,
    pub company_id: i32,
    pub success: bool,
    pub jobs_found: i32,
    pub jobs_added: i32,
    pub jobs_filtered: i32,
    pub jobs_archived: i32,
    pub error: Option<String>,
}

impl Orchestrator {
    pub fn new(pool: PgPool, http: HttpClient, ai_api_key: Option<String>) -> Self {
        let registry = Arc::new(ScraperRegistry::new(http.clone()));
        Self {
            pool,
            http,
            registry,
            ai_api_key,
        }
    }

    pub fn registry(&self) -> &ScraperRegistry {
        &self.registry
    }

    /// Refresh a single company under its own one-company session, so
    /// manual refreshes audit exactly like batch runs.
    pub async fn fetch_jobs_for_company(
        &self,
        company_id: i32,
        trigger_source: &str,
    ) -> Result<CompanyScrapeReport, AppError> {
        let company = Company::get(&self.pool, company_id).await?;
        let filters = self.load_filters().await?;
        let session = ScrapeSession::create(&self.pool, trigger_source, 1).await?;

        let report = self.scrape_company(session.id, &company, &filters).await;

        let status = if report.success { "completed" } else { "failed" };
        ScrapeSession::finalize(&self.pool, session.id, status).await?;
        Ok(report)
    }

    /// Scrape every active company under one session. Returns the session
    /// id once the whole batch has been processed; individual company
    /// failures are logged, counted and do not abort the batch.
    pub async fn fetch_jobs_for_all_companies(
        &self,
        trigger_source: &str,
    ) -> Result<Uuid, AppError> {
        let mut companies = Company::list_active(&self.pool).await?;
        if trigger_source == "scheduler" {
            // The cron tick may fire more often than slow-moving boards
            // want; the refresh logic decides what is actually due.
            let now = chrono::Utc::now();
            companies.retain(|c| c.is_due(now));
        }

        let filters = self.load_filters().await?;
        let max_parallel = Setting::get_i64(&self.pool, "scraper_max_parallel_scrapes", 1)
            .await?
            .clamp(1, 8) as usize;

        let session = ScrapeSession::create(&self.pool, trigger_source, companies.len() as i32).await?;
        tracing::info!(
            "Scrape session {} started: {} companies, parallelism {max_parallel}",
            session.id,
            companies.len()
        );

        let mut succeeded = 0usize;
        let mut attempted = 0usize;
        let total = companies.len();

        for chunk in companies.chunks(max_parallel) {
            // Stop checkpoint: abandon remaining companies if the session
            // was stopped from outside.
            if ScrapeSession::is_stopped(&self.pool, session.id).await? {
                tracing::warn!("Scrape session {} stopped externally, abandoning", session.id);
                return Ok(session.id);
            }

            let reports = futures::future::join_all(
                chunk
                    .iter()
                    .map(|company| self.scrape_company(session.id, company, &filters)),
            )
            .await;
            for report in reports {
                attempted += 1;
                if report.success {
                    succeeded += 1;
                }
            }

            if attempted < total {
                tokio::time::sleep(
                    Duration::from_millis(INTER_COMPANY_DELAY_MS)
                        + jitter(INTER_COMPANY_JITTER_MS),
                )
                .await;
            }
        }

        let status = if succeeded == attempted {
            "completed"
        } else if succeeded > 0 {
            "partial"
        } else {
            "failed"
        };
        ScrapeSession::finalize(&self.pool, session.id, status).await?;
        tracing::info!(
            "Scrape session {} {status}: {succeeded}/{attempted} companies succeeded",
            session.id
        );
        Ok(session.id)
    }

    /// One company's scrape, from fetch to bookkeeping. Never returns an
    /// error: failures become the log row and zeroed session counters.
    async fn scrape_company(
        &self,
        session_id: Uuid,
        company: &Company,
        filters: &JobFilters,
    ) -> CompanyScrapeReport {
        let started = Instant::now();
        tracing::info!("Scraping company {} ({})", company.name, company.careers_url);

        match self.scrape_and_persist(company, filters).await {
            Ok((platform, found, added, filtered, archived, new_job_ids)) => {
                let duration_ms = started.elapsed().as_millis() as i64;
                let log = ScrapingLog::insert(
                    &self.pool,
                    NewScrapingLog {
                        session_id,
                        company_id: company.id,
                        platform: Some(platform),
                        status: "completed",
                        jobs_found: found,
                        jobs_added: added,
                        jobs_filtered: filtered,
                        jobs_archived: archived,
                        error: None,
                        duration_ms,
                    },
                )
                .await;
                let _ = ScrapeSession::add_company_result(
                    &self.pool, session_id, found, added, filtered, archived,
                )
                .await;

                if let Ok(log) = &log {
                    self.dispatch_matcher(log.id, company.id, new_job_ids).await;
                }

                CompanyScrapeReport {
                    session_id,
                    company_id: company.id,
                    success: true,
                    jobs_found: found,
                    jobs_added: added,
                    jobs_filtered: filtered,
                    jobs_archived: archived,
                    error: None,
                }
            }
            Err(e) => {
                let message = e.to_string();
                tracing::error!("Scrape failed for company {}: {message}", company.id);
                let _ = ScrapingLog::insert(
                    &self.pool,
                    NewScrapingLog {
                        session_id,
                        company_id: company.id,
                        platform: company.platform.as_deref(),
                        status: "failed",
                        jobs_found: 0,
                        jobs_added: 0,
                        jobs_filtered: 0,
                        jobs_archived: 0,
                        error: Some(&message),
                        duration_ms: started.elapsed().as_millis() as i64,
                    },
                )
                .await;
                let _ =
                    ScrapeSession::add_company_result(&self.pool, session_id, 0, 0, 0, 0).await;

                CompanyScrapeReport {
                    session_id,
                    company_id: company.id,
                    success: false,
                    jobs_found: 0,
                    jobs_added: 0,
                    jobs_filtered: 0,
                    jobs_archived: 0,
                    error: Some(message),
                }
            }
        }
    }

    async fn scrape_and_persist(
        &self,
        company: &Company,
        filters: &JobFilters,
    ) -> Result<(&'static str, i32, i32, i32, i32, Vec<i32>), AppError> {
        let scraper = self
            .registry
            .resolve(&company.careers_url, company.platform.as_deref())?;
        let known = Job::existing_external_ids(&self.pool, company.id).await?;

        let opts = ScrapeOptions {
            board_token: company.board_token.clone(),
            known_external_ids: known.clone(),
            filters: filters.clone(),
        };
        let outcome = scraper.scrape(&company.careers_url, &opts).await?;

        // The scraper already skipped known ids; partition again as the
        // final guard so a re-listed duplicate refreshes instead of
        // double-inserting.
        let parts = dedup::partition(outcome.jobs, &known);
        let added = Job::insert_scraped(&self.pool, company.id, &parts.new_jobs).await?;
        Job::update_from_scrape(&self.pool, company.id, &parts.duplicates).await?;

        let archived = Job::archive_missing(
            &self.pool,
            company.id,
            &outcome.listed_external_ids,
            "scraper",
        )
        .await?;
        let reopened =
            Job::reopen_archived(&self.pool, company.id, &outcome.listed_external_ids).await?;
        if reopened > 0 {
            tracing::info!("Reopened {reopened} archived jobs for company {}", company.id);
        }

        Company::record_scraped(&self.pool, company.id).await?;

        let new_job_ids = Job::ids_for_external_ids(
            &self.pool,
            company.id,
            &parts
                .new_jobs
                .iter()
                .map(|j| j.external_id.clone())
                .collect::<Vec<_>>(),
        )
        .await?;

        Ok((
            scraper.platform(),
            outcome.jobs_found,
            added,
            outcome.filter_counts.total(),
            archived,
            new_job_ids,
        ))
    }

    /// Fire-and-forget matcher dispatch for freshly inserted jobs. The
    /// matcher's own session tracks completion; its progress is mirrored
    /// into the originating scraping log's matcher fields.
    async fn dispatch_matcher(&self, log_id: i32, company_id: i32, new_job_ids: Vec<i32>) {
        if new_job_ids.is_empty() {
            return;
        }
        let auto = Setting::get_bool(&self.pool, "matcher_auto_match_after_scrape", false)
            .await
            .unwrap_or(false);
        if !auto {
            return;
        }

        let pool = self.pool.clone();
        let http = self.http.clone();
        let api_key = self.ai_api_key.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let total = new_job_ids.len() as i32;
            let _ = ScrapingLog::update_matcher(
                &pool, log_id, "in_progress", total, 0, 0, 0, None,
            )
            .await;

            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
            let mirror_pool = pool.clone();
            let mirror = tokio::spawn(async move {
                while let Some(p) = rx.recv().await {
                    let p: matcher::engine::Progress = p;
                    let _ = ScrapingLog::update_matcher(
                        &mirror_pool,
                        log_id,
                        "in_progress",
                        p.total as i32,
                        p.completed as i32,
                        p.failed as i32,
                        p.errors as i32,
                        None,
                    )
                    .await;
                }
            });

            let result = matcher::match_with_tracking(
                &pool,
                &http,
                api_key.as_deref(),
                &new_job_ids,
                MatchOptions {
                    trigger_source: "scrape".to_string(),
                    company_id: Some(company_id),
                    on_progress: Some(Box::new(move |p| {
                        let _ = tx.send(p);
                    })),
                },
            )
            .await;
            mirror.abort();

            let duration_ms = Some(started.elapsed().as_millis() as i64);
            match result {
                Ok(summary) => {
                    let status = if summary.jobs_failed == 0 { "completed" } else { "failed" };
                    let _ = ScrapingLog::update_matcher(
                        &pool,
                        log_id,
                        status,
                        summary.jobs_total,
                        summary.jobs_succeeded + summary.jobs_failed,
                        summary.jobs_failed,
                        summary.error_count,
                        duration_ms,
                    )
                    .await;
                }
                Err(e) => {
                    tracing::error!("Matcher dispatch for log {log_id} failed: {e}");
                    let _ = ScrapingLog::update_matcher(
                        &pool, log_id, "failed", total, 0, 0, 1, duration_ms,
                    )
                    .await;
                }
            }
        });
    }

    async fn load_filters(&self) -> Result<JobFilters, AppError> {
        Ok(JobFilters {
            country: Setting::get(&self.pool, "scraper_filter_country").await?,
            city: Setting::get(&self.pool, "scraper_filter_city").await?,
            title_keywords: Setting::get_csv(&self.pool, "scraper_filter_title_keywords").await?,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    pub fn ai_api_key(&self) -> Option<&str> {
        self.ai_api_key.as_deref()
    }
}
