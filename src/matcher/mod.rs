//! AI match scoring: a concurrency-bounded pool over job ids with retry,
//! backoff and circuit breaking, tracked in match_sessions/match_logs the
//! same way scrapes are tracked.

pub mod ai;
pub mod breaker;
pub mod engine;

use std::time::{Duration, Instant};

use sqlx::PgPool;

use crate::error::AppError;
use crate::http::HttpClient;
use crate::matcher::ai::{match_metadata, ScoringClient};
use crate::matcher::breaker::CircuitBreaker;
use crate::matcher::engine::{run_pool, MatcherConfig, Progress};
use crate::models::job::Job;
use crate::models::match_log::{MatchLog, NewMatchLog};
use crate::models::match_session::MatchSession;
use crate::models::setting::Setting;

const DEFAULT_MODEL: &str = "gpt-4o-mini";

pub struct MatchOptions {
    pub trigger_source: String,
    pub company_id: Option<i32>,
    /// Observed by the orchestrator to mirror progress into the
    /// originating scraping log.
    pub on_progress: Option<Box<dyn FnMut(Progress) + Send>>,
}

#[derive(Debug, Clone)]
pub struct MatchSummary {
    pub session_id: uuid::Uuid,
    pub jobs_total: i32,
    pub jobs_succeeded: i32,
    pub jobs_failed: i32,
    pub error_count: i32,
    pub duration: Duration,
}

/// Read the matcher knobs from settings, falling back to defaults.
pub async fn load_config(pool: &PgPool) -> Result<MatcherConfig, AppError> {
    let defaults = MatcherConfig::default();
    Ok(MatcherConfig {
        batch_size: Setting::get_i64(pool, "matcher_batch_size", defaults.batch_size as i64)
            .await?
            .max(1) as usize,
        concurrency: Setting::get_i64(
            pool,
            "matcher_concurrency_limit",
            defaults.concurrency as i64,
        )
        .await?
        .max(1) as usize,
        max_retries: Setting::get_i64(pool, "matcher_max_retries", defaults.max_retries as i64)
            .await?
            .max(0) as u32,
        timeout: Duration::from_millis(
            Setting::get_i64(pool, "matcher_timeout_ms", defaults.timeout.as_millis() as i64)
                .await?
                .max(1) as u64,
        ),
        base_delay: Duration::from_millis(
            Setting::get_i64(
                pool,
                "matcher_backoff_base_delay",
                defaults.base_delay.as_millis() as i64,
            )
            .await?
            .max(0) as u64,
        ),
        max_delay: Duration::from_millis(
            Setting::get_i64(
                pool,
                "matcher_backoff_max_delay",
                defaults.max_delay.as_millis() as i64,
            )
            .await?
            .max(0) as u64,
        ),
        breaker_threshold: Setting::get_i64(
            pool,
            "matcher_circuit_breaker_threshold",
            defaults.breaker_threshold as i64,
        )
        .await?
        .max(1) as u32,
        breaker_reset: Duration::from_millis(
            Setting::get_i64(
                pool,
                "matcher_circuit_breaker_reset_timeout",
                defaults.breaker_reset.as_millis() as i64,
            )
            .await?
            .max(1) as u64,
        ),
    })
}

/// Score the given jobs, persisting a MatchSession plus one MatchLog per
/// job. Ineligible jobs (no description) are dropped up front. Returns
/// the aggregate summary; individual failures never fail the batch.
pub async fn match_with_tracking(
    pool: &PgPool,
    http: &HttpClient,
    api_key: Option<&str>,
    job_ids: &[i32],
    mut opts: MatchOptions,
) -> Result<MatchSummary, AppError> {
    let started = Instant::now();
    let config = load_config(pool).await?;

    let model = Setting::get(pool, "matcher_model")
        .await?
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());
    let reasoning_effort = Setting::get(pool, "matcher_reasoning_effort").await?;
    let provider = Setting::get(pool, "matcher_provider").await?;
    let profile = Setting::get(pool, "matcher_profile").await?.unwrap_or_default();

    let eligible = Job::matchable_ids(pool, job_ids).await?;
    let skipped = job_ids.len() - eligible.len();
    if skipped > 0 {
        tracing::debug!("Skipping {skipped} jobs with no description");
    }

    let session = MatchSession::create(
        pool,
        &opts.trigger_source,
        opts.company_id,
        eligible.len() as i32,
        &model,
    )
    .await?;
    tracing::info!(
        "Match session {} started: {} jobs, model {model}",
        session.id,
        eligible.len()
    );

    let client = ScoringClient::for_model(
        http.clone(),
        &model,
        reasoning_effort.as_deref(),
        provider.as_deref(),
        api_key,
    );
    let breaker = CircuitBreaker::new(config.breaker_threshold, config.breaker_reset);

    let client_ref = &client;
    let profile_ref = profile.as_str();
    let outcomes = run_pool(
        &eligible,
        &config,
        &breaker,
        |job_id| async move {
            let job = Job::get(pool, job_id).await.map_err(|e| {
                engine::MatchFailure {
                    kind: engine::MatchErrorKind::Provider,
                    message: format!("failed to load job {job_id}: {e}"),
                }
            })?;
            client_ref
                .score_job(
                    profile_ref,
                    &job.title,
                    job.description.as_deref().unwrap_or_default(),
                )
                .await
        },
        |progress| {
            if let Some(cb) = opts.on_progress.as_mut() {
                cb(progress);
            }
        },
    )
    .await;

    let mut succeeded = 0;
    let mut failed = 0;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(scored) => {
                succeeded += 1;
                Job::set_match_result(pool, outcome.job_id, scored.score, &match_metadata(scored))
                    .await?;
                MatchLog::insert(
                    pool,
                    NewMatchLog {
                        session_id: session.id,
                        job_id: outcome.job_id,
                        status: "completed",
                        score: Some(scored.score),
                        attempts: outcome.attempts as i32,
                        error_type: None,
                        error_message: None,
                        duration_ms: outcome.duration.as_millis() as i64,
                        model: &scored.model,
                    },
                )
                .await?;
            }
            Err(failure) => {
                failed += 1;
                MatchLog::insert(
                    pool,
                    NewMatchLog {
                        session_id: session.id,
                        job_id: outcome.job_id,
                        status: "failed",
                        score: None,
                        attempts: outcome.attempts as i32,
                        error_type: Some(failure.kind.as_str()),
                        error_message: Some(&failure.message),
                        duration_ms: outcome.duration.as_millis() as i64,
                        model: &model,
                    },
                )
                .await?;
            }
        }
    }

    let error_count = breaker.total_errors() as i32;
    let status = if failed == 0 {
        "completed"
    } else if succeeded > 0 {
        "partial"
    } else {
        "failed"
    };
    MatchSession::finalize(pool, session.id, status, succeeded, failed, error_count).await?;

    let summary = MatchSummary {
        session_id: session.id,
        jobs_total: eligible.len() as i32,
        jobs_succeeded: succeeded,
        jobs_failed: failed,
        error_count,
        duration: started.elapsed(),
    };
    tracing::info!(
        "Match session {} {status}: {}/{} succeeded, {} errors, {:?}",
        session.id,
        succeeded,
        summary.jobs_total,
        error_count,
        summary.duration
    );
    Ok(summary)
}
