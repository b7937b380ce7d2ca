//! Cron-driven trigger for batch scrapes. One instance per process with
//! explicit start/stop/restart lifecycle; a cross-process lock (CAS on a
//! settings row) keeps concurrent deployments from double-running.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use cron::Schedule;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::error::AppError;
use crate::models::setting::{SchedulerLock, Setting};
use crate::orchestrator::Orchestrator;

/// Generous bound on one batch run; an owner that crashes mid-run stops
/// blocking others once this expires.
const LOCK_TTL_MINUTES: i64 = 30;
const DEFAULT_FREQUENCY_HOURS: i64 = 6;

#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

struct Inner {
    orchestrator: Orchestrator,
    owner_id: String,
    task: Mutex<Option<JoinHandle<()>>>,
    /// In-process guard against overlapping ticks.
    is_running: AtomicBool,
    enabled_cache: Mutex<Option<bool>>,
}

#[derive(Debug, Serialize)]
pub struct SchedulerStatus {
    pub enabled: bool,
    pub scheduled: bool,
    pub running: bool,
    pub cron: String,
}

/// Cron expression from an explicit setting or a frequency in hours.
/// Frequencies over a day collapse to a daily tick; per-company
/// frequency hints decide what is actually due on each run.
pub fn derive_cron_expr(explicit: Option<&str>, frequency_hours: i64) -> Result<String, AppError> {
    if let Some(expr) = explicit {
        let expr = expr.trim();
        Schedule::from_str(expr)
            .map_err(|e| AppError::BadRequest(format!("Invalid cron expression '{expr}': {e}")))?;
        return Ok(expr.to_string());
    }

    let hours = frequency_hours.max(1);
    if hours <= 24 {
        Ok(format!("0 0 */{hours} * * *"))
    } else {
        Ok("0 0 0 * * *".to_string())
    }
}

impl Scheduler {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            inner: Arc::new(Inner {
                orchestrator,
                owner_id: format!("jobscout-{}", uuid::Uuid::new_v4()),
                task: Mutex::new(None),
                is_running: AtomicBool::new(false),
                enabled_cache: Mutex::new(None),
            }),
        }
    }

    pub async fn start(&self) -> Result<(), AppError> {
        self.stop().await;

        if !self.enabled().await? {
            tracing::info!("Scheduler is disabled, not starting");
            return Ok(());
        }

        let expr = self.cron_expr().await?;
        let schedule = Schedule::from_str(&expr)
            .map_err(|e| AppError::Internal(format!("Unparseable schedule '{expr}': {e}")))?;
        tracing::info!("Scheduler started with cron '{expr}'");

        let this = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let Some(next) = schedule.after(&now).next() else {
                    tracing::warn!("Cron schedule has no future occurrences, stopping");
                    break;
                };
                let wait = (next - now).to_std().unwrap_or_default();
                tracing::debug!("Next scheduled scrape at {next}");
                tokio::time::sleep(wait).await;
                this.tick().await;
            }
        });

        *self.inner.task.lock().await = Some(handle);
        Ok(())
    }

    pub async fn stop(&self) {
        if let Some(handle) = self.inner.task.lock().await.take() {
            handle.abort();
            tracing::info!("Scheduler stopped");
        }
    }

    pub async fn restart(&self) -> Result<(), AppError> {
        self.invalidate_settings_cache().await;
        self.start().await
    }

    pub async fn status(&self) -> Result<SchedulerStatus, AppError> {
        Ok(SchedulerStatus {
            enabled: self.enabled().await?,
            scheduled: self.inner.task.lock().await.is_some(),
            running: self.inner.is_running.load(Ordering::SeqCst),
            cron: self.cron_expr().await?,
        })
    }

    /// Drop cached settings so the next tick/start re-reads them.
    pub async fn invalidate_settings_cache(&self) {
        *self.inner.enabled_cache.lock().await = None;
    }

    /// Manual "run now". Accepted only when idle; the batch runs in the
    /// background and the caller gets "started" immediately.
    pub async fn trigger_manual_refresh(&self) -> Result<(), AppError> {
        if self.inner.is_running.load(Ordering::SeqCst) {
            return Err(AppError::Conflict("A refresh is already in progress".into()));
        }
        let this = self.clone();
        tokio::spawn(async move {
            this.run_guarded("manual").await;
        });
        Ok(())
    }

    async fn tick(&self) {
        match self.enabled().await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!("Scheduler tick skipped: disabled");
                return;
            }
            Err(e) => {
                tracing::error!("Could not read scheduler settings: {e}");
                return;
            }
        }
        self.run_guarded("scheduler").await;
    }

    /// One lock-guarded batch run. Lock contention is a no-op signal,
    /// not an error; the lock is released on every path out.
    async fn run_guarded(&self, trigger_source: &str) {
        if self.inner.is_running.swap(true, Ordering::SeqCst) {
            tracing::warn!("Tick skipped: previous run still in progress");
            return;
        }

        let pool = self.inner.orchestrator.pool().clone();
        let lock = match SchedulerLock::acquire(
            &pool,
            &self.inner.owner_id,
            chrono::Duration::minutes(LOCK_TTL_MINUTES),
        )
        .await
        {
            Ok(Some(lock)) => lock,
            Ok(None) => {
                tracing::info!("Another instance holds the scheduler lock, skipping tick");
                self.inner.is_running.store(false, Ordering::SeqCst);
                return;
            }
            Err(e) => {
                tracing::error!("Scheduler lock acquisition failed: {e}");
                self.inner.is_running.store(false, Ordering::SeqCst);
                return;
            }
        };

        let result = self
            .inner
            .orchestrator
            .fetch_jobs_for_all_companies(trigger_source)
            .await;

        if let Err(e) = lock.release(&pool).await {
            tracing::error!("Failed to release scheduler lock: {e}");
        }
        self.inner.is_running.store(false, Ordering::SeqCst);

        match result {
            Ok(session_id) => tracing::info!("Scheduled scrape finished (session {session_id})"),
            Err(e) => tracing::error!("Scheduled scrape failed: {e}"),
        }
    }

    async fn enabled(&self) -> Result<bool, AppError> {
        let mut cache = self.inner.enabled_cache.lock().await;
        if let Some(enabled) = *cache {
            return Ok(enabled);
        }
        let enabled =
            Setting::get_bool(self.inner.orchestrator.pool(), "scheduler_enabled", false).await?;
        *cache = Some(enabled);
        Ok(enabled)
    }

    async fn cron_expr(&self) -> Result<String, AppError> {
        let pool = self.inner.orchestrator.pool();
        let explicit = Setting::get(pool, "scheduler_cron").await?;
        let frequency =
            Setting::get_i64(pool, "scheduler_frequency_hours", DEFAULT_FREQUENCY_HOURS).await?;
        derive_cron_expr(explicit.as_deref(), frequency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_cron_is_validated() {
        assert_eq!(
            derive_cron_expr(Some("0 30 2 * * *"), 6).unwrap(),
            "0 30 2 * * *"
        );
        assert!(derive_cron_expr(Some("not a cron"), 6).is_err());
    }

    #[test]
    fn frequency_within_a_day_becomes_every_n_hours() {
        let expr = derive_cron_expr(None, 4).unwrap();
        assert_eq!(expr, "0 0 */4 * * *");
        Schedule::from_str(&expr).unwrap();
    }

    #[test]
    fn frequency_over_a_day_becomes_daily() {
        let expr = derive_cron_expr(None, 72).unwrap();
        assert_eq!(expr, "0 0 0 * * *");
        Schedule::from_str(&expr).unwrap();
    }

    #[test]
    fn zero_frequency_is_clamped() {
        assert_eq!(derive_cron_expr(None, 0).unwrap(), "0 0 */1 * * *");
    }
}
