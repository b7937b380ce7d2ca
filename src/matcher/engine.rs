//! The matching worker pool, kept generic over the scoring call so the
//! pool/retry/breaker mechanics are testable without a provider.

use std::future::Future;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};

use crate::http::backoff_delay;
use crate::matcher::breaker::CircuitBreaker;

#[derive(Debug, Clone)]
pub struct MatcherConfig {
    pub batch_size: usize,
    pub concurrency: usize,
    pub max_retries: u32,
    pub timeout: Duration,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub breaker_threshold: u32,
    pub breaker_reset: Duration,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            concurrency: 3,
            max_retries: 2,
            timeout: Duration::from_secs(60),
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            breaker_threshold: 5,
            breaker_reset: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchErrorKind {
    /// Breaker was open; no call was made.
    CircuitOpen,
    Timeout,
    /// Provider returned an error response.
    Provider,
    /// Response arrived but could not be interpreted.
    Parse,
}

impl MatchErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchErrorKind::CircuitOpen => "circuit_open",
            MatchErrorKind::Timeout => "timeout",
            MatchErrorKind::Provider => "provider",
            MatchErrorKind::Parse => "parse",
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, MatchErrorKind::Timeout | MatchErrorKind::Provider)
    }
}

#[derive(Debug, Clone)]
pub struct MatchFailure {
    pub kind: MatchErrorKind,
    pub message: String,
}

#[derive(Debug)]
pub struct JobOutcome<T> {
    pub job_id: i32,
    pub result: Result<T, MatchFailure>,
    pub attempts: u32,
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Failed attempts so far, retries included. A job that succeeds on
    /// its third attempt contributes two.
    pub errors: usize,
}

/// Drive `score` over `job_ids` in batches of `batch_size`, with at most
/// `concurrency` calls in flight per batch. One job failing never fails
/// the run; every job yields an outcome.
pub async fn run_pool<T, F, Fut, P>(
    job_ids: &[i32],
    config: &MatcherConfig,
    breaker: &CircuitBreaker,
    score: F,
    mut on_progress: P,
) -> Vec<JobOutcome<T>>
where
    F: Fn(i32) -> Fut,
    Fut: Future<Output = Result<T, MatchFailure>>,
    P: FnMut(Progress),
{
    let total = job_ids.len();
    let mut outcomes: Vec<JobOutcome<T>> = Vec::with_capacity(total);
    let mut succeeded = 0;
    let mut failed = 0;
    let mut errors = 0;

    for batch in job_ids.chunks(config.batch_size.max(1)) {
        let mut in_flight = stream::iter(batch.iter().copied())
            .map(|job_id| score_with_retries(job_id, config, breaker, &score))
            .buffer_unordered(config.concurrency.max(1));

        while let Some(outcome) = in_flight.next().await {
            if outcome.result.is_ok() {
                succeeded += 1;
                errors += (outcome.attempts as usize).saturating_sub(1);
            } else {
                failed += 1;
                errors += outcome.attempts as usize;
            }
            outcomes.push(outcome);
            on_progress(Progress {
                completed: outcomes.len(),
                total,
                succeeded,
                failed,
                errors,
            });
        }
    }

    outcomes
}

async fn score_with_retries<T, F, Fut>(
    job_id: i32,
    config: &MatcherConfig,
    breaker: &CircuitBreaker,
    score: &F,
) -> JobOutcome<T>
where
    F: Fn(i32) -> Fut,
    Fut: Future<Output = Result<T, MatchFailure>>,
{
    let started = Instant::now();
    let mut attempts = 0;
    let mut last_failure: Option<MatchFailure> = None;

    while attempts <= config.max_retries {
        if !breaker.allow() {
            return JobOutcome {
                job_id,
                result: Err(MatchFailure {
                    kind: MatchErrorKind::CircuitOpen,
                    message: "circuit breaker open, call skipped".to_string(),
                }),
                attempts,
                duration: started.elapsed(),
            };
        }

        if attempts > 0 {
            let delay = backoff_delay(attempts - 1, config.base_delay, config.max_delay);
            tokio::time::sleep(delay).await;
        }
        attempts += 1;

        let result = match tokio::time::timeout(config.timeout, score(job_id)).await {
            Ok(r) => r,
            Err(_) => Err(MatchFailure {
                kind: MatchErrorKind::Timeout,
                message: format!("scoring timed out after {:?}", config.timeout),
            }),
        };

        match result {
            Ok(value) => {
                breaker.record_success();
                return JobOutcome {
                    job_id,
                    result: Ok(value),
                    attempts,
                    duration: started.elapsed(),
                };
            }
            Err(failure) => {
                breaker.record_failure();
                let retryable = failure.kind.is_retryable();
                last_failure = Some(failure);
                if !retryable {
                    break;
                }
            }
        }
    }

    JobOutcome {
        job_id,
        result: Err(last_failure.unwrap_or(MatchFailure {
            kind: MatchErrorKind::Provider,
            message: "no attempts made".to_string(),
        })),
        attempts,
        duration: started.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn config(batch: usize, concurrency: usize, retries: u32) -> MatcherConfig {
        MatcherConfig {
            batch_size: batch,
            concurrency,
            max_retries: retries,
            timeout: Duration::from_secs(5),
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            breaker_threshold: 100,
            breaker_reset: Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn five_jobs_batch_two_concurrency_one() {
        let cfg = config(2, 1, 0);
        let breaker = CircuitBreaker::new(cfg.breaker_threshold, cfg.breaker_reset);
        let order = Mutex::new(Vec::new());

        let mut last_progress = None;
        let outcomes = run_pool(
            &[1, 2, 3, 4, 5],
            &cfg,
            &breaker,
            |id| {
                order.lock().unwrap().push(id);
                async move { Ok::<_, MatchFailure>(id * 10) }
            },
            |p| last_progress = Some(p),
        )
        .await;

        assert_eq!(outcomes.len(), 5);
        assert!(outcomes.iter().all(|o| o.result.is_ok()));
        // Batches of (2,2,1), sequential within a batch.
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3, 4, 5]);
        let progress = last_progress.unwrap();
        assert_eq!(progress.total, 5);
        assert_eq!(progress.completed, 5);
        assert_eq!(progress.succeeded, 5);
        assert_eq!(progress.failed, 0);
        assert_eq!(progress.errors, 0);
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let cfg = config(10, 1, 2);
        let breaker = CircuitBreaker::new(cfg.breaker_threshold, cfg.breaker_reset);
        let calls = AtomicUsize::new(0);

        let mut last_progress = None;
        let outcomes = run_pool(
            &[7],
            &cfg,
            &breaker,
            |id| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(MatchFailure {
                            kind: MatchErrorKind::Provider,
                            message: "flaky".into(),
                        })
                    } else {
                        Ok(id)
                    }
                }
            },
            |p| last_progress = Some(p),
        )
        .await;

        assert!(outcomes[0].result.is_ok());
        assert_eq!(outcomes[0].attempts, 3);
        // Two failed attempts count as errors even though the job
        // ultimately succeeded.
        let progress = last_progress.unwrap();
        assert_eq!(progress.succeeded, 1);
        assert_eq!(progress.failed, 0);
        assert_eq!(progress.errors, 2);
    }

    #[tokio::test]
    async fn parse_errors_do_not_retry() {
        let cfg = config(10, 1, 3);
        let breaker = CircuitBreaker::new(cfg.breaker_threshold, cfg.breaker_reset);
        let calls = AtomicUsize::new(0);

        let outcomes = run_pool(
            &[1],
            &cfg,
            &breaker,
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<(), _>(MatchFailure {
                        kind: MatchErrorKind::Parse,
                        message: "garbage".into(),
                    })
                }
            },
            |_| {},
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcomes[0].attempts, 1);
    }

    #[tokio::test]
    async fn open_breaker_short_circuits_without_calls() {
        let mut cfg = config(10, 1, 0);
        cfg.breaker_threshold = 2;
        let breaker = CircuitBreaker::new(cfg.breaker_threshold, cfg.breaker_reset);
        let calls = AtomicUsize::new(0);

        let outcomes = run_pool(
            &[1, 2, 3, 4, 5],
            &cfg,
            &breaker,
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<(), _>(MatchFailure {
                        kind: MatchErrorKind::Provider,
                        message: "down".into(),
                    })
                }
            },
            |_| {},
        )
        .await;

        // Two real calls trip the breaker; the remaining three jobs are
        // short-circuited with no provider call.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let short_circuited = outcomes
            .iter()
            .filter(|o| {
                matches!(
                    &o.result,
                    Err(f) if f.kind == MatchErrorKind::CircuitOpen
                )
            })
            .count();
        assert_eq!(short_circuited, 3);
    }
}
