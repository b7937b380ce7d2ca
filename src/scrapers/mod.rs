//! Platform scrapers. Each implements [`JobScraper`] and converts a raw
//! platform response into normalized [`ScrapedJob`] records; the registry
//! picks the right one per careers URL.

pub mod content;
pub mod greenhouse;
pub mod icims;
pub mod lever;
pub mod phenom;
pub mod registry;
pub mod workday;

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ScrapeError;
use crate::filter::{FilterCounts, JobFilters};
use crate::http::jitter;
use crate::scrapers::content::DescriptionFormat;

/// Bounded parallelism for list-page fetches.
pub(crate) const LIST_CONCURRENCY: usize = 3;
/// Bounded parallelism for per-job detail fetches.
pub(crate) const DETAIL_CONCURRENCY: usize = 8;
/// Base delay between fetch batches; jitter is added on top.
pub(crate) const BATCH_DELAY_MS: u64 = 400;
pub(crate) const BATCH_JITTER_MS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationType {
    Remote,
    Hybrid,
    Onsite,
}

impl LocationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationType::Remote => "remote",
            LocationType::Hybrid => "hybrid",
            LocationType::Onsite => "onsite",
        }
    }
}

/// A normalized job record as produced by a scraper. Transient: the
/// orchestrator folds it into the persisted `jobs` table.
#[derive(Debug, Clone)]
pub struct ScrapedJob {
    /// platform:board:native-id, the dedup key.
    pub external_id: String,
    pub title: String,
    pub url: Option<String>,
    pub location: String,
    pub location_type: LocationType,
    pub department: Option<String>,
    pub description: Option<String>,
    pub description_format: DescriptionFormat,
    pub employment_type: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
}

impl Default for ScrapedJob {
    fn default() -> Self {
        Self {
            external_id: String::new(),
            title: String::new(),
            url: None,
            location: String::new(),
            location_type: LocationType::Onsite,
            department: None,
            description: None,
            description_format: DescriptionFormat::Plain,
            employment_type: None,
            posted_at: None,
        }
    }
}

/// Caller-supplied context for one scrape.
#[derive(Debug, Clone, Default)]
pub struct ScrapeOptions {
    /// Manual board-token override for ambiguous careers URLs.
    pub board_token: Option<String>,
    /// External ids already stored for this company; listings matching
    /// these skip the detail-fetch phase.
    pub known_external_ids: HashSet<String>,
    pub filters: JobFilters,
}

/// What a scrape produced, with enough bookkeeping for the session
/// counters and the archive pass.
#[derive(Debug, Default)]
pub struct ScrapeOutcome {
    /// New jobs with full details, filtered and deduplicated.
    pub jobs: Vec<ScrapedJob>,
    /// Every external id currently listed on the board, pre-filter.
    /// Drives archival of postings that disappeared.
    pub listed_external_ids: Vec<String>,
    pub jobs_found: i32,
    pub filter_counts: FilterCounts,
    pub duplicates_skipped: i32,
}

#[async_trait]
pub trait JobScraper: Send + Sync {
    /// Platform identifier, also the first segment of external ids.
    fn platform(&self) -> &'static str;

    /// Whether this scraper recognizes the careers URL.
    fn validate(&self, url: &str) -> bool;

    async fn scrape(&self, url: &str, opts: &ScrapeOptions)
        -> Result<ScrapeOutcome, ScrapeError>;
}

/// Compose the stable dedup key.
pub fn external_id(platform: &str, board: &str, native_id: &str) -> String {
    format!("{platform}:{board}:{native_id}")
}

/// Derive remote/hybrid/onsite from an explicit platform hint, falling
/// back to sniffing the location string.
pub fn derive_location_type(location: &str, hint: Option<&str>) -> LocationType {
    let probe = hint.unwrap_or(location).to_lowercase();
    if probe.contains("hybrid") {
        LocationType::Hybrid
    } else if probe.contains("remote")
        || probe.contains("worldwide")
        || probe.contains("anywhere")
        || probe.contains("work from home")
    {
        LocationType::Remote
    } else {
        LocationType::Onsite
    }
}

/// A listed-but-not-yet-detailed job. `payload` carries whatever the
/// platform's list endpoint returned so the detail phase can use it.
#[derive(Debug)]
pub struct JobStub<T> {
    pub external_id: String,
    pub title: String,
    pub location: String,
    pub payload: T,
}

#[derive(Debug)]
pub struct Triage<T> {
    pub keep: Vec<JobStub<T>>,
    pub listed_external_ids: Vec<String>,
    pub jobs_found: i32,
    pub filter_counts: FilterCounts,
    pub duplicates_skipped: i32,
}

/// Early filtering and deduplication, applied before the detail-fetch
/// phase to keep request volume down. Order: filter, then dedup, so the
/// filtered counts reflect the board's full listing.
pub fn triage<T>(stubs: Vec<JobStub<T>>, opts: &ScrapeOptions) -> Triage<T> {
    let jobs_found = stubs.len() as i32;
    let listed_external_ids: Vec<String> =
        stubs.iter().map(|s| s.external_id.clone()).collect();

    let mut filter_counts = FilterCounts::default();
    let mut duplicates_skipped = 0;
    let mut seen: HashSet<String> = HashSet::new();
    let mut keep = Vec::new();

    for stub in stubs {
        if let Some(reason) = opts.filters.evaluate(&stub.title, &stub.location) {
            filter_counts.record(reason);
            continue;
        }
        if opts.known_external_ids.contains(&stub.external_id)
            || !seen.insert(stub.external_id.clone())
        {
            duplicates_skipped += 1;
            continue;
        }
        keep.push(stub);
    }

    Triage {
        keep,
        listed_external_ids,
        jobs_found,
        filter_counts,
        duplicates_skipped,
    }
}

/// Run `f` over `items` with bounded parallelism, pausing with jitter
/// between batches. Individual failures are logged and skipped; a scrape
/// should not die because one detail page 500'd through its retries.
pub(crate) async fn fetch_batched<T, R, F, Fut>(
    items: Vec<T>,
    concurrency: usize,
    f: F,
) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R, ScrapeError>> + Send,
{
    let mut out = Vec::with_capacity(items.len());
    let mut batches: Vec<Vec<T>> = Vec::new();
    let mut iter = items.into_iter();
    loop {
        let batch: Vec<T> = iter.by_ref().take(concurrency.max(1)).collect();
        if batch.is_empty() {
            break;
        }
        batches.push(batch);
    }

    let last = batches.len().saturating_sub(1);
    for (i, batch) in batches.into_iter().enumerate() {
        let results = futures::future::join_all(batch.into_iter().map(&f)).await;
        for result in results {
            match result {
                Ok(r) => out.push(r),
                Err(e) => tracing::warn!("Batched fetch item failed: {e}"),
            }
        }
        if i < last {
            tokio::time::sleep(Duration::from_millis(BATCH_DELAY_MS) + jitter(BATCH_JITTER_MS))
                .await;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub(id: &str, title: &str, location: &str) -> JobStub<()> {
        JobStub {
            external_id: id.to_string(),
            title: title.to_string(),
            location: location.to_string(),
            payload: (),
        }
    }

    #[test]
    fn external_id_is_composite() {
        assert_eq!(external_id("lever", "acme", "42"), "lever:acme:42");
    }

    #[test]
    fn location_type_prefers_hint() {
        assert_eq!(derive_location_type("Berlin", Some("Remote")), LocationType::Remote);
        assert_eq!(derive_location_type("Remote - US", None), LocationType::Remote);
        assert_eq!(derive_location_type("Hybrid, Pune", None), LocationType::Hybrid);
        assert_eq!(derive_location_type("London", None), LocationType::Onsite);
    }

    #[test]
    fn triage_filters_before_dedup() {
        let mut opts = ScrapeOptions::default();
        opts.filters.country = Some("India".to_string());
        opts.known_external_ids.insert("p:b:2".to_string());

        let stubs = vec![
            stub("p:b:1", "Engineer", "Pune, India"),
            stub("p:b:2", "Engineer", "Mumbai, India"),
            stub("p:b:3", "Engineer", "Berlin, Germany"),
            stub("p:b:1", "Engineer", "Pune, India"),
        ];
        let triaged = triage(stubs, &opts);

        assert_eq!(triaged.jobs_found, 4);
        assert_eq!(triaged.listed_external_ids.len(), 4);
        assert_eq!(triaged.filter_counts.by_country, 1);
        assert_eq!(triaged.duplicates_skipped, 2);
        assert_eq!(triaged.keep.len(), 1);
        assert_eq!(triaged.keep[0].external_id, "p:b:1");
    }

    #[tokio::test]
    async fn fetch_batched_skips_failures() {
        let results = fetch_batched(vec![1, 2, 3, 4, 5], 2, |n| async move {
            if n == 3 {
                Err(ScrapeError::Parse("boom".to_string()))
            } else {
                Ok(n * 10)
            }
        })
        .await;
        assert_eq!(results, vec![10, 20, 40, 50]);
    }
}
