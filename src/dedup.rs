//! Classifies scraped jobs as new vs. already-known. The external id
//! (platform + board token + native id) is the primary key and is stable
//! across re-scrapes.

use std::collections::HashSet;

use crate::scrapers::ScrapedJob;

#[derive(Debug, Default)]
pub struct DedupResult {
    pub new_jobs: Vec<ScrapedJob>,
    pub duplicates: Vec<ScrapedJob>,
}

/// Partition `scraped` against the set of external ids already stored for
/// the company. Ids repeated within the same scrape batch also count as
/// duplicates (some boards list a posting under several departments).
pub fn partition(scraped: Vec<ScrapedJob>, known_ids: &HashSet<String>) -> DedupResult {
    let mut seen_in_batch: HashSet<String> = HashSet::new();
    let mut result = DedupResult::default();

    for job in scraped {
        if known_ids.contains(&job.external_id) || !seen_in_batch.insert(job.external_id.clone()) {
            result.duplicates.push(job);
        } else {
            result.new_jobs.push(job);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: &str) -> ScrapedJob {
        ScrapedJob {
            external_id: id.to_string(),
            title: "Engineer".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn splits_new_from_known() {
        let known: HashSet<String> = ["greenhouse:acme:1".to_string()].into_iter().collect();
        let result = partition(vec![job("greenhouse:acme:1"), job("greenhouse:acme:2")], &known);
        assert_eq!(result.new_jobs.len(), 1);
        assert_eq!(result.new_jobs[0].external_id, "greenhouse:acme:2");
        assert_eq!(result.duplicates.len(), 1);
    }

    #[test]
    fn within_batch_repeats_are_duplicates() {
        let result = partition(vec![job("a"), job("a"), job("b")], &HashSet::new());
        assert_eq!(result.new_jobs.len(), 2);
        assert_eq!(result.duplicates.len(), 1);
    }

    #[test]
    fn idempotent_against_updated_known_set() {
        let known: HashSet<String> = HashSet::new();
        let first = partition(vec![job("a"), job("b")], &known);
        assert_eq!(first.new_jobs.len(), 2);

        // Re-running the same output once the first run's ids are known
        // yields zero new insertions.
        let known: HashSet<String> =
            first.new_jobs.iter().map(|j| j.external_id.clone()).collect();
        let second = partition(vec![job("a"), job("b")], &known);
        assert!(second.new_jobs.is_empty());
        assert_eq!(second.duplicates.len(), 2);
    }
}
