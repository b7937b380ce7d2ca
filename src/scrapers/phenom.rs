//! Phenom-powered career sites (the `/us/en/search-results` pattern on a
//! company's own domain). The widget API wants a generated CSRF token and
//! a `ph-domain` tenant identifier, both of which only appear in the
//! traffic of a real page load, so this scraper always bootstraps.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{json, Value};

use crate::browser::{bootstrap_session, BrowserSession};
use crate::error::ScrapeError;
use crate::http::{HttpClient, RequestOptions};
use crate::scrapers::content::normalize_description;
use crate::scrapers::greenhouse::parse_rfc3339;
use crate::scrapers::{
    derive_location_type, external_id, fetch_batched, triage, JobScraper, JobStub, ScrapeOptions,
    ScrapeOutcome, ScrapedJob, DETAIL_CONCURRENCY, LIST_CONCURRENCY,
};

const PAGE_SIZE: usize = 50;
const BOOTSTRAP_WAIT: Duration = Duration::from_secs(20);

pub struct Phenom {
    client: HttpClient,
    request_opts: RequestOptions,
}

impl Phenom {
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            request_opts: RequestOptions::default(),
        }
    }

    fn widgets_endpoint(url: &str) -> Result<String, ScrapeError> {
        let host = url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(url)
            .split('/')
            .next()
            .unwrap_or("");
        if host.is_empty() {
            return Err(ScrapeError::MissingBoardToken(url.to_string()));
        }
        Ok(format!("https://{host}/widgets"))
    }

    async fn search_page(
        &self,
        endpoint: &str,
        headers: &HeaderMap,
        domain: &str,
        from: usize,
    ) -> Result<Value, ScrapeError> {
        let body = json!({
            "ddoKey": "refineSearch",
            "domain": domain,
            "from": from,
            "size": PAGE_SIZE,
            "keywords": "",
            "global": true,
            "selected_fields": {},
        });
        Ok(self
            .client
            .post_json(endpoint, Some(headers.clone()), &body, &self.request_opts)
            .await?)
    }

    async fn job_detail(
        &self,
        endpoint: &str,
        headers: &HeaderMap,
        domain: &str,
        job_id: &str,
    ) -> Result<Value, ScrapeError> {
        let body = json!({
            "ddoKey": "jobDetail",
            "domain": domain,
            "jobId": job_id,
        });
        Ok(self
            .client
            .post_json(endpoint, Some(headers.clone()), &body, &self.request_opts)
            .await?)
    }

    fn to_scraped(&self, ext_id: &str, listing: &Value, detail: &Value) -> ScrapedJob {
        let location = listing
            .get("location")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let remote_hint = listing.get("workType").and_then(|v| v.as_str());

        let (description, description_format) = detail
            .get("jobDetail")
            .and_then(|d| d.get("description"))
            .or_else(|| listing.get("descriptionTeaser"))
            .and_then(|v| v.as_str())
            .map(|html| {
                let (d, f) = normalize_description(html);
                (Some(d).filter(|d| !d.is_empty()), f)
            })
            .unwrap_or_default();

        ScrapedJob {
            external_id: ext_id.to_string(),
            title: listing
                .get("title")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            url: listing
                .get("applyUrl")
                .or_else(|| listing.get("jobUrl"))
                .and_then(|v| v.as_str())
                .map(String::from),
            location_type: derive_location_type(&location, remote_hint),
            location,
            department: listing
                .get("category")
                .and_then(|v| v.as_str())
                .map(String::from),
            description,
            description_format,
            employment_type: listing
                .get("type")
                .and_then(|v| v.as_str())
                .map(String::from),
            posted_at: listing
                .get("postedDate")
                .and_then(|v| v.as_str())
                .and_then(parse_rfc3339),
        }
    }
}

#[async_trait]
impl JobScraper for Phenom {
    fn platform(&self) -> &'static str {
        "phenom"
    }

    fn validate(&self, url: &str) -> bool {
        url.contains("/search-results") || url.contains("phenompeople.com")
    }

    async fn scrape(
        &self,
        url: &str,
        opts: &ScrapeOptions,
    ) -> Result<ScrapeOutcome, ScrapeError> {
        let endpoint = Self::widgets_endpoint(url)?;

        let session = bootstrap_session(url, BOOTSTRAP_WAIT)
            .await?
            .ok_or_else(|| ScrapeError::SessionBootstrap(url.to_string()))?;
        let headers = session_headers(&session)?;

        // The tenant identifier observed in traffic beats the override,
        // which beats falling back to the page's own host.
        let domain = session
            .domain
            .clone()
            .or_else(|| opts.board_token.clone())
            .unwrap_or_else(|| {
                endpoint
                    .trim_start_matches("https://")
                    .trim_end_matches("/widgets")
                    .to_string()
            });

        let first = self.search_page(&endpoint, &headers, &domain, 0).await?;
        let total = first
            .pointer("/refineSearch/totalHits")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as usize;
        let mut listings = jobs_of(&first)?;

        let offsets: Vec<usize> = (PAGE_SIZE..total).step_by(PAGE_SIZE).collect();
        let endpoint_ref = endpoint.as_str();
        let headers_ref = &headers;
        let domain_ref = domain.as_str();
        let pages = fetch_batched(offsets, LIST_CONCURRENCY, |from| async move {
            self.search_page(endpoint_ref, headers_ref, domain_ref, from).await
        })
        .await;
        for page in &pages {
            listings.extend(jobs_of(page)?);
        }

        let stubs: Vec<JobStub<Value>> = listings
            .iter()
            .filter_map(|raw| {
                let native_id = raw.get("jobId").and_then(|v| v.as_str())?;
                Some(JobStub {
                    external_id: external_id(self.platform(), &domain, native_id),
                    title: raw
                        .get("title")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    location: raw
                        .get("location")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    payload: raw.clone(),
                })
            })
            .collect();

        let triaged = triage(stubs, opts);

        let jobs = fetch_batched(triaged.keep, DETAIL_CONCURRENCY, |stub| async move {
            let native_id = stub
                .external_id
                .rsplit(':')
                .next()
                .unwrap_or_default()
                .to_string();
            let detail = self
                .job_detail(endpoint_ref, headers_ref, domain_ref, &native_id)
                .await?;
            Ok(self.to_scraped(&stub.external_id, &stub.payload, &detail))
        })
        .await;

        Ok(ScrapeOutcome {
            jobs,
            listed_external_ids: triaged.listed_external_ids,
            jobs_found: triaged.jobs_found,
            filter_counts: triaged.filter_counts,
            duplicates_skipped: triaged.duplicates_skipped,
        })
    }
}

fn jobs_of(page: &Value) -> Result<Vec<Value>, ScrapeError> {
    page.pointer("/refineSearch/data/jobs")
        .and_then(|v| v.as_array())
        .cloned()
        .ok_or_else(|| ScrapeError::Parse("Phenom response missing job list".into()))
}

fn session_headers(session: &BrowserSession) -> Result<HeaderMap, ScrapeError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("cookie"),
        HeaderValue::from_str(&session.cookie_header())
            .map_err(|_| ScrapeError::SessionBootstrap("unusable cookie header".into()))?,
    );
    let token = session
        .csrf_token
        .as_deref()
        .ok_or_else(|| ScrapeError::SessionBootstrap("no CSRF token observed".into()))?;
    headers.insert(
        HeaderName::from_static("x-csrf-token"),
        HeaderValue::from_str(token)
            .map_err(|_| ScrapeError::SessionBootstrap("unusable csrf token".into()))?,
    );
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widgets_endpoint_from_careers_url() {
        assert_eq!(
            Phenom::widgets_endpoint("https://careers.acme.com/us/en/search-results").unwrap(),
            "https://careers.acme.com/widgets"
        );
    }

    #[test]
    fn validates_search_results_urls() {
        let phenom = Phenom::new(HttpClient::new().unwrap());
        assert!(phenom.validate("https://careers.acme.com/us/en/search-results"));
        assert!(phenom.validate("https://acme.phenompeople.com/"));
        assert!(!phenom.validate("https://boards.greenhouse.io/acme"));
    }
}
