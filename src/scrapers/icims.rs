//! iCIMS career portals. The portal search API sits behind a session
//! cookie and CSRF token that cannot be derived from the URL, so every
//! scrape starts with a browser bootstrap; bulk retrieval then runs over
//! plain HTTP with the captured artifacts.

use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
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

/// Characters that must not appear raw in a URL path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`');

pub struct Icims {
    client: HttpClient,
    request_opts: RequestOptions,
}

impl Icims {
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            request_opts: RequestOptions::default(),
        }
    }

    /// Portal host plus tenant, from `careers-{tenant}.icims.com`.
    fn parse_portal(url: &str, override_token: Option<&str>) -> Result<(String, String), ScrapeError> {
        let host = url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(url)
            .split('/')
            .next()
            .unwrap_or("")
            .to_string();

        if let Some(token) = override_token {
            return Ok((host, token.to_string()));
        }

        let tenant = host
            .strip_suffix(".icims.com")
            .and_then(|h| h.strip_prefix("careers-").or(Some(h)))
            .unwrap_or("")
            .to_string();
        if tenant.is_empty() {
            return Err(ScrapeError::MissingBoardToken(url.to_string()));
        }
        Ok((host, tenant))
    }

    async fn search_page(
        &self,
        host: &str,
        headers: &HeaderMap,
        page: usize,
    ) -> Result<Value, ScrapeError> {
        let url = format!("https://{host}/api/search/jobs");
        let body = json!({
            "page": page,
            "pageSize": PAGE_SIZE,
            "ss": 1,
            "searchRelation": "keyword_all"
        });
        Ok(self
            .client
            .post_json(&url, Some(headers.clone()), &body, &self.request_opts)
            .await?)
    }

    fn to_scraped(&self, ext_id: &str, listing: &Value, detail: &Value) -> ScrapedJob {
        let location = listing
            .get("location")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let (description, description_format) = detail
            .get("description")
            .or_else(|| listing.get("description"))
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
            url: listing.get("jobUrl").and_then(|v| v.as_str()).map(String::from),
            location_type: derive_location_type(&location, None),
            location,
            department: listing
                .get("department")
                .and_then(|v| v.as_str())
                .map(String::from),
            description,
            description_format,
            employment_type: listing
                .get("positionType")
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
impl JobScraper for Icims {
    fn platform(&self) -> &'static str {
        "icims"
    }

    fn validate(&self, url: &str) -> bool {
        url.contains(".icims.com")
    }

    async fn scrape(
        &self,
        url: &str,
        opts: &ScrapeOptions,
    ) -> Result<ScrapeOutcome, ScrapeError> {
        let (host, tenant) = Self::parse_portal(url, opts.board_token.as_deref())?;

        // No anonymous path here: the portal issues its session only to a
        // real page load.
        let session = bootstrap_session(url, BOOTSTRAP_WAIT)
            .await?
            .ok_or_else(|| ScrapeError::SessionBootstrap(url.to_string()))?;
        let headers = session_headers(&session)?;

        let first = self.search_page(&host, &headers, 0).await?;
        let total = first.get("total").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
        let mut listings = jobs_of(&first)?;

        let page_count = total.div_ceil(PAGE_SIZE);
        let host_ref = host.as_str();
        let headers_ref = &headers;
        let pages = fetch_batched((1..page_count).collect(), LIST_CONCURRENCY, |page| async move {
            self.search_page(host_ref, headers_ref, page).await
        })
        .await;
        for page in &pages {
            listings.extend(jobs_of(page)?);
        }

        let stubs: Vec<JobStub<Value>> = listings
            .iter()
            .filter_map(|raw| {
                let id_value = raw.get("id")?;
                let native_id = id_value
                    .as_i64()
                    .map(|n| n.to_string())
                    .or_else(|| id_value.as_str().map(String::from))?;
                Some(JobStub {
                    external_id: external_id(self.platform(), &tenant, &native_id),
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
            let detail_url = format!(
                "https://{host_ref}/api/jobs/{}",
                utf8_percent_encode(&native_id, PATH_SEGMENT)
            );
            let detail = self
                .client
                .get_json(&detail_url, Some(headers_ref.clone()), &self.request_opts)
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
    page.get("jobs")
        .and_then(|v| v.as_array())
        .cloned()
        .ok_or_else(|| ScrapeError::Parse("iCIMS response missing 'jobs'".into()))
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
    fn parses_portal_host_and_tenant() {
        let (host, tenant) =
            Icims::parse_portal("https://careers-acme.icims.com/jobs/search?ss=1", None).unwrap();
        assert_eq!(host, "careers-acme.icims.com");
        assert_eq!(tenant, "acme");
    }

    #[test]
    fn override_token_replaces_tenant() {
        let (_, tenant) =
            Icims::parse_portal("https://careers-acme.icims.com/jobs", Some("acme-corp")).unwrap();
        assert_eq!(tenant, "acme-corp");
    }

    #[test]
    fn non_icims_host_fails() {
        assert!(Icims::parse_portal("https://jobs.acme.com", None).is_err());
    }
}
