//! Workday CXS scraper. The tenant and site are inferred from the
//! careers URL and the JSON API is probed directly; tenants that refuse
//! anonymous API calls get a browser-bootstrapped session (cookies plus
//! the Calypso CSRF token) and the probe is retried over plain HTTP.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{json, Value};

use crate::browser::{bootstrap_session, BrowserSession};
use crate::error::ScrapeError;
use crate::http::{HttpClient, RequestOptions};
use crate::scrapers::content::normalize_description;
use crate::scrapers::{
    derive_location_type, external_id, fetch_batched, triage, JobScraper, JobStub, ScrapeOptions,
    ScrapeOutcome, ScrapedJob, DETAIL_CONCURRENCY, LIST_CONCURRENCY,
};

const PAGE_SIZE: usize = 20;
const BOOTSTRAP_WAIT: Duration = Duration::from_secs(20);

pub struct Workday {
    client: HttpClient,
    request_opts: RequestOptions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Board {
    host: String,
    tenant: String,
    site: String,
}

impl Board {
    fn jobs_endpoint(&self) -> String {
        format!(
            "https://{}/wday/cxs/{}/{}/jobs",
            self.host, self.tenant, self.site
        )
    }

    fn detail_endpoint(&self, external_path: &str) -> String {
        format!(
            "https://{}/wday/cxs/{}/{}{}",
            self.host, self.tenant, self.site, external_path
        )
    }
}

impl Workday {
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            request_opts: RequestOptions::default(),
        }
    }

    /// `https://{tenant}.{dc}.myworkdayjobs.com[/locale]/{site}`. A manual
    /// board token of the form `tenant/site` overrides inference.
    fn parse_board(url: &str, override_token: Option<&str>) -> Result<Board, ScrapeError> {
        let host = url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(url)
            .split('/')
            .next()
            .unwrap_or("")
            .to_string();

        if let Some(token) = override_token
            && let Some((tenant, site)) = token.split_once('/')
        {
            return Ok(Board {
                host,
                tenant: tenant.to_string(),
                site: site.to_string(),
            });
        }

        if !host.contains("myworkdayjobs.com") {
            return Err(ScrapeError::MissingBoardToken(url.to_string()));
        }
        let tenant = host.split('.').next().unwrap_or("").to_string();

        let path = url
            .split_once(&host)
            .map(|(_, rest)| rest)
            .unwrap_or("")
            .trim_matches('/');
        // Skip a leading locale segment like en-US.
        let site = path
            .split('/')
            .filter(|s| !s.is_empty() && !is_locale(s))
            .next_back()
            .unwrap_or("")
            .to_string();

        if tenant.is_empty() || site.is_empty() {
            return Err(ScrapeError::MissingBoardToken(url.to_string()));
        }
        Ok(Board { host, tenant, site })
    }

    async fn fetch_page(
        &self,
        board: &Board,
        headers: Option<&HeaderMap>,
        offset: usize,
    ) -> Result<Value, ScrapeError> {
        let body = json!({
            "limit": PAGE_SIZE,
            "offset": offset,
            "searchText": "",
            "appliedFacets": {}
        });
        Ok(self
            .client
            .post_json(&board.jobs_endpoint(), headers.cloned(), &body, &self.request_opts)
            .await?)
    }

    /// Probe the API anonymously first; on a client-side rejection,
    /// bootstrap a browser session and retry with its artifacts.
    async fn first_page(
        &self,
        url: &str,
        board: &Board,
    ) -> Result<(Value, Option<HeaderMap>), ScrapeError> {
        match self.fetch_page(board, None, 0).await {
            Ok(page) => Ok((page, None)),
            Err(ScrapeError::Http(e)) if e.is_client_error() => {
                tracing::info!(
                    "Workday tenant {} refused anonymous access, bootstrapping session",
                    board.tenant
                );
                let session = bootstrap_session(url, BOOTSTRAP_WAIT)
                    .await?
                    .ok_or_else(|| ScrapeError::SessionBootstrap(url.to_string()))?;
                let headers = session_headers(&session)?;
                let page = self.fetch_page(board, Some(&headers), 0).await?;
                Ok((page, Some(headers)))
            }
            Err(e) => Err(e),
        }
    }

    fn to_scraped(&self, ext_id: &str, listing: &Value, detail: &Value) -> ScrapedJob {
        let info = detail.get("jobPostingInfo").unwrap_or(detail);
        let location = info
            .get("location")
            .and_then(|v| v.as_str())
            .or_else(|| listing.get("locationsText").and_then(|v| v.as_str()))
            .unwrap_or_default()
            .to_string();
        let remote_hint = info.get("remoteType").and_then(|v| v.as_str());

        let (description, description_format) = info
            .get("jobDescription")
            .and_then(|v| v.as_str())
            .map(|html| {
                let (d, f) = normalize_description(html);
                (Some(d).filter(|d| !d.is_empty()), f)
            })
            .unwrap_or_default();

        ScrapedJob {
            external_id: ext_id.to_string(),
            title: info
                .get("title")
                .and_then(|v| v.as_str())
                .or_else(|| listing.get("title").and_then(|v| v.as_str()))
                .unwrap_or_default()
                .to_string(),
            url: info.get("externalUrl").and_then(|v| v.as_str()).map(String::from),
            location_type: derive_location_type(&location, remote_hint),
            location,
            department: info
                .get("jobFamily")
                .and_then(|v| v.as_str())
                .map(String::from),
            description,
            description_format,
            employment_type: info.get("timeType").and_then(|v| v.as_str()).map(String::from),
            posted_at: info
                .get("startDate")
                .and_then(|v| v.as_str())
                .and_then(parse_date),
        }
    }
}

#[async_trait]
impl JobScraper for Workday {
    fn platform(&self) -> &'static str {
        "workday"
    }

    fn validate(&self, url: &str) -> bool {
        url.contains("myworkdayjobs.com") || url.contains("myworkdaysite.com")
    }

    async fn scrape(
        &self,
        url: &str,
        opts: &ScrapeOptions,
    ) -> Result<ScrapeOutcome, ScrapeError> {
        let board = Self::parse_board(url, opts.board_token.as_deref())?;
        let (first, headers) = self.first_page(url, &board).await?;

        let total = first.get("total").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
        let mut postings = postings_of(&first)?;

        // Page 0 told us the total; fetch the rest with bounded parallelism.
        let offsets: Vec<usize> = (PAGE_SIZE..total).step_by(PAGE_SIZE).collect();
        let board_ref = &board;
        let headers_ref = headers.as_ref();
        let pages = fetch_batched(offsets, LIST_CONCURRENCY, |offset| async move {
            self.fetch_page(board_ref, headers_ref, offset).await
        })
        .await;
        for page in &pages {
            postings.extend(postings_of(page)?);
        }

        let stubs: Vec<JobStub<Value>> = postings
            .iter()
            .filter_map(|raw| {
                let native_id = raw
                    .get("bulletFields")
                    .and_then(|v| v.as_array())
                    .and_then(|a| a.first())
                    .and_then(|v| v.as_str())
                    .map(String::from)
                    .or_else(|| {
                        raw.get("externalPath").and_then(|v| v.as_str()).map(|p| {
                            p.rsplit('/').next().unwrap_or(p).to_string()
                        })
                    })?;
                Some(JobStub {
                    external_id: external_id(self.platform(), &board.tenant, &native_id),
                    title: raw
                        .get("title")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    location: raw
                        .get("locationsText")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    payload: raw.clone(),
                })
            })
            .collect();

        let triaged = triage(stubs, opts);

        let jobs = fetch_batched(triaged.keep, DETAIL_CONCURRENCY, |stub| async move {
            let path = stub
                .payload
                .get("externalPath")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ScrapeError::Parse("posting missing externalPath".into()))?;
            let detail = self
                .client
                .get_json(
                    &board_ref.detail_endpoint(path),
                    headers_ref.cloned(),
                    &self.request_opts,
                )
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

fn postings_of(page: &Value) -> Result<Vec<Value>, ScrapeError> {
    page.get("jobPostings")
        .and_then(|v| v.as_array())
        .cloned()
        .ok_or_else(|| ScrapeError::Parse("Workday response missing 'jobPostings'".into()))
}

fn session_headers(session: &BrowserSession) -> Result<HeaderMap, ScrapeError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("cookie"),
        HeaderValue::from_str(&session.cookie_header())
            .map_err(|_| ScrapeError::SessionBootstrap("unusable cookie header".into()))?,
    );
    if let Some(token) = &session.csrf_token {
        headers.insert(
            HeaderName::from_static("x-calypso-csrf-token"),
            HeaderValue::from_str(token)
                .map_err(|_| ScrapeError::SessionBootstrap("unusable csrf token".into()))?,
        );
    }
    Ok(headers)
}

fn is_locale(segment: &str) -> bool {
    let mut parts = segment.splitn(2, '-');
    let lang = parts.next().unwrap_or("");
    let region = parts.next();
    lang.len() == 2
        && lang.chars().all(|c| c.is_ascii_lowercase())
        && region.is_none_or(|r| r.len() == 2 && r.chars().all(|c| c.is_ascii_uppercase()))
}

fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_board_from_url() {
        let board = Workday::parse_board(
            "https://acme.wd5.myworkdayjobs.com/en-US/ExternalCareers",
            None,
        )
        .unwrap();
        assert_eq!(board.tenant, "acme");
        assert_eq!(board.site, "ExternalCareers");
        assert_eq!(board.host, "acme.wd5.myworkdayjobs.com");
        assert_eq!(
            board.jobs_endpoint(),
            "https://acme.wd5.myworkdayjobs.com/wday/cxs/acme/ExternalCareers/jobs"
        );
    }

    #[test]
    fn board_without_locale_segment() {
        let board =
            Workday::parse_board("https://acme.wd1.myworkdayjobs.com/Careers", None).unwrap();
        assert_eq!(board.site, "Careers");
    }

    #[test]
    fn override_token_sets_tenant_and_site() {
        let board = Workday::parse_board(
            "https://jobs.acme.com/search",
            Some("acmecorp/External"),
        )
        .unwrap();
        assert_eq!(board.tenant, "acmecorp");
        assert_eq!(board.site, "External");
        assert_eq!(board.host, "jobs.acme.com");
    }

    #[test]
    fn non_workday_url_without_override_fails() {
        assert!(Workday::parse_board("https://jobs.acme.com/search", None).is_err());
    }

    #[test]
    fn locale_detection() {
        assert!(is_locale("en-US"));
        assert!(is_locale("de"));
        assert!(!is_locale("Careers"));
        assert!(!is_locale("external"));
    }
}
