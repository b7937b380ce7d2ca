//! Greenhouse job boards. Public JSON API, no session required. The
//! primary boards API takes `content=true`; some boards only expose the
//! embed endpoint, which is used as a fallback.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::ScrapeError;
use crate::http::{HttpClient, RequestOptions};
use crate::scrapers::content::normalize_description;
use crate::scrapers::{
    derive_location_type, external_id, fetch_batched, triage, JobScraper, JobStub, ScrapeOptions,
    ScrapeOutcome, ScrapedJob, DETAIL_CONCURRENCY,
};

const BOARDS_API: &str = "https://boards-api.greenhouse.io/v1/boards";
const EMBED_API: &str = "https://api.greenhouse.io/v1/boards";

pub struct Greenhouse {
    client: HttpClient,
    request_opts: RequestOptions,
}

impl Greenhouse {
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            request_opts: RequestOptions::default(),
        }
    }

    /// Board token from `boards.greenhouse.io/{token}` or a `for=` query
    /// parameter on embedded boards.
    fn board_token(url: &str, override_token: Option<&str>) -> Result<String, ScrapeError> {
        if let Some(token) = override_token {
            return Ok(token.to_string());
        }
        if let Some(query) = url.split_once('?').map(|(_, q)| q)
            && let Some(token) = query
                .split('&')
                .find_map(|p| p.strip_prefix("for="))
                .filter(|t| !t.is_empty())
        {
            return Ok(token.to_string());
        }
        let path = url
            .split_once("greenhouse.io/")
            .map(|(_, rest)| rest)
            .unwrap_or("");
        let token = path.split(['/', '?']).next().unwrap_or("");
        if token.is_empty() {
            return Err(ScrapeError::MissingBoardToken(url.to_string()));
        }
        Ok(token.to_string())
    }

    async fn list_jobs(&self, token: &str) -> Result<Value, ScrapeError> {
        let primary = format!("{BOARDS_API}/{token}/jobs?content=true");
        match self.client.get_json(&primary, None, &self.request_opts).await {
            Ok(v) => Ok(v),
            Err(e) if e.is_client_error() => {
                let fallback = format!("{EMBED_API}/{token}/embed/jobs?content=true");
                tracing::debug!("Greenhouse boards API rejected {token}, trying embed endpoint");
                Ok(self
                    .client
                    .get_json(&fallback, None, &self.request_opts)
                    .await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn job_detail(&self, token: &str, job_id: &str) -> Result<Value, ScrapeError> {
        let url = format!("{BOARDS_API}/{token}/jobs/{job_id}");
        Ok(self.client.get_json(&url, None, &self.request_opts).await?)
    }
}

#[async_trait]
impl JobScraper for Greenhouse {
    fn platform(&self) -> &'static str {
        "greenhouse"
    }

    fn validate(&self, url: &str) -> bool {
        url.contains("greenhouse.io")
    }

    async fn scrape(
        &self,
        url: &str,
        opts: &ScrapeOptions,
    ) -> Result<ScrapeOutcome, ScrapeError> {
        let token = Self::board_token(url, opts.board_token.as_deref())?;
        let listing = self.list_jobs(&token).await?;

        let raw_jobs = listing
            .get("jobs")
            .and_then(|v| v.as_array())
            .ok_or_else(|| ScrapeError::Parse("Greenhouse response missing 'jobs'".into()))?;

        let stubs: Vec<JobStub<Value>> = raw_jobs
            .iter()
            .filter_map(|raw| {
                let native_id = raw.get("id").and_then(value_as_id)?;
                Some(JobStub {
                    external_id: external_id(self.platform(), &token, &native_id),
                    title: str_field(raw, "title").unwrap_or_default(),
                    location: raw
                        .get("location")
                        .and_then(|l| l.get("name"))
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    payload: raw.clone(),
                })
            })
            .collect();

        let triaged = triage(stubs, opts);

        // content=true usually inlines descriptions; fetch the rest.
        let token_ref = &token;
        let jobs = fetch_batched(triaged.keep, DETAIL_CONCURRENCY, |stub| async move {
            let mut raw = stub.payload;
            if str_field(&raw, "content").is_none_or(|c| c.trim().is_empty()) {
                let native_id = raw
                    .get("id")
                    .and_then(value_as_id)
                    .ok_or_else(|| ScrapeError::Parse("job lost its id".into()))?;
                raw = self.job_detail(token_ref, &native_id).await?;
            }
            Ok(self.to_scraped(&stub.external_id, &raw))
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

impl Greenhouse {
    fn to_scraped(&self, ext_id: &str, raw: &Value) -> ScrapedJob {
        let location = raw
            .get("location")
            .and_then(|l| l.get("name"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let (description, description_format) = match str_field(raw, "content") {
            // Greenhouse escapes the HTML payload.
            Some(content) => {
                let (d, f) = normalize_description(&unescape_entities(&content));
                (Some(d).filter(|d| !d.is_empty()), f)
            }
            None => (None, Default::default()),
        };

        ScrapedJob {
            external_id: ext_id.to_string(),
            title: str_field(raw, "title").unwrap_or_default(),
            url: str_field(raw, "absolute_url"),
            location_type: derive_location_type(&location, None),
            location,
            department: raw
                .get("departments")
                .and_then(|d| d.as_array())
                .and_then(|a| a.first())
                .and_then(|d| d.get("name"))
                .and_then(|v| v.as_str())
                .map(String::from),
            description,
            description_format,
            employment_type: None,
            posted_at: str_field(raw, "first_published")
                .or_else(|| str_field(raw, "updated_at"))
                .and_then(|s| parse_rfc3339(&s)),
        }
    }
}

fn str_field(raw: &Value, key: &str) -> Option<String> {
    raw.get(key).and_then(|v| v.as_str()).map(String::from)
}

fn value_as_id(v: &Value) -> Option<String> {
    v.as_i64()
        .map(|n| n.to_string())
        .or_else(|| v.as_str().map(String::from))
}

pub(crate) fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn unescape_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn board_token_from_path_query_and_override() {
        assert_eq!(
            Greenhouse::board_token("https://boards.greenhouse.io/acme", None).unwrap(),
            "acme"
        );
        assert_eq!(
            Greenhouse::board_token("https://job-boards.greenhouse.io/acme/jobs/1", None)
                .unwrap(),
            "acme"
        );
        assert_eq!(
            Greenhouse::board_token("https://acme.com/careers?for=acmeinc", None).unwrap(),
            "acmeinc"
        );
        assert_eq!(
            Greenhouse::board_token("https://boards.greenhouse.io/acme", Some("other")).unwrap(),
            "other"
        );
        assert!(Greenhouse::board_token("https://greenhouse.io/", None).is_err());
    }

    #[test]
    fn converts_listing_entry() {
        let gh = Greenhouse::new(HttpClient::new().unwrap());
        let raw = serde_json::json!({
            "id": 1234,
            "title": "Rust Engineer",
            "absolute_url": "https://boards.greenhouse.io/acme/jobs/1234",
            "location": {"name": "Remote - India"},
            "departments": [{"name": "Engineering"}],
            "content": "&lt;p&gt;Build &amp; ship.&lt;/p&gt;",
            "updated_at": "2026-05-01T10:00:00Z"
        });
        let job = gh.to_scraped("greenhouse:acme:1234", &raw);
        assert_eq!(job.title, "Rust Engineer");
        assert_eq!(job.location_type.as_str(), "remote");
        assert_eq!(job.department.as_deref(), Some("Engineering"));
        let desc = job.description.unwrap();
        assert!(desc.contains("Build & ship."));
        assert!(job.posted_at.is_some());
    }
}
