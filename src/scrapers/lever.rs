//! Lever postings. Public JSON API keyed by site handle; everything,
//! including descriptions, comes back in the single list call.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::ScrapeError;
use crate::http::{HttpClient, RequestOptions};
use crate::scrapers::content::normalize_description;
use crate::scrapers::{
    derive_location_type, external_id, triage, JobScraper, JobStub, ScrapeOptions, ScrapeOutcome,
    ScrapedJob,
};

const API_BASE: &str = "https://api.lever.co/v0/postings";

pub struct Lever {
    client: HttpClient,
    request_opts: RequestOptions,
}

impl Lever {
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            request_opts: RequestOptions::default(),
        }
    }

    fn site_handle(url: &str, override_token: Option<&str>) -> Result<String, ScrapeError> {
        if let Some(token) = override_token {
            return Ok(token.to_string());
        }
        let path = url
            .split_once("lever.co/")
            .map(|(_, rest)| rest)
            .unwrap_or("");
        let handle = path.split(['/', '?']).next().unwrap_or("");
        if handle.is_empty() {
            return Err(ScrapeError::MissingBoardToken(url.to_string()));
        }
        Ok(handle.to_string())
    }

    fn to_scraped(&self, ext_id: &str, raw: &Value) -> ScrapedJob {
        let categories = raw.get("categories");
        let location = categories
            .and_then(|c| c.get("location"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let workplace_type = raw.get("workplaceType").and_then(|v| v.as_str());

        let (description, description_format) = raw
            .get("description")
            .and_then(|v| v.as_str())
            .map(|html| {
                let (d, f) = normalize_description(html);
                (Some(d).filter(|d| !d.is_empty()), f)
            })
            .unwrap_or_default();

        ScrapedJob {
            external_id: ext_id.to_string(),
            title: raw
                .get("text")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            url: raw.get("hostedUrl").and_then(|v| v.as_str()).map(String::from),
            location_type: derive_location_type(&location, workplace_type),
            location,
            department: categories
                .and_then(|c| c.get("team").or_else(|| c.get("department")))
                .and_then(|v| v.as_str())
                .map(String::from),
            description,
            description_format,
            employment_type: categories
                .and_then(|c| c.get("commitment"))
                .and_then(|v| v.as_str())
                .map(String::from),
            posted_at: raw
                .get("createdAt")
                .and_then(|v| v.as_i64())
                .and_then(|ms| DateTime::<Utc>::from_timestamp_millis(ms)),
        }
    }
}

#[async_trait]
impl JobScraper for Lever {
    fn platform(&self) -> &'static str {
        "lever"
    }

    fn validate(&self, url: &str) -> bool {
        url.contains("lever.co")
    }

    async fn scrape(
        &self,
        url: &str,
        opts: &ScrapeOptions,
    ) -> Result<ScrapeOutcome, ScrapeError> {
        let handle = Self::site_handle(url, opts.board_token.as_deref())?;
        let list_url = format!("{API_BASE}/{handle}?mode=json");
        let listing = self.client.get_json(&list_url, None, &self.request_opts).await?;

        let raw_jobs = listing
            .as_array()
            .ok_or_else(|| ScrapeError::Parse("Lever response is not an array".into()))?;

        let stubs: Vec<JobStub<Value>> = raw_jobs
            .iter()
            .filter_map(|raw| {
                let native_id = raw.get("id").and_then(|v| v.as_str())?;
                Some(JobStub {
                    external_id: external_id(self.platform(), &handle, native_id),
                    title: raw
                        .get("text")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    location: raw
                        .get("categories")
                        .and_then(|c| c.get("location"))
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    payload: raw.clone(),
                })
            })
            .collect();

        let triaged = triage(stubs, opts);

        // No detail phase: the list payload is already complete.
        let jobs = triaged
            .keep
            .into_iter()
            .map(|stub| self.to_scraped(&stub.external_id, &stub.payload))
            .collect();

        Ok(ScrapeOutcome {
            jobs,
            listed_external_ids: triaged.listed_external_ids,
            jobs_found: triaged.jobs_found,
            filter_counts: triaged.filter_counts,
            duplicates_skipped: triaged.duplicates_skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_handle_from_url() {
        assert_eq!(
            Lever::site_handle("https://jobs.lever.co/acme", None).unwrap(),
            "acme"
        );
        assert_eq!(
            Lever::site_handle("https://jobs.eu.lever.co/acme/abc-123", None).unwrap(),
            "acme"
        );
        assert_eq!(
            Lever::site_handle("https://jobs.lever.co/acme", Some("acme-eu")).unwrap(),
            "acme-eu"
        );
        assert!(Lever::site_handle("https://jobs.lever.co/", None).is_err());
    }

    #[test]
    fn converts_posting() {
        let lever = Lever::new(HttpClient::new().unwrap());
        let raw = serde_json::json!({
            "id": "abc-123",
            "text": "Backend Engineer",
            "hostedUrl": "https://jobs.lever.co/acme/abc-123",
            "workplaceType": "remote",
            "categories": {
                "location": "Bengaluru, India",
                "team": "Platform",
                "commitment": "Full-time"
            },
            "description": "<p>Ship reliable services.</p>",
            "createdAt": 1767225600000i64
        });
        let job = lever.to_scraped("lever:acme:abc-123", &raw);
        assert_eq!(job.title, "Backend Engineer");
        assert_eq!(job.location_type.as_str(), "remote");
        assert_eq!(job.employment_type.as_deref(), Some("Full-time"));
        assert!(job.description.unwrap().contains("Ship reliable services."));
        assert!(job.posted_at.is_some());
    }
}
