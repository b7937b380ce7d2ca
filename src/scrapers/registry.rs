use std::sync::Arc;

use crate::error::ScrapeError;
use crate::http::HttpClient;
use crate::scrapers::greenhouse::Greenhouse;
use crate::scrapers::icims::Icims;
use crate::scrapers::lever::Lever;
use crate::scrapers::phenom::Phenom;
use crate::scrapers::workday::Workday;
use crate::scrapers::JobScraper;

/// Pure routing layer: picks a scraper by explicit platform name or by
/// probing each scraper's `validate` in registration order.
pub struct ScraperRegistry {
    scrapers: Vec<Arc<dyn JobScraper>>,
}

impl ScraperRegistry {
    pub fn new(client: HttpClient) -> Self {
        Self {
            scrapers: vec![
                Arc::new(Greenhouse::new(client.clone())),
                Arc::new(Lever::new(client.clone())),
                Arc::new(Workday::new(client.clone())),
                Arc::new(Icims::new(client.clone())),
                Arc::new(Phenom::new(client)),
            ],
        }
    }

    pub fn supported(&self) -> Vec<&'static str> {
        self.scrapers.iter().map(|s| s.platform()).collect()
    }

    /// Resolve by explicit platform name if given, else by URL detection.
    pub fn resolve(
        &self,
        url: &str,
        platform: Option<&str>,
    ) -> Result<Arc<dyn JobScraper>, ScrapeError> {
        if let Some(name) = platform {
            return self
                .scrapers
                .iter()
                .find(|s| s.platform() == name)
                .cloned()
                .ok_or_else(|| self.unsupported(url));
        }

        self.scrapers
            .iter()
            .find(|s| s.validate(url))
            .cloned()
            .ok_or_else(|| self.unsupported(url))
    }

    fn unsupported(&self, url: &str) -> ScrapeError {
        ScrapeError::UnsupportedPlatform {
            url: url.to_string(),
            supported: self.supported().join(", "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ScraperRegistry {
        ScraperRegistry::new(HttpClient::new().unwrap())
    }

    #[test]
    fn detects_platform_from_url() {
        let r = registry();
        let cases = [
            ("https://boards.greenhouse.io/acme", "greenhouse"),
            ("https://jobs.lever.co/acme", "lever"),
            ("https://acme.wd5.myworkdayjobs.com/en-US/External", "workday"),
            ("https://careers-acme.icims.com/jobs/search", "icims"),
            ("https://careers.acme.com/us/en/search-results", "phenom"),
        ];
        for (url, platform) in cases {
            let scraper = r.resolve(url, None).unwrap();
            assert_eq!(scraper.platform(), platform, "for {url}");
        }
    }

    #[test]
    fn explicit_platform_wins() {
        let r = registry();
        let scraper = r.resolve("https://example.com/careers", Some("lever")).unwrap();
        assert_eq!(scraper.platform(), "lever");
    }

    #[test]
    fn unknown_url_lists_supported_platforms() {
        let r = registry();
        let err = r
            .resolve("https://example.com/careers", None)
            .err()
            .expect("unknown URL should not resolve");
        match err {
            ScrapeError::UnsupportedPlatform { supported, .. } => {
                for name in ["greenhouse", "lever", "workday", "icims", "phenom"] {
                    assert!(supported.contains(name));
                }
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
