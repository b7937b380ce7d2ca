use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::EventRequestWillBeSent;
use chromiumoxide::Page;
use futures::StreamExt;

use crate::error::ScrapeError;

/// Request header names that platforms use for their anti-CSRF token.
const CSRF_HEADER_NAMES: &[&str] = &[
    "x-csrf-token",
    "csrf-token",
    "x-xsrf-token",
    "x-calypso-csrf-token",
];

/// Session artifacts harvested from a headless-browser visit. Enough to
/// drive the platform's private API over plain HTTP afterwards.
#[derive(Debug, Clone)]
pub struct BrowserSession {
    pub base_url: String,
    pub cookies: Vec<(String, String)>,
    pub csrf_token: Option<String>,
    pub domain: Option<String>,
}

impl BrowserSession {
    /// Render the captured cookie jar as a `Cookie:` header value.
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Visit `url` in a throwaway headless browser, passively observing
/// outgoing requests until a CSRF-style token shows up (or the wait
/// expires), then capture the cookie jar. Returns `None` when nothing
/// usable was observed. The browser is torn down on every exit path.
pub async fn bootstrap_session(
    url: &str,
    wait: Duration,
) -> Result<Option<BrowserSession>, ScrapeError> {
    let config = BrowserConfig::builder()
        .no_sandbox()
        .build()
        .map_err(|e| ScrapeError::SessionBootstrap(format!("{url}: {e}")))?;

    let (mut browser, mut handler) = Browser::launch(config)
        .await
        .map_err(|e| ScrapeError::SessionBootstrap(format!("{url}: {e}")))?;

    let handler_task = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            let _ = event;
        }
    });

    let result = observe_session(&browser, url, wait).await;

    // Teardown happens regardless of what observation returned.
    if let Err(e) = browser.close().await {
        tracing::warn!("Failed to close browser cleanly: {e}");
    }
    let _ = browser.wait().await;
    handler_task.abort();

    result
}

async fn observe_session(
    browser: &Browser,
    url: &str,
    wait: Duration,
) -> Result<Option<BrowserSession>, ScrapeError> {
    let page = browser
        .new_page("about:blank")
        .await
        .map_err(|e| ScrapeError::SessionBootstrap(format!("{url}: {e}")))?;

    let mut requests = page
        .event_listener::<EventRequestWillBeSent>()
        .await
        .map_err(|e| ScrapeError::SessionBootstrap(format!("{url}: {e}")))?;

    page.goto(url)
        .await
        .map_err(|e| ScrapeError::SessionBootstrap(format!("{url}: {e}")))?;

    let mut csrf_token: Option<String> = None;
    let mut domain: Option<String> = None;

    // Watch outbound traffic until the token appears or the wait expires.
    // The cookie jar keeps filling either way, so a timeout without a
    // token can still yield a usable session for cookie-only platforms.
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, requests.next()).await {
            Ok(Some(event)) => {
                inspect_request(&event, &mut csrf_token, &mut domain);
                if csrf_token.is_some() && domain.is_some() {
                    break;
                }
            }
            Ok(None) | Err(_) => break,
        }
    }

    let cookies = page
        .get_cookies()
        .await
        .map_err(|e| ScrapeError::SessionBootstrap(format!("{url}: {e}")))?
        .into_iter()
        .map(|c| (c.name, c.value))
        .collect::<Vec<_>>();

    let base_url = page
        .url()
        .await
        .ok()
        .flatten()
        .unwrap_or_else(|| url.to_string());

    if cookies.is_empty() && csrf_token.is_none() {
        tracing::warn!("Bootstrap for {url} observed no cookies or token");
        return Ok(None);
    }

    Ok(Some(BrowserSession {
        base_url,
        cookies,
        csrf_token,
        domain,
    }))
}

fn inspect_request(
    event: &EventRequestWillBeSent,
    csrf_token: &mut Option<String>,
    domain: &mut Option<String>,
) {
    if csrf_token.is_none()
        && let Some(headers) = event.request.headers.inner().as_object()
    {
        for (name, value) in headers {
            if CSRF_HEADER_NAMES.contains(&name.to_ascii_lowercase().as_str())
                && let Some(v) = value.as_str()
            {
                *csrf_token = Some(v.to_string());
                break;
            }
        }
    }

    if domain.is_none() {
        *domain = extract_domain_param(&event.request.url);
    }
}

/// Tenant identifiers show up as a `domain=` query parameter on the
/// platform's own API calls (Phenom-style widget requests).
fn extract_domain_param(url: &str) -> Option<String> {
    let query = url.split_once('?')?.1;
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == "domain" && !v.is_empty()).then(|| v.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_domain_query_param() {
        assert_eq!(
            extract_domain_param("https://x.com/api/search?domain=acme.com&page=1"),
            Some("acme.com".to_string())
        );
        assert_eq!(extract_domain_param("https://x.com/api/search?page=1"), None);
        assert_eq!(extract_domain_param("https://x.com/api/search"), None);
        assert_eq!(extract_domain_param("https://x.com/?domain="), None);
    }

    #[test]
    fn cookie_header_joins_pairs() {
        let session = BrowserSession {
            base_url: "https://x.com".into(),
            cookies: vec![
                ("sid".into(), "abc".into()),
                ("csrf".into(), "def".into()),
            ],
            csrf_token: None,
            domain: None,
        };
        assert_eq!(session.cookie_header(), "sid=abc; csrf=def");
    }
}
