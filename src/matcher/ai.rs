//! Chat-completions scoring client. Any OpenAI-compatible endpoint works
//! (hosted or local); the provider id picks the base URL.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::http::{HttpClient, HttpError, RequestOptions};
use crate::matcher::engine::{MatchErrorKind, MatchFailure};

const OPENAI_BASE: &str = "https://api.openai.com/v1";
const OLLAMA_BASE: &str = "http://localhost:11434/v1";

#[derive(Debug, Clone)]
pub struct ScoredMatch {
    /// 0-100 fit against the candidate profile.
    pub score: i32,
    pub reasons: Vec<String>,
    pub model: String,
}

#[derive(Debug, Deserialize)]
struct ScorePayload {
    score: i32,
    #[serde(default)]
    reasons: Vec<String>,
}

#[derive(Clone)]
pub struct ScoringClient {
    http: HttpClient,
    base_url: String,
    api_key: Option<String>,
    model: String,
    reasoning_effort: Option<String>,
}

impl ScoringClient {
    /// Factory: model identifier, reasoning-effort hint and optional
    /// provider id resolve to an invocable client.
    pub fn for_model(
        http: HttpClient,
        model: &str,
        reasoning_effort: Option<&str>,
        provider: Option<&str>,
        api_key: Option<&str>,
    ) -> Self {
        let base_url = match provider {
            Some("ollama") => OLLAMA_BASE.to_string(),
            Some(custom) if custom.starts_with("http") => custom.trim_end_matches('/').to_string(),
            _ => OPENAI_BASE.to_string(),
        };
        Self {
            http,
            base_url,
            api_key: api_key.map(String::from),
            model: model.to_string(),
            reasoning_effort: reasoning_effort.map(String::from),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Score one job description against the candidate profile. The
    /// engine owns retries and the overall timeout, so a single attempt
    /// is made here.
    pub async fn score_job(
        &self,
        profile: &str,
        job_title: &str,
        job_description: &str,
    ) -> Result<ScoredMatch, MatchFailure> {
        let mut body = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You score job openings against a candidate profile. Respond with strict JSON: {\"score\": <0-100 integer>, \"reasons\": [<short strings>]}. No prose outside the JSON."
                },
                {
                    "role": "user",
                    "content": format!(
                        "Candidate profile:\n{profile}\n\nJob: {job_title}\n\n{job_description}"
                    )
                }
            ],
            "temperature": 0.2
        });
        if let Some(effort) = &self.reasoning_effort {
            body["reasoning_effort"] = json!(effort);
        }

        let mut headers = HeaderMap::new();
        if let Some(key) = &self.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {key}")).map_err(|_| {
                MatchFailure {
                    kind: MatchErrorKind::Provider,
                    message: "API key is not a valid header value".to_string(),
                }
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        let opts = RequestOptions {
            timeout: Duration::from_secs(120),
            max_retries: 0,
            ..Default::default()
        };
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post_json(&url, Some(headers), &body, &opts)
            .await
            .map_err(provider_failure)?;

        let content = response
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| MatchFailure {
                kind: MatchErrorKind::Parse,
                message: "response had no message content".to_string(),
            })?;

        let payload = parse_score_payload(content)?;
        let model = response
            .get("model")
            .and_then(|v| v.as_str())
            .unwrap_or(&self.model)
            .to_string();

        Ok(ScoredMatch {
            score: payload.score.clamp(0, 100),
            reasons: payload.reasons,
            model,
        })
    }
}

fn provider_failure(e: HttpError) -> MatchFailure {
    let kind = match &e {
        HttpError::Timeout { .. } => MatchErrorKind::Timeout,
        HttpError::Decode { .. } => MatchErrorKind::Parse,
        _ => MatchErrorKind::Provider,
    };
    MatchFailure {
        kind,
        message: e.to_string(),
    }
}

/// Models wrap JSON in code fences more often than not.
fn parse_score_payload(content: &str) -> Result<ScorePayload, MatchFailure> {
    let trimmed = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    serde_json::from_str::<ScorePayload>(trimmed).map_err(|e| MatchFailure {
        kind: MatchErrorKind::Parse,
        message: format!("unparseable score payload: {e}"),
    })
}

pub fn match_metadata(scored: &ScoredMatch) -> Value {
    json!({
        "reasons": scored.reasons,
        "model": scored.model,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_and_fenced_payloads() {
        let bare = parse_score_payload(r#"{"score": 85, "reasons": ["rust", "remote"]}"#).unwrap();
        assert_eq!(bare.score, 85);
        assert_eq!(bare.reasons.len(), 2);

        let fenced =
            parse_score_payload("```json\n{\"score\": 40, \"reasons\": []}\n```").unwrap();
        assert_eq!(fenced.score, 40);

        assert!(parse_score_payload("The candidate fits well.").is_err());
    }

    #[test]
    fn provider_selection() {
        let http = HttpClient::new().unwrap();
        let openai = ScoringClient::for_model(http.clone(), "gpt-4o-mini", None, None, None);
        assert_eq!(openai.base_url, OPENAI_BASE);

        let ollama =
            ScoringClient::for_model(http.clone(), "llama3", None, Some("ollama"), None);
        assert_eq!(ollama.base_url, OLLAMA_BASE);

        let custom = ScoringClient::for_model(
            http,
            "m",
            Some("low"),
            Some("https://llm.internal/v1/"),
            None,
        );
        assert_eq!(custom.base_url, "https://llm.internal/v1");
    }
}
