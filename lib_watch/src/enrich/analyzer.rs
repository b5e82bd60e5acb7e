//! # Warning Analyzer
//!
//! Calls an OpenAI-style chat-completions endpoint to turn a warning's
//! category and payload into structured root-cause/impact/next-steps text.
//! Every failure mode — missing configuration, transport error, non-2xx
//! status, or a reply that is not the expected JSON — collapses into the
//! placeholder analysis.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::flagging::RawEvent;

/// Request timeout for one analysis call.
const ANALYSIS_TIMEOUT: Duration = Duration::from_secs(10);

/// Structured analysis attached to a warning before delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub root_cause: Vec<String>,
    pub impact: Vec<String>,
    pub next_steps: Vec<String>,
}

impl Analysis {
    /// The fixed fallback used whenever the analysis service is unavailable.
    pub fn placeholder() -> Self {
        Self {
            root_cause: vec!["Analysis service temporarily unavailable".to_string()],
            impact: vec!["Unable to assess risk level".to_string()],
            next_steps: vec![
                "Retry analysis".to_string(),
                "Manual review recommended".to_string(),
            ],
        }
    }
}

/// Settings for the analyzer. With `api_url` or `api_key` unset the analyzer
/// short-circuits to the placeholder without any network traffic.
#[derive(Debug, Clone, Default)]
pub struct AnalyzerConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
}

#[derive(Debug, Error)]
enum AnalyzeError {
    #[error("analysis API not configured")]
    NotConfigured,
    #[error("analysis request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("analysis API returned status {0}")]
    Status(u16),
    #[error("analysis reply was not the expected shape: {0}")]
    Malformed(String),
}

/// Chat-completions reply envelope, reduced to the fields we read.
#[derive(Debug, Deserialize)]
struct CompletionReply {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: String,
}

/// Client for the enrichment endpoint.
pub struct Analyzer {
    http: reqwest::Client,
    config: AnalyzerConfig,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(ANALYSIS_TIMEOUT)
                .build()
                .unwrap_or_default(),
            config,
        }
    }

    /// Analyzes one warning. Infallible by design: any internal error is
    /// logged and replaced by [`Analysis::placeholder`].
    pub async fn analyze(&self, category: &str, payload: &RawEvent, warning_id: i64) -> Analysis {
        match self.request_analysis(category, payload).await {
            Ok(analysis) => analysis,
            Err(e) => {
                log::warn!(
                    "analysis unavailable for warning {} ({}): {}",
                    warning_id,
                    category,
                    e
                );
                Analysis::placeholder()
            }
        }
    }

    async fn request_analysis(
        &self,
        category: &str,
        payload: &RawEvent,
    ) -> Result<Analysis, AnalyzeError> {
        let (url, key) = match (&self.config.api_url, &self.config.api_key) {
            (Some(url), Some(key)) => (url, key),
            _ => return Err(AnalyzeError::NotConfigured),
        };

        let prompt = build_prompt(category, payload);
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [{"role": "user", "content": prompt}],
            "response_format": {"type": "json_object"}
        });

        let response = self
            .http
            .post(url)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AnalyzeError::Status(status.as_u16()));
        }

        let reply: CompletionReply = response.json().await?;
        let content = reply
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| AnalyzeError::Malformed("no choices in reply".to_string()))?;

        serde_json::from_str::<Analysis>(content)
            .map_err(|e| AnalyzeError::Malformed(e.to_string()))
    }
}

/// Builds the analysis prompt from the warning category and the raw payload.
fn build_prompt(category: &str, payload: &RawEvent) -> String {
    let payload_json =
        serde_json::to_string_pretty(payload).unwrap_or_else(|_| "{}".to_string());
    format!(
        "You are a GitHub security and DevOps expert analyzing repository events \
that may pose risks.\n\n\
Warning Type: {}\n\
Event Payload: {}\n\n\
Analyze the event and reply with a JSON object holding exactly three keys: \
\"root_cause\" (2-4 specific, actionable causes), \"impact\" (2-4 concrete \
impacts on the organization), and \"next_steps\" (3-5 prioritized actions), \
each an array of strings. Use the names of the actor, repo, and branch from \
the payload where applicable, be concise, and tailor the answer to this \
specific event rather than giving generic advice.",
        category, payload_json
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_event() -> RawEvent {
        serde_json::from_value(json!({
            "id": "42",
            "type": "PublicEvent",
            "payload": {},
            "repo": {"name": "acme/secrets"}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_unconfigured_analyzer_falls_back_to_placeholder() {
        let analyzer = Analyzer::new(AnalyzerConfig::default());
        let analysis = analyzer
            .analyze("Repository visibility changed to public", &sample_event(), 1)
            .await;
        assert_eq!(
            analysis.root_cause,
            vec!["Analysis service temporarily unavailable"]
        );
        assert_eq!(analysis.next_steps.len(), 2);
    }

    #[test]
    fn test_prompt_carries_category_and_payload() {
        let prompt = build_prompt("Default branch deleted", &sample_event());
        assert!(prompt.contains("Default branch deleted"));
        assert!(prompt.contains("acme/secrets"));
    }
}
