//! Classification gateway: one submission text in, one structured opinion
//! classification out, over an OpenAI-compatible chat-completions endpoint.
//!
//! Each attempt runs the HTTP call in its own spawned task raced against a
//! watchdog timer. When the watchdog fires first the task is abandoned, not
//! cancelled - the remote call may still be running and billing. Retries are
//! immediate, with no backoff; the dedup stage is what prevents duplicate
//! work, so no caching happens here.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::config::ClassifierConfig;
use crate::submission::Analysis;

/// Classification failure taxonomy. All variants are retried identically;
/// the last one surfaces after retries are exhausted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassifyError {
    #[error("classification timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("response missing required field '{0}'")]
    Validation(&'static str),
}

/// Gateway over the external classifier. Workers each construct their own
/// instance (own HTTP client, shared read-only config) so no mutable state
/// crosses tasks.
pub struct ClassificationGateway {
    client: reqwest::Client,
    config: Arc<ClassifierConfig>,
    api_key: Arc<str>,
}

impl ClassificationGateway {
    pub fn new(config: Arc<ClassifierConfig>, api_key: Arc<str>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            api_key,
        }
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config.request_timeout_secs)
    }

    /// Watchdog deadline: strictly greater than the remote call's own
    /// timeout, so the grace margin decides who reports first.
    fn watchdog_timeout(&self) -> Duration {
        self.request_timeout() + Duration::from_secs(self.config.watchdog_grace_secs)
    }

    /// Classify one submission text. Up to `max_retries` additional attempts
    /// after the first failure; the final error is the one surfaced.
    pub async fn classify(
        &self,
        text: &str,
        submission_id: &str,
        organization: &str,
        submitter: &str,
    ) -> Result<Analysis, ClassifyError> {
        let max_retries = self.config.max_retries;
        let mut last_error = ClassifyError::Transport("no attempt was made".to_string());

        for attempt in 0..=max_retries {
            match self.attempt(text, submission_id, organization, submitter).await {
                Ok(analysis) => return Ok(analysis),
                Err(e) => {
                    if attempt < max_retries {
                        warn!(
                            "Classification attempt {} failed for {}: {}. Retrying...",
                            attempt + 1,
                            submission_id,
                            e
                        );
                    } else {
                        error!(
                            "Classification failed after {} attempts for {}: {}",
                            max_retries + 1,
                            submission_id,
                            e
                        );
                    }
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    /// One attempt: spawn the call as its own task and race it against the
    /// watchdog. On expiry the JoinHandle is dropped without aborting, which
    /// leaves the request running detached - fire-and-abandon, with the
    /// watchdog as the upper bound on how long we wait, not on what the
    /// remote side spends.
    async fn attempt(
        &self,
        text: &str,
        submission_id: &str,
        organization: &str,
        submitter: &str,
    ) -> Result<Analysis, ClassifyError> {
        let client = self.client.clone();
        let url = format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let api_key = Arc::clone(&self.api_key);
        let body = self.request_body(text, submission_id, organization, submitter);
        let request_timeout = self.request_timeout();

        let handle = tokio::spawn(async move {
            call_classifier(client, url, &api_key, body, request_timeout).await
        });

        match tokio::time::timeout(self.watchdog_timeout(), handle).await {
            Err(_) => Err(ClassifyError::Timeout(self.watchdog_timeout())),
            Ok(Err(join_error)) => Err(ClassifyError::Transport(format!(
                "classifier task failed: {join_error}"
            ))),
            Ok(Ok(raw)) => self.validate(raw?),
        }
    }

    /// The decoded object must carry all of labels, key_quote and rationale;
    /// anything less is a failed attempt, not a partial success.
    fn validate(&self, raw: Value) -> Result<Analysis, ClassifyError> {
        let labels = raw
            .get("labels")
            .and_then(Value::as_array)
            .ok_or(ClassifyError::Validation("labels"))?
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
        let key_quote = raw
            .get("key_quote")
            .and_then(Value::as_str)
            .ok_or(ClassifyError::Validation("key_quote"))?
            .to_string();
        let rationale = raw
            .get("rationale")
            .and_then(Value::as_str)
            .ok_or(ClassifyError::Validation("rationale"))?
            .to_string();

        // Entity type is advisory: anything outside the configured set
        // collapses to the unknown bucket rather than failing the attempt
        let entity_type = raw
            .get("entity_type")
            .and_then(Value::as_str)
            .filter(|e| self.config.entity_types.iter().any(|known| known == e))
            .unwrap_or(ClassifierConfig::UNKNOWN_ENTITY)
            .to_string();

        Ok(Analysis {
            labels,
            entity_type,
            key_quote,
            rationale,
        })
    }

    fn request_body(
        &self,
        text: &str,
        submission_id: &str,
        organization: &str,
        submitter: &str,
    ) -> Value {
        let mut context_parts = Vec::new();
        if !organization.is_empty() {
            context_parts.push(format!("Organization: {organization}"));
        }
        if !submitter.is_empty() {
            context_parts.push(format!("Submitter: {submitter}"));
        }

        let mut user_message = format!("Analyze the following public comment (ID: {submission_id}):");
        if !context_parts.is_empty() {
            user_message.push_str("\n\n");
            user_message.push_str(&context_parts.join(" | "));
        }
        user_message.push_str("\n\n");
        user_message.push_str(text);

        serde_json::json!({
            "model": self.config.model,
            "temperature": 0.0,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": self.system_prompt()},
                {"role": "user", "content": user_message}
            ]
        })
    }

    /// The configured prompt verbatim, or one assembled from the label and
    /// entity vocabularies.
    pub fn system_prompt(&self) -> String {
        if !self.config.system_prompt.is_empty() {
            return self.config.system_prompt.clone();
        }

        let label_list = self
            .config
            .labels
            .iter()
            .map(|l| format!("- {}: {}", l.id, l.description))
            .collect::<Vec<_>>()
            .join("\n");
        let entity_list = self
            .config
            .entity_types
            .iter()
            .map(|e| format!("- {e}"))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "You are analyzing public comments submitted regarding a proposed regulation.\n\
             \n\
             For each comment, identify:\n\
             \n\
             1. Labels: Which of these positions does the commenter express? Select ALL that \
             apply, or none if none apply. Respond with the label ids exactly as listed:\n\
             {label_list}\n\
             \n\
             2. Entity Type: Identify what type of entity is submitting this comment. Look for \
             clues in the organization name, submitter title, and the comment text itself. Only \
             select a specific entity type if there is clear evidence; otherwise select \
             \"Other/Unknown\". Choose from:\n\
             {entity_list}\n\
             \n\
             3. Key Quote: Select the most important quote (max 100 words) that best captures \
             the essence of the comment. The quote must be exactly present in the original \
             text - do not paraphrase or modify.\n\
             \n\
             4. Rationale: Briefly explain (1-2 sentences) why you selected these labels.\n\
             \n\
             Respond as a JSON object with keys \"labels\", \"entity_type\", \"key_quote\" and \
             \"rationale\". Analyze objectively and avoid inserting personal opinions or biases."
        )
    }
}

/// Exactly one call to the external classifier, decoded down to the JSON
/// object embedded in the first choice's message content.
async fn call_classifier(
    client: reqwest::Client,
    url: String,
    api_key: &str,
    body: Value,
    request_timeout: Duration,
) -> Result<Value, ClassifyError> {
    debug!("Classifier request to {}", url);

    let response = client
        .post(&url)
        .bearer_auth(api_key)
        .json(&body)
        .timeout(request_timeout)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                ClassifyError::Timeout(request_timeout)
            } else {
                ClassifyError::Transport(e.to_string())
            }
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(ClassifyError::Transport(format!(
            "classifier returned HTTP {status}"
        )));
    }

    let envelope: Value = response
        .json()
        .await
        .map_err(|e| ClassifyError::Malformed(format!("response body is not JSON: {e}")))?;

    let content = envelope
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| ClassifyError::Malformed("response has no message content".to_string()))?;

    serde_json::from_str(content)
        .map_err(|e| ClassifyError::Malformed(format!("message content is not JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, DEFAULT_CONFIG};

    fn gateway() -> ClassificationGateway {
        let config: AppConfig = toml::from_str(DEFAULT_CONFIG).unwrap();
        ClassificationGateway::new(Arc::new(config.classifier), Arc::from("test-key"))
    }

    #[test]
    fn test_validate_accepts_complete_response() {
        let gw = gateway();
        let raw = serde_json::json!({
            "labels": ["Healthcare Cost and Access: Support Value-Based Care Initiatives"],
            "entity_type": "Individual",
            "key_quote": "value-based care works",
            "rationale": "the comment endorses value-based care"
        });
        let analysis = gw.validate(raw).unwrap();
        assert_eq!(analysis.labels.len(), 1);
        assert_eq!(analysis.entity_type, "Individual");
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        let gw = gateway();
        let missing_labels = serde_json::json!({"key_quote": "q", "rationale": "r"});
        assert_eq!(
            gw.validate(missing_labels),
            Err(ClassifyError::Validation("labels"))
        );

        let missing_quote = serde_json::json!({"labels": [], "rationale": "r"});
        assert_eq!(
            gw.validate(missing_quote),
            Err(ClassifyError::Validation("key_quote"))
        );

        let missing_rationale = serde_json::json!({"labels": [], "key_quote": "q"});
        assert_eq!(
            gw.validate(missing_rationale),
            Err(ClassifyError::Validation("rationale"))
        );
    }

    #[test]
    fn test_validate_coerces_unknown_entity_type() {
        let gw = gateway();
        let raw = serde_json::json!({
            "labels": [],
            "entity_type": "Sentient Toaster",
            "key_quote": "q",
            "rationale": "r"
        });
        let analysis = gw.validate(raw).unwrap();
        assert_eq!(analysis.entity_type, ClassifierConfig::UNKNOWN_ENTITY);

        let absent = serde_json::json!({"labels": [], "key_quote": "q", "rationale": "r"});
        assert_eq!(
            gw.validate(absent).unwrap().entity_type,
            ClassifierConfig::UNKNOWN_ENTITY
        );
    }

    #[test]
    fn test_validate_allows_empty_label_list() {
        let gw = gateway();
        let raw = serde_json::json!({
            "labels": [],
            "entity_type": "Individual",
            "key_quote": "q",
            "rationale": "no clear position"
        });
        assert!(gw.validate(raw).unwrap().labels.is_empty());
    }

    #[test]
    fn test_assembled_prompt_lists_vocabulary() {
        let gw = gateway();
        let prompt = gw.system_prompt();
        for label in &gw.config.labels {
            assert!(prompt.contains(&label.id), "prompt should list {}", label.id);
        }
        assert!(prompt.contains("Other/Unknown"));
    }

    #[test]
    fn test_explicit_prompt_wins() {
        let config: AppConfig = toml::from_str(DEFAULT_CONFIG).unwrap();
        let mut classifier = config.classifier;
        classifier.system_prompt = "Custom prompt.".to_string();
        let gw = ClassificationGateway::new(Arc::new(classifier), Arc::from("k"));
        assert_eq!(gw.system_prompt(), "Custom prompt.");
    }

    #[test]
    fn test_request_body_includes_context() {
        let gw = gateway();
        let body = gw.request_body("the text", "c-1", "ACME Corp", "Dr. Smith");
        let user = body["messages"][1]["content"].as_str().unwrap();
        assert!(user.contains("(ID: c-1)"));
        assert!(user.contains("Organization: ACME Corp | Submitter: Dr. Smith"));
        assert!(user.ends_with("the text"));
        assert_eq!(body["temperature"], 0.0);
    }

    #[test]
    fn test_watchdog_exceeds_request_timeout() {
        let gw = gateway();
        assert!(gw.watchdog_timeout() > gw.request_timeout());
    }
}
