use std::time::Duration;
use wiremock::matchers::{body_string_contains, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// OpenAI-style chat-completions envelope wrapping a classification payload.
pub fn classifier_envelope(
    labels: &[&str],
    entity_type: &str,
    key_quote: &str,
    rationale: &str,
) -> serde_json::Value {
    let content = serde_json::json!({
        "labels": labels,
        "entity_type": entity_type,
        "key_quote": key_quote,
        "rationale": rationale,
    });
    envelope_with_content(&content.to_string())
}

/// Envelope with arbitrary message content (for malformed-payload tests).
pub fn envelope_with_content(content: &str) -> serde_json::Value {
    serde_json::json!({
        "choices": [{
            "message": {
                "role": "assistant",
                "content": content
            }
        }]
    })
}

/// Creates a mock classifier that always answers with the given payload.
pub async fn mock_classifier(
    labels: &[&str],
    entity_type: &str,
    key_quote: &str,
    rationale: &str,
) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(classifier_envelope(labels, entity_type, key_quote, rationale)),
        )
        .mount(&server)
        .await;

    server
}

/// Creates a mock classifier that fails the first `failures` calls with an
/// HTTP 500 and succeeds afterwards.
pub async fn mock_classifier_failing_first(failures: u64, key_quote: &str) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(failures)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(classifier_envelope(
            &["support"],
            "Individual",
            key_quote,
            "recovered after retries",
        )))
        .mount(&server)
        .await;

    server
}

/// Creates a mock classifier that always returns the given HTTP error.
pub async fn mock_classifier_error(status_code: u16) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(status_code))
        .mount(&server)
        .await;

    server
}

/// Mounts a per-submission response on an existing server: requests whose
/// body mentions `submission_id` get the given quote after `delay_ms`.
/// Varying the delays scrambles completion order in orchestrator tests.
pub async fn mount_delayed_response(
    server: &MockServer,
    submission_id: &str,
    key_quote: &str,
    delay_ms: u64,
) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains(submission_id))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(classifier_envelope(
                    &["support"],
                    "Individual",
                    key_quote,
                    "delayed response",
                ))
                .set_delay(Duration::from_millis(delay_ms)),
        )
        .mount(server)
        .await;
}

/// Creates a mock vision service answering every generateContent call with
/// the given extracted text.
pub async fn mock_vision_server(extracted_text: &str) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path_regex(r"^/v1/models/.+:generateContent$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "candidates": [{
                "content": {
                    "parts": [{"text": extracted_text}]
                }
            }]
        })))
        .mount(&server)
        .await;

    server
}

/// Creates a mock vision service that always fails.
pub async fn mock_vision_error(status_code: u16) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path_regex(r"^/v1/models/.+:generateContent$"))
        .respond_with(ResponseTemplate::new(status_code))
        .mount(&server)
        .await;

    server
}

/// Creates a mock file server for attachment downloads.
pub async fn mock_attachment_server(url_path: &str, body: &str) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(url_path))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body.to_string())
                .insert_header("content-type", "text/plain; charset=utf-8"),
        )
        .mount(&server)
        .await;

    server
}
