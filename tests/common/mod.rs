// Shared across test binaries; not every binary uses every helper
#![allow(dead_code)]

pub mod wiremock_helpers;

use commentlens::config::{ClassifierConfig, LabelSpec};
use commentlens::submission::Submission;

/// Bare submission with the given id and text.
pub fn submission(id: &str, text: &str) -> Submission {
    Submission {
        id: id.to_string(),
        raw_text: text.to_string(),
        attachment_text: String::new(),
        combined_text: text.to_string(),
        submitter: String::new(),
        organization: String::new(),
        date: String::new(),
        attachment_status: None,
    }
}

/// Classifier config pointed at a mock server, with fast timeouts.
pub fn test_classifier_config(base_url: &str, max_retries: u32) -> ClassifierConfig {
    ClassifierConfig {
        base_url: base_url.to_string(),
        model: "test-model".to_string(),
        request_timeout_secs: 5,
        watchdog_grace_secs: 1,
        max_retries,
        system_prompt: String::new(),
        entity_types: vec!["Individual".to_string(), "Other/Unknown".to_string()],
        labels: vec![
            LabelSpec {
                id: "support".to_string(),
                description: "The commenter supports the proposal".to_string(),
            },
            LabelSpec {
                id: "oppose".to_string(),
                description: "The commenter opposes the proposal".to_string(),
            },
        ],
    }
}
