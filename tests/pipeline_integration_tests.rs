//! End-to-end pipeline runs against mock services: CSV in, merged collection
//! and summary out.

mod common;

use common::wiremock_helpers::*;
use commentlens::config::{AppConfig, DEFAULT_CONFIG};
use commentlens::pipeline::{self, PipelineOptions};
use std::io::Write;
use std::path::Path;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(classifier_url: &str, workdir: &Path) -> AppConfig {
    let mut config: AppConfig = toml::from_str(DEFAULT_CONFIG).expect("default config parses");
    config.classifier.base_url = classifier_url.to_string();
    config.classifier.request_timeout_secs = 5;
    config.classifier.max_retries = 1;
    config.analysis.batch_pause_ms = 10;
    config.extraction.attachments_dir = workdir
        .join("attachments")
        .to_string_lossy()
        .into_owned();
    config
}

fn write_csv(dir: &Path, content: &str) -> std::path::PathBuf {
    let csv_path = dir.join("comments.csv");
    let mut file = std::fs::File::create(&csv_path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    csv_path
}

fn options(csv_path: std::path::PathBuf) -> PipelineOptions {
    PipelineOptions {
        csv_path,
        limit: None,
        sample: None,
        truncate_chars: None,
        parallel: true,
        use_vision: false,
    }
}

#[tokio::test]
async fn test_dedup_scenario_classifies_each_unique_text_once() {
    // a and b normalize to the same text; only a (the representative) and c
    // are ever sent to the classifier
    let server = MockServer::start().await;
    mount_delayed_response(&server, "(ID: a)", "hello quote", 0).await;
    mount_delayed_response(&server, "(ID: c)", "goodbye quote", 0).await;

    let dir = tempfile::tempdir().unwrap();
    let csv = write_csv(
        dir.path(),
        "Document ID,Comment\na,Hello world\nb,hello world\nc,Goodbye\n",
    );
    std::env::set_var("COMMENTLENS_API_KEY", "test-key");

    let config = test_config(&server.uri(), dir.path());
    let (merged, summary) = pipeline::run(&config, &options(csv)).await.unwrap();

    // Merge completeness: one output per input, in input order
    assert_eq!(merged.len(), 3);
    let ids: Vec<&str> = merged.iter().map(|m| m.submission.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);

    // Group statistics: {a, b} size 2 ratio 1/1 (3 / 2 = 1), {c} ratio 1/3
    assert_eq!(merged[0].group_size, 2);
    assert_eq!(merged[0].duplication_ratio, "1/1");
    assert_eq!(merged[0].duplicate_ids, vec!["a", "b"]);
    assert!(!merged[0].is_unique);
    assert_eq!(merged[2].group_size, 1);
    assert_eq!(merged[2].duplication_ratio, "1/3");
    assert!(merged[2].is_unique);

    // b inherits its representative's analysis verbatim
    assert_eq!(merged[0].outcome, merged[1].outcome);
    assert_eq!(
        merged[0].outcome.analysis.as_ref().unwrap().key_quote,
        "hello quote"
    );
    assert_eq!(
        merged[2].outcome.analysis.as_ref().unwrap().key_quote,
        "goodbye quote"
    );

    // Exactly two classifier calls for three submissions
    assert_eq!(server.received_requests().await.unwrap().len(), 2);

    assert_eq!(summary.total_submissions, 3);
    assert_eq!(summary.unique_texts, 2);
    assert_eq!(summary.duplicate_submissions, 1);
    assert_eq!(summary.classified_ok, 2);
    assert_eq!(summary.classified_failed, 0);
}

#[tokio::test]
async fn test_parallel_run_preserves_order_across_batches() {
    let server = MockServer::start().await;
    for i in 0..9 {
        mount_delayed_response(
            &server,
            &format!("(ID: sub-{i})"),
            &format!("quote-{i}"),
            (8 - i as u64) * 30,
        )
        .await;
    }

    let dir = tempfile::tempdir().unwrap();
    let rows: String = (0..9)
        .map(|i| format!("sub-{i},distinct text number {i}\n"))
        .collect();
    let csv = write_csv(dir.path(), &format!("Document ID,Comment\n{rows}"));
    std::env::set_var("COMMENTLENS_API_KEY", "test-key");

    let mut config = test_config(&server.uri(), dir.path());
    config.analysis.batch_size = 4;
    config.analysis.max_workers = 3;

    let (merged, summary) = pipeline::run(&config, &options(csv)).await.unwrap();

    assert_eq!(merged.len(), 9);
    for (i, record) in merged.iter().enumerate() {
        assert_eq!(record.submission.id, format!("sub-{i}"));
        assert_eq!(
            record.outcome.analysis.as_ref().unwrap().key_quote,
            format!("quote-{i}")
        );
    }
    assert_eq!(summary.classified_ok, 9);
}

#[tokio::test]
async fn test_classification_failures_mark_records_without_aborting() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("(ID: bad)"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_delayed_response(&server, "(ID: good)", "fine", 0).await;

    let dir = tempfile::tempdir().unwrap();
    let csv = write_csv(
        dir.path(),
        "Document ID,Comment\ngood,works fine\nbad,this one fails\n",
    );
    std::env::set_var("COMMENTLENS_API_KEY", "test-key");

    let config = test_config(&server.uri(), dir.path());
    let (merged, summary) = pipeline::run(&config, &options(csv)).await.unwrap();

    // The run completed; the failed record carries its error marker
    assert_eq!(merged.len(), 2);
    assert!(merged[0].outcome.is_success());
    assert!(!merged[1].outcome.is_success());
    assert!(merged[1].outcome.error.is_some());
    assert_eq!(summary.classified_ok, 1);
    assert_eq!(summary.classified_failed, 1);
}

#[tokio::test]
async fn test_missing_input_file_is_fatal() {
    std::env::set_var("COMMENTLENS_API_KEY", "test-key");
    let dir = tempfile::tempdir().unwrap();
    let config = test_config("http://localhost:9", dir.path());

    let result = pipeline::run(&config, &options(dir.path().join("nope.csv"))).await;
    assert!(result.is_err());
}
