//! Run controller: sequences ingestion, deduplication, parallel analysis and
//! merge-back, and aggregates per-stage statistics for the final report.

use anyhow::{Context, Result};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::attachment::AttachmentProcessor;
use crate::cache::FsTextCache;
use crate::config::{AppConfig, CLASSIFIER_API_KEY_ENV, VISION_API_KEY_ENV};
use crate::dedup::DedupTable;
use crate::extraction::{ExtractionCascade, VisionExtractor};
use crate::ingest::{read_submissions, IngestOptions};
use crate::merge::merge_results;
use crate::orchestrator::AnalysisOrchestrator;
use crate::submission::AnalyzedSubmission;

/// Below this many representatives the parallel machinery is not worth
/// spinning up; classification falls back to the sequential path.
const PARALLEL_THRESHOLD: usize = 5;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub csv_path: PathBuf,
    pub limit: Option<usize>,
    pub sample: Option<usize>,
    pub truncate_chars: Option<usize>,
    pub parallel: bool,
    pub use_vision: bool,
}

/// Aggregate counts reported at the end of a run. Individual failures are
/// visible on the output records; nothing is silently dropped.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub total_submissions: usize,
    pub unique_texts: usize,
    pub duplicate_submissions: usize,
    pub classified_ok: usize,
    pub classified_failed: usize,
    pub attachments_total: usize,
    pub attachments_processed: usize,
    pub attachments_failed: usize,
    pub model: String,
    pub started_at: String,
    pub completed_at: String,
    pub duration_secs: f64,
}

/// Execute the full pipeline and hand back the merged collection plus the
/// run summary. Classification and attachment failures degrade to markers on
/// the affected records; only missing inputs or missing credentials abort.
pub async fn run(
    config: &AppConfig,
    options: &PipelineOptions,
) -> Result<(Vec<AnalyzedSubmission>, RunSummary)> {
    let started = Instant::now();
    let started_at = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();

    let api_key: Arc<str> = std::env::var(CLASSIFIER_API_KEY_ENV)
        .map(Arc::from)
        .with_context(|| format!("{CLASSIFIER_API_KEY_ENV} not set in the environment"))?;

    let client = reqwest::Client::builder()
        .user_agent(&config.http.user_agent)
        .build()
        .context("Failed to build HTTP client")?;

    // Stage 1: ingestion (attachments downloaded and extracted per row)
    info!("Stage 1: loading submissions");
    let vision = if options.use_vision {
        match std::env::var(VISION_API_KEY_ENV) {
            Ok(key) => Some(VisionExtractor::new(&config.extraction, client.clone(), key)),
            Err(_) => {
                warn!("{VISION_API_KEY_ENV} not set; vision extraction disabled");
                None
            }
        }
    } else {
        None
    };
    let cascade = ExtractionCascade::new(
        Arc::new(FsTextCache::new()),
        vision,
        config.extraction.min_local_chars,
    );
    let attachments = AttachmentProcessor::new(
        client,
        cascade,
        &config.extraction.attachments_dir,
        std::time::Duration::from_secs(config.http.download_timeout_secs),
    );
    let submissions = read_submissions(
        &options.csv_path,
        &config.ingest,
        &IngestOptions::new(options.limit, options.sample),
        &attachments,
    )
    .await?;

    // Stage 2: deduplication
    info!("Stage 2: building deduplication table");
    let table = DedupTable::build(&submissions);
    let representatives = table.representatives(&submissions);
    info!(
        "Will classify {} unique texts out of {} submissions",
        representatives.len(),
        submissions.len()
    );

    // Stage 3: classification of the unique representatives
    info!("Stage 3: analyzing unique submissions");
    let orchestrator = AnalysisOrchestrator::new(
        Arc::new(config.classifier.clone()),
        Arc::clone(&api_key),
        &config.analysis,
        options.truncate_chars,
    );
    let progress = classification_progress(representatives.len() as u64);
    let outcomes = if options.parallel && representatives.len() > PARALLEL_THRESHOLD {
        orchestrator
            .analyze_all(&representatives, Some(&progress))
            .await
    } else {
        orchestrator
            .analyze_sequential(&representatives, Some(&progress))
            .await
    };
    progress.finish_and_clear();

    // Stage 4: merge results back onto every submission
    info!("Stage 4: merging results");
    let merged = merge_results(&submissions, &table, &outcomes);

    let classified_ok = outcomes.iter().filter(|o| o.is_success()).count();
    let (attachments_total, attachments_processed, attachments_failed) = submissions
        .iter()
        .filter_map(|s| s.attachment_status.as_ref())
        .fold((0, 0, 0), |(t, p, f), status| {
            (t + status.total, p + status.processed, f + status.failed)
        });

    let summary = RunSummary {
        total_submissions: submissions.len(),
        unique_texts: table.unique_count(),
        duplicate_submissions: submissions.len() - table.unique_count(),
        classified_ok,
        classified_failed: outcomes.len() - classified_ok,
        attachments_total,
        attachments_processed,
        attachments_failed,
        model: config.classifier.model.clone(),
        started_at,
        completed_at: Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        duration_secs: started.elapsed().as_secs_f64(),
    };

    info!(
        "Pipeline complete: {}/{} unique texts classified in {:.1}s",
        summary.classified_ok, summary.unique_texts, summary.duration_secs
    );

    Ok((merged, summary))
}

fn classification_progress(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    );
    pb.set_message("Analyzing submissions");
    pb
}

/// Print the human-readable end-of-run summary.
pub fn print_summary(summary: &RunSummary) {
    println!("\n=== ANALYSIS SUMMARY ===");
    println!("Model: {}", summary.model);
    println!("Submissions: {}", summary.total_submissions);
    println!(
        "Unique texts: {} ({} duplicates)",
        summary.unique_texts, summary.duplicate_submissions
    );
    println!(
        "Classified: {} ok, {} failed",
        summary.classified_ok, summary.classified_failed
    );
    if summary.attachments_total > 0 {
        println!(
            "Attachments: {} processed, {} failed (of {})",
            summary.attachments_processed, summary.attachments_failed, summary.attachments_total
        );
    }
    println!("Duration: {:.2}s", summary.duration_secs);
    println!("========================\n");
}
