//! Parallel analysis orchestrator: batches the unique representatives, runs
//! the classification gateway concurrently under a worker cap, and restores
//! input order before handing results on.

use futures::stream::{FuturesUnordered, StreamExt};
use indicatif::ProgressBar;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::classifier::ClassificationGateway;
use crate::config::{AnalysisConfig, ClassifierConfig};
use crate::submission::{AnalysisOutcome, Submission};

pub struct AnalysisOrchestrator {
    classifier: Arc<ClassifierConfig>,
    api_key: Arc<str>,
    batch_size: usize,
    max_workers: usize,
    batch_pause: Duration,
    truncate_chars: Option<usize>,
}

impl AnalysisOrchestrator {
    pub fn new(
        classifier: Arc<ClassifierConfig>,
        api_key: Arc<str>,
        analysis: &AnalysisConfig,
        truncate_chars: Option<usize>,
    ) -> Self {
        Self {
            classifier,
            api_key,
            batch_size: analysis.batch_size,
            max_workers: analysis.max_workers,
            batch_pause: Duration::from_millis(analysis.batch_pause_ms),
            truncate_chars,
        }
    }

    /// Analyze every representative; `out[i]` corresponds to
    /// `representatives[i]` whatever order the concurrent calls complete in.
    /// Per-representative failures become error markers, never aborts.
    pub async fn analyze_all(
        &self,
        representatives: &[&Submission],
        progress: Option<&ProgressBar>,
    ) -> Vec<AnalysisOutcome> {
        info!(
            "Analyzing {} representatives ({} per batch, {} workers)",
            representatives.len(),
            self.batch_size,
            self.max_workers
        );

        let mut results = Vec::with_capacity(representatives.len());
        let batches: Vec<&[&Submission]> = representatives.chunks(self.batch_size).collect();

        for (batch_index, batch) in batches.iter().enumerate() {
            debug!("Starting batch {}/{}", batch_index + 1, batches.len());
            results.extend(self.run_batch(batch, progress).await);

            // Politeness pause between batches, not a correctness mechanism
            if batch_index + 1 < batches.len() {
                tokio::time::sleep(self.batch_pause).await;
            }
        }

        results
    }

    /// One batch: a bounded pool of independent tasks, each with its own
    /// gateway instance. Results come back in completion order keyed by
    /// submission id and are re-sorted into the batch's input order - a
    /// correctness requirement for consumers that zip by index.
    async fn run_batch(
        &self,
        batch: &[&Submission],
        progress: Option<&ProgressBar>,
    ) -> Vec<AnalysisOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut pending: FuturesUnordered<JoinHandle<(String, AnalysisOutcome)>> =
            FuturesUnordered::new();

        for submission in batch {
            let semaphore = Arc::clone(&semaphore);
            let config = Arc::clone(&self.classifier);
            let api_key = Arc::clone(&self.api_key);
            let id = submission.id.clone();
            let text = truncated(&submission.combined_text, self.truncate_chars);
            let organization = submission.organization.clone();
            let submitter = submission.submitter.clone();

            pending.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let gateway = ClassificationGateway::new(config, api_key);
                let outcome = match gateway.classify(&text, &id, &organization, &submitter).await {
                    Ok(analysis) => AnalysisOutcome::success(analysis),
                    Err(e) => AnalysisOutcome::failure(e.to_string()),
                };
                (id, outcome)
            }));
        }

        let mut by_id: HashMap<String, AnalysisOutcome> = HashMap::with_capacity(batch.len());
        while let Some(joined) = pending.next().await {
            if let Ok((id, outcome)) = joined {
                if let Some(pb) = progress {
                    pb.inc(1);
                }
                by_id.insert(id, outcome);
            }
        }

        batch
            .iter()
            .map(|submission| {
                by_id
                    .remove(&submission.id)
                    .unwrap_or_else(|| AnalysisOutcome::failure("analysis task panicked"))
            })
            .collect()
    }

    /// Sequential fallback for tiny runs or `--no-parallel`: one gateway,
    /// strict input order, same failure semantics.
    pub async fn analyze_sequential(
        &self,
        representatives: &[&Submission],
        progress: Option<&ProgressBar>,
    ) -> Vec<AnalysisOutcome> {
        info!("Analyzing {} representatives (sequential)", representatives.len());

        let gateway = ClassificationGateway::new(Arc::clone(&self.classifier), Arc::clone(&self.api_key));
        let mut results = Vec::with_capacity(representatives.len());

        for submission in representatives {
            let text = truncated(&submission.combined_text, self.truncate_chars);
            let outcome = match gateway
                .classify(&text, &submission.id, &submission.organization, &submission.submitter)
                .await
            {
                Ok(analysis) => AnalysisOutcome::success(analysis),
                Err(e) => AnalysisOutcome::failure(e.to_string()),
            };
            if let Some(pb) = progress {
                pb.inc(1);
            }
            results.push(outcome);
        }

        results
    }
}

/// Cap the text sent for analysis without touching the stored submission.
fn truncated(text: &str, limit: Option<usize>) -> String {
    match limit {
        Some(n) => text.chars().take(n).collect(),
        None => text.to_string(),
    }
}
