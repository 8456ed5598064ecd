//! Attachment download and per-submission processing.
//!
//! Attachments live at `attachments/<submissionId>/<filename>` with sibling
//! `<filename>.extracted.txt` cache files; that layout is the pipeline's only
//! cross-run state. A cached entry skips both download and extraction.

use anyhow::{Context, Result};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::extraction::ExtractionCascade;
use crate::submission::{
    AttachmentFailure, AttachmentFailureReason, AttachmentStatus, MULTI_ATTACHMENT_SEPARATOR,
};

/// Downloads attachment files and runs the extraction cascade over them.
pub struct AttachmentProcessor {
    client: reqwest::Client,
    cascade: ExtractionCascade,
    attachments_dir: PathBuf,
    download_timeout: Duration,
}

impl AttachmentProcessor {
    pub fn new(
        client: reqwest::Client,
        cascade: ExtractionCascade,
        attachments_dir: impl Into<PathBuf>,
        download_timeout: Duration,
    ) -> Self {
        Self {
            client,
            cascade,
            attachments_dir: attachments_dir.into(),
            download_timeout,
        }
    }

    /// Process the comma-separated attachment URL list of one submission.
    /// Returns the joined attachment text (possibly empty) and the
    /// per-attachment status; failures never abort the submission.
    pub async fn process(&self, submission_id: &str, urls_field: &str) -> (String, AttachmentStatus) {
        let urls: Vec<&str> = urls_field
            .split(',')
            .map(|u| u.trim())
            .filter(|u| !u.is_empty())
            .collect();

        let mut status = AttachmentStatus {
            total: urls.len(),
            ..Default::default()
        };
        let mut texts: Vec<String> = Vec::new();
        let submission_dir = self.attachments_dir.join(submission_id);

        for (index, url) in urls.iter().enumerate() {
            let filename = attachment_filename(index, url);
            let file_path = submission_dir.join(&filename);

            // Cached text short-circuits download and extraction entirely
            if let Some(text) = self.cascade.cached(&file_path) {
                debug!("Using cached text for {}", file_path.display());
                texts.push(text);
                status.processed += 1;
                continue;
            }

            if file_path.exists() {
                debug!("Attachment {} already downloaded", filename);
            } else if let Err(e) = self.download(url, &file_path).await {
                warn!("Failed to download {}: {}", url, e);
                status.failed += 1;
                status.failures.push(AttachmentFailure {
                    filename,
                    reason: AttachmentFailureReason::DownloadFailed,
                });
                continue;
            }

            let text = self.cascade.extract(&file_path).await;
            if text.is_empty() {
                warn!("No text extracted from {}", file_path.display());
                status.failed += 1;
                status.failures.push(AttachmentFailure {
                    filename,
                    reason: AttachmentFailureReason::NoTextExtracted,
                });
                continue;
            }

            info!("Extracted {} chars from {}", text.len(), filename);
            texts.push(text);
            status.processed += 1;
        }

        (texts.join(MULTI_ATTACHMENT_SEPARATOR), status)
    }

    /// Stream one attachment to disk.
    async fn download(&self, url: &str, output_path: &Path) -> Result<()> {
        debug!("Downloading attachment: {}", url);

        let response = self
            .client
            .get(url)
            .timeout(self.download_timeout)
            .send()
            .await
            .with_context(|| format!("Request failed: {url}"))?;

        if !response.status().is_success() {
            anyhow::bail!("Download failed: HTTP {} for {}", response.status(), url);
        }

        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let mut file = tokio::fs::File::create(output_path)
            .await
            .with_context(|| format!("Failed to create file: {}", output_path.display()))?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.with_context(|| format!("Download interrupted: {url}"))?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(())
    }
}

/// Deterministic attachment filename: index plus the URL's last path segment,
/// defaulting to a `.pdf` extension when the segment has none. Must stay
/// stable across runs so cache files keep matching.
pub fn attachment_filename(index: usize, url: &str) -> String {
    let segment = url.rsplit('/').next().unwrap_or(url);
    let mut filename = format!("attachment_{}_{}", index + 1, segment);
    if !filename.contains('.') {
        filename.push_str(".pdf");
    }
    filename
}
