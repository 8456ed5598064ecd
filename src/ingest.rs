//! CSV ingestion: turn mapped CSV rows into [`Submission`]s, downloading and
//! extracting attachment text along the way.
//!
//! Column-mapping *inference* is a separate tool; this stage just applies the
//! mapping named in the config. Rows with neither body text nor attachments
//! are skipped.

use anyhow::{Context, Result};
use csv::StringRecord;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use tracing::{debug, info};

use crate::attachment::AttachmentProcessor;
use crate::config::IngestConfig;
use crate::submission::Submission;

/// Seed for reproducible sampling across runs.
pub const DEFAULT_SAMPLE_SEED: u64 = 42;

#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Read at most this many rows
    pub limit: Option<usize>,
    /// Uniformly sample this many rows after reading
    pub sample: Option<usize>,
    pub seed: u64,
}

impl IngestOptions {
    pub fn new(limit: Option<usize>, sample: Option<usize>) -> Self {
        Self {
            limit,
            sample,
            seed: DEFAULT_SAMPLE_SEED,
        }
    }
}

/// Read submissions from a CSV file, processing attachments per row.
pub async fn read_submissions(
    csv_path: &Path,
    mapping: &IngestConfig,
    options: &IngestOptions,
    attachments: &AttachmentProcessor,
) -> Result<Vec<Submission>> {
    info!("Reading submissions from {}", csv_path.display());

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open input CSV: {}", csv_path.display()))?;
    let headers = reader
        .headers()
        .context("Failed to read CSV headers")?
        .clone();

    let column = |name: &str| headers.iter().position(|h| h == name);
    let id_col = column(&mapping.id);
    let text_col = column(&mapping.text);
    let date_col = column(&mapping.date);
    let first_name_col = column(&mapping.first_name);
    let last_name_col = column(&mapping.last_name);
    let organization_col = column(&mapping.organization);
    let attachment_col = column(&mapping.attachment_files);
    let submitter_col = mapping.submitter.as_deref().and_then(column);

    // First pass: pull rows into memory so sampling sees the full set
    let mut rows: Vec<StringRecord> = Vec::new();
    for result in reader.records() {
        if let Some(limit) = options.limit {
            if rows.len() >= limit {
                break;
            }
        }
        rows.push(result.context("Failed to parse CSV record")?);
    }

    if let Some(sample_size) = options.sample {
        if rows.len() > sample_size {
            info!("Sampling {} submissions from {} (seed {})", sample_size, rows.len(), options.seed);
            let mut rng = StdRng::seed_from_u64(options.seed);
            let indices = rand::seq::index::sample(&mut rng, rows.len(), sample_size);
            rows = indices.iter().map(|i| rows[i].clone()).collect();
        }
    }

    // Second pass: build submissions, downloading attachments as we go
    let mut submissions = Vec::new();
    for (index, row) in rows.iter().enumerate() {
        let id = match field(row, id_col) {
            "" => format!("comment_{index}"),
            id => id.to_string(),
        };
        let raw_text = field(row, text_col).to_string();
        let attachment_field = field(row, attachment_col);

        if raw_text.is_empty() && attachment_field.is_empty() {
            debug!("Skipping row {} with no text and no attachments", index);
            continue;
        }

        let (attachment_text, attachment_status) = if attachment_field.is_empty() {
            (String::new(), None)
        } else {
            info!("Processing attachments for submission {}", id);
            let (text, status) = attachments.process(&id, attachment_field).await;
            (text, Some(status))
        };

        let combined_text = Submission::combine_text(&raw_text, &attachment_text);
        if combined_text.trim().is_empty() {
            debug!("Skipping row {} with no usable text", index);
            continue;
        }

        let submitter = match field(row, submitter_col) {
            "" => {
                let first = field(row, first_name_col);
                let last = field(row, last_name_col);
                format!("{first} {last}").trim().to_string()
            }
            name => name.to_string(),
        };

        submissions.push(Submission {
            id,
            raw_text,
            attachment_text,
            combined_text,
            submitter,
            organization: field(row, organization_col).to_string(),
            date: field(row, date_col).to_string(),
            attachment_status,
        });
    }

    info!("Loaded {} submissions", submissions.len());
    Ok(submissions)
}

fn field<'r>(row: &'r StringRecord, col: Option<usize>) -> &'r str {
    col.and_then(|i| row.get(i)).map(str::trim).unwrap_or("")
}
