//! Export of the merged per-submission collection. The surrounding system's
//! columnar/database/report stages are separate; these writers exist so a
//! standalone run leaves something usable behind.

use anyhow::{Context, Result};
use csv::Writer;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use tracing::{debug, info};

use crate::pipeline::RunSummary;
use crate::submission::AnalyzedSubmission;

#[derive(Serialize)]
struct JsonExport<'a> {
    summary: &'a RunSummary,
    submissions: &'a [AnalyzedSubmission],
}

/// Write the full collection plus the run summary as pretty-printed JSON.
pub fn export_json(
    records: &[AnalyzedSubmission],
    summary: &RunSummary,
    output_path: &str,
) -> Result<()> {
    debug!("Exporting {} submissions to JSON: {}", records.len(), output_path);

    let export = JsonExport {
        summary,
        submissions: records,
    };
    let json = serde_json::to_string_pretty(&export).context("Failed to serialize results")?;

    let mut file = File::create(output_path)
        .with_context(|| format!("Failed to create output file: {output_path}"))?;
    file.write_all(json.as_bytes())?;

    info!("Exported {} submissions to JSON: {}", records.len(), output_path);
    Ok(())
}

/// Write the collection as a flat CSV, one row per submission.
pub fn export_csv(records: &[AnalyzedSubmission], output_path: &str) -> Result<()> {
    debug!("Exporting {} submissions to CSV: {}", records.len(), output_path);

    let file = File::create(output_path)
        .with_context(|| format!("Failed to create output file: {output_path}"))?;
    let mut wtr = Writer::from_writer(file);

    wtr.write_record([
        "id",
        "submitter",
        "organization",
        "date",
        "comment_text",
        "attachment_text",
        "labels",
        "entity_type",
        "key_quote",
        "rationale",
        "analysis_error",
        "group_size",
        "is_unique",
        "duplication_ratio",
        "duplicate_ids",
    ])?;

    for record in records {
        let analysis = record.outcome.analysis.as_ref();
        let labels = analysis.map(|a| a.labels.join("; ")).unwrap_or_default();
        let group_size = record.group_size.to_string();
        let is_unique = record.is_unique.to_string();
        let duplicate_ids = record.duplicate_ids.join(";");
        wtr.write_record([
            record.submission.id.as_str(),
            record.submission.submitter.as_str(),
            record.submission.organization.as_str(),
            record.submission.date.as_str(),
            record.submission.raw_text.as_str(),
            record.submission.attachment_text.as_str(),
            labels.as_str(),
            analysis.map(|a| a.entity_type.as_str()).unwrap_or(""),
            analysis.map(|a| a.key_quote.as_str()).unwrap_or(""),
            analysis.map(|a| a.rationale.as_str()).unwrap_or(""),
            record.outcome.error.as_deref().unwrap_or(""),
            group_size.as_str(),
            is_unique.as_str(),
            record.duplication_ratio.as_str(),
            duplicate_ids.as_str(),
        ])?;
    }

    wtr.flush()?;
    info!("Exported {} submissions to CSV: {}", records.len(), output_path);
    Ok(())
}
