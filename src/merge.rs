//! Result merge-back: propagate each representative's classification and the
//! group's duplication statistics onto every submission that shared its text.
//!
//! Pure given its inputs and trivially re-runnable; the output preserves the
//! original submission order via id-free, key-indexed lookup.

use tracing::info;

use crate::dedup::DedupTable;
use crate::submission::{AnalysisOutcome, AnalyzedSubmission, Submission};

/// Merge per-representative outcomes back onto the full submission list.
/// `outcomes[i]` must correspond to `table.groups[i]` (the orchestrator's
/// ordering guarantee). Always yields exactly one record per input
/// submission, in input order.
pub fn merge_results(
    submissions: &[Submission],
    table: &DedupTable,
    outcomes: &[AnalysisOutcome],
) -> Vec<AnalyzedSubmission> {
    let merged: Vec<AnalyzedSubmission> = submissions
        .iter()
        .map(|submission| {
            let (outcome, group) = match table.group_index_for(&submission.combined_text) {
                Some(index) => (
                    outcomes.get(index).cloned().unwrap_or_else(|| {
                        AnalysisOutcome::failure("no analysis produced for group")
                    }),
                    Some(&table.groups[index]),
                ),
                None => (
                    AnalysisOutcome::failure("submission missing from dedup table"),
                    None,
                ),
            };

            AnalyzedSubmission {
                submission: submission.clone(),
                outcome,
                group_size: group.map(|g| g.size).unwrap_or(1),
                is_unique: group.map(|g| g.is_unique).unwrap_or(true),
                duplication_ratio: group
                    .map(|g| g.ratio.clone())
                    .unwrap_or_else(|| "1/1".to_string()),
                duplicate_ids: group
                    .map(|g| g.member_ids.clone())
                    .unwrap_or_else(|| vec![submission.id.clone()]),
            }
        })
        .collect();

    info!("Merged analysis results onto {} submissions", merged.len());
    merged
}
