//! Core data model: submissions, attachment processing status, and the
//! per-submission analysis outcome attached during merge-back.

use serde::{Deserialize, Serialize};

/// Marker inserted between body text and attachment text when both exist.
/// This exact string is load-bearing: dedup keys are computed over the
/// combined text, so two runs must produce byte-identical combinations.
pub const ATTACHMENT_SEPARATOR: &str = "\n\n--- ATTACHMENT CONTENT ---\n";

/// Separator between the texts of multiple attachments on one submission.
pub const MULTI_ATTACHMENT_SEPARATOR: &str = "\n\n--- ATTACHMENT ---\n\n";

/// One original row of input. Immutable after ingestion; analysis fields are
/// attached to a separate [`AnalyzedSubmission`] during merge-back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Submission {
    /// Stable external identifier, or a synthesized `comment_{i}` fallback
    pub id: String,
    /// Body text from the CSV row
    pub raw_text: String,
    /// Text pulled out of attachments (empty when none)
    pub attachment_text: String,
    /// `raw_text` plus attachment text under [`ATTACHMENT_SEPARATOR`];
    /// the unit of dedup and analysis
    pub combined_text: String,
    pub submitter: String,
    pub organization: String,
    pub date: String,
    /// Per-attachment processing outcome, when the row had attachments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_status: Option<AttachmentStatus>,
}

impl Submission {
    /// Assemble the combined text from body and attachment text.
    pub fn combine_text(raw_text: &str, attachment_text: &str) -> String {
        if attachment_text.is_empty() {
            raw_text.to_string()
        } else if raw_text.is_empty() {
            attachment_text.to_string()
        } else {
            format!("{raw_text}{ATTACHMENT_SEPARATOR}{attachment_text}")
        }
    }
}

/// Why a single attachment produced no text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentFailureReason {
    DownloadFailed,
    NoTextExtracted,
}

/// One failed attachment with its reason code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentFailure {
    pub filename: String,
    pub reason: AttachmentFailureReason,
}

/// Aggregate attachment outcome for one submission. Failures here never
/// abort the submission; it proceeds with whatever text was obtained.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttachmentStatus {
    pub total: usize,
    pub processed: usize,
    pub failed: usize,
    pub failures: Vec<AttachmentFailure>,
}

/// Structured classification returned by the external service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    /// Zero or more label ids from the configured vocabulary; set semantics,
    /// order is irrelevant
    pub labels: Vec<String>,
    /// Entity type, coerced to `Other/Unknown` when outside the configured set
    pub entity_type: String,
    /// Verbatim quote from the analyzed text (asked of the service, not
    /// enforced)
    pub key_quote: String,
    pub rationale: String,
}

/// Result of classifying one representative: either an analysis or the error
/// that survived the gateway's retries. Copied unchanged onto every member of
/// the representative's dedup group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<Analysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisOutcome {
    pub fn success(analysis: Analysis) -> Self {
        Self {
            analysis: Some(analysis),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            analysis: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.analysis.is_some()
    }
}

/// Final output record: the original submission plus its group's analysis
/// and duplication statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzedSubmission {
    #[serde(flatten)]
    pub submission: Submission,
    #[serde(flatten)]
    pub outcome: AnalysisOutcome,
    /// Number of submissions sharing this text
    pub group_size: usize,
    pub is_unique: bool,
    /// Human-readable `1/N` share of the dataset (floor-divided denominator)
    pub duplication_ratio: String,
    /// Ordered ids of every submission in the group, first-seen first
    pub duplicate_ids: Vec<String>,
}
