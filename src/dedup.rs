//! Deduplication engine: groups submissions by normalized combined text so
//! only one representative per group is sent for classification.

use std::collections::HashMap;
use tracing::info;

use crate::submission::Submission;

/// One group of byte-identical (after normalization) submissions.
#[derive(Debug, Clone, PartialEq)]
pub struct DedupGroup {
    /// Trimmed, lowercased combined text
    pub normalized_key: String,
    /// Member submission ids, first-seen order; `members[0]` is the
    /// representative
    pub member_ids: Vec<String>,
    /// Positions of the members in the original input list
    pub member_indices: Vec<usize>,
    pub size: usize,
    pub is_unique: bool,
    /// `1/{total / size}` with integer floor; lossy display format kept for
    /// downstream compatibility, exact size travels alongside
    pub ratio: String,
}

impl DedupGroup {
    /// Input-list position of the representative.
    pub fn representative_index(&self) -> usize {
        self.member_indices[0]
    }
}

/// Dedup index over one input list. Group order is first-seen, so the same
/// input order always produces the same table.
#[derive(Debug, Clone)]
pub struct DedupTable {
    pub groups: Vec<DedupGroup>,
    pub total: usize,
    key_to_group: HashMap<String, usize>,
}

impl DedupTable {
    /// Normalization applied before comparing submissions.
    pub fn normalized_key(text: &str) -> String {
        text.trim().to_lowercase()
    }

    /// Build the dedup table in two passes: group member indices by
    /// normalized key (insertion order preserved via a first-seen key list,
    /// never an unordered map's iteration order), then stamp each group with
    /// its statistics.
    pub fn build(submissions: &[Submission]) -> Self {
        let total = submissions.len();
        let mut key_order: Vec<String> = Vec::new();
        let mut members: HashMap<String, Vec<usize>> = HashMap::new();

        for (index, submission) in submissions.iter().enumerate() {
            let key = Self::normalized_key(&submission.combined_text);
            match members.get_mut(&key) {
                Some(list) => list.push(index),
                None => {
                    members.insert(key.clone(), vec![index]);
                    key_order.push(key);
                }
            }
        }

        let mut groups = Vec::with_capacity(key_order.len());
        let mut key_to_group = HashMap::with_capacity(key_order.len());
        for key in key_order {
            let member_indices = members.remove(&key).unwrap_or_default();
            let size = member_indices.len();
            let member_ids = member_indices
                .iter()
                .map(|&i| submissions[i].id.clone())
                .collect();
            key_to_group.insert(key.clone(), groups.len());
            groups.push(DedupGroup {
                normalized_key: key,
                member_ids,
                member_indices,
                size,
                is_unique: size == 1,
                ratio: format!("1/{}", total / size),
            });
        }

        info!(
            "Deduplication complete: {} submissions, {} unique, {:.1}x average duplication",
            total,
            groups.len(),
            if groups.is_empty() {
                0.0
            } else {
                total as f64 / groups.len() as f64
            }
        );

        Self {
            groups,
            total,
            key_to_group,
        }
    }

    /// Number of unique text groups (= classifier calls the run will make).
    pub fn unique_count(&self) -> usize {
        self.groups.len()
    }

    /// Group owning the given combined text, if any.
    pub fn group_for(&self, combined_text: &str) -> Option<&DedupGroup> {
        self.group_index_for(combined_text).map(|i| &self.groups[i])
    }

    /// Position of the owning group, aligned with the representative and
    /// outcome ordering.
    pub fn group_index_for(&self, combined_text: &str) -> Option<usize> {
        let key = Self::normalized_key(combined_text);
        self.key_to_group.get(&key).copied()
    }

    /// Representatives in group order, borrowed from the input list.
    pub fn representatives<'a>(&self, submissions: &'a [Submission]) -> Vec<&'a Submission> {
        self.groups
            .iter()
            .map(|g| &submissions[g.representative_index()])
            .collect()
    }
}
