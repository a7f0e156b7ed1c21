//! Diff computation between two templates

use crate::template::{ResourceEntry, Template};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How a single resource or output changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    /// Present only in the new template
    Addition,
    /// Present only in the old template
    Removal,
    /// Present in both with a different body
    Modification,
    /// Same logical id, different resource type (CloudFormation replaces it)
    Replacement { from: String, to: String },
}

/// A diff for one logical id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDiff {
    /// Logical id of the resource
    pub logical_id: String,
    /// Resource type (the new one for additions and modifications)
    pub resource_type: String,
    /// What changed
    pub kind: ChangeKind,
    /// Old body as pretty JSON, if any
    pub old_body: Option<String>,
    /// New body as pretty JSON, if any
    pub new_body: Option<String>,
}

impl ResourceDiff {
    /// Check if this diff represents an addition
    pub fn is_addition(&self) -> bool {
        matches!(self.kind, ChangeKind::Addition)
    }

    /// Check if this diff represents a removal
    pub fn is_removal(&self) -> bool {
        matches!(self.kind, ChangeKind::Removal)
    }

    /// Check if this diff represents a modification or replacement
    pub fn is_modification(&self) -> bool {
        matches!(
            self.kind,
            ChangeKind::Modification | ChangeKind::Replacement { .. }
        )
    }

    /// Line-level changes between the old and new bodies.
    ///
    /// Returns `(tag, line)` pairs where tag is `-` or `+`; unchanged lines
    /// are omitted.
    pub fn changed_lines(&self) -> Vec<(char, String)> {
        let old = self.old_body.as_deref().unwrap_or("");
        let new = self.new_body.as_deref().unwrap_or("");
        let diff = similar::TextDiff::from_lines(old, new);

        diff.iter_all_changes()
            .filter_map(|change| {
                let tag = match change.tag() {
                    similar::ChangeTag::Delete => '-',
                    similar::ChangeTag::Insert => '+',
                    similar::ChangeTag::Equal => return None,
                };
                Some((tag, change.value().trim_end().to_string()))
            })
            .collect()
    }
}

/// Full diff between two templates
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateDiff {
    pub resources: Vec<ResourceDiff>,
    /// Output names with their change kind
    pub outputs: Vec<(String, ChangeKind)>,
}

impl TemplateDiff {
    /// Compare `old` (e.g. last synthesized) against `new`.
    pub fn between(old: &Template, new: &Template) -> Self {
        let ids: BTreeSet<&String> = old.resources.keys().chain(new.resources.keys()).collect();

        let resources = ids
            .into_iter()
            .filter_map(|id| resource_diff(id, old.resource(id), new.resource(id)))
            .collect();

        let names: BTreeSet<&String> = old.outputs.keys().chain(new.outputs.keys()).collect();
        let outputs = names
            .into_iter()
            .filter_map(|name| {
                let kind = match (old.outputs.get(name), new.outputs.get(name)) {
                    (None, Some(_)) => ChangeKind::Addition,
                    (Some(_), None) => ChangeKind::Removal,
                    (Some(a), Some(b)) if a != b => ChangeKind::Modification,
                    _ => return None,
                };
                Some((name.clone(), kind))
            })
            .collect();

        Self { resources, outputs }
    }

    /// Summary statistics
    pub fn summary(&self) -> DiffSummary {
        DiffSummary::from_diffs(&self.resources, self.outputs.len())
    }

    /// Check if there are any changes
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.outputs.is_empty()
    }
}

fn resource_diff(
    id: &str,
    old: Option<&ResourceEntry>,
    new: Option<&ResourceEntry>,
) -> Option<ResourceDiff> {
    let kind = match (old, new) {
        (None, Some(_)) => ChangeKind::Addition,
        (Some(_), None) => ChangeKind::Removal,
        (Some(a), Some(b)) if a.resource_type != b.resource_type => ChangeKind::Replacement {
            from: a.resource_type.clone(),
            to: b.resource_type.clone(),
        },
        (Some(a), Some(b)) if a != b => ChangeKind::Modification,
        _ => return None,
    };

    let resource_type = new.or(old).map(|e| e.resource_type.clone())?;

    Some(ResourceDiff {
        logical_id: id.to_string(),
        resource_type,
        kind,
        old_body: old.and_then(|e| serde_json::to_string_pretty(e).ok()),
        new_body: new.and_then(|e| serde_json::to_string_pretty(e).ok()),
    })
}

/// Diff summary statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffSummary {
    /// Number of resources to add
    pub additions: usize,
    /// Number of resources to remove
    pub removals: usize,
    /// Number of resources to modify in place or replace
    pub modifications: usize,
    /// Number of changed outputs
    pub outputs: usize,
}

impl DiffSummary {
    /// Create a summary from a list of diffs
    pub fn from_diffs(diffs: &[ResourceDiff], outputs: usize) -> Self {
        let mut summary = Self {
            outputs,
            ..Self::default()
        };
        for diff in diffs {
            if diff.is_addition() {
                summary.additions += 1;
            } else if diff.is_removal() {
                summary.removals += 1;
            } else {
                summary.modifications += 1;
            }
        }
        summary
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.additions + self.removals + self.modifications + self.outputs
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}
