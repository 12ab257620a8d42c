//! Core types for reconciling remote resources

use crate::diff::ChangeSet;
use serde::{Deserialize, Serialize};

/// What the reconciler intends to do with one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Nothing to do
    NoChange,
    /// Create (or adopt) the resource
    Create {
        /// Why an existing record is being recreated, if it is
        reason: Option<String>,
    },
    /// Update fields in place
    Update { changes: ChangeSet },
    /// Delete, then create again
    Replace { changes: ChangeSet },
    /// Delete the resource and drop its record
    Delete,
    /// Drop a record whose resource is already gone
    Forget { reason: String },
    /// The resource could not be checked; leave it alone this run
    Unverified { reason: String },
}

impl Action {
    /// Check if the action changes anything
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::NoChange | Self::Unverified { .. })
    }

    /// Plan symbol, as printed in front of the resource address
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::NoChange => " ",
            Self::Create { .. } => "+",
            Self::Update { .. } => "~",
            Self::Replace { .. } => "-/+",
            Self::Delete => "-",
            Self::Forget { .. } => "x",
            Self::Unverified { .. } => "?",
        }
    }
}

/// Result of applying one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyResult {
    /// No changes needed
    NoChange,
    /// Resource was created
    Created,
    /// Resource was modified in place
    Modified,
    /// Resource was deleted and created again
    Replaced,
    /// Resource was removed
    Removed,
    /// Record was dropped without remote calls
    Forgotten,
    /// Apply failed
    Failed { error: String },
    /// Apply was skipped
    Skipped { reason: String },
}

impl ApplyResult {
    /// Check if the result represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Check if the result represents a change
    pub fn is_change(&self) -> bool {
        matches!(
            self,
            Self::Created | Self::Modified | Self::Replaced | Self::Removed | Self::Forgotten
        )
    }

    /// Build a failure from an error chain
    pub fn failed(error: &anyhow::Error) -> Self {
        Self::Failed {
            error: format!("{error:#}"),
        }
    }
}

/// Summary of execution results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub created: usize,
    pub modified: usize,
    pub replaced: usize,
    pub removed: usize,
    pub forgotten: usize,
    pub skipped: usize,
    pub failed: usize,
    pub no_change: usize,
}

impl ExecuteSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.modified + self.replaced + self.removed + self.forgotten
    }

    /// Check if execution was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of resources processed
    pub fn total(&self) -> usize {
        self.total_changes() + self.skipped + self.failed + self.no_change
    }

    /// Merge another summary into this one
    pub fn merge(&mut self, other: &ExecuteSummary) {
        self.created += other.created;
        self.modified += other.modified;
        self.replaced += other.replaced;
        self.removed += other.removed;
        self.forgotten += other.forgotten;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.no_change += other.no_change;
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &ApplyResult) {
        match result {
            ApplyResult::NoChange => self.no_change += 1,
            ApplyResult::Created => self.created += 1,
            ApplyResult::Modified => self.modified += 1,
            ApplyResult::Replaced => self.replaced += 1,
            ApplyResult::Removed => self.removed += 1,
            ApplyResult::Forgotten => self.forgotten += 1,
            ApplyResult::Failed { .. } => self.failed += 1,
            ApplyResult::Skipped { .. } => self.skipped += 1,
        }
    }
}

/// What to do with the stored record after applying a resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordChange<R> {
    /// Persist this record
    Store(R),
    /// Drop the record
    Remove,
    /// Leave whatever is stored untouched
    Keep,
}

/// Options for execution
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Don't make changes, just show what would happen
    pub dry_run: bool,
    /// Skip the confirmation prompt
    pub yes: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let mut summary = ExecuteSummary::default();
        summary.add_result(&ApplyResult::Created);
        summary.add_result(&ApplyResult::Replaced);
        summary.add_result(&ApplyResult::NoChange);
        summary.add_result(&ApplyResult::Failed {
            error: "boom".into(),
        });

        assert_eq!(summary.total_changes(), 2);
        assert_eq!(summary.total(), 4);
        assert!(!summary.is_success());

        let mut total = ExecuteSummary::default();
        total.merge(&summary);
        total.merge(&summary);
        assert_eq!(total.created, 2);
        assert_eq!(total.failed, 2);
    }

    #[test]
    fn test_action_symbols() {
        assert_eq!(Action::Create { reason: None }.symbol(), "+");
        assert_eq!(
            Action::Replace {
                changes: ChangeSet::new()
            }
            .symbol(),
            "-/+"
        );
        assert!(!Action::NoChange.is_change());
        assert!(Action::Delete.is_change());
    }

    #[test]
    fn test_failed_keeps_context_chain() {
        let err = anyhow::anyhow!("room gone").context("abandoning room.lobby");
        assert_eq!(
            ApplyResult::failed(&err),
            ApplyResult::Failed {
                error: "abandoning room.lobby: room gone".into()
            }
        );
    }
}
