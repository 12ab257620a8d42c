//! Reconcile planner - decides what to do with each declared or recorded resource

use crate::lifecycle::{Existence, Lifecycle, Refresh};
use crate::types::Action;
use anyhow::{Context, Result};

/// Planned action for a single resource, with everything needed to apply it
pub struct PlannedChange<L: Lifecycle> {
    /// Label the resource is declared under
    pub label: String,
    /// What to do
    pub action: Action,
    /// Declared state, absent when the resource was removed from the manifest
    pub desired: Option<L::Desired>,
    /// Refreshed record, absent when there is nothing recorded
    pub record: Option<L::Record>,
}

impl<L: Lifecycle> PlannedChange<L> {
    /// Resource address, `kind.label`
    pub fn address(&self, lifecycle: &L) -> String {
        format!("{}.{}", lifecycle.kind(), self.label)
    }
}

impl<L: Lifecycle> std::fmt::Debug for PlannedChange<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlannedChange")
            .field("label", &self.label)
            .field("action", &self.action)
            .field("has_desired", &self.desired.is_some())
            .field("has_record", &self.record.is_some())
            .finish()
    }
}

/// Plan one resource
///
/// Runs Exists and Read against the recorded resource, then diffs the
/// refreshed record against the declaration:
///
/// | record | exists/read | declared | action    |
/// |--------|-------------|----------|-----------|
/// | none   | -           | yes      | Create    |
/// | some   | gone        | yes      | Create    |
/// | some   | gone        | no       | Forget    |
/// | some   | unverified  | any      | Unverified|
/// | some   | present     | no       | Delete    |
/// | some   | present     | yes      | diff      |
pub fn plan_resource<L: Lifecycle>(
    lifecycle: &L,
    label: &str,
    desired: Option<L::Desired>,
    record: Option<L::Record>,
) -> Result<PlannedChange<L>> {
    let address = format!("{}.{}", lifecycle.kind(), label);
    let planned = |action: Action,
                   desired: Option<L::Desired>,
                   record: Option<L::Record>|
     -> PlannedChange<L> {
        PlannedChange {
            label: label.to_string(),
            action,
            desired,
            record,
        }
    };

    let Some(record) = record else {
        return Ok(planned(Action::Create { reason: None }, desired, None));
    };

    let gone = |reason: String, desired: Option<L::Desired>| {
        log::info!("{address} no longer exists: {reason}");
        match desired {
            Some(desired) => planned(
                Action::Create {
                    reason: Some(reason),
                },
                Some(desired),
                None,
            ),
            None => planned(Action::Forget { reason }, None, None),
        }
    };

    match lifecycle.exists(&record) {
        Existence::Present => {}
        Existence::Gone { reason } => return Ok(gone(reason, desired)),
        Existence::Unverified { error } => {
            log::warn!("{address}: could not verify existence, keeping it: {error:#}");
            return Ok(planned(
                Action::Unverified {
                    reason: format!("{error:#}"),
                },
                desired,
                Some(record),
            ));
        }
    }

    let record = match lifecycle
        .read(&record)
        .with_context(|| format!("reading {address}"))?
    {
        Refresh::Current(record) => record,
        Refresh::Gone { reason } => return Ok(gone(reason, desired)),
    };

    let Some(desired) = desired else {
        return Ok(planned(Action::Delete, None, Some(record)));
    };

    let changes = lifecycle.diff(&record, &desired);
    let action = if changes.is_empty() {
        Action::NoChange
    } else if changes.requires_replace() {
        Action::Replace { changes }
    } else {
        Action::Update { changes }
    };
    Ok(planned(action, Some(desired), Some(record)))
}

/// Plan the removal of a recorded resource, as `destroy` does
///
/// Skips Read: a resource that still exists is deleted as recorded.
pub fn plan_destroy<L: Lifecycle>(
    lifecycle: &L,
    label: &str,
    record: L::Record,
) -> PlannedChange<L> {
    let action = match lifecycle.exists(&record) {
        Existence::Gone { reason } => Action::Forget { reason },
        Existence::Present | Existence::Unverified { .. } => Action::Delete,
    };
    PlannedChange {
        label: label.to_string(),
        action,
        desired: None,
        record: Some(record),
    }
}

/// Resource filter parsed from `kind` or `kind.label`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Target {
    /// Resource kind to match
    pub kind: Option<String>,
    /// Label to match
    pub label: Option<String>,
}

/// Invalid target string
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid target {0:?}: expected `kind` or `kind.label`")]
pub struct ParseTargetError(String);

impl std::str::FromStr for Target {
    type Err = ParseTargetError;

    fn from_str(target: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<&str> = target.split('.').collect();
        match parts.as_slice() {
            [kind] if !kind.is_empty() => Ok(Self {
                kind: Some((*kind).to_string()),
                label: None,
            }),
            [kind, label] if !kind.is_empty() && !label.is_empty() => Ok(Self {
                kind: Some((*kind).to_string()),
                label: Some((*label).to_string()),
            }),
            _ => Err(ParseTargetError(target.to_string())),
        }
    }
}

impl Target {
    /// Check if a resource matches the filter criteria
    pub fn matches(&self, kind: &str, label: &str) -> bool {
        if let Some(k) = &self.kind
            && k != kind
        {
            return false;
        }
        if let Some(l) = &self.label
            && l != label
        {
            return false;
        }
        true
    }
}

/// Check a resource against an optional target
pub fn matches_target(target: Option<&Target>, kind: &str, label: &str) -> bool {
    target.is_none_or(|t| t.matches(kind, label))
}
