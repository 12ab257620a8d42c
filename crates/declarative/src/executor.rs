//! Execution engine - applies planned changes sequentially
//!
//! Resources are applied one at a time, in plan order. Every applied change
//! is handed to a sink right away so the caller can persist it before the
//! next remote call.

use crate::context::{ConfirmCallback, ProgressCallback};
use crate::lifecycle::{Created, Lifecycle, Refresh};
use crate::planner::PlannedChange;
use crate::types::{Action, ApplyResult, ExecuteOptions, ExecuteSummary, RecordChange};
use anyhow::{Context, Result};

/// Ask for confirmation before applying `total_changes` changes
///
/// Returns `false` when nothing should be applied: no changes, a dry run,
/// or a declined prompt.
pub fn confirm_changes<C: ConfirmCallback>(
    total_changes: usize,
    opts: &ExecuteOptions,
    confirm: &mut C,
) -> Result<bool> {
    if total_changes == 0 || opts.dry_run {
        return Ok(false);
    }
    if opts.yes {
        return Ok(true);
    }
    confirm.confirm(&format!("Apply {total_changes} change(s)?"))
}

/// Apply a list of planned changes for one lifecycle
///
/// `sink` receives the record change of every resource as soon as it is
/// known; an error from the sink aborts the run.
pub fn execute<L, P, S>(
    lifecycle: &L,
    changes: Vec<PlannedChange<L>>,
    progress: &mut P,
    mut sink: S,
) -> Result<ExecuteSummary>
where
    L: Lifecycle,
    P: ProgressCallback,
    S: FnMut(&str, RecordChange<L::Record>) -> Result<()>,
{
    let mut summary = ExecuteSummary::default();
    let pending = changes.iter().filter(|c| c.action.is_change()).count();
    if pending > 0 {
        progress.on_batch_start(pending, lifecycle.kind());
    }

    for change in changes {
        let address = change.address(lifecycle);
        let label = change.label.clone();
        let visible = change.action.is_change();

        if visible {
            progress.on_resource_start(&address, &describe(&change.action));
        }
        let (result, record) = apply_change(lifecycle, change);
        if visible {
            progress.on_resource_complete(&address, &result);
        }
        if let ApplyResult::Failed { error } = &result {
            log::error!("{address}: {error}");
        }

        summary.add_result(&result);
        sink(&label, record).with_context(|| format!("saving state for {address}"))?;
    }

    if pending > 0 {
        progress.on_batch_complete();
    }
    Ok(summary)
}

fn describe(action: &Action) -> String {
    match action {
        Action::NoChange => "unchanged".into(),
        Action::Create { reason: None } => "creating".into(),
        Action::Create { reason: Some(_) } => "recreating".into(),
        Action::Update { changes } => format!("updating {} field(s)", changes.len()),
        Action::Replace { .. } => "replacing".into(),
        Action::Delete => "deleting".into(),
        Action::Forget { .. } => "forgetting".into(),
        Action::Unverified { .. } => "skipping".into(),
    }
}

/// Apply a single planned change
pub fn apply_change<L: Lifecycle>(
    lifecycle: &L,
    change: PlannedChange<L>,
) -> (ApplyResult, RecordChange<L::Record>) {
    let PlannedChange {
        action,
        desired,
        record,
        ..
    } = change;

    match (action, desired, record) {
        (Action::NoChange, _, Some(record)) => (ApplyResult::NoChange, RecordChange::Store(record)),
        (Action::NoChange, _, None) => (ApplyResult::NoChange, RecordChange::Keep),
        (Action::Unverified { reason }, _, _) => {
            (ApplyResult::Skipped { reason }, RecordChange::Keep)
        }
        (Action::Forget { .. }, _, _) => (ApplyResult::Forgotten, RecordChange::Remove),
        (Action::Create { .. }, Some(desired), _) => {
            create_and_read(lifecycle, &desired, ApplyResult::Created, RecordChange::Keep)
        }
        (Action::Update { changes }, Some(desired), Some(record)) => {
            match lifecycle.update(&record, &desired, &changes) {
                Ok(updated) => (
                    ApplyResult::Modified,
                    RecordChange::Store(refresh(lifecycle, updated)),
                ),
                Err(err) => (ApplyResult::failed(&err), RecordChange::Keep),
            }
        }
        (Action::Replace { .. }, Some(desired), Some(mut record)) => {
            if let Err(err) = lifecycle.delete(&mut record) {
                return (ApplyResult::failed(&err), RecordChange::Store(record));
            }
            create_and_read(lifecycle, &desired, ApplyResult::Replaced, RecordChange::Remove)
        }
        (Action::Delete, _, Some(mut record)) => match lifecycle.delete(&mut record) {
            Ok(()) => (ApplyResult::Removed, RecordChange::Remove),
            Err(err) => (ApplyResult::failed(&err), RecordChange::Store(record)),
        },
        (action, desired, record) => (
            ApplyResult::Failed {
                error: format!(
                    "cannot {action:?}: declaration {}, record {}",
                    if desired.is_some() { "present" } else { "missing" },
                    if record.is_some() { "present" } else { "missing" },
                ),
            },
            RecordChange::Keep,
        ),
    }
}

fn create_and_read<L: Lifecycle>(
    lifecycle: &L,
    desired: &L::Desired,
    success: ApplyResult,
    on_error: RecordChange<L::Record>,
) -> (ApplyResult, RecordChange<L::Record>) {
    match lifecycle.create(desired) {
        Ok(Created { record, warning }) => {
            let record = refresh(lifecycle, record);
            match warning {
                Some(warning) => (ApplyResult::failed(&warning), RecordChange::Store(record)),
                None => (success, RecordChange::Store(record)),
            }
        }
        Err(err) => (ApplyResult::failed(&err), on_error),
    }
}

/// Read back computed fields after a write, falling back to the written record
fn refresh<L: Lifecycle>(lifecycle: &L, record: L::Record) -> L::Record {
    match lifecycle.read(&record) {
        Ok(Refresh::Current(current)) => current,
        Ok(Refresh::Gone { reason }) => {
            log::warn!("{} vanished right after being written: {reason}", lifecycle.kind());
            record
        }
        Err(err) => {
            log::warn!("{}: refresh after write failed: {err:#}", lifecycle.kind());
            record
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AutoConfirm, AutoDecline, NoProgress};
    use crate::planner::plan_resource;
    use crate::testing::{Fake, FakeRecord};

    fn run(fake: &Fake, change: PlannedChange<Fake>) -> (ExecuteSummary, Vec<RecordChange<FakeRecord>>) {
        let mut stored = Vec::new();
        let summary = execute(fake, vec![change], &mut NoProgress, |_, record| {
            stored.push(record);
            Ok(())
        })
        .unwrap();
        (summary, stored)
    }

    #[test]
    fn test_confirm_changes() {
        let opts = ExecuteOptions::default();
        assert!(!confirm_changes(0, &opts, &mut AutoConfirm).unwrap());
        assert!(confirm_changes(2, &opts, &mut AutoConfirm).unwrap());
        assert!(!confirm_changes(2, &opts, &mut AutoDecline).unwrap());

        let yes = ExecuteOptions {
            yes: true,
            ..Default::default()
        };
        assert!(confirm_changes(2, &yes, &mut AutoDecline).unwrap());

        let dry = ExecuteOptions {
            dry_run: true,
            yes: true,
        };
        assert!(!confirm_changes(2, &dry, &mut AutoConfirm).unwrap());
    }

    #[test]
    fn test_create_then_read() {
        let fake = Fake::default();
        let change = plan_resource(&fake, "a", Some("x".to_string()), None).unwrap();
        let (summary, stored) = run(&fake, change);

        assert_eq!(summary.created, 1);
        assert_eq!(fake.calls(), vec!["create", "read"]);
        assert_eq!(stored, vec![RecordChange::Store(FakeRecord::new("x"))]);
    }

    #[test]
    fn test_create_warning_is_failure_but_stores_record() {
        let fake = Fake {
            warn_on_create: true,
            ..Fake::default()
        };
        let change = plan_resource(&fake, "a", Some("x".to_string()), None).unwrap();
        let (summary, stored) = run(&fake, change);

        assert_eq!(summary.failed, 1);
        assert_eq!(stored, vec![RecordChange::Store(FakeRecord::new("x"))]);
    }

    #[test]
    fn test_update_then_read() {
        let fake = Fake::default();
        let change =
            plan_resource(&fake, "a", Some("y".to_string()), Some(FakeRecord::new("x"))).unwrap();
        fake.clear_calls();
        let (summary, stored) = run(&fake, change);

        assert_eq!(summary.modified, 1);
        assert_eq!(fake.calls(), vec!["update", "read"]);
        assert_eq!(stored, vec![RecordChange::Store(FakeRecord::new("y"))]);
    }

    #[test]
    fn test_replace_deletes_then_creates() {
        let fake = Fake {
            replace_on_change: true,
            ..Fake::default()
        };
        let change =
            plan_resource(&fake, "a", Some("y".to_string()), Some(FakeRecord::new("x"))).unwrap();
        fake.clear_calls();
        let (summary, _) = run(&fake, change);

        assert_eq!(summary.replaced, 1);
        assert_eq!(fake.calls(), vec!["delete", "create", "read"]);
    }

    #[test]
    fn test_failed_delete_stores_progress() {
        let fake = Fake {
            fail_delete: true,
            ..Fake::default()
        };
        let change = plan_resource(&fake, "a", None, Some(FakeRecord::new("x"))).unwrap();
        let (summary, stored) = run(&fake, change);

        assert_eq!(summary.failed, 1);
        match &stored[0] {
            RecordChange::Store(record) => assert_eq!(record.delete_attempts, 1),
            other => panic!("expected stored record, got {other:?}"),
        }
    }

    #[test]
    fn test_delete_removes_record() {
        let fake = Fake::default();
        let change = plan_resource(&fake, "a", None, Some(FakeRecord::new("x"))).unwrap();
        let (summary, stored) = run(&fake, change);

        assert_eq!(summary.removed, 1);
        assert_eq!(stored, vec![RecordChange::Remove]);
    }

    #[test]
    fn test_sink_error_aborts() {
        let fake = Fake::default();
        let change = plan_resource(&fake, "a", Some("x".to_string()), None).unwrap();
        let err = execute(&fake, vec![change], &mut NoProgress, |_, _| {
            anyhow::bail!("disk full")
        })
        .unwrap_err();
        assert!(format!("{err:#}").contains("disk full"));
    }
}
