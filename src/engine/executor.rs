//! Execution engine - applies a plan kind by kind, saving state as it goes

use anyhow::Result;
use colored::Colorize;
use declarative::{
    Action, ConfirmCallback, ExecuteOptions, ExecuteSummary, Lifecycle, PlannedChange,
    ProgressCallback, confirm_changes,
};

use super::differ::display_plan;
use super::planner::{Lifecycles, Plan};
use crate::state::{MxformState, store};

/// Deletions first, then everything else
fn split<L: Lifecycle>(
    changes: Vec<PlannedChange<L>>,
) -> (Vec<PlannedChange<L>>, Vec<PlannedChange<L>>) {
    changes
        .into_iter()
        .partition(|change| change.action == Action::Delete)
}

/// Display the plan, confirm, then apply it
///
/// Deletions run first, rooms before users before content, so nothing is
/// torn down while something declared still points at it. Creates and
/// updates then run content, users, rooms. Every resource's record is
/// saved before the next one starts.
pub fn execute<'a, C, P>(
    lifecycles: &Lifecycles<'a>,
    plan: Plan<'a>,
    state: &mut MxformState,
    opts: &ExecuteOptions,
    confirm: &mut C,
    progress: &mut P,
) -> Result<ExecuteSummary>
where
    C: ConfirmCallback,
    P: ProgressCallback,
{
    display_plan(&plan, lifecycles);

    let total = plan.change_count();
    if !confirm_changes(total, opts, confirm)? {
        if total > 0 && opts.dry_run {
            println!();
            println!("  {} Dry run - no changes made", "ℹ".blue());
        } else if total > 0 {
            println!();
            println!("  {} Aborted", "✗".red());
            return Ok(ExecuteSummary {
                skipped: total,
                ..Default::default()
            });
        }
        return Ok(ExecuteSummary::default());
    }

    let (content_deletes, content) = split(plan.content);
    let (user_deletes, users) = split(plan.users);
    let (room_deletes, rooms) = split(plan.rooms);

    let mut summary = ExecuteSummary::default();

    let result = declarative::execute(&lifecycles.rooms, room_deletes, progress, |label, change| {
        store(&mut state.rooms, label, change);
        state.touch()
    })?;
    summary.merge(&result);

    let result = declarative::execute(&lifecycles.users, user_deletes, progress, |label, change| {
        store(&mut state.users, label, change);
        state.touch()
    })?;
    summary.merge(&result);

    let result = declarative::execute(
        &lifecycles.content,
        content_deletes,
        progress,
        |label, change| {
            store(&mut state.content, label, change);
            state.touch()
        },
    )?;
    summary.merge(&result);

    let result = declarative::execute(&lifecycles.content, content, progress, |label, change| {
        store(&mut state.content, label, change);
        state.touch()
    })?;
    summary.merge(&result);

    let result = declarative::execute(&lifecycles.users, users, progress, |label, change| {
        store(&mut state.users, label, change);
        state.touch()
    })?;
    summary.merge(&result);

    let result = declarative::execute(&lifecycles.rooms, rooms, progress, |label, change| {
        store(&mut state.rooms, label, change);
        state.touch()
    })?;
    summary.merge(&result);

    print_summary(&summary);
    Ok(summary)
}

/// Print final summary
pub fn print_summary(summary: &ExecuteSummary) {
    println!();
    if summary.is_success() {
        println!("  {} Configuration applied successfully!", "✓".green().bold());
    } else {
        println!("  {} Configuration applied with errors", "⚠".yellow().bold());
    }

    if summary.created > 0 {
        println!("    • {} resources created", summary.created);
    }
    if summary.modified > 0 {
        println!("    • {} resources modified", summary.modified);
    }
    if summary.replaced > 0 {
        println!("    • {} resources replaced", summary.replaced);
    }
    if summary.removed > 0 {
        println!("    • {} resources removed", summary.removed);
    }
    if summary.forgotten > 0 {
        println!("    • {} records forgotten", summary.forgotten);
    }
    if summary.skipped > 0 {
        println!("    • {} resources skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "resources".red());
    }
}
