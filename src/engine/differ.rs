//! Plan display

use super::planner::{Lifecycles, Plan};
use colored::{ColoredString, Colorize};
use declarative::{Action, Lifecycle, PlannedChange};

fn symbol(action: &Action) -> ColoredString {
    let symbol = action.symbol();
    match action {
        Action::Create { .. } => symbol.green(),
        Action::Update { .. } => symbol.yellow(),
        Action::Replace { .. } => symbol.magenta(),
        Action::Delete => symbol.red(),
        Action::Forget { .. } | Action::Unverified { .. } => symbol.dimmed(),
        Action::NoChange => symbol.normal(),
    }
}

fn describe(action: &Action) -> String {
    match action {
        Action::NoChange => String::new(),
        Action::Create { reason: None } => "(will create)".into(),
        Action::Create { reason: Some(reason) } => format!("(gone, will recreate: {reason})"),
        Action::Update { changes } => format!("({} field(s) in place)", changes.len()),
        Action::Replace { changes } => format!(
            "(must be replaced: {})",
            changes.force_new_fields().join(", ")
        ),
        Action::Delete => "(will remove)".into(),
        Action::Forget { reason } => format!("(already gone, record dropped: {reason})"),
        Action::Unverified { reason } => format!("(could not verify, left alone: {reason})"),
    }
}

/// Lines for the changes of one kind
fn kind_lines<L: Lifecycle>(lifecycle: &L, changes: &[PlannedChange<L>]) -> Vec<String> {
    let mut lines = Vec::new();
    for change in changes {
        if change.action == Action::NoChange {
            continue;
        }
        lines.push(format!(
            "│   {} {:<30} {}",
            symbol(&change.action),
            change.address(lifecycle),
            describe(&change.action).dimmed()
        ));
        if let Action::Update { changes } | Action::Replace { changes } = &change.action {
            for field in changes.iter() {
                lines.push(format!("│         {}", field.to_string().dimmed()));
            }
        }
    }
    lines
}

/// Display a plan in a box, grouped by kind
pub fn display_plan<'a>(plan: &Plan<'a>, lifecycles: &Lifecycles<'a>) {
    let sections = [
        ("Content", kind_lines(&lifecycles.content, &plan.content)),
        ("Users", kind_lines(&lifecycles.users, &plan.users)),
        ("Rooms", kind_lines(&lifecycles.rooms, &plan.rooms)),
    ];

    if sections.iter().all(|(_, lines)| lines.is_empty()) {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Plan".bold()
    );
    println!("│");

    for (title, lines) in &sections {
        if lines.is_empty() {
            continue;
        }
        println!("│ {}", title.bold());
        for line in lines {
            println!("{line}");
        }
        println!("│");
    }

    let unverified = plan.unverified_count();
    println!("├─────────────────────────────────────────────────────┤");
    if unverified > 0 {
        println!(
            "│ Summary: {} changes, {} unverified",
            plan.change_count().to_string().bold(),
            unverified.to_string().yellow()
        );
    } else {
        println!(
            "│ Summary: {} changes",
            plan.change_count().to_string().bold()
        );
    }
    println!("└─────────────────────────────────────────────────────┘");
}
