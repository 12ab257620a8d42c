//! Progress indicators for the mxform CLI.

use colored::Colorize;
use declarative::{ApplyResult, ProgressCallback};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner with a message, ticking on its own
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn outcome(result: &ApplyResult) -> String {
    match result {
        ApplyResult::NoChange => format!("{}", "○".dimmed()),
        ApplyResult::Created
        | ApplyResult::Modified
        | ApplyResult::Replaced
        | ApplyResult::Removed
        | ApplyResult::Forgotten => format!("{}", "✓".green()),
        ApplyResult::Failed { .. } => format!("{}", "✗".red()),
        ApplyResult::Skipped { .. } => format!("{}", "⊘".yellow()),
    }
}

fn detail(result: &ApplyResult) -> Option<&str> {
    match result {
        ApplyResult::Failed { error } => Some(error),
        ApplyResult::Skipped { reason } => Some(reason),
        _ => None,
    }
}

/// Reports apply progress: a spinner per resource, then one line with its outcome
#[derive(Default)]
pub struct ApplyProgress {
    current: Option<ProgressBar>,
    quiet: bool,
}

impl ApplyProgress {
    pub fn new(quiet: bool) -> Self {
        Self {
            current: None,
            quiet,
        }
    }
}

impl ProgressCallback for ApplyProgress {
    fn on_batch_start(&mut self, count: usize, kind: &str) {
        if self.quiet {
            return;
        }
        println!();
        println!("  {} Applying {} {} change(s)...", "→".cyan(), count, kind);
    }

    fn on_resource_start(&mut self, id: &str, description: &str) {
        if self.quiet {
            return;
        }
        self.current = Some(spinner(&format!("{description} {id}")));
    }

    fn on_resource_complete(&mut self, id: &str, result: &ApplyResult) {
        if let Some(pb) = self.current.take() {
            pb.finish_and_clear();
        }
        if self.quiet {
            return;
        }
        match detail(result) {
            Some(detail) => println!("    {} {} {}", outcome(result), id, detail.dimmed()),
            None => println!("    {} {}", outcome(result), id),
        }
    }

    fn on_batch_complete(&mut self) {
        if let Some(pb) = self.current.take() {
            pb.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_only_for_failures_and_skips() {
        assert_eq!(
            detail(&ApplyResult::Failed {
                error: "boom".into()
            }),
            Some("boom")
        );
        assert_eq!(
            detail(&ApplyResult::Skipped {
                reason: "unverified".into()
            }),
            Some("unverified")
        );
        assert_eq!(detail(&ApplyResult::Created), None);
    }

    #[test]
    fn test_quiet_progress_draws_nothing() {
        let mut progress = ApplyProgress::new(true);
        progress.on_batch_start(1, "room");
        progress.on_resource_start("room.lobby", "creating");
        assert!(progress.current.is_none());
        progress.on_resource_complete("room.lobby", &ApplyResult::Created);
        progress.on_batch_complete();
    }
}
