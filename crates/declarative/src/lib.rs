//! # Declarative
//!
//! A small reconcile framework for resources whose state lives on a
//! remote server.
//!
//! ## Core Concepts
//!
//! - **Lifecycle**: how to check, create, refresh, update and delete one kind of resource
//! - **ChangeSet**: field-level differences, each marked in-place or force-new
//! - **PlannedChange**: the action chosen for one resource after Exists and Read
//! - **Executor**: applies planned changes one at a time, handing each record to a sink
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{execute, plan_resource, NoProgress, RecordChange};
//!
//! let planned = plan_resource(&rooms, "lobby", Some(desired), state.get("lobby"))?;
//! let summary = execute(&rooms, vec![planned], &mut NoProgress, |label, change| {
//!     match change {
//!         RecordChange::Store(record) => state.insert(label, record),
//!         RecordChange::Remove => state.remove(label),
//!         RecordChange::Keep => {}
//!     }
//!     state.save()
//! })?;
//! ```
//!
//! ## Callback Traits
//!
//! - [`ProgressCallback`]: Receives progress updates
//! - [`ConfirmCallback`]: Handles user confirmations
//!
//! This allows the crate to be used without hard dependencies on
//! specific UI frameworks.

pub mod context;
pub mod diff;
pub mod executor;
pub mod lifecycle;
pub mod planner;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export main types at crate root
pub use context::{AutoConfirm, AutoDecline, ConfirmCallback, NoProgress, ProgressCallback};
pub use diff::{ChangeSet, FieldChange};
pub use executor::{apply_change, confirm_changes, execute};
pub use lifecycle::{Created, Existence, Lifecycle, Refresh};
pub use planner::{ParseTargetError, PlannedChange, Target, matches_target, plan_destroy, plan_resource};
pub use types::{Action, ApplyResult, ExecuteOptions, ExecuteSummary, RecordChange};
