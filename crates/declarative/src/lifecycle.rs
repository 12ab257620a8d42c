//! Lifecycle trait for remotely owned resources
//!
//! A Lifecycle knows how to check, create, refresh, update and delete one
//! kind of resource whose authoritative state lives on a remote server. The
//! reconciler only ever holds two things per resource: what was declared
//! (`Desired`) and what was last recorded (`Record`).

use crate::diff::ChangeSet;
use anyhow::Result;

/// Result of an existence check
#[derive(Debug)]
pub enum Existence {
    /// The resource is still there
    Present,
    /// The resource is gone and its record should be dropped
    Gone { reason: String },
    /// The check itself failed; assume the resource is still there
    Unverified { error: anyhow::Error },
}

impl Existence {
    /// Whether the record should be kept
    pub fn is_present(&self) -> bool {
        !matches!(self, Self::Gone { .. })
    }
}

/// A freshly created record, possibly with a non-fatal follow-up failure
#[derive(Debug)]
pub struct Created<R> {
    /// The record to persist
    pub record: R,
    /// A failure that happened after identity was established
    pub warning: Option<anyhow::Error>,
}

impl<R> Created<R> {
    /// A clean creation
    pub fn ok(record: R) -> Self {
        Self {
            record,
            warning: None,
        }
    }

    /// A creation whose follow-up step failed
    pub fn with_warning(record: R, warning: anyhow::Error) -> Self {
        Self {
            record,
            warning: Some(warning),
        }
    }
}

/// Result of refreshing a record
#[derive(Debug)]
pub enum Refresh<R> {
    /// The refreshed record
    Current(R),
    /// The resource is gone
    Gone { reason: String },
}

/// Core trait for remotely owned resources
///
/// # Example
///
/// ```ignore
/// use declarative::{ChangeSet, Created, Existence, Lifecycle, Refresh};
///
/// struct Notes;
///
/// impl Lifecycle for Notes {
///     type Desired = String;
///     type Record = String;
///
///     fn kind(&self) -> &'static str { "note" }
///     fn exists(&self, _: &String) -> Existence { Existence::Present }
///     fn create(&self, text: &String) -> anyhow::Result<Created<String>> {
///         Ok(Created::ok(text.clone()))
///     }
///     fn read(&self, record: &String) -> anyhow::Result<Refresh<String>> {
///         Ok(Refresh::Current(record.clone()))
///     }
///     fn diff(&self, record: &String, text: &String) -> ChangeSet {
///         let mut changes = ChangeSet::new();
///         changes.force_new("text", record, text);
///         changes
///     }
///     fn update(&self, record: &String, _: &String, _: &ChangeSet) -> anyhow::Result<String> {
///         Ok(record.clone())
///     }
///     fn delete(&self, _: &mut String) -> anyhow::Result<()> { Ok(()) }
/// }
/// ```
pub trait Lifecycle {
    /// Declared state
    type Desired;
    /// Durable record: handle plus computed fields
    type Record: Clone;

    /// Resource kind, used for display and target filtering
    fn kind(&self) -> &'static str;

    /// Check whether the recorded resource still exists
    fn exists(&self, record: &Self::Record) -> Existence;

    /// Create or adopt the resource
    fn create(&self, desired: &Self::Desired) -> Result<Created<Self::Record>>;

    /// Refresh observed fields
    fn read(&self, record: &Self::Record) -> Result<Refresh<Self::Record>>;

    /// Compare a refreshed record against the declaration
    ///
    /// Fields left undeclared must not show up as changes.
    fn diff(&self, record: &Self::Record, desired: &Self::Desired) -> ChangeSet;

    /// Apply in-place changes, returning the record to persist
    fn update(
        &self,
        record: &Self::Record,
        desired: &Self::Desired,
        changes: &ChangeSet,
    ) -> Result<Self::Record>;

    /// Delete the resource
    ///
    /// The record is mutable so a partial teardown can record its progress;
    /// on error the mutated record is persisted.
    fn delete(&self, record: &mut Self::Record) -> Result<()>;
}
