//! In-memory lifecycle for planner and executor tests

use crate::diff::ChangeSet;
use crate::lifecycle::{Created, Existence, Lifecycle, Refresh};
use anyhow::Result;
use std::cell::RefCell;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FakeRecord {
    pub value: String,
    pub gone: bool,
    pub unverified: bool,
    pub delete_attempts: usize,
}

impl FakeRecord {
    pub fn new(value: &str) -> Self {
        Self {
            value: value.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
pub struct Fake {
    pub replace_on_change: bool,
    pub warn_on_create: bool,
    pub fail_delete: bool,
    pub(crate) calls: RefCell<Vec<&'static str>>,
}

impl Fake {
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    fn call(&self, name: &'static str) {
        self.calls.borrow_mut().push(name);
    }
}

impl Lifecycle for Fake {
    type Desired = String;
    type Record = FakeRecord;

    fn kind(&self) -> &'static str {
        "fake"
    }

    fn exists(&self, record: &FakeRecord) -> Existence {
        self.call("exists");
        if record.gone {
            Existence::Gone {
                reason: "deleted remotely".into(),
            }
        } else if record.unverified {
            Existence::Unverified {
                error: anyhow::anyhow!("timed out"),
            }
        } else {
            Existence::Present
        }
    }

    fn create(&self, desired: &String) -> Result<Created<FakeRecord>> {
        self.call("create");
        let record = FakeRecord::new(desired);
        if self.warn_on_create {
            Ok(Created::with_warning(record, anyhow::anyhow!("profile update failed")))
        } else {
            Ok(Created::ok(record))
        }
    }

    fn read(&self, record: &FakeRecord) -> Result<Refresh<FakeRecord>> {
        self.call("read");
        Ok(Refresh::Current(record.clone()))
    }

    fn diff(&self, record: &FakeRecord, desired: &String) -> ChangeSet {
        let mut changes = ChangeSet::new();
        if self.replace_on_change {
            changes.force_new("value", &record.value, desired);
        } else {
            changes.in_place("value", &record.value, desired);
        }
        changes
    }

    fn update(&self, _record: &FakeRecord, desired: &String, _changes: &ChangeSet) -> Result<FakeRecord> {
        self.call("update");
        Ok(FakeRecord::new(desired))
    }

    fn delete(&self, record: &mut FakeRecord) -> Result<()> {
        self.call("delete");
        record.delete_attempts += 1;
        if self.fail_delete {
            anyhow::bail!("step 3 failed");
        }
        Ok(())
    }
}
