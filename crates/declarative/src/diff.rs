//! Field-level changes between a record and a declaration

use serde::{Deserialize, Serialize};
use std::fmt;

/// One changed field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    /// Field name as declared
    pub field: String,
    /// Recorded value
    pub old: String,
    /// Declared value
    pub new: String,
    /// Whether the change needs the resource to be recreated
    pub force_new: bool,
}

impl fmt::Display for FieldChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?} => {:?}", self.field, self.old, self.new)?;
        if self.force_new {
            write!(f, " (forces replacement)")?;
        }
        Ok(())
    }
}

/// Ordered set of field changes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    changes: Vec<FieldChange>,
}

impl ChangeSet {
    /// Create an empty change set
    pub fn new() -> Self {
        Self::default()
    }

    fn push<T: fmt::Display + PartialEq + ?Sized>(
        &mut self,
        field: &str,
        old: &T,
        new: &T,
        force_new: bool,
    ) {
        if old != new {
            self.changes.push(FieldChange {
                field: field.to_string(),
                old: old.to_string(),
                new: new.to_string(),
                force_new,
            });
        }
    }

    /// Track a field that can be updated in place
    pub fn in_place<T: fmt::Display + PartialEq + ?Sized>(&mut self, field: &str, old: &T, new: &T) {
        self.push(field, old, new, false);
    }

    /// Track a field whose change forces replacement
    pub fn force_new<T: fmt::Display + PartialEq + ?Sized>(&mut self, field: &str, old: &T, new: &T) {
        self.push(field, old, new, true);
    }

    /// Track a list field whose change forces replacement
    pub fn force_new_list(&mut self, field: &str, old: &[String], new: &[String]) {
        if old != new {
            self.push(field, old.join(",").as_str(), new.join(",").as_str(), true);
        }
    }

    /// Whether nothing changed
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of changed fields
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Whether any change forces replacement
    pub fn requires_replace(&self) -> bool {
        self.changes.iter().any(|c| c.force_new)
    }

    /// Names of fields that force replacement
    pub fn force_new_fields(&self) -> Vec<&str> {
        self.changes
            .iter()
            .filter(|c| c.force_new)
            .map(|c| c.field.as_str())
            .collect()
    }

    /// Whether a field changed
    pub fn contains(&self, field: &str) -> bool {
        self.changes.iter().any(|c| c.field == field)
    }

    /// The change for a field
    pub fn get(&self, field: &str) -> Option<&FieldChange> {
        self.changes.iter().find(|c| c.field == field)
    }

    /// Iterate over changes in tracking order
    pub fn iter(&self) -> impl Iterator<Item = &FieldChange> {
        self.changes.iter()
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a FieldChange;
    type IntoIter = std::slice::Iter<'a, FieldChange>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_values_are_not_tracked() {
        let mut changes = ChangeSet::new();
        changes.in_place("name", "Lobby", "Lobby");
        changes.force_new_list("invite_user_ids", &["@a:hs".to_string()], &["@a:hs".to_string()]);
        assert!(changes.is_empty());
    }

    #[test]
    fn test_in_place_change() {
        let mut changes = ChangeSet::new();
        changes.in_place("topic", "old", "new");
        assert_eq!(changes.len(), 1);
        assert!(!changes.requires_replace());
        assert_eq!(changes.get("topic").unwrap().new, "new");
    }

    #[test]
    fn test_force_new_change() {
        let mut changes = ChangeSet::new();
        changes.in_place("name", "a", "b");
        changes.force_new("preset", "private_chat", "public_chat");
        assert!(changes.requires_replace());
        assert_eq!(changes.force_new_fields(), vec!["preset"]);
        assert!(changes.contains("name"));
    }

    #[test]
    fn test_bool_fields() {
        let mut changes = ChangeSet::new();
        changes.in_place("guests_allowed", &true, &false);
        let change = changes.get("guests_allowed").unwrap();
        assert_eq!(change.old, "true");
        assert_eq!(change.new, "false");
        assert_eq!(change.to_string(), "guests_allowed: \"true\" => \"false\"");
    }
}
