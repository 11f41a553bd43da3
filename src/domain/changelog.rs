//! Per-entity change tracking: a dirty flag plus a human-readable diff log.
//!
//! Every task mutator routes through [`ChangeLog::apply`] (or records an
//! entry directly): the candidate value is compared to the current one and
//! only an actual difference appends a `"<field>: <old> -> <new>"` entry and
//! raises the dirty flag. The write-back phase uses the flag to scope remote
//! updates to entities that really changed.

use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Dirty flag plus ordered change entries for one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLog {
    dirty: bool,
    entries: Vec<String>,
}

impl ChangeLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any mutation stuck since the last [`ChangeLog::reset`].
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The ordered change entries. Empty with a false flag is a valid state.
    #[must_use]
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Record a change entry and raise the dirty flag.
    pub fn record(&mut self, field: &str, old: impl Display, new: impl Display) {
        self.entries.push(format!("{field}: {old} -> {new}"));
        self.dirty = true;
    }

    /// Compare-before-set: overwrite `current` with `candidate` only when
    /// they differ, recording the change. Returns true when a change stuck.
    pub fn apply<T: PartialEq + Display>(
        &mut self,
        field: &str,
        current: &mut T,
        candidate: T,
    ) -> bool {
        if *current == candidate {
            return false;
        }
        self.record(field, &*current, &candidate);
        *current = candidate;
        true
    }

    /// Clear the flag and entries, typically after a successful write-back.
    pub fn reset(&mut self) {
        self.dirty = false;
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_log_is_clean() {
        let log = ChangeLog::new();
        assert!(!log.is_dirty());
        assert!(log.entries().is_empty());
    }

    #[test]
    fn apply_skips_equal_values() {
        let mut log = ChangeLog::new();
        let mut value = 5;
        assert!(!log.apply("count", &mut value, 5));
        assert!(!log.is_dirty());
        assert!(log.entries().is_empty());
    }

    #[test]
    fn apply_records_difference() {
        let mut log = ChangeLog::new();
        let mut value = "NOT_STARTED".to_string();
        assert!(log.apply("status", &mut value, "IN_PROGRESS".to_string()));
        assert!(log.is_dirty());
        assert_eq!(log.entries(), ["status: NOT_STARTED -> IN_PROGRESS"]);
        assert_eq!(value, "IN_PROGRESS");
    }

    #[test]
    fn entries_keep_order() {
        let mut log = ChangeLog::new();
        let mut a = 1;
        let mut b = 2;
        log.apply("a", &mut a, 10);
        log.apply("b", &mut b, 20);
        assert_eq!(log.entries(), ["a: 1 -> 10", "b: 2 -> 20"]);
    }

    #[test]
    fn reset_clears_flag_and_entries() {
        let mut log = ChangeLog::new();
        let mut value = 1;
        log.apply("v", &mut value, 2);
        log.reset();
        assert!(!log.is_dirty());
        assert!(log.entries().is_empty());
    }
}
