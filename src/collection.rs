//! Identity-keyed task collections and the upsert/merge engine.
//!
//! A [`TaskCollection`] is an ordered sequence of tasks with two keyed
//! reductions: by record id and by page reference, both last-write-wins.
//! [`TaskCollection::upsert_by_id`] is the merge primitive used everywhere a
//! page of fresh records meets prior state: pagination assembly within one
//! fetch, and combining a persisted snapshot with the current fetch across
//! cycles. It is idempotent, so retried pages and re-applied deltas are
//! harmless.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::domain::{PageRef, RecordId, Tag, Task};

/// An ordered, identity-mergeable set of tasks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskCollection {
    items: Vec<Task>,
}

impl TaskCollection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_vec(items: Vec<Task>) -> Self {
        let mut collection = Self::new();
        collection.upsert_by_id(items);
        collection
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn items(&self) -> &[Task] {
        &self.items
    }

    pub fn items_mut(&mut self) -> &mut [Task] {
        &mut self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Task> {
        self.items.iter()
    }

    // =========================================================================
    // Keyed reductions
    // =========================================================================

    /// Map from record id to task, last write wins.
    #[must_use]
    pub fn by_id(&self) -> HashMap<RecordId, &Task> {
        self.items
            .iter()
            .map(|task| (task.record_id().clone(), task))
            .collect()
    }

    /// Map from page reference to task, last write wins.
    #[must_use]
    pub fn by_page_ref(&self) -> HashMap<PageRef, &Task> {
        self.items
            .iter()
            .map(|task| (task.page_ref().clone(), task))
            .collect()
    }

    /// Position of the task with the given record id, if present.
    #[must_use]
    pub fn position_by_id(&self, id: &RecordId) -> Option<usize> {
        self.items.iter().rposition(|task| task.record_id() == id)
    }

    /// Position of the task with the given page reference, if present.
    #[must_use]
    pub fn position_by_page_ref(&self, page_ref: &PageRef) -> Option<usize> {
        self.items.iter().rposition(|task| task.page_ref() == page_ref)
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Task> {
        self.items.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Task> {
        self.items.get_mut(index)
    }

    // =========================================================================
    // Merge engine
    // =========================================================================

    /// Append `delta`, then rebuild the sequence from the by-id reduction:
    /// one entry per record id, a delta item replacing any pre-existing item
    /// that shares its id. Applying the same delta twice yields the same
    /// final set as applying it once.
    pub fn upsert_by_id(&mut self, delta: impl IntoIterator<Item = Task>) {
        self.items.extend(delta);

        let mut positions: HashMap<RecordId, usize> = HashMap::with_capacity(self.items.len());
        let mut deduped: Vec<Task> = Vec::with_capacity(self.items.len());
        for task in self.items.drain(..) {
            match positions.get(task.record_id()) {
                Some(&index) => deduped[index] = task,
                None => {
                    positions.insert(task.record_id().clone(), deduped.len());
                    deduped.push(task);
                }
            }
        }
        self.items = deduped;
    }

    /// Pure variant of [`TaskCollection::upsert_by_id`]: clones the receiver,
    /// merges the delta into the clone, and returns it.
    #[must_use]
    pub fn upserted_by_id(&self, delta: impl IntoIterator<Item = Task>) -> Self {
        let mut merged = self.clone();
        merged.upsert_by_id(delta);
        merged
    }

    // =========================================================================
    // Filters
    // =========================================================================

    /// Bucket tasks by each requested tag. A task carrying several requested
    /// tags appears in each of those buckets.
    #[must_use]
    pub fn partition_by_tags(&self, requested: &BTreeSet<Tag>) -> BTreeMap<Tag, TaskCollection> {
        let mut buckets: BTreeMap<Tag, TaskCollection> = requested
            .iter()
            .map(|tag| (tag.clone(), TaskCollection::new()))
            .collect();
        for task in &self.items {
            for tag in task.tags() {
                if let Some(bucket) = buckets.get_mut(tag) {
                    bucket.items.push(task.clone());
                }
            }
        }
        buckets
    }

    /// Tasks whose dirty flag is set: the minimal write-back delta.
    #[must_use]
    pub fn updated(&self) -> Vec<&Task> {
        self.items.iter().filter(|task| task.is_dirty()).collect()
    }
}

impl IntoIterator for TaskCollection {
    type Item = Task;
    type IntoIter = std::vec::IntoIter<Task>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a TaskCollection {
    type Item = &'a Task;
    type IntoIter = std::slice::Iter<'a, Task>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
