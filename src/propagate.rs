//! Status, progress and hours propagation across the task graph.
//!
//! The engine walks scheduled tasks bottom-up through their sub-task
//! references (resolved through the collection's lookup maps, never through
//! embedded object graphs) and applies, in order:
//!
//! 1. status transitions (`update_status`), with `Canceled` absorbing and
//!    overdue tasks forced to `Delayed`,
//! 2. man-hour aggregation (`aggregate_man_hours`), folding executed-task
//!    and sub-task hours upward and refreshing the hours label,
//! 3. progress computation (`calc_progress_rate`) from completed vs. total
//!    sub-task scheduled hours.
//!
//! Every mutation goes through the entities' compare-before-set mutators, so
//! running a pass twice against unchanged inputs leaves no new dirty flags.

use chrono::{DateTime, FixedOffset};
use std::collections::HashSet;
use tracing::debug;

use crate::collection::TaskCollection;
use crate::config::LabelConfig;
use crate::domain::{Hours, PageRef, Progress, RecordId, Status, TaskName};
use crate::error::PlanSyncError;
use crate::label::{Label, LabelKind};

/// Callback invoked with each per-item linkage failure. The batch proceeds.
pub type LinkErrorFn<'a> = &'a mut dyn FnMut(PlanSyncError);

/// Drives status/progress/hours propagation over a [`TaskCollection`].
#[derive(Debug, Clone)]
pub struct PropagationEngine {
    labels: LabelConfig,
}

impl PropagationEngine {
    #[must_use]
    pub fn new(labels: LabelConfig) -> Self {
        Self { labels }
    }

    // =========================================================================
    // Linkage
    // =========================================================================

    /// Match executed tasks to scheduled tasks by identity-label equality and
    /// parent labels to parent tasks, then push denormalized fields down.
    ///
    /// Failures are isolated per item via `on_error`; the rest of the batch
    /// proceeds.
    pub fn link(&self, tasks: &mut TaskCollection, on_error: LinkErrorFn<'_>) {
        self.link_parents(tasks, on_error);
        self.link_executed(tasks, on_error);
        self.push_down_executed(tasks);
    }

    /// Resolve parent-identity labels into parent/sub-task references.
    fn link_parents(&self, tasks: &mut TaskCollection, on_error: LinkErrorFn<'_>) {
        let candidates: Vec<usize> = (0..tasks.len())
            .filter(|&i| {
                let task = &tasks.items()[i];
                task.is_scheduled() && task.name().parent_number().is_some()
            })
            .collect();

        for index in candidates {
            let task = &tasks.items()[index];
            let child_no = task.record_id().number.clone();
            let parent_no = task
                .name()
                .parent_number()
                .expect("filtered on parent label")
                .to_string();

            let parent_index = (0..tasks.len()).find(|&i| {
                let candidate = &tasks.items()[i];
                candidate.is_scheduled() && candidate.record_id().number == parent_no
            });
            let Some(parent_index) = parent_index else {
                on_error(PlanSyncError::linkage(
                    child_no,
                    format!("parent label points at unknown record {parent_no}"),
                ));
                continue;
            };
            if parent_index == index {
                on_error(PlanSyncError::linkage(child_no, "task is its own parent"));
                continue;
            }

            let child_ref = tasks.items()[index].page_ref().clone();
            let parent_ref = tasks.items()[parent_index].page_ref().clone();
            if let Some(parent) = tasks.get_mut(parent_index) {
                parent.add_subtask(child_ref);
            }
            if let Some(child) = tasks.get_mut(index) {
                child.set_parent(Some(parent_ref));
            }
        }
    }

    /// Match executed tasks to scheduled tasks by identity label.
    fn link_executed(&self, tasks: &mut TaskCollection, on_error: LinkErrorFn<'_>) {
        let executed_indexes: Vec<usize> =
            (0..tasks.len()).filter(|&i| tasks.items()[i].is_executed()).collect();

        for index in executed_indexes {
            let executed = &tasks.items()[index];
            let Some(target_no) = executed.name().identity_number().map(str::to_string) else {
                // No identity label means nothing to match against.
                continue;
            };
            let executed_no = executed.record_id().number.clone();
            let executed_id = executed.record_id().clone();

            let scheduled_index = (0..tasks.len()).find(|&i| {
                let candidate = &tasks.items()[i];
                candidate.is_scheduled() && candidate.record_id().number == target_no
            });
            let Some(scheduled_index) = scheduled_index else {
                on_error(PlanSyncError::linkage(
                    executed_no,
                    format!("identity label points at unknown scheduled record {target_no}"),
                ));
                continue;
            };

            let scheduled_id = tasks.items()[scheduled_index].record_id().clone();
            if let Some(scheduled) = tasks.get_mut(scheduled_index) {
                scheduled.link_executed(executed_id);
            }
            if let Some(executed) = tasks.get_mut(index) {
                executed.set_scheduled_id(scheduled_id);
            }
        }
    }

    /// Refresh the denormalized display fields of linked executed tasks from
    /// their scheduled tasks: identity label, name text, status, parent.
    /// One-directional; nothing flows back up.
    pub fn push_down_executed(&self, tasks: &mut TaskCollection) {
        let executed_indexes: Vec<usize> =
            (0..tasks.len()).filter(|&i| tasks.items()[i].is_executed()).collect();

        for index in executed_indexes {
            let Some(scheduled_id) = tasks.items()[index]
                .executed_data()
                .and_then(|d| d.scheduled_id.clone())
            else {
                continue;
            };
            let Some(scheduled_index) = tasks.position_by_id(&scheduled_id) else {
                continue;
            };

            let scheduled = &tasks.items()[scheduled_index];
            let status = scheduled.status();
            let parent = scheduled.parent().cloned();
            let number = scheduled.record_id().number.clone();
            let mut name = TaskName::new(scheduled.name().text());
            name.register(Label::Identity {
                number,
                glyph: self.labels.glyph_for(status),
            });

            if let Some(executed) = tasks.get_mut(index) {
                executed.set_name(name);
                executed.set_status(status);
                executed.set_parent(parent);
                executed.refresh_identity_glyph(&self.labels);
            }
        }
    }

    // =========================================================================
    // Propagation
    // =========================================================================

    /// Run the full propagation pass: statuses (bottom-up), hours
    /// aggregation, progress, label refresh, executed-task push-down.
    pub fn propagate(&self, tasks: &mut TaskCollection, now: DateTime<FixedOffset>) {
        let roots: Vec<usize> =
            (0..tasks.len()).filter(|&i| tasks.items()[i].is_scheduled()).collect();

        let mut visited = HashSet::new();
        for index in &roots {
            self.update_status(tasks, *index, now, &mut visited);
        }

        let mut visited = HashSet::new();
        for index in &roots {
            self.aggregate_man_hours(tasks, *index, &mut visited);
        }

        for index in &roots {
            self.calc_progress_rate(tasks, *index);
        }

        self.push_down_executed(tasks);
    }

    /// Status transition rules for one scheduled task, recursing into
    /// sub-tasks first. See the module docs for the evaluation order.
    fn update_status(
        &self,
        tasks: &mut TaskCollection,
        index: usize,
        now: DateTime<FixedOffset>,
        visited: &mut HashSet<usize>,
    ) {
        if !visited.insert(index) {
            return;
        }

        // Canceled is absorbing: no further checks, not even a glyph refresh.
        if tasks.items()[index].status() == Status::Canceled {
            return;
        }

        // The rules below settle on a target status first; the task is only
        // written once, so an intermediate hop (Delayed reverting and then
        // being re-forced, say) leaves no trace in the change log.
        let mut target = tasks.items()[index].status();

        // Delayed reverts once the task is no longer overdue.
        if target == Status::Delayed && !Self::is_past_due(&tasks.items()[index], now) {
            target = Status::NotStarted;
        }

        // Linked executed tasks move the needle between NotStarted and
        // InProgress based on whether any actual work has begun.
        let executed_starts = self.linked_executed_starts(tasks, index);
        if !executed_starts.is_empty() {
            let any_started = executed_starts.iter().any(|start| *start < now);
            if target == Status::NotStarted && any_started {
                target = Status::InProgress;
            } else if target == Status::InProgress && !any_started {
                target = Status::NotStarted;
            }
        }

        // Sub-tasks aggregate bottom-up.
        let subtask_indexes = self.subtask_indexes(tasks, index);
        if !subtask_indexes.is_empty() {
            for &child in &subtask_indexes {
                self.update_status(tasks, child, now, visited);
            }
            let statuses: Vec<Status> = subtask_indexes
                .iter()
                .map(|&child| tasks.items()[child].status())
                .collect();
            target = if statuses.iter().all(|s| *s == Status::Completed) {
                Status::Completed
            } else if statuses
                .iter()
                .any(|s| matches!(s, Status::InProgress | Status::Completed))
            {
                Status::InProgress
            } else {
                Status::NotStarted
            };
        }

        // Overdue forces Delayed regardless of what the checks above chose,
        // unless they settled on a closed status.
        if !target.is_closed() && Self::is_past_due(&tasks.items()[index], now) {
            target = Status::Delayed;
        }

        let task = tasks.get_mut(index).expect("index in range");
        task.set_status(target);
        if task.refresh_identity_glyph(&self.labels) {
            debug!(record = %task.record_id(), status = %task.status(), "refreshed status glyph");
        }
    }

    /// The task has a range and it ended before now. Whether that makes the
    /// task overdue also depends on its status being open.
    fn is_past_due(task: &crate::domain::Task, now: DateTime<FixedOffset>) -> bool {
        task.date_range().is_some_and(|range| range.end < now)
    }

    /// Fold executed and sub-task hours upward, bottom-up. A task with
    /// sub-tasks carries no independent estimate: its scheduled hours become
    /// the sum of its sub-tasks'.
    fn aggregate_man_hours(
        &self,
        tasks: &mut TaskCollection,
        index: usize,
        visited: &mut HashSet<usize>,
    ) {
        if !visited.insert(index) {
            return;
        }

        let subtask_indexes = self.subtask_indexes(tasks, index);
        for &child in &subtask_indexes {
            self.aggregate_man_hours(tasks, child, visited);
        }

        let own_executed = self.linked_executed_hours(tasks, index);
        let mut executed_total = own_executed;
        let mut scheduled_total = Hours::ZERO;
        for &child in &subtask_indexes {
            if let Some(data) = tasks.items()[child].scheduled_data() {
                executed_total = executed_total + data.executed_hours;
                scheduled_total = scheduled_total + data.scheduled_hours;
            }
        }

        let task = tasks.get_mut(index).expect("index in range");
        let mut changed = task.set_executed_hours(executed_total);
        if !subtask_indexes.is_empty() {
            changed |= task.set_scheduled_hours(scheduled_total);
        }
        // Refresh only when a value moved or a label is already embedded;
        // an untouched title never gains a label.
        if changed || task.name().label(LabelKind::Hours).is_some() {
            task.refresh_hours_label();
        }
    }

    /// Progress = completed sub-task scheduled hours / total sub-task
    /// scheduled hours, with shortcuts for completed tasks and leaves.
    fn calc_progress_rate(&self, tasks: &mut TaskCollection, index: usize) {
        if tasks.items()[index].status() == Status::Completed {
            tasks.get_mut(index).expect("index in range").set_progress(Progress::DONE);
            return;
        }

        let subtask_indexes = self.subtask_indexes(tasks, index);
        if subtask_indexes.is_empty() {
            tasks.get_mut(index).expect("index in range").set_progress(Progress::ZERO);
            return;
        }

        let mut completed = Hours::ZERO;
        let mut total = Hours::ZERO;
        for &child in &subtask_indexes {
            let task = &tasks.items()[child];
            if let Some(data) = task.scheduled_data() {
                total = total + data.scheduled_hours;
                if task.status() == Status::Completed {
                    completed = completed + data.scheduled_hours;
                }
            }
        }

        let rate = Progress::new(Hours::ratio(completed, total));
        tasks.get_mut(index).expect("index in range").set_progress(rate);
    }

    // =========================================================================
    // Graph resolution helpers
    // =========================================================================

    fn subtask_indexes(&self, tasks: &TaskCollection, index: usize) -> Vec<usize> {
        let Some(data) = tasks.items()[index].scheduled_data() else {
            return Vec::new();
        };
        let refs: Vec<PageRef> = data.subtask_refs.iter().cloned().collect();
        refs.iter()
            .filter_map(|r| tasks.position_by_page_ref(r))
            .filter(|&i| i != index && tasks.items()[i].is_scheduled())
            .collect()
    }

    fn linked_executed_starts(
        &self,
        tasks: &TaskCollection,
        index: usize,
    ) -> Vec<DateTime<FixedOffset>> {
        self.linked_executed_indexes(tasks, index)
            .iter()
            .filter_map(|&i| tasks.items()[i].executed_data().map(|d| d.range.start))
            .collect()
    }

    fn linked_executed_hours(&self, tasks: &TaskCollection, index: usize) -> Hours {
        self.linked_executed_indexes(tasks, index)
            .iter()
            .filter_map(|&i| tasks.items()[i].executed_data().map(|d| d.hours))
            .fold(Hours::ZERO, |acc, h| acc + h)
    }

    fn linked_executed_indexes(&self, tasks: &TaskCollection, index: usize) -> Vec<usize> {
        let Some(data) = tasks.items()[index].scheduled_data() else {
            return Vec::new();
        };
        let ids: Vec<RecordId> = data.executed_ids.iter().cloned().collect();
        ids.iter().filter_map(|id| tasks.position_by_id(id)).collect()
    }
}
