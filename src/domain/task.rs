//! Task entities: one common record plus scheduled/executed payloads.
//!
//! The external store models planned work (scheduled tasks, which may own
//! sub-tasks and linked executed tasks) and actual work (executed tasks,
//! which may point back at a scheduled task). Both share the same base
//! record; the variant-specific fields live in [`TaskKind`]. Relations are
//! held as identity sets and resolved through collection lookup maps, never
//! as embedded object graphs.
//!
//! All mutation goes through named operations that compare-before-set and
//! feed the entity's [`ChangeLog`], so the write-back phase can scope remote
//! updates to entities that actually changed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::config::LabelConfig;
use crate::domain::{
    ChangeLog, DateRange, Hours, PageRef, Progress, RecordId, RemindSetting, Status, Tag, TaskName,
};
use crate::label::{Label, LabelKind};

/// Fields specific to a scheduled (planned) task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledData {
    /// Planned hours. Replaced by the sub-task sum when sub-tasks exist.
    pub scheduled_hours: Hours,
    /// Aggregated actual hours from linked executed tasks and sub-tasks.
    pub executed_hours: Hours,
    /// Completion ratio derived from sub-task scheduled hours.
    pub progress: Progress,
    /// Planned window, when the record carries one.
    pub date_range: Option<DateRange>,
    /// Linked executed tasks, by record identity.
    pub executed_ids: BTreeSet<RecordId>,
    /// Child scheduled tasks, by page reference.
    pub subtask_refs: BTreeSet<PageRef>,
}

impl ScheduledData {
    #[must_use]
    pub fn new(scheduled_hours: Hours, executed_hours: Hours, date_range: Option<DateRange>) -> Self {
        Self {
            scheduled_hours,
            executed_hours,
            progress: Progress::ZERO,
            date_range,
            executed_ids: BTreeSet::new(),
            subtask_refs: BTreeSet::new(),
        }
    }
}

/// Fields specific to an executed (actual) task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutedData {
    /// When the work actually happened.
    pub range: DateRange,
    /// Derived from the range's duration.
    pub hours: Hours,
    /// The scheduled task this record was matched against, if any.
    pub scheduled_id: Option<RecordId>,
}

impl ExecutedData {
    #[must_use]
    pub fn new(range: DateRange) -> Self {
        Self {
            range,
            hours: range.duration_hours(),
            scheduled_id: None,
        }
    }
}

/// Variant payload distinguishing planned from actual work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TaskKind {
    Scheduled(ScheduledData),
    Executed(ExecutedData),
}

/// One task record from the external store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    page_ref: PageRef,
    name: TaskName,
    tags: BTreeSet<Tag>,
    record_id: RecordId,
    status: Status,
    remind: RemindSetting,
    parent: Option<PageRef>,
    changes: ChangeLog,
    kind: TaskKind,
}

impl Task {
    /// Construct a scheduled task. Fields set here are the decoded remote
    /// state; construction never dirties the change log.
    #[must_use]
    pub fn scheduled(
        page_ref: PageRef,
        record_id: RecordId,
        name: TaskName,
        status: Status,
        data: ScheduledData,
    ) -> Self {
        Self {
            page_ref,
            name,
            tags: BTreeSet::new(),
            record_id,
            status,
            remind: RemindSetting::default(),
            parent: None,
            changes: ChangeLog::new(),
            kind: TaskKind::Scheduled(data),
        }
    }

    /// Construct an executed task.
    #[must_use]
    pub fn executed(
        page_ref: PageRef,
        record_id: RecordId,
        name: TaskName,
        status: Status,
        data: ExecutedData,
    ) -> Self {
        Self {
            page_ref,
            name,
            tags: BTreeSet::new(),
            record_id,
            status,
            remind: RemindSetting::default(),
            parent: None,
            changes: ChangeLog::new(),
            kind: TaskKind::Executed(data),
        }
    }

    // =========================================================================
    // Construction-time setters (no change tracking)
    // =========================================================================

    /// Replace the tag set as decoded from the raw record.
    pub fn with_tags(mut self, tags: BTreeSet<Tag>) -> Self {
        self.tags = tags;
        self
    }

    /// Set the reminder configuration as decoded from the raw record.
    pub fn with_remind(mut self, remind: RemindSetting) -> Self {
        self.remind = remind;
        self
    }

    /// Set the parent page reference as decoded from the raw record.
    pub fn with_parent(mut self, parent: Option<PageRef>) -> Self {
        self.parent = parent;
        self
    }

    /// Seed the sub-task references as decoded from the raw record.
    pub fn with_subtasks(mut self, refs: BTreeSet<PageRef>) -> Self {
        if let TaskKind::Scheduled(data) = &mut self.kind {
            data.subtask_refs = refs;
        }
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[must_use]
    pub fn page_ref(&self) -> &PageRef {
        &self.page_ref
    }

    #[must_use]
    pub fn record_id(&self) -> &RecordId {
        &self.record_id
    }

    #[must_use]
    pub fn name(&self) -> &TaskName {
        &self.name
    }

    #[must_use]
    pub fn tags(&self) -> &BTreeSet<Tag> {
        &self.tags
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    #[must_use]
    pub fn remind(&self) -> &RemindSetting {
        &self.remind
    }

    #[must_use]
    pub fn parent(&self) -> Option<&PageRef> {
        self.parent.as_ref()
    }

    #[must_use]
    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    #[must_use]
    pub fn is_scheduled(&self) -> bool {
        matches!(self.kind, TaskKind::Scheduled(_))
    }

    #[must_use]
    pub fn is_executed(&self) -> bool {
        matches!(self.kind, TaskKind::Executed(_))
    }

    #[must_use]
    pub fn scheduled_data(&self) -> Option<&ScheduledData> {
        match &self.kind {
            TaskKind::Scheduled(data) => Some(data),
            TaskKind::Executed(_) => None,
        }
    }

    #[must_use]
    pub fn executed_data(&self) -> Option<&ExecutedData> {
        match &self.kind {
            TaskKind::Executed(data) => Some(data),
            TaskKind::Scheduled(_) => None,
        }
    }

    /// The task's time window: the planned range for scheduled tasks, the
    /// actual range for executed tasks.
    #[must_use]
    pub fn date_range(&self) -> Option<DateRange> {
        match &self.kind {
            TaskKind::Scheduled(data) => data.date_range,
            TaskKind::Executed(data) => Some(data.range),
        }
    }

    // =========================================================================
    // Change tracking
    // =========================================================================

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.changes.is_dirty()
    }

    #[must_use]
    pub fn change_entries(&self) -> &[String] {
        self.changes.entries()
    }

    /// Clear the dirty flag, typically after a successful write-back.
    pub fn reset_changes(&mut self) {
        self.changes.reset();
    }

    // =========================================================================
    // Mutators (compare-before-set through the change log)
    // =========================================================================

    /// Set the status. Returns true when the status actually changed.
    pub fn set_status(&mut self, status: Status) -> bool {
        self.changes.apply("status", &mut self.status, status)
    }

    /// Set the progress ratio. Dirties only on a numeric difference.
    pub fn set_progress(&mut self, progress: Progress) -> bool {
        match &mut self.kind {
            TaskKind::Scheduled(data) => {
                self.changes.apply("progress", &mut data.progress, progress)
            }
            TaskKind::Executed(_) => false,
        }
    }

    /// Set the planned hours estimate.
    pub fn set_scheduled_hours(&mut self, hours: Hours) -> bool {
        match &mut self.kind {
            TaskKind::Scheduled(data) => {
                self.changes
                    .apply("scheduled_hours", &mut data.scheduled_hours, hours)
            }
            TaskKind::Executed(_) => false,
        }
    }

    /// Set the aggregated executed hours.
    pub fn set_executed_hours(&mut self, hours: Hours) -> bool {
        match &mut self.kind {
            TaskKind::Scheduled(data) => {
                self.changes
                    .apply("executed_hours", &mut data.executed_hours, hours)
            }
            TaskKind::Executed(_) => false,
        }
    }

    /// Link an executed task to this scheduled task by identity.
    pub fn link_executed(&mut self, id: RecordId) -> bool {
        match &mut self.kind {
            TaskKind::Scheduled(data) => {
                if data.executed_ids.contains(&id) {
                    return false;
                }
                self.changes.record("executed_ids", "-", &id);
                data.executed_ids.insert(id);
                true
            }
            TaskKind::Executed(_) => false,
        }
    }

    /// Register a child scheduled task discovered through linkage.
    pub fn add_subtask(&mut self, page_ref: PageRef) -> bool {
        match &mut self.kind {
            TaskKind::Scheduled(data) => {
                if data.subtask_refs.contains(&page_ref) {
                    return false;
                }
                self.changes.record("subtask_refs", "-", &page_ref);
                data.subtask_refs.insert(page_ref);
                true
            }
            TaskKind::Executed(_) => false,
        }
    }

    /// Point this executed task at its matched scheduled task.
    pub fn set_scheduled_id(&mut self, id: RecordId) -> bool {
        match &mut self.kind {
            TaskKind::Executed(data) => {
                if data.scheduled_id.as_ref() == Some(&id) {
                    return false;
                }
                let old = data
                    .scheduled_id
                    .as_ref()
                    .map_or_else(|| "none".to_string(), ToString::to_string);
                self.changes.record("scheduled_id", old, &id);
                data.scheduled_id = Some(id);
                true
            }
            TaskKind::Scheduled(_) => false,
        }
    }

    /// Set the parent page reference.
    pub fn set_parent(&mut self, parent: Option<PageRef>) -> bool {
        if self.parent == parent {
            return false;
        }
        let fmt = |p: &Option<PageRef>| {
            p.as_ref()
                .map_or_else(|| "none".to_string(), ToString::to_string)
        };
        self.changes.record("parent", fmt(&self.parent), fmt(&parent));
        self.parent = parent;
        true
    }

    /// Replace the whole display name. Used by the executed-task push-down.
    pub fn set_name(&mut self, name: TaskName) -> bool {
        if self.name == name {
            return false;
        }
        self.changes.record("name", self.name.text(), name.text());
        self.name = name;
        true
    }

    /// Re-register the identity label so its glyph mirrors the current
    /// status. The glyph from a prior decode is never trusted.
    pub fn refresh_identity_glyph(&mut self, labels: &LabelConfig) -> bool {
        let desired = labels.glyph_for(self.status);
        let Some(Label::Identity { number, glyph }) = self.name.label(LabelKind::Identity) else {
            return false;
        };
        if *glyph == desired {
            return false;
        }
        let fmt = |g: Option<char>| g.map_or_else(|| "-".to_string(), |c| c.to_string());
        self.changes
            .record("identity_glyph", fmt(*glyph), fmt(desired));
        let number = number.clone();
        self.name.register(Label::Identity {
            number,
            glyph: desired,
        });
        true
    }

    /// Re-register the hours label from the current scheduled/executed pair.
    pub fn refresh_hours_label(&mut self) -> bool {
        let TaskKind::Scheduled(data) = &self.kind else {
            return false;
        };
        let desired = Label::Hours {
            executed: data.executed_hours,
            scheduled: data.scheduled_hours,
        };
        let current = self.name.label(LabelKind::Hours);
        if current == Some(&desired) {
            return false;
        }
        let fmt = |l: Option<&Label>| match l {
            Some(Label::Hours {
                executed,
                scheduled,
            }) => format!("{executed}/{scheduled}"),
            _ => "-".to_string(),
        };
        self.changes
            .record("hours_label", fmt(current), fmt(Some(&desired)));
        self.name.register(desired);
        true
    }
}
