//! Boundary to the external task store.
//!
//! Inbound: [`RawRecord`]s as the store's query API returns them, decoded
//! into entities by [`RecordDecoder`]. A malformed record yields a
//! [`PlanSyncError::Decode`] carrying the record's number; callers skip the
//! record and keep the batch going.
//!
//! Outbound: [`TaskPatch`], a sparse field-keyed update holding only the
//! fields a task's change log says were touched. Unchanged fields are never
//! written.
//!
//! The store itself is a collaborator behind the [`TaskStore`] trait; this
//! crate ships no concrete client.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::config::SyncConfig;
use crate::domain::{
    DateRange, ExecutedData, Hours, PageRef, RecordId, RemindSetting, ScheduledData, Status, Tag,
    Task, TaskKind,
};
use crate::error::{PlanSyncError, Result};
use crate::label::{Label, LabelCodec, LabelKind};

// ============================================================================
// Inbound
// ============================================================================

/// One record as fetched from the store's query API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Opaque page reference.
    pub page_ref: String,
    /// Identity prefix (display only).
    #[serde(default)]
    pub prefix: String,
    /// Identity number.
    pub number: String,
    /// Label-bearing display title.
    pub title: String,
    /// Tag names.
    #[serde(default)]
    pub tags: Vec<String>,
    /// One of the five canonical status names.
    pub status: String,
    /// Range start, naive in the reference timezone. Required for executed
    /// records.
    #[serde(default)]
    pub start: Option<NaiveDateTime>,
    /// Range end; absent collapses to start.
    #[serde(default)]
    pub end: Option<NaiveDateTime>,
    /// Planned hours (scheduled records only).
    #[serde(default)]
    pub scheduled_hours: Option<f64>,
    /// Recorded executed hours (scheduled records only).
    #[serde(default)]
    pub executed_hours: Option<f64>,
    /// Parent page references.
    #[serde(default)]
    pub parent_refs: Vec<String>,
    /// Child page references.
    #[serde(default)]
    pub subtask_refs: Vec<String>,
    #[serde(default)]
    pub notify_before_start: bool,
    #[serde(default)]
    pub notify_before_end: bool,
    #[serde(default)]
    pub before_start_min: Option<i64>,
    #[serde(default)]
    pub before_end_min: Option<i64>,
}

/// One page of a paginated query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPage {
    pub records: Vec<RawRecord>,
    /// Cursor for the next page; `None` means this was the last page.
    pub next_cursor: Option<String>,
}

/// Decodes raw records into task entities.
#[derive(Debug, Clone)]
pub struct RecordDecoder {
    codec: LabelCodec,
    offset: chrono::FixedOffset,
}

impl RecordDecoder {
    #[must_use]
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            codec: LabelCodec::new(config.labels.clone()),
            offset: config.reference_offset(),
        }
    }

    /// Decode a scheduled-task record.
    pub fn decode_scheduled(&self, raw: &RawRecord) -> Result<Task> {
        let wrap = |e: PlanSyncError| PlanSyncError::decode(&raw.number, e.to_string());

        let record_id = RecordId::new(&raw.prefix, &raw.number).map_err(wrap)?;
        let name = self.codec.decode(&raw.title).map_err(wrap)?;
        let status: Status = raw.status.parse().map_err(wrap)?;
        let date_range = self.decode_range(raw)?;

        let scheduled_hours = Hours::new(raw.scheduled_hours.unwrap_or(0.0)).map_err(wrap)?;
        let executed_hours = Hours::new(raw.executed_hours.unwrap_or(0.0)).map_err(wrap)?;
        let remind = Self::decode_remind(raw, &name);
        let tags = Self::decode_tags(raw)?;

        let task = Task::scheduled(
            PageRef::new(&raw.page_ref),
            record_id,
            name,
            status,
            ScheduledData::new(scheduled_hours, executed_hours, date_range),
        )
        .with_tags(tags)
        .with_remind(remind)
        .with_parent(raw.parent_refs.first().map(PageRef::new))
        .with_subtasks(raw.subtask_refs.iter().map(PageRef::new).collect());
        Ok(task)
    }

    /// Decode an executed-task record. The date range is required.
    pub fn decode_executed(&self, raw: &RawRecord) -> Result<Task> {
        let wrap = |e: PlanSyncError| PlanSyncError::decode(&raw.number, e.to_string());

        let record_id = RecordId::new(&raw.prefix, &raw.number).map_err(wrap)?;
        let name = self.codec.decode(&raw.title).map_err(wrap)?;
        let status: Status = raw.status.parse().map_err(wrap)?;
        let range = self.decode_range(raw)?.ok_or_else(|| {
            PlanSyncError::decode(&raw.number, "executed record is missing its date range")
        })?;

        let remind = Self::decode_remind(raw, &name);
        let tags = Self::decode_tags(raw)?;

        let task = Task::executed(
            PageRef::new(&raw.page_ref),
            record_id,
            name,
            status,
            ExecutedData::new(range),
        )
        .with_tags(tags)
        .with_remind(remind)
        .with_parent(raw.parent_refs.first().map(PageRef::new));
        Ok(task)
    }

    fn decode_range(&self, raw: &RawRecord) -> Result<Option<DateRange>> {
        match raw.start {
            Some(start) => DateRange::from_naive(start, raw.end, self.offset)
                .map(Some)
                .map_err(|e| PlanSyncError::decode(&raw.number, e.to_string())),
            None => Ok(None),
        }
    }

    fn decode_tags(raw: &RawRecord) -> Result<BTreeSet<Tag>> {
        raw.tags
            .iter()
            .map(|t| {
                Tag::new(t.clone())
                    .map_err(|e| PlanSyncError::decode(&raw.number, e.to_string()))
            })
            .collect()
    }

    /// Reminder config: the record's native fields, with minute offsets
    /// filled from a decoded remind label when the fields are absent.
    fn decode_remind(raw: &RawRecord, name: &crate::domain::TaskName) -> RemindSetting {
        let mut remind = RemindSetting {
            notify_before_start: raw.notify_before_start,
            notify_before_end: raw.notify_before_end,
            before_start_min: raw.before_start_min,
            before_end_min: raw.before_end_min,
        };
        if let Some(Label::Remind {
            before_start_min,
            before_end_min,
        }) = name.label(LabelKind::Remind)
        {
            remind.before_start_min = remind.before_start_min.or(*before_start_min);
            remind.before_end_min = remind.before_end_min.or(*before_end_min);
        }
        remind
    }
}

// ============================================================================
// Outbound
// ============================================================================

/// Sparse update payload: only fields flagged dirty are populated.
/// Remind settings are inbound-only and have no patch counterpart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    pub page_ref: PageRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_hours: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_hours: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtask_refs: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_id: Option<String>,
}

impl TaskPatch {
    /// Build the minimal patch for a task from its change log. Returns
    /// `None` when the task is clean.
    #[must_use]
    pub fn from_task(task: &Task, codec: &LabelCodec) -> Option<Self> {
        if !task.is_dirty() {
            return None;
        }

        let changed: BTreeSet<&str> = task
            .change_entries()
            .iter()
            .filter_map(|entry| entry.split_once(':').map(|(field, _)| field))
            .collect();

        let mut patch = Self {
            page_ref: task.page_ref().clone(),
            title: None,
            status: None,
            scheduled_hours: None,
            executed_hours: None,
            progress: None,
            parent_ref: None,
            subtask_refs: None,
            executed_ids: None,
            scheduled_id: None,
        };

        // Any change touching the name or an embedded label re-encodes the
        // whole title.
        if changed.contains("name")
            || changed.contains("identity_glyph")
            || changed.contains("hours_label")
        {
            patch.title = Some(codec.encode(task.name(), task.status()));
        }
        if changed.contains("status") {
            patch.status = Some(task.status().as_str().to_string());
        }
        if changed.contains("parent") {
            patch.parent_ref = task.parent().map(ToString::to_string);
        }
        if let TaskKind::Scheduled(data) = task.kind() {
            if changed.contains("scheduled_hours") {
                patch.scheduled_hours = Some(data.scheduled_hours.value());
            }
            if changed.contains("executed_hours") {
                patch.executed_hours = Some(data.executed_hours.value());
            }
            if changed.contains("progress") {
                patch.progress = Some(data.progress.value());
            }
            if changed.contains("executed_ids") {
                patch.executed_ids =
                    Some(data.executed_ids.iter().map(|id| id.number.clone()).collect());
            }
            if changed.contains("subtask_refs") {
                patch.subtask_refs =
                    Some(data.subtask_refs.iter().map(ToString::to_string).collect());
            }
        }
        if let TaskKind::Executed(data) = task.kind() {
            if changed.contains("scheduled_id") {
                patch.scheduled_id = data.scheduled_id.as_ref().map(|id| id.number.clone());
            }
        }

        Some(patch)
    }
}

// ============================================================================
// Store trait
// ============================================================================

/// The external task store's query/update API.
///
/// Object-safe so orchestration can hold a `dyn TaskStore`; implementations
/// must be `Send + Sync` because the three fetch groups run concurrently.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Fetch one page of scheduled-task records.
    async fn query_scheduled(&self, cursor: Option<String>) -> Result<RawPage>;

    /// Fetch one page of executed-task records.
    async fn query_executed(&self, cursor: Option<String>) -> Result<RawPage>;

    /// Fetch one page of records whose reminder boundary falls inside the
    /// configured lookahead window.
    async fn query_reminder_window(&self, cursor: Option<String>) -> Result<RawPage>;

    /// Apply a sparse update to one record.
    async fn update(&self, patch: &TaskPatch) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Progress;

    fn raw_scheduled(number: &str, title: &str) -> RawRecord {
        RawRecord {
            page_ref: format!("page-{number}"),
            prefix: "TASK-".into(),
            number: number.into(),
            title: title.into(),
            tags: vec!["backend".into()],
            status: "NOT_STARTED".into(),
            start: None,
            end: None,
            scheduled_hours: Some(8.0),
            executed_hours: None,
            parent_refs: vec![],
            subtask_refs: vec!["page-2".into()],
            notify_before_start: false,
            notify_before_end: false,
            before_start_min: None,
            before_end_min: None,
        }
    }

    fn raw_executed(number: &str, title: &str) -> RawRecord {
        RawRecord {
            status: "NOT_STARTED".into(),
            scheduled_hours: None,
            subtask_refs: vec![],
            start: chrono::NaiveDate::from_ymd_opt(2024, 3, 9)
                .unwrap()
                .and_hms_opt(9, 0, 0),
            end: chrono::NaiveDate::from_ymd_opt(2024, 3, 9)
                .unwrap()
                .and_hms_opt(12, 0, 0),
            ..raw_scheduled(number, title)
        }
    }

    fn decoder() -> RecordDecoder {
        RecordDecoder::new(&SyncConfig::default())
    }

    // =========================================================================
    // Decode
    // =========================================================================

    #[test]
    fn decode_scheduled_record() {
        let task = decoder().decode_scheduled(&raw_scheduled("1", "[1]Write docs")).unwrap();
        assert!(task.is_scheduled());
        assert_eq!(task.record_id().number, "1");
        assert_eq!(task.name().text(), "Write docs");
        assert_eq!(task.scheduled_data().unwrap().scheduled_hours.value(), 8.0);
        assert_eq!(task.scheduled_data().unwrap().subtask_refs.len(), 1);
        assert!(!task.is_dirty());
    }

    #[test]
    fn decode_executed_record_derives_hours() {
        let task = decoder().decode_executed(&raw_executed("10", "[1]work")).unwrap();
        assert!(task.is_executed());
        assert_eq!(task.executed_data().unwrap().hours.value(), 3.0);
        // Range is anchored in the reference offset.
        assert_eq!(
            task.executed_data().unwrap().range.start.offset().local_minus_utc(),
            9 * 3600
        );
    }

    #[test]
    fn decode_executed_without_range_fails_with_record_no() {
        let mut raw = raw_executed("10", "[1]work");
        raw.start = None;
        let err = decoder().decode_executed(&raw).unwrap_err();
        assert_eq!(err.record_no(), Some("10"));
    }

    #[test]
    fn decode_bad_status_fails_with_record_no() {
        let mut raw = raw_scheduled("1", "[1]x");
        raw.status = "DONE".into();
        let err = decoder().decode_scheduled(&raw).unwrap_err();
        assert!(matches!(err, PlanSyncError::Decode { .. }));
        assert_eq!(err.record_no(), Some("1"));
    }

    #[test]
    fn decode_bad_label_fails_with_record_no() {
        let err = decoder()
            .decode_scheduled(&raw_scheduled("1", "x[?junk]"))
            .unwrap_err();
        assert_eq!(err.record_no(), Some("1"));
        assert!(err.to_string().contains("?junk"));
    }

    #[test]
    fn decode_empty_number_fails() {
        let err = decoder().decode_scheduled(&raw_scheduled("", "x")).unwrap_err();
        assert!(matches!(err, PlanSyncError::Decode { .. }));
    }

    #[test]
    fn decode_remind_label_fills_missing_minutes() {
        let mut raw = raw_scheduled("1", "[1]Standup[~15|30]");
        raw.notify_before_start = true;
        let task = decoder().decode_scheduled(&raw).unwrap();
        assert_eq!(task.remind().before_start_min, Some(15));
        assert_eq!(task.remind().before_end_min, Some(30));

        // Native fields win over the label.
        raw.before_start_min = Some(5);
        let task = decoder().decode_scheduled(&raw).unwrap();
        assert_eq!(task.remind().before_start_min, Some(5));
    }

    // =========================================================================
    // Patch
    // =========================================================================

    #[test]
    fn clean_task_yields_no_patch() {
        let codec = LabelCodec::default();
        let task = decoder().decode_scheduled(&raw_scheduled("1", "[1]x")).unwrap();
        assert!(TaskPatch::from_task(&task, &codec).is_none());
    }

    #[test]
    fn patch_contains_only_changed_fields() {
        let codec = LabelCodec::default();
        let mut task = decoder().decode_scheduled(&raw_scheduled("1", "[1]x")).unwrap();
        task.set_status(Status::InProgress);

        let patch = TaskPatch::from_task(&task, &codec).unwrap();
        assert_eq!(patch.status.as_deref(), Some("IN_PROGRESS"));
        assert!(patch.title.is_none());
        assert!(patch.scheduled_hours.is_none());
        assert!(patch.progress.is_none());
    }

    #[test]
    fn label_refresh_reencodes_title() {
        let codec = LabelCodec::default();
        let mut task = decoder().decode_scheduled(&raw_scheduled("1", "[1]x")).unwrap();
        task.set_status(Status::Completed);
        task.refresh_identity_glyph(&crate::config::LabelConfig::default());

        let patch = TaskPatch::from_task(&task, &codec).unwrap();
        assert_eq!(patch.title.as_deref(), Some("[✔1]x"));
        assert_eq!(patch.status.as_deref(), Some("COMPLETED"));
    }

    #[test]
    fn progress_change_lands_in_patch() {
        let codec = LabelCodec::default();
        let mut task = decoder().decode_scheduled(&raw_scheduled("1", "[1]x")).unwrap();
        task.set_progress(Progress::new(0.5));

        let patch = TaskPatch::from_task(&task, &codec).unwrap();
        assert_eq!(patch.progress, Some(0.5));
    }

    #[test]
    fn sparse_patch_serializes_without_clean_fields() {
        let codec = LabelCodec::default();
        let mut task = decoder().decode_scheduled(&raw_scheduled("1", "[1]x")).unwrap();
        task.set_status(Status::InProgress);

        let patch = TaskPatch::from_task(&task, &codec).unwrap();
        let json = serde_json::to_value(&patch).unwrap();
        let object = json.as_object().unwrap();
        assert!(object.contains_key("status"));
        assert!(!object.contains_key("progress"));
        assert!(!object.contains_key("title"));
        // Remind settings never travel outbound.
        assert!(!object.keys().any(|k| k.contains("notify") || k.contains("before")));
    }
}
