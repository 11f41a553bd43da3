//! The reconciliation cycle: fetch, link, propagate, diff, write back.
//!
//! One cycle is a single logical pass. The three fetch groups run
//! concurrently and join on an all-complete barrier; per-item decode and
//! linkage failures are recorded in the [`CycleSummary`] and never abort the
//! batch. All graph mutation happens after the barrier, single-threaded.
//! The snapshot is read once at the start and written once at the end.

use chrono::{DateTime, FixedOffset, Utc};
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::collection::TaskCollection;
use crate::config::SyncConfig;
use crate::domain::Task;
use crate::error::{PlanSyncError, Result};
use crate::label::LabelCodec;
use crate::notify::{due_reminders, Notifier};
use crate::propagate::PropagationEngine;
use crate::remote::{RecordDecoder, TaskPatch, TaskStore};
use crate::snapshot::{Snapshot, SnapshotStore};

/// Which logical group a fetch targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchKind {
    Scheduled,
    Executed,
    ReminderWindow,
}

/// Outcome of paginating one fetch group.
#[derive(Debug, Default)]
struct FetchOutcome {
    tasks: Vec<Task>,
    skipped: Vec<String>,
    failed: Option<String>,
}

/// Counts surfaced at the end of a cycle. Per-item problems appear as
/// messages, not stack traces.
#[derive(Debug, Clone, Default)]
pub struct CycleSummary {
    pub fetched: usize,
    pub merged_total: usize,
    pub skipped: usize,
    pub link_failures: usize,
    pub updated: usize,
    pub written: usize,
    pub write_failures: usize,
    pub reminders_sent: usize,
    pub notify_failures: usize,
    /// Human-readable per-item failure messages.
    pub failures: Vec<String>,
}

impl CycleSummary {
    /// One-line rendering for the end-of-cycle log.
    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "fetched {} (skipped {}), merged {}, updated {}, written {} (failed {}), \
             link failures {}, reminders {} (failed {})",
            self.fetched,
            self.skipped,
            self.merged_total,
            self.updated,
            self.written,
            self.write_failures,
            self.link_failures,
            self.reminders_sent,
            self.notify_failures,
        )
    }
}

/// Drives one reconciliation cycle against the external collaborators.
pub struct SyncCycle<'a> {
    config: &'a SyncConfig,
    store: &'a dyn TaskStore,
    snapshots: &'a dyn SnapshotStore,
    notifier: &'a dyn Notifier,
    decoder: RecordDecoder,
    engine: PropagationEngine,
    codec: LabelCodec,
}

impl<'a> SyncCycle<'a> {
    #[must_use]
    pub fn new(
        config: &'a SyncConfig,
        store: &'a dyn TaskStore,
        snapshots: &'a dyn SnapshotStore,
        notifier: &'a dyn Notifier,
    ) -> Self {
        Self {
            config,
            store,
            snapshots,
            notifier,
            decoder: RecordDecoder::new(config),
            engine: PropagationEngine::new(config.labels.clone()),
            codec: LabelCodec::new(config.labels.clone()),
        }
    }

    /// Run one cycle at the current time.
    pub async fn run(&self) -> Result<CycleSummary> {
        let now = Utc::now().with_timezone(&self.config.reference_offset());
        self.run_at(now).await
    }

    /// Run one cycle at an explicit `now`.
    pub async fn run_at(&self, now: DateTime<FixedOffset>) -> Result<CycleSummary> {
        let mut summary = CycleSummary::default();

        // Baseline snapshot, read once.
        let baseline = match self.snapshots.load()? {
            Some(snapshot) => snapshot.tasks,
            None if self.config.require_snapshot => {
                return Err(PlanSyncError::snapshot(
                    "no baseline snapshot and this cycle requires one",
                ));
            }
            None => TaskCollection::new(),
        };
        debug!(baseline = baseline.len(), "loaded baseline");

        // Concurrent fetch of the three logical groups, all-complete barrier.
        let (scheduled, executed, reminder) = tokio::join!(
            self.fetch_group(FetchKind::Scheduled),
            self.fetch_group(FetchKind::Executed),
            self.fetch_group(FetchKind::ReminderWindow),
        );

        let mut delta: Vec<Task> = Vec::new();
        for outcome in [scheduled, executed, reminder] {
            summary.fetched += outcome.tasks.len();
            summary.skipped += outcome.skipped.len();
            summary.failures.extend(outcome.skipped);
            if let Some(message) = outcome.failed {
                summary.failures.push(message);
            }
            delta.extend(outcome.tasks);
        }

        // The baseline stays untouched until the merge lands.
        let mut merged = baseline.upserted_by_id(delta);
        summary.merged_total = merged.len();

        // Link and propagate, single-threaded over the in-memory graph.
        let mut link_failures = Vec::new();
        self.engine.link(&mut merged, &mut |e| {
            warn!(error = %e, "linkage failure");
            link_failures.push(e.to_string());
        });
        summary.link_failures = link_failures.len();
        summary.failures.extend(link_failures);

        self.engine.propagate(&mut merged, now);

        // Diff down to the dirty subset and write back concurrently.
        let dirty: Vec<(usize, TaskPatch)> = (0..merged.len())
            .filter_map(|i| {
                TaskPatch::from_task(&merged.items()[i], &self.codec).map(|patch| (i, patch))
            })
            .collect();
        summary.updated = dirty.len();

        let results = join_all(dirty.iter().map(|(_, patch)| self.store.update(patch))).await;
        for ((index, patch), result) in dirty.iter().zip(results) {
            match result {
                Ok(()) => {
                    summary.written += 1;
                    if let Some(task) = merged.get_mut(*index) {
                        task.reset_changes();
                    }
                }
                Err(e) => {
                    warn!(page = %patch.page_ref, error = %e, "write-back failed");
                    summary.write_failures += 1;
                    summary.failures.push(format!("write {}: {e}", patch.page_ref));
                }
            }
        }

        // Reminders due inside the lookahead window.
        let reminders = due_reminders(&merged, now, self.config.reminder_window_min);
        let results = join_all(
            reminders
                .iter()
                .map(|reminder| self.notifier.notify(&reminder.message)),
        )
        .await;
        for (reminder, result) in reminders.iter().zip(results) {
            match result {
                Ok(()) => summary.reminders_sent += 1,
                Err(e) => {
                    warn!(page = %reminder.page_ref, error = %e, "notification failed");
                    summary.notify_failures += 1;
                    summary.failures.push(format!("notify {}: {e}", reminder.page_ref));
                }
            }
        }

        // Snapshot written once, at the end.
        self.snapshots.save(&Snapshot::new(merged))?;

        info!("cycle complete: {}", summary.render());
        Ok(summary)
    }

    /// Sequential fetch-and-merge pagination loop for one group. Each page's
    /// cursor depends on the previous response, so pages are not
    /// parallelized. Per-record decode failures are skipped and reported;
    /// a page-level store failure ends the group but not the cycle.
    async fn fetch_group(&self, kind: FetchKind) -> FetchOutcome {
        let mut outcome = FetchOutcome::default();
        let mut collection = TaskCollection::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = match kind {
                FetchKind::Scheduled => self.store.query_scheduled(cursor.clone()).await,
                FetchKind::Executed => self.store.query_executed(cursor.clone()).await,
                FetchKind::ReminderWindow => {
                    self.store.query_reminder_window(cursor.clone()).await
                }
            };
            let page = match page {
                Ok(page) => page,
                Err(e) => {
                    warn!(?kind, error = %e, "fetch group failed");
                    outcome.failed = Some(format!("fetch {kind:?}: {e}"));
                    break;
                }
            };

            let mut decoded = Vec::with_capacity(page.records.len());
            for raw in &page.records {
                let result = match kind {
                    FetchKind::Executed => self.decoder.decode_executed(raw),
                    FetchKind::Scheduled | FetchKind::ReminderWindow => {
                        self.decoder.decode_scheduled(raw)
                    }
                };
                match result {
                    Ok(task) => decoded.push(task),
                    Err(e) => {
                        warn!(record = %raw.number, error = %e, "skipping record");
                        outcome.skipped.push(e.to_string());
                    }
                }
            }
            collection.upsert_by_id(decoded);

            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }

        outcome.tasks = collection.into_iter().collect();
        outcome
    }
}
