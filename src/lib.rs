//! PlanSync - Task Store Reconciliation Core
//!
//! A reconciliation engine for a task-tracking store where structured
//! metadata rides inside display titles as bracketed labels. Each cycle
//! fetches scheduled and executed records, merges them with the previous
//! cycle's snapshot, relinks the parent/subtask and scheduled/executed
//! graphs, propagates status, progress, and man-hours bottom-up, and
//! writes only the fields that actually changed back to the store.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`label`] - Bracketed-label codec for metadata embedded in titles
//! - [`domain`] - Value objects, task entities, and change tracking
//! - [`collection`] - Identity-keyed task collection with idempotent merge
//! - [`propagate`] - Linking and status/progress/hours propagation
//! - [`remote`] - Record decoding, sparse patches, and the store seam
//! - [`snapshot`] - Cross-cycle snapshot persistence
//! - [`notify`] - Reminder scanning and the notification seam
//! - [`cycle`] - The reconciliation cycle orchestrator
//!
//! # Example
//!
//! ```rust,ignore
//! use plansync::{FileSnapshotStore, SyncConfig, SyncCycle};
//!
//! let config = SyncConfig::load(".plansync/config.toml")?;
//! let snapshots = FileSnapshotStore::new(".plansync");
//!
//! // `store` and `notifier` are your TaskStore / Notifier implementations.
//! let cycle = SyncCycle::new(&config, &store, &snapshots, &notifier);
//! let summary = cycle.run().await?;
//! println!("{}", summary.render());
//! ```

pub mod collection;
pub mod config;
pub mod cycle;
pub mod domain;
pub mod error;
pub mod label;
pub mod notify;
pub mod propagate;
pub mod remote;
pub mod snapshot;

// Re-export commonly used types
pub use error::{IntoPlanSyncError, PlanSyncError, Result};

// Re-export config types
pub use config::{LabelConfig, SyncConfig};

// Re-export domain types
pub use domain::{
    ChangeLog, DateRange, ExecutedData, Hours, PageRef, Progress, RecordId, RemindSetting,
    ScheduledData, Status, Tag, Task, TaskKind, TaskName,
};

// Re-export the label codec
pub use label::{Label, LabelCodec, LabelKind};

// Re-export collection and propagation types
pub use collection::TaskCollection;
pub use propagate::PropagationEngine;

// Re-export boundary types
pub use notify::{due_reminders, Notifier, Reminder};
pub use remote::{RawPage, RawRecord, RecordDecoder, TaskPatch, TaskStore};
pub use snapshot::{FileSnapshotStore, Snapshot, SnapshotStore, SNAPSHOT_VERSION};

// Re-export the orchestrator
pub use cycle::{CycleSummary, SyncCycle};
