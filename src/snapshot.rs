//! Cross-cycle snapshot persistence.
//!
//! The merged task collection from the previous cycle is the baseline the
//! next cycle merges fresh fetches into. The blob is opaque to the store:
//! a versioned JSON document written atomically (temp file + rename) under
//! an exclusive file lock.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::collection::TaskCollection;
use crate::error::{PlanSyncError, Result};

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Default snapshot file name.
const SNAPSHOT_FILE: &str = "snapshot.json";

/// Temporary file suffix for atomic writes.
const TMP_SUFFIX: &str = ".tmp";

/// Lock file suffix for concurrent access prevention.
const LOCK_SUFFIX: &str = ".lock";

/// The serialized cross-cycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub tasks: TaskCollection,
}

impl Snapshot {
    #[must_use]
    pub fn new(tasks: TaskCollection) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            tasks,
        }
    }

    #[must_use]
    pub fn is_version_compatible(&self) -> bool {
        self.version == SNAPSHOT_VERSION
    }
}

/// Persistence seam for the cross-cycle snapshot.
pub trait SnapshotStore: Send + Sync {
    /// Persist the snapshot, replacing any prior one.
    fn save(&self, snapshot: &Snapshot) -> Result<()>;

    /// Load the previous snapshot, or `None` when no usable one exists.
    fn load(&self) -> Result<Option<Snapshot>>;
}

/// File-backed snapshot store with atomic writes and file locking.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    /// Directory where snapshot files are stored.
    dir: PathBuf,
}

impl FileSnapshotStore {
    #[must_use]
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    #[must_use]
    pub fn snapshot_file_path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }

    #[must_use]
    pub fn tmp_file_path(&self) -> PathBuf {
        self.dir.join(format!("{SNAPSHOT_FILE}{TMP_SUFFIX}"))
    }

    #[must_use]
    pub fn lock_file_path(&self) -> PathBuf {
        self.dir.join(format!("{SNAPSHOT_FILE}{LOCK_SUFFIX}"))
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.snapshot_file_path().exists()
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let lock_file = File::create(self.lock_file_path())?;
        FileExt::lock_exclusive(&lock_file)
            .map_err(|e| PlanSyncError::snapshot(format!("failed to acquire lock: {e}")))?;

        let tmp_path = self.tmp_file_path();
        let json = serde_json::to_string_pretty(snapshot)?;

        let mut tmp_file = File::create(&tmp_path)?;
        tmp_file.write_all(json.as_bytes())?;
        tmp_file.sync_all()?;

        fs::rename(&tmp_path, self.snapshot_file_path())?;

        Ok(())
    }

    fn load(&self) -> Result<Option<Snapshot>> {
        let snapshot_path = self.snapshot_file_path();

        if !snapshot_path.exists() {
            return Ok(None);
        }

        let lock_path = self.lock_file_path();
        if lock_path.exists() {
            let lock_file = File::open(&lock_path)?;
            FileExt::lock_shared(&lock_file)
                .map_err(|e| PlanSyncError::snapshot(format!("failed to acquire lock: {e}")))?;
        }

        let mut file = match File::open(&snapshot_path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        let snapshot: Snapshot = match serde_json::from_str(&contents) {
            Ok(s) => s,
            Err(e) => {
                warn!(
                    "Corrupted snapshot at {}: {}. Deleting and starting fresh.",
                    snapshot_path.display(),
                    e
                );
                let _ = fs::remove_file(&snapshot_path);
                return Ok(None);
            }
        };

        if !snapshot.is_version_compatible() {
            warn!(
                "Incompatible snapshot version {} (supported: {}). Starting fresh.",
                snapshot.version, SNAPSHOT_VERSION
            );
            let _ = fs::remove_file(&snapshot_path);
            return Ok(None);
        }

        Ok(Some(snapshot))
    }
}
