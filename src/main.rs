//! PlanSync - Task Store Reconciliation Core
//!
//! Command-line front end: run a reconciliation cycle against a directory
//! of exported records, replay propagation over the cached snapshot, or
//! inspect the snapshot contents.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tracing::info;

use plansync::{
    due_reminders, Notifier, PlanSyncError, PropagationEngine, RawPage, RawRecord, Result,
    SyncConfig, SyncCycle, TaskPatch, TaskStore,
};
use plansync::{FileSnapshotStore, LabelCodec, Snapshot, SnapshotStore};

#[derive(Parser)]
#[command(name = "plansync")]
#[command(version = "0.1.0")]
#[command(about = "Reconciliation engine for a label-driven task store", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Config file (TOML). Missing file means built-in defaults.
    #[arg(short, long, global = true, default_value = ".plansync/config.toml")]
    config: PathBuf,

    /// Directory holding the cross-cycle snapshot
    #[arg(short, long, global = true, default_value = ".plansync")]
    state_dir: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one reconciliation cycle against exported record files
    Run {
        /// Directory with scheduled.json / executed.json / reminders.json
        #[arg(short, long, default_value = ".")]
        input: PathBuf,

        /// File the emitted patches are written to
        #[arg(short, long, default_value = "patches.json")]
        output: PathBuf,
    },

    /// Relink and propagate over the cached snapshot, printing would-be
    /// patches without writing anything
    Replay,

    /// Show snapshot contents grouped by status and tag
    Inspect,
}

/// Store adapter over a directory of JSON record exports. Each query reads
/// one file as a single page; updates are collected and flushed to the
/// output file after the cycle.
struct JsonDirStore {
    dir: PathBuf,
    patches: Mutex<Vec<TaskPatch>>,
}

impl JsonDirStore {
    fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            patches: Mutex::new(Vec::new()),
        }
    }

    fn read_page(&self, file: &str) -> Result<RawPage> {
        let path = self.dir.join(file);
        if !path.exists() {
            return Ok(RawPage::default());
        }
        let contents = fs::read_to_string(&path)
            .map_err(|e| PlanSyncError::store("query", format!("{}: {e}", path.display())))?;
        let records: Vec<RawRecord> = serde_json::from_str(&contents)
            .map_err(|e| PlanSyncError::store("query", format!("{}: {e}", path.display())))?;
        Ok(RawPage {
            records,
            next_cursor: None,
        })
    }

    fn flush(&self, output: &Path) -> Result<()> {
        let patches = self.patches.lock().map_err(|_| {
            PlanSyncError::store("flush", "patch buffer lock poisoned".to_string())
        })?;
        let json = serde_json::to_string_pretty(&*patches)?;
        fs::write(output, json)?;
        Ok(())
    }
}

#[async_trait]
impl TaskStore for JsonDirStore {
    async fn query_scheduled(&self, _cursor: Option<String>) -> Result<RawPage> {
        self.read_page("scheduled.json")
    }

    async fn query_executed(&self, _cursor: Option<String>) -> Result<RawPage> {
        self.read_page("executed.json")
    }

    async fn query_reminder_window(&self, _cursor: Option<String>) -> Result<RawPage> {
        self.read_page("reminders.json")
    }

    async fn update(&self, patch: &TaskPatch) -> Result<()> {
        self.patches
            .lock()
            .map_err(|_| PlanSyncError::store("update", "patch buffer lock poisoned".to_string()))?
            .push(patch.clone());
        Ok(())
    }
}

/// Notifier that delivers reminders to the log.
struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str) -> Result<()> {
        info!("reminder: {message}");
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "plansync=debug,info"
    } else {
        "plansync=info,warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Err(e) = execute(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(e.exit_code());
    }
}

async fn execute(cli: Cli) -> Result<()> {
    let config = SyncConfig::load(&cli.config)?;
    let snapshots = FileSnapshotStore::new(&cli.state_dir);

    match cli.command {
        Commands::Run { input, output } => {
            let store = JsonDirStore::new(input);
            let notifier = LogNotifier;
            let cycle = SyncCycle::new(&config, &store, &snapshots, &notifier);

            let summary = cycle.run().await?;
            store.flush(&output)?;

            println!("Cycle complete: {}", summary.render());
            if !summary.failures.is_empty() {
                println!("Failures:");
                for failure in &summary.failures {
                    println!("  - {failure}");
                }
            }
            println!("Patches written to {}", output.display());
        }

        Commands::Replay => {
            let snapshot = snapshots.load()?.ok_or_else(|| {
                PlanSyncError::snapshot(format!(
                    "no snapshot under {}; run a cycle first",
                    cli.state_dir.display()
                ))
            })?;
            let mut tasks = snapshot.tasks;

            let engine = PropagationEngine::new(config.labels.clone());
            let mut link_failures = Vec::new();
            engine.link(&mut tasks, &mut |e| link_failures.push(e.to_string()));
            let now = chrono::Utc::now().with_timezone(&config.reference_offset());
            engine.propagate(&mut tasks, now);

            let codec = LabelCodec::new(config.labels.clone());
            let dirty = tasks.updated();
            println!("Replay over {} tasks: {} would change", tasks.len(), dirty.len());
            for task in dirty {
                println!("\n{} ({})", task.record_id(), task.page_ref());
                for entry in task.change_entries() {
                    println!("  {entry}");
                }
                if let Some(patch) = TaskPatch::from_task(task, &codec) {
                    println!("  patch: {}", serde_json::to_string(&patch)?);
                }
            }
            for failure in &link_failures {
                println!("link failure: {failure}");
            }

            let due = due_reminders(&tasks, now, config.reminder_window_min);
            for reminder in &due {
                println!("reminder due: {}", reminder.message);
            }
        }

        Commands::Inspect => {
            let snapshot = snapshots.load()?.ok_or_else(|| {
                PlanSyncError::snapshot(format!(
                    "no snapshot under {}",
                    cli.state_dir.display()
                ))
            })?;
            print_inspection(&snapshot);
        }
    }

    Ok(())
}

fn print_inspection(snapshot: &Snapshot) {
    println!(
        "Snapshot v{} saved {} ({} tasks)",
        snapshot.version,
        snapshot.saved_at.format("%Y-%m-%d %H:%M:%S UTC"),
        snapshot.tasks.len()
    );

    let mut by_status: BTreeMap<&str, usize> = BTreeMap::new();
    let mut all_tags = BTreeSet::new();
    let mut scheduled = 0usize;
    let mut executed = 0usize;

    for task in snapshot.tasks.iter() {
        *by_status.entry(task.status().as_str()).or_default() += 1;
        all_tags.extend(task.tags().iter().cloned());
        if task.is_scheduled() {
            scheduled += 1;
        } else {
            executed += 1;
        }
    }

    println!("  Scheduled: {scheduled}, Executed: {executed}");
    println!("  By status:");
    for (status, count) in &by_status {
        println!("    {status}: {count}");
    }
    if !all_tags.is_empty() {
        println!("  By tag:");
        for (tag, bucket) in snapshot.tasks.partition_by_tags(&all_tags) {
            println!("    {tag}: {}", bucket.len());
        }
    }

    let dirty = snapshot.tasks.updated().len();
    if dirty > 0 {
        println!("  Unwritten changes: {dirty}");
    }
}
