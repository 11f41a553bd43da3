//! Domain model: value objects, task names, entities, change tracking.

pub mod changelog;
pub mod name;
pub mod task;
pub mod values;

pub use changelog::ChangeLog;
pub use name::TaskName;
pub use task::{ExecutedData, ScheduledData, Task, TaskKind};
pub use values::{DateRange, Hours, PageRef, Progress, RecordId, RemindSetting, Status, Tag};
