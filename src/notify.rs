//! Reminder scanning and the outbound notification seam.
//!
//! Reminders fire ahead of a task's start or end, offset by the per-task
//! minute settings. The scan is pure: it yields the messages due inside the
//! lookahead window and leaves delivery to a [`Notifier`]. Delivery failures
//! are reported back as per-item outcomes, never raised into the cycle.

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset};

use crate::collection::TaskCollection;
use crate::domain::PageRef;
use crate::error::Result;

/// External notification channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one plain message.
    async fn notify(&self, message: &str) -> Result<()>;
}

/// One reminder due for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    pub page_ref: PageRef,
    pub message: String,
}

/// Collect the reminders whose fire time falls inside
/// `[now, now + window_min)`.
#[must_use]
pub fn due_reminders(
    tasks: &TaskCollection,
    now: DateTime<FixedOffset>,
    window_min: i64,
) -> Vec<Reminder> {
    let window_end = now + Duration::minutes(window_min);
    let in_window = |fire_at: DateTime<FixedOffset>| fire_at >= now && fire_at < window_end;
    let mut reminders = Vec::new();

    for task in tasks {
        let remind = task.remind();
        if remind.is_silent() {
            continue;
        }
        let Some(range) = task.date_range() else {
            continue;
        };

        if remind.notify_before_start {
            let offset = remind.before_start_min.unwrap_or(0);
            let fire_at = range.start - Duration::minutes(offset);
            if in_window(fire_at) {
                reminders.push(Reminder {
                    page_ref: task.page_ref().clone(),
                    message: format!(
                        "{} starts at {} ({} min ahead)",
                        task.name().text(),
                        range.start.format("%Y-%m-%d %H:%M"),
                        offset
                    ),
                });
            }
        }
        if remind.notify_before_end {
            let offset = remind.before_end_min.unwrap_or(0);
            let fire_at = range.end - Duration::minutes(offset);
            if in_window(fire_at) {
                reminders.push(Reminder {
                    page_ref: task.page_ref().clone(),
                    message: format!(
                        "{} ends at {} ({} min ahead)",
                        task.name().text(),
                        range.end.format("%Y-%m-%d %H:%M"),
                        offset
                    ),
                });
            }
        }
    }

    reminders
}
