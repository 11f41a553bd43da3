//! Configuration for the reconciliation engine.
//!
//! All glyphs and sigils the label codec recognizes live in [`LabelConfig`],
//! an explicit immutable value handed to the codec and propagation engine at
//! construction. Nothing in the codec reads module-level constants.

use crate::error::{PlanSyncError, Result};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::domain::Status;

/// Glyphs and sigils used when decoding/encoding title labels.
///
/// At most one label of each kind may appear in a title. Bracketed content
/// is classified by its first character: a sigil selects the Parent, Hours
/// or Remind kind; a decimal digit (optionally preceded by a status glyph)
/// selects the Identity kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    /// Opening delimiter of a label.
    pub open: char,
    /// Closing delimiter of a label.
    pub close: char,
    /// Sigil introducing a parent-identity label.
    pub parent_sigil: char,
    /// Sigil introducing an hours label (`executed/scheduled`).
    pub hours_sigil: char,
    /// Sigil introducing a remind label (`beforeStart|beforeEnd` minutes).
    pub remind_sigil: char,
    /// Status glyph shown in front of the identity number while in progress.
    pub glyph_in_progress: char,
    /// Status glyph for delayed tasks.
    pub glyph_delayed: char,
    /// Status glyph for completed tasks.
    pub glyph_completed: char,
    /// Status glyph for canceled tasks.
    pub glyph_canceled: char,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            open: '[',
            close: ']',
            parent_sigil: '^',
            hours_sigil: '@',
            remind_sigil: '~',
            glyph_in_progress: '▶',
            glyph_delayed: '⚠',
            glyph_completed: '✔',
            glyph_canceled: '✖',
        }
    }
}

impl LabelConfig {
    /// Status glyph for the given status, if that status carries one.
    ///
    /// `NotStarted` has no glyph: a bare number in the identity label means
    /// the task has not been touched.
    #[must_use]
    pub fn glyph_for(&self, status: Status) -> Option<char> {
        match status {
            Status::NotStarted => None,
            Status::InProgress => Some(self.glyph_in_progress),
            Status::Delayed => Some(self.glyph_delayed),
            Status::Completed => Some(self.glyph_completed),
            Status::Canceled => Some(self.glyph_canceled),
        }
    }

    /// True if `c` is one of the configured status glyphs.
    #[must_use]
    pub fn is_status_glyph(&self, c: char) -> bool {
        c == self.glyph_in_progress
            || c == self.glyph_delayed
            || c == self.glyph_completed
            || c == self.glyph_canceled
    }

    /// Reject configs where two kinds would classify the same first character.
    pub fn validate(&self) -> Result<()> {
        let sigils = [self.parent_sigil, self.hours_sigil, self.remind_sigil];
        for (i, a) in sigils.iter().enumerate() {
            if sigils[i + 1..].contains(a) {
                return Err(PlanSyncError::InvalidConfig {
                    field: "labels".into(),
                    reason: format!("duplicate sigil '{a}'"),
                });
            }
            if a.is_ascii_digit() || self.is_status_glyph(*a) {
                return Err(PlanSyncError::InvalidConfig {
                    field: "labels".into(),
                    reason: format!("sigil '{a}' collides with identity label"),
                });
            }
        }
        Ok(())
    }
}

/// Top-level configuration for a reconciliation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Label glyph/sigil configuration.
    pub labels: LabelConfig,
    /// Reference timezone offset from UTC, in minutes. Naive timestamps in
    /// raw records are interpreted in this offset.
    pub tz_offset_min: i32,
    /// Width of the reminder lookahead window, in minutes.
    pub reminder_window_min: i64,
    /// Whether a cycle requires a loadable baseline snapshot. When true and
    /// no snapshot can be loaded, the cycle aborts with SnapshotUnavailable.
    pub require_snapshot: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            labels: LabelConfig::default(),
            tz_offset_min: 9 * 60,
            reminder_window_min: 60,
            require_snapshot: false,
        }
    }
}

impl SyncConfig {
    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: SyncConfig = toml::from_str(&content)
            .map_err(|e| PlanSyncError::config_with_path(e.to_string(), path.to_path_buf()))?;
        config.labels.validate()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate scalar fields.
    pub fn validate(&self) -> Result<()> {
        // Explicit bounds rather than abs(): abs() overflows on i32::MIN.
        if self.tz_offset_min <= -(24 * 60) || self.tz_offset_min >= 24 * 60 {
            return Err(PlanSyncError::InvalidConfig {
                field: "tz_offset_min".into(),
                reason: format!("{} is not a valid UTC offset", self.tz_offset_min),
            });
        }
        if self.reminder_window_min < 0 {
            return Err(PlanSyncError::InvalidConfig {
                field: "reminder_window_min".into(),
                reason: "window must be non-negative".into(),
            });
        }
        Ok(())
    }

    /// The reference timezone as a chrono offset.
    #[must_use]
    pub fn reference_offset(&self) -> FixedOffset {
        // validate() bounds the offset, so this cannot overflow.
        FixedOffset::east_opt(self.tz_offset_min * 60)
            .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is valid"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_label_config() {
        let labels = LabelConfig::default();
        assert_eq!(labels.open, '[');
        assert_eq!(labels.parent_sigil, '^');
        assert!(labels.validate().is_ok());
    }

    #[test]
    fn test_glyph_for_status() {
        let labels = LabelConfig::default();
        assert_eq!(labels.glyph_for(Status::NotStarted), None);
        assert_eq!(labels.glyph_for(Status::Completed), Some('✔'));
        assert_eq!(labels.glyph_for(Status::Canceled), Some('✖'));
    }

    #[test]
    fn test_duplicate_sigil_rejected() {
        let labels = LabelConfig {
            parent_sigil: '@',
            ..LabelConfig::default()
        };
        assert!(labels.validate().is_err());
    }

    #[test]
    fn test_digit_sigil_rejected() {
        let labels = LabelConfig {
            remind_sigil: '7',
            ..LabelConfig::default()
        };
        assert!(labels.validate().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.tz_offset_min, 540);
        assert_eq!(config.reminder_window_min, 60);
        assert!(!config.require_snapshot);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_tz_offset() {
        let config = SyncConfig {
            tz_offset_min: 24 * 60,
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_extreme_tz_offset_rejected_without_panic() {
        for offset in [i32::MIN, -(24 * 60), 24 * 60, i32::MAX] {
            let config = SyncConfig {
                tz_offset_min: offset,
                ..SyncConfig::default()
            };
            assert!(config.validate().is_err(), "offset {offset} should be rejected");
        }
    }

    #[test]
    fn test_reference_offset() {
        let config = SyncConfig::default();
        assert_eq!(config.reference_offset().local_minus_utc(), 9 * 3600);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = SyncConfig::load(Path::new("/nonexistent/plansync.toml")).unwrap();
        assert_eq!(config.tz_offset_min, 540);
    }

    #[test]
    fn test_load_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plansync.toml");
        std::fs::write(
            &path,
            "tz_offset_min = 0\nreminder_window_min = 30\n\n[labels]\nparent_sigil = '>'\n",
        )
        .unwrap();

        let config = SyncConfig::load(&path).unwrap();
        assert_eq!(config.tz_offset_min, 0);
        assert_eq!(config.reminder_window_min, 30);
        assert_eq!(config.labels.parent_sigil, '>');
        // Unspecified label fields keep their defaults.
        assert_eq!(config.labels.hours_sigil, '@');
    }
}
