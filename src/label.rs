//! Codec for metadata labels embedded in task titles.
//!
//! The external store only gives us a plain-text title, so linkage metadata
//! travels inside it as bracketed fragments: `[✔42]Write docs[@5/8][^7]`
//! carries the record number (with a status glyph), the executed/scheduled
//! hours, and the parent's record number.
//!
//! Bracketed content is classified by its first character against a static
//! sigil table; content that matches no kind is a [`PlanSyncError::LabelParse`]
//! rather than silently falling through. Text outside brackets is always
//! legal.
//!
//! The remind label (`[~15|30]`) is read on decode but never re-embedded by
//! [`LabelCodec::encode`]; the store's native reminder fields are the write
//! path for that configuration.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::LabelConfig;
use crate::domain::{Hours, Status, TaskName};
use crate::error::{PlanSyncError, Result};

/// Discriminant for the label kinds, in canonical serialization order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LabelKind {
    Identity,
    Hours,
    ParentIdentity,
    Remind,
}

/// A structured annotation decoded from (or encoded into) a title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Label {
    /// Mirrors the record number, prefixed with the current status glyph.
    Identity {
        number: String,
        glyph: Option<char>,
    },
    /// Executed/scheduled hour quantities as a ratio string.
    Hours { executed: Hours, scheduled: Hours },
    /// Mirrors the parent task's record number.
    ParentIdentity { number: String },
    /// Minute offsets before start/end at which to remind. Decode-only.
    Remind {
        before_start_min: Option<i64>,
        before_end_min: Option<i64>,
    },
}

impl Label {
    #[must_use]
    pub fn kind(&self) -> LabelKind {
        match self {
            Label::Identity { .. } => LabelKind::Identity,
            Label::Hours { .. } => LabelKind::Hours,
            Label::ParentIdentity { .. } => LabelKind::ParentIdentity,
            Label::Remind { .. } => LabelKind::Remind,
        }
    }
}

/// Encoder/decoder between raw titles and [`TaskName`]s.
#[derive(Debug, Clone)]
pub struct LabelCodec {
    config: LabelConfig,
    bracket: Regex,
}

impl LabelCodec {
    /// Build a codec for the given label configuration.
    #[must_use]
    pub fn new(config: LabelConfig) -> Self {
        let pattern = format!(
            "{}([^{}{}]*){}",
            regex::escape(&config.open.to_string()),
            regex::escape(&config.open.to_string()),
            regex::escape(&config.close.to_string()),
            regex::escape(&config.close.to_string()),
        );
        let bracket = Regex::new(&pattern).expect("bracket pattern is well-formed");
        Self { config, bracket }
    }

    /// Decode a raw title into plain text plus labels.
    ///
    /// # Errors
    ///
    /// Returns [`PlanSyncError::LabelParse`] when a bracketed fragment
    /// matches no label kind.
    pub fn decode(&self, raw: &str) -> Result<TaskName> {
        let mut text = String::with_capacity(raw.len());
        let mut labels = Vec::new();
        let mut last = 0;

        for caps in self.bracket.captures_iter(raw) {
            let whole = caps.get(0).expect("group 0 always present");
            let content = caps.get(1).expect("content group").as_str();
            text.push_str(&raw[last..whole.start()]);
            last = whole.end();
            labels.push(self.classify(content)?);
        }
        text.push_str(&raw[last..]);

        let mut name = TaskName::new(text);
        for label in labels {
            name.register(label);
        }
        Ok(name)
    }

    /// Encode a name back into a raw title in canonical order:
    /// identity, plain text, hours, parent-identity.
    ///
    /// The identity glyph is recomputed from `status`; whatever glyph a prior
    /// decode produced is not trusted. Remind labels are never re-embedded.
    #[must_use]
    pub fn encode(&self, name: &TaskName, status: Status) -> String {
        let open = self.config.open;
        let close = self.config.close;
        let mut out = String::new();

        if let Some(Label::Identity { number, .. }) = name.label(LabelKind::Identity) {
            out.push(open);
            if let Some(glyph) = self.config.glyph_for(status) {
                out.push(glyph);
            }
            out.push_str(number);
            out.push(close);
        }

        out.push_str(name.text());

        if let Some(Label::Hours {
            executed,
            scheduled,
        }) = name.label(LabelKind::Hours)
        {
            out.push(open);
            out.push(self.config.hours_sigil);
            out.push_str(&format!("{executed}/{scheduled}"));
            out.push(close);
        }

        if let Some(Label::ParentIdentity { number }) = name.label(LabelKind::ParentIdentity) {
            out.push(open);
            out.push(self.config.parent_sigil);
            out.push_str(number);
            out.push(close);
        }

        out
    }

    /// Classify one bracketed fragment. First-character dispatch, checked
    /// exhaustively: unknown sigils fail instead of falling through.
    fn classify(&self, content: &str) -> Result<Label> {
        let mut chars = content.chars();
        let first = chars
            .next()
            .ok_or_else(|| PlanSyncError::label_parse(content))?;
        let rest = chars.as_str();

        if first == self.config.parent_sigil {
            return Self::parse_number(rest)
                .map(|number| Label::ParentIdentity { number })
                .ok_or_else(|| PlanSyncError::label_parse(content));
        }
        if first == self.config.hours_sigil {
            return self.parse_hours(rest, content);
        }
        if first == self.config.remind_sigil {
            return Self::parse_remind(rest).ok_or_else(|| PlanSyncError::label_parse(content));
        }
        if first.is_ascii_digit() {
            return Self::parse_number(content)
                .map(|number| Label::Identity {
                    number,
                    glyph: None,
                })
                .ok_or_else(|| PlanSyncError::label_parse(content));
        }
        if self.config.is_status_glyph(first) {
            return Self::parse_number(rest)
                .map(|number| Label::Identity {
                    number,
                    glyph: Some(first),
                })
                .ok_or_else(|| PlanSyncError::label_parse(content));
        }
        Err(PlanSyncError::label_parse(content))
    }

    /// A non-empty run of decimal digits.
    fn parse_number(s: &str) -> Option<String> {
        if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
            Some(s.to_string())
        } else {
            None
        }
    }

    /// `executed/scheduled`, each side a non-negative decimal.
    fn parse_hours(&self, s: &str, content: &str) -> Result<Label> {
        let (executed, scheduled) = s
            .split_once('/')
            .ok_or_else(|| PlanSyncError::label_parse(content))?;
        let parse_side = |side: &str| -> Result<Hours> {
            let value: f64 = side
                .trim()
                .parse()
                .map_err(|_| PlanSyncError::label_parse(content))?;
            Hours::new(value).map_err(|_| PlanSyncError::label_parse(content))
        };
        Ok(Label::Hours {
            executed: parse_side(executed)?,
            scheduled: parse_side(scheduled)?,
        })
    }

    /// `beforeStart|beforeEnd` minute offsets; either side may be empty.
    fn parse_remind(s: &str) -> Option<Label> {
        let (start, end) = s.split_once('|')?;
        let parse_side = |side: &str| -> Option<Option<i64>> {
            if side.is_empty() {
                Some(None)
            } else {
                side.parse::<i64>().ok().map(Some)
            }
        };
        Some(Label::Remind {
            before_start_min: parse_side(start)?,
            before_end_min: parse_side(end)?,
        })
    }
}

impl Default for LabelCodec {
    fn default() -> Self {
        Self::new(LabelConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> LabelCodec {
        LabelCodec::default()
    }

    // =========================================================================
    // Decode
    // =========================================================================

    #[test]
    fn decode_plain_title_without_labels() {
        let name = codec().decode("Write the migration guide").unwrap();
        assert_eq!(name.text(), "Write the migration guide");
        assert!(name.labels().is_empty());
    }

    #[test]
    fn decode_identity_label() {
        let name = codec().decode("[42]Write docs").unwrap();
        assert_eq!(name.text(), "Write docs");
        assert_eq!(name.identity_number(), Some("42"));
    }

    #[test]
    fn decode_identity_label_with_glyph() {
        let name = codec().decode("[✔42]Write docs").unwrap();
        assert_eq!(
            name.label(LabelKind::Identity),
            Some(&Label::Identity {
                number: "42".into(),
                glyph: Some('✔'),
            })
        );
    }

    #[test]
    fn decode_hours_label() {
        let name = codec().decode("Write docs[@5/8]").unwrap();
        assert_eq!(
            name.label(LabelKind::Hours),
            Some(&Label::Hours {
                executed: Hours::new(5.0).unwrap(),
                scheduled: Hours::new(8.0).unwrap(),
            })
        );
    }

    #[test]
    fn decode_parent_label() {
        let name = codec().decode("Write docs[^7]").unwrap();
        assert_eq!(name.parent_number(), Some("7"));
    }

    #[test]
    fn decode_remind_label() {
        let name = codec().decode("Standup[~15|30]").unwrap();
        assert_eq!(
            name.label(LabelKind::Remind),
            Some(&Label::Remind {
                before_start_min: Some(15),
                before_end_min: Some(30),
            })
        );
    }

    #[test]
    fn decode_remind_label_with_empty_sides() {
        let name = codec().decode("Standup[~|30]").unwrap();
        assert_eq!(
            name.label(LabelKind::Remind),
            Some(&Label::Remind {
                before_start_min: None,
                before_end_min: Some(30),
            })
        );
        let name = codec().decode("Standup[~|]").unwrap();
        assert_eq!(
            name.label(LabelKind::Remind),
            Some(&Label::Remind {
                before_start_min: None,
                before_end_min: None,
            })
        );
    }

    #[test]
    fn decode_all_label_kinds_together() {
        let name = codec().decode("[▶42]Write docs[@2.5/8][^7][~10|]").unwrap();
        assert_eq!(name.text(), "Write docs");
        assert_eq!(name.labels().len(), 4);
        assert_eq!(name.identity_number(), Some("42"));
        assert_eq!(name.parent_number(), Some("7"));
    }

    #[test]
    fn decode_unknown_bracket_content_fails() {
        let err = codec().decode("Write docs[?junk]").unwrap_err();
        match err {
            PlanSyncError::LabelParse { content } => assert_eq!(content, "?junk"),
            other => panic!("expected LabelParse, got {other:?}"),
        }
    }

    #[test]
    fn decode_empty_bracket_fails() {
        assert!(codec().decode("Write docs[]").is_err());
    }

    #[test]
    fn decode_malformed_hours_fails() {
        assert!(codec().decode("[@five/8]x").is_err());
        assert!(codec().decode("[@5]x").is_err());
        assert!(codec().decode("[@-1/8]x").is_err());
    }

    #[test]
    fn decode_glyph_without_digits_fails() {
        assert!(codec().decode("[✔]x").is_err());
        assert!(codec().decode("[✔abc]x").is_err());
    }

    #[test]
    fn decode_empty_text_after_stripping_is_legal() {
        let name = codec().decode("[42]").unwrap();
        assert_eq!(name.text(), "");
        assert_eq!(name.identity_number(), Some("42"));
    }

    // =========================================================================
    // Encode
    // =========================================================================

    #[test]
    fn encode_canonical_order() {
        let mut name = TaskName::new("Write docs");
        name.register(Label::ParentIdentity { number: "7".into() });
        name.register(Label::Hours {
            executed: Hours::new(5.0).unwrap(),
            scheduled: Hours::new(8.0).unwrap(),
        });
        name.register(Label::Identity {
            number: "42".into(),
            glyph: None,
        });
        let raw = codec().encode(&name, Status::NotStarted);
        assert_eq!(raw, "[42]Write docs[@5/8][^7]");
    }

    #[test]
    fn encode_recomputes_status_glyph() {
        let mut name = TaskName::new("Write docs");
        // Stale glyph from a prior decode; encode must not trust it.
        name.register(Label::Identity {
            number: "42".into(),
            glyph: Some('▶'),
        });
        let raw = codec().encode(&name, Status::Completed);
        assert_eq!(raw, "[✔42]Write docs");
    }

    #[test]
    fn encode_hours_trims_trailing_zeros() {
        let mut name = TaskName::new("x");
        name.register(Label::Hours {
            executed: Hours::new(5.0).unwrap(),
            scheduled: Hours::new(8.0).unwrap(),
        });
        assert_eq!(codec().encode(&name, Status::NotStarted), "x[@5/8]");
    }

    #[test]
    fn encode_drops_remind_label() {
        let mut name = TaskName::new("Standup");
        name.register(Label::Remind {
            before_start_min: Some(15),
            before_end_min: None,
        });
        assert_eq!(codec().encode(&name, Status::NotStarted), "Standup");
    }

    // =========================================================================
    // Round-trip
    // =========================================================================

    #[test]
    fn roundtrip_identity_hours_parent() {
        let codec = codec();
        let mut name = TaskName::new("Write docs");
        name.register(Label::Identity {
            number: "42".into(),
            glyph: Some('▶'),
        });
        name.register(Label::Hours {
            executed: Hours::new(2.5).unwrap(),
            scheduled: Hours::new(8.0).unwrap(),
        });
        name.register(Label::ParentIdentity { number: "7".into() });

        let raw = codec.encode(&name, Status::InProgress);
        let decoded = codec.decode(&raw).unwrap();
        assert_eq!(decoded, name);
    }

    #[test]
    fn roundtrip_identity_only_each_status() {
        let codec = codec();
        for status in [
            Status::NotStarted,
            Status::InProgress,
            Status::Delayed,
            Status::Completed,
            Status::Canceled,
        ] {
            let mut name = TaskName::new("t");
            name.register(Label::Identity {
                number: "9".into(),
                glyph: codec.config.glyph_for(status),
            });
            let decoded = codec.decode(&codec.encode(&name, status)).unwrap();
            assert_eq!(decoded, name, "roundtrip failed for {status}");
        }
    }

    #[test]
    fn roundtrip_empty_text() {
        let codec = codec();
        let mut name = TaskName::new("");
        name.register(Label::Identity {
            number: "1".into(),
            glyph: None,
        });
        let decoded = codec.decode(&codec.encode(&name, Status::NotStarted)).unwrap();
        assert_eq!(decoded, name);
    }
}
