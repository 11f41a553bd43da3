//! Task display names: plain text plus embedded metadata labels.

use serde::{Deserialize, Serialize};

use crate::label::{Label, LabelKind};

/// A task's display name: the plain-text portion and the labels attached to
/// it. At most one label of each kind is held at a time; registering a kind
/// that is already present replaces the prior label.
///
/// Equality is structural over the text and every label field.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaskName {
    text: String,
    labels: Vec<Label>,
}

impl TaskName {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            labels: Vec::new(),
        }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    /// Attach a label, replacing any existing label of the same kind.
    /// Labels are kept in canonical kind order.
    pub fn register(&mut self, label: Label) {
        self.labels.retain(|l| l.kind() != label.kind());
        self.labels.push(label);
        self.labels.sort_by_key(Label::kind);
    }

    /// Remove the label of the given kind, if present.
    pub fn remove(&mut self, kind: LabelKind) {
        self.labels.retain(|l| l.kind() != kind);
    }

    /// The label of the given kind, if attached.
    #[must_use]
    pub fn label(&self, kind: LabelKind) -> Option<&Label> {
        self.labels.iter().find(|l| l.kind() == kind)
    }

    /// The identity label's number, if an identity label is attached.
    #[must_use]
    pub fn identity_number(&self) -> Option<&str> {
        match self.label(LabelKind::Identity) {
            Some(Label::Identity { number, .. }) => Some(number.as_str()),
            _ => None,
        }
    }

    /// The parent-identity label's number, if attached.
    #[must_use]
    pub fn parent_number(&self) -> Option<&str> {
        match self.label(LabelKind::ParentIdentity) {
            Some(Label::ParentIdentity { number }) => Some(number.as_str()),
            _ => None,
        }
    }
}
