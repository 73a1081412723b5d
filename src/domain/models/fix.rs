//! Fix specification, fix result and shared-file change descriptor models.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-cluster diagnosis produced by the diagnosis oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixSpec {
    pub cluster: String,
    #[serde(default)]
    pub diagnosis: String,
    #[serde(default, rename = "diagnosis_confidence", alias = "confidence")]
    pub confidence: f64,
    /// Proposed fixes, passed through to the fix oracle untouched.
    #[serde(default)]
    pub fixes: Vec<serde_json::Value>,
    #[serde(default)]
    pub unfixable: bool,
    #[serde(default, rename = "needs_interrogation", alias = "needs_human")]
    pub needs_human: bool,
}

/// A fix the fix oracle reports as applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedFix {
    #[serde(default, alias = "path")]
    pub file: Option<String>,
    #[serde(default, alias = "summary")]
    pub description: String,
}

/// A proposed fix the fix oracle chose not to apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFix {
    #[serde(default, alias = "summary")]
    pub description: String,
    #[serde(default)]
    pub reason: String,
}

/// Closed set of additive edits to shared files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    AddImport,
    AddRoute,
    AddNavEntry,
    AddMethod,
    MountRouter,
    /// Free-form edit; only the merge oracle may apply it.
    #[serde(other)]
    Other,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddImport => "add_import",
            Self::AddRoute => "add_route",
            Self::AddNavEntry => "add_nav_entry",
            Self::AddMethod => "add_method",
            Self::MountRouter => "mount_router",
            Self::Other => "other",
        }
    }

    pub fn is_structured(&self) -> bool {
        !matches!(self, Self::Other)
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Edit a fix task needs in a shared file it may not write itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeDescriptor {
    #[serde(rename = "change_type", alias = "kind")]
    pub kind: ChangeKind,
    #[serde(alias = "file")]
    pub target_file: String,
    #[serde(alias = "code")]
    pub content: String,
    /// Text of the line after which the content goes.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "ordering_hint")]
    pub anchor: Option<String>,
    /// Identity of the thing being added (route path, method name, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl ChangeDescriptor {
    /// What two descriptors must share to compete for the same spot.
    ///
    /// Imports are keyed by their own text, so distinct imports never
    /// conflict and identical ones collapse.
    pub fn location_key(&self) -> String {
        match self.kind {
            ChangeKind::AddImport => self.content.trim().to_string(),
            _ => self
                .key
                .clone()
                .or_else(|| self.anchor.clone())
                .unwrap_or_default(),
        }
    }

    /// Amount of content added: (non-empty lines, trimmed bytes).
    pub fn size(&self) -> (usize, usize) {
        let trimmed = self.content.trim();
        let lines = trimmed.lines().filter(|l| !l.trim().is_empty()).count();
        (lines, trimmed.len())
    }
}

/// A change descriptor tagged with the cluster that asked for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedChange {
    pub origin_cluster: String,
    #[serde(flatten)]
    pub change: ChangeDescriptor,
}

/// Outcome of one fix task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixResult {
    #[serde(default)]
    pub cluster: String,
    #[serde(default)]
    pub fixes_applied: Vec<AppliedFix>,
    #[serde(default)]
    pub shared_file_changes_needed: Vec<ChangeDescriptor>,
    #[serde(default)]
    pub fixes_skipped: Vec<SkippedFix>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Set when the task failed, timed out or returned malformed output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FixResult {
    /// Zero-contribution result for a task that produced nothing usable.
    pub fn missing(cluster: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            error: Some(error.into()),
            ..Default::default()
        }
    }
}
