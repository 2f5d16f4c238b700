//! The canonical unit of work handed through the delivery pipeline.

use serde::{Deserialize, Serialize};

/// A normalized change record extracted from one VCS event.
///
/// Optional fields follow the sparse-record policy: a field whose computed
/// value is empty is absent, not an empty placeholder. Downstream consumers
/// key off field presence, so serialization skips absent fields entirely and
/// deserialization restores exactly what was published.
///
/// `branch` is special: the Subversion extractor materializes an empty
/// string for paths that match no branch filter, and that empty string is a
/// present value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Identifier or path of the source repository.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,

    /// Branch the change belongs to, if classified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    /// Commit hash or numeric revision. Always non-empty.
    pub revision: String,

    /// Commit author, or the `"dummy"` placeholder for rewind records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// Commit message, or the `"rewind"` marker for rewind records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,

    /// File paths touched, in order, without duplicates or empty entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

impl ChangeRecord {
    /// Create a record for the given revision. All other fields start absent.
    pub fn new(revision: impl Into<String>) -> Self {
        ChangeRecord {
            revision: revision.into(),
            ..ChangeRecord::default()
        }
    }

    /// Replace the file list, dropping empty entries and duplicates while
    /// preserving first-seen order.
    pub fn set_files(&mut self, files: Vec<String>) {
        let mut seen = Vec::with_capacity(files.len());
        for file in files {
            if !file.is_empty() && !seen.contains(&file) {
                seen.push(file);
            }
        }
        self.files = seen;
    }
}

/// `Some(value)` when the string is non-empty, `None` otherwise.
///
/// The extractors use this to keep absent fields absent instead of storing
/// empty placeholders.
pub fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
