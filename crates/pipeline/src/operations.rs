//! Proposed file-level operations and the working set the review loop revises.

use serde::{Deserialize, Serialize};

use crate::FilePath;

/// What a proposal wants done to one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FileAction {
    /// Create the file, or replace its full content.
    Modify {
        /// Complete new file content, trimmed of surrounding whitespace.
        code: String,
    },
    /// Remove the file.
    Delete,
    /// The proposer looked at the file and decided to leave it alone.
    NoChange,
}

impl FileAction {
    /// Short tag used in logs and rendered summaries.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Modify { .. } => "modify",
            Self::Delete => "delete",
            Self::NoChange => "no_change",
        }
    }
}

/// A single proposed change to one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOperation {
    /// Target path. Not unique across revisions: a newer proposal replaces
    /// the whole working set.
    pub file_path: FilePath,
    /// What to do with the file.
    #[serde(flatten)]
    pub action: FileAction,
}

impl FileOperation {
    /// A create/replace operation.
    pub fn modify(file_path: FilePath, code: impl Into<String>) -> Self {
        Self {
            file_path,
            action: FileAction::Modify { code: code.into() },
        }
    }

    /// A delete operation.
    pub fn delete(file_path: FilePath) -> Self {
        Self {
            file_path,
            action: FileAction::Delete,
        }
    }

    /// A no-change marker.
    pub fn no_change(file_path: FilePath) -> Self {
        Self {
            file_path,
            action: FileAction::NoChange,
        }
    }

    /// The new content, for modify operations.
    pub fn code(&self) -> Option<&str> {
        match &self.action {
            FileAction::Modify { code } => Some(code),
            FileAction::Delete | FileAction::NoChange => None,
        }
    }

    /// `true` for modify and delete operations.
    pub fn is_change(&self) -> bool {
        !matches!(self.action, FileAction::NoChange)
    }
}

// ---------------------------------------------------------------------------

/// An ordered sequence of operations, in the order the proposer wrote them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSet(Vec<FileOperation>);

impl OperationSet {
    /// Wraps an ordered operation list.
    pub fn new(operations: Vec<FileOperation>) -> Self {
        Self(operations)
    }

    /// `true` when nothing at all was parsed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of operations, including no-change markers.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates in proposal order.
    pub fn iter(&self) -> std::slice::Iter<'_, FileOperation> {
        self.0.iter()
    }

    /// `true` if at least one modify or delete operation is present.
    pub fn has_changes(&self) -> bool {
        self.0.iter().any(FileOperation::is_change)
    }

    /// The set with no-change markers removed, preserving order.
    pub fn committable(&self) -> OperationSet {
        Self(self.0.iter().filter(|op| op.is_change()).cloned().collect())
    }

    /// Renders the set as markdown for reviewer and reviser prompts.
    pub fn render_markdown(&self) -> String {
        if self.0.is_empty() {
            return "(no operations)".to_string();
        }
        let mut out = String::new();
        for op in &self.0 {
            match &op.action {
                FileAction::Modify { code } => {
                    out.push_str(&format!("Changes for `{}`:\n```\n{}\n```\n\n", op.file_path, code));
                }
                FileAction::Delete => {
                    out.push_str(&format!("Delete file `{}`\n\n", op.file_path));
                }
                FileAction::NoChange => {
                    out.push_str(&format!("No changes needed for `{}`.\n\n", op.file_path));
                }
            }
        }
        out.trim_end().to_string()
    }
}

impl IntoIterator for OperationSet {
    type Item = FileOperation;
    type IntoIter = std::vec::IntoIter<FileOperation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a OperationSet {
    type Item = &'a FileOperation;
    type IntoIter = std::slice::Iter<'a, FileOperation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<FileOperation> for OperationSet {
    fn from_iter<I: IntoIterator<Item = FileOperation>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
