//! Original file contents, captured once before the first proposal.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{CommitSha, FileAction, FileOperation, FilePath};

/// Placeholder for a path that does not exist on the default branch.
pub const NEW_FILE_PLACEHOLDER: &str = "new file";
/// Placeholder for a path whose content could not be fetched.
pub const UNAVAILABLE_PLACEHOLDER: &str = "content unavailable";
/// Placeholder for the new side of a delete.
pub const DELETED_PLACEHOLDER: &str = "file deleted";

/// Why a snapshot entry has no content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbsentReason {
    /// The remote reported the path as not found.
    NewFile,
    /// The fetch failed, or the path is a directory or other non-file.
    Unavailable,
}

/// One path's state on the default branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum OriginalFile {
    /// The file exists.
    Present {
        /// Decoded content.
        content: String,
        /// Blob SHA.
        sha: Option<CommitSha>,
    },
    /// The file could not be read.
    Absent {
        /// Why.
        reason: AbsentReason,
    },
}

impl OriginalFile {
    /// The content, or the placeholder naming why it is missing.
    pub fn content_or_placeholder(&self) -> &str {
        match self {
            Self::Present { content, .. } => content,
            Self::Absent {
                reason: AbsentReason::NewFile,
            } => NEW_FILE_PLACEHOLDER,
            Self::Absent {
                reason: AbsentReason::Unavailable,
            } => UNAVAILABLE_PLACEHOLDER,
        }
    }
}

/// Path → original content. Never updated by later proposals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginalFileSnapshot(BTreeMap<FilePath, OriginalFile>);

impl OriginalFileSnapshot {
    /// An empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a path. Later inserts for the same path replace earlier ones;
    /// the snapshot is only built once per run.
    pub fn insert(&mut self, path: FilePath, file: OriginalFile) {
        self.0.insert(path, file);
    }

    /// Looks a path up.
    pub fn get(&self, path: &FilePath) -> Option<&OriginalFile> {
        self.0.get(path)
    }

    /// Content for prompts and explanations; unknown paths count as unavailable.
    pub fn original_text(&self, path: &FilePath) -> &str {
        self.get(path)
            .map_or(UNAVAILABLE_PLACEHOLDER, OriginalFile::content_or_placeholder)
    }

    /// The old side of `op` for change explanations. A modify on a path that
    /// was never fetched is a file the proposer introduced, so it reads as
    /// new; other unknown paths read as unavailable.
    pub fn original_for(&self, op: &FileOperation) -> &str {
        match self.get(&op.file_path) {
            Some(file) => file.content_or_placeholder(),
            None if matches!(op.action, FileAction::Modify { .. }) => NEW_FILE_PLACEHOLDER,
            None => UNAVAILABLE_PLACEHOLDER,
        }
    }

    /// Number of recorded paths.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` if no path was recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&FilePath, &OriginalFile)> {
        self.0.iter()
    }
}

/// The new side of an operation for change explanations.
pub fn proposed_text(op: &FileOperation) -> &str {
    op.code().unwrap_or(DELETED_PLACEHOLDER)
}
