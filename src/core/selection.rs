//! Maps checked tree nodes to their file content.
//!
//! A [`SelectionResult`] is rebuilt in full whenever the set of checked ids
//! changes, and patched entry by entry when the watcher reports changes to
//! files that are still selected.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::{find_node_by_id, FileHandler, Node, NodeId, NodeKind};

/// One checked file and its text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionEntry {
    pub file_path: PathBuf,
    pub content: String,
}

/// The ordered content of all currently checked files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectionResult {
    entries: Vec<SelectionEntry>,
}

/// Resolves checked ids to file paths, in the order the ids were supplied.
///
/// Unknown ids (from an older tree) and folder nodes are skipped. A repeated id
/// resolves once, at its first position.
pub fn selected_file_paths(forest: &[Node], selected: &[NodeId]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    selected
        .iter()
        .filter(|id| seen.insert(**id))
        .filter_map(|id| find_node_by_id(forest, *id))
        .filter(|node| node.kind == NodeKind::File)
        .map(|node| node.file_path.clone())
        .collect()
}

impl SelectionResult {
    /// Reads every path in order, omitting files that cannot be read.
    pub async fn fetch(paths: Vec<PathBuf>) -> Self {
        let mut entries = Vec::with_capacity(paths.len());
        for file_path in paths {
            if let Some(content) = FileHandler::read_or_log(&file_path).await {
                entries.push(SelectionEntry { file_path, content });
            }
        }
        Self { entries }
    }

    /// Builds the result for a full set of checked ids against `forest`.
    pub async fn resolve(forest: &[Node], selected: &[NodeId]) -> Self {
        Self::fetch(selected_file_paths(forest, selected)).await
    }

    pub fn entries(&self) -> &[SelectionEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.iter().any(|e| e.file_path == path)
    }

    /// Replaces the content of the entry for `path` in place.
    ///
    /// Returns `false` if `path` is not selected.
    pub fn replace_content(&mut self, path: &Path, content: String) -> bool {
        match self.entries.iter_mut().find(|e| e.file_path == path) {
            Some(entry) => {
                entry.content = content;
                true
            }
            None => false,
        }
    }

    /// Drops the entry for `path`. Returns `false` if it was not selected.
    pub fn remove(&mut self, path: &Path) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.file_path != path);
        self.entries.len() != before
    }

    /// Renders the entries as fenced blocks headed by their path, optionally
    /// followed by a directory outline.
    pub fn to_markdown(&self, outline: Option<&str>) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&format!("```{}\n", entry.file_path.display()));
            out.push_str(&entry.content);
            if !entry.content.ends_with('\n') {
                out.push('\n');
            }
            out.push_str("```\n\n");
        }
        if let Some(outline) = outline {
            out.push_str("# DIRECTORY TREE\n```\n");
            out.push_str(outline);
            if !outline.ends_with('\n') {
                out.push('\n');
            }
            out.push_str("```\n");
        }
        out
    }
}
