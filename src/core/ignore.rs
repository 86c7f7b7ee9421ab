//! Exact-name exclusion lists applied during a tree walk.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

/// Folder and file names excluded from trees and from watcher notifications.
///
/// Matching is by exact base-name equality, never by glob or path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IgnorePolicy {
    #[serde(default)]
    pub ignored_folders: Vec<String>,
    #[serde(default)]
    pub ignored_files: Vec<String>,
}

impl Default for IgnorePolicy {
    fn default() -> Self {
        Self {
            ignored_folders: vec!["node_modules".into(), ".git".into(), ".next".into()],
            ignored_files: vec![".DS_Store".into(), "Thumbs.db".into()],
        }
    }
}

impl IgnorePolicy {
    /// Builds a policy from comma-separated user input, as typed into the settings form.
    pub fn from_lists(folders: &str, files: &str) -> Self {
        Self {
            ignored_folders: parse_list(folders),
            ignored_files: parse_list(files),
        }
    }

    pub fn ignores_folder(&self, name: &str) -> bool {
        self.ignored_folders.iter().any(|f| f == name)
    }

    pub fn ignores_file(&self, name: &str) -> bool {
        self.ignored_files.iter().any(|f| f == name)
    }

    /// Returns `true` if `path` is under an ignored folder below `root`, or is an ignored file.
    ///
    /// Used to drop watcher notifications for entries the tree never shows.
    pub fn excludes_path(&self, root: &Path, path: &Path) -> bool {
        let relative = path.strip_prefix(root).unwrap_or(path);
        let components: Vec<&str> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(name) => name.to_str(),
                _ => None,
            })
            .collect();

        let Some((last, ancestors)) = components.split_last() else {
            return false;
        };
        if ancestors.iter().any(|name| self.ignores_folder(name)) {
            return true;
        }
        // The entry itself may be a folder or a file; it may no longer exist to tell.
        self.ignores_folder(last) || self.ignores_file(last)
    }
}

fn parse_list(input: &str) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    for item in input.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !items.iter().any(|existing| existing == item) {
            items.push(item.to_string());
        }
    }
    items
}
