//! Filesystem-change subscription for the folders shown in the tree.

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::{CoreError, IgnorePolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Modified,
    Added,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub kind: ChangeKind,
    pub path: PathBuf,
}

impl FileChange {
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    pub fn is_structural(&self) -> bool {
        self.kind != ChangeKind::Modified
    }
}

/// A live, recursive subscription on one or more root folders.
///
/// Dropping the watcher releases every underlying subscription.
pub struct FolderWatcher {
    _watcher: RecommendedWatcher,
    roots: Vec<PathBuf>,
}

impl FolderWatcher {
    /// Starts watching `roots`, calling `on_change` from the watcher's thread for
    /// every classified change.
    pub fn subscribe<F>(roots: &[PathBuf], on_change: F) -> Result<Self, CoreError>
    where
        F: Fn(FileChange) + Send + 'static,
    {
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for change in classify(&event) {
                    on_change(change);
                }
            }
            Err(e) => tracing::warn!("Watch error: {}", e),
        })?;

        for root in roots {
            watcher.watch(root, RecursiveMode::Recursive)?;
        }
        tracing::info!("Watching {:?}", roots);

        Ok(Self {
            _watcher: watcher,
            roots: roots.to_vec(),
        })
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

impl Drop for FolderWatcher {
    fn drop(&mut self) {
        tracing::info!("Releasing watcher for {:?}", self.roots);
    }
}

/// Maps a raw notify event to the changes the tree cares about.
pub fn classify(event: &Event) -> Vec<FileChange> {
    let kind = match event.kind {
        EventKind::Create(_) => ChangeKind::Added,
        EventKind::Remove(_) => ChangeKind::Removed,
        EventKind::Modify(ModifyKind::Name(mode)) => {
            return classify_rename(mode, &event.paths);
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => return Vec::new(),
        EventKind::Modify(_) => ChangeKind::Modified,
        _ => return Vec::new(),
    };
    event
        .paths
        .iter()
        .map(|p| FileChange::new(kind, p.clone()))
        .collect()
}

fn classify_rename(mode: RenameMode, paths: &[PathBuf]) -> Vec<FileChange> {
    match (mode, paths) {
        (RenameMode::Both, [from, to, ..]) => vec![
            FileChange::new(ChangeKind::Removed, from.clone()),
            FileChange::new(ChangeKind::Added, to.clone()),
        ],
        (RenameMode::From, _) => paths
            .iter()
            .map(|p| FileChange::new(ChangeKind::Removed, p.clone()))
            .collect(),
        (RenameMode::To, _) => paths
            .iter()
            .map(|p| FileChange::new(ChangeKind::Added, p.clone()))
            .collect(),
        // The backend could not tell which side this is; the path's existence can.
        _ => paths
            .iter()
            .map(|p| {
                let kind = if p.exists() {
                    ChangeKind::Added
                } else {
                    ChangeKind::Removed
                };
                FileChange::new(kind, p.clone())
            })
            .collect(),
    }
}

/// A set of changes collapsed into the actions they require.
///
/// Later changes to a path override earlier ones, so a save that removes and
/// recreates a file ends up as a content refresh rather than a removal.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    /// The changes that survived the relevance filter, in arrival order.
    pub changes: Vec<FileChange>,
    /// Paths whose content should be re-read if they are selected.
    pub refreshed: Vec<PathBuf>,
    /// Paths whose selection entry should be dropped.
    pub removed: Vec<PathBuf>,
    /// `true` if any added or removed path requires a tree rebuild.
    pub needs_rebuild: bool,
}

impl ChangeBatch {
    /// Collapses `changes`, dropping paths the ignore policy hides under `roots`.
    pub fn collect(changes: &[FileChange], policy: &IgnorePolicy, roots: &[PathBuf]) -> Self {
        let mut batch = Self::default();
        for change in changes {
            if !is_relevant(&change.path, policy, roots) {
                continue;
            }
            batch.changes.push(change.clone());
            batch.needs_rebuild |= change.is_structural();
            let path = &change.path;
            match change.kind {
                ChangeKind::Modified => {
                    if !batch.removed.contains(path) && !batch.refreshed.contains(path) {
                        batch.refreshed.push(path.clone());
                    }
                }
                ChangeKind::Added => {
                    batch.removed.retain(|p| p != path);
                    if !batch.refreshed.contains(path) {
                        batch.refreshed.push(path.clone());
                    }
                }
                ChangeKind::Removed => {
                    batch.refreshed.retain(|p| p != path);
                    if !batch.removed.contains(path) {
                        batch.removed.push(path.clone());
                    }
                }
            }
        }
        batch
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

fn is_relevant(path: &Path, policy: &IgnorePolicy, roots: &[PathBuf]) -> bool {
    match roots.iter().find(|root| path.starts_with(root)) {
        Some(root) => !policy.excludes_path(root, path),
        None => false,
    }
}
