//! Builds an identified, typed node tree from a directory on disk.

use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use super::{CoreError, IgnorePolicy, Node, NodeIdAllocator};

/// A synchronous, depth-first directory walker.
///
/// Ids are taken from the shared allocator in pre-order over the sorted tree.
/// Builders that share an allocator never hand out the same id twice.
pub struct TreeBuilder<'a> {
    policy: &'a IgnorePolicy,
    ids: &'a NodeIdAllocator,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(policy: &'a IgnorePolicy, ids: &'a NodeIdAllocator) -> Self {
        Self { policy, ids }
    }

    /// Walks `root` and returns its node tree.
    ///
    /// Only a failure to list the root itself is returned as an error. Subdirectories
    /// that cannot be listed are left out of their parent's children.
    pub fn build(&self, root: &Path) -> Result<Node, CoreError> {
        let metadata = fs::metadata(root).map_err(|e| CoreError::Io(e, root.to_path_buf()))?;
        if !metadata.is_dir() {
            return Err(CoreError::NotADirectory(root.to_path_buf()));
        }

        let policy = self.policy;
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by(compare_entries)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_ignored(policy, entry));

        // Open folders along the current path; index == depth.
        let mut open: Vec<Node> = Vec::new();
        for item in walker {
            let entry = match item {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => return Err(walk_error(e, root)),
                Err(e) => {
                    tracing::warn!("Omitting folder that could not be listed: {}", e);
                    // A listing error follows its folder's own entry directly.
                    if open.len() > 1 && open.last().map(|f| f.file_path.as_path()) == e.path() {
                        open.pop();
                    }
                    continue;
                }
            };

            close_folders(&mut open, entry.depth());
            let is_folder = entry.depth() == 0 || entry.file_type().is_dir();
            let name = if entry.depth() == 0 {
                root.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| root.display().to_string())
            } else {
                entry.file_name().to_string_lossy().into_owned()
            };
            let id = self.ids.allocate();
            let path = entry.into_path();

            if is_folder {
                open.push(Node::folder(id, name, path, Vec::new()));
            } else if let Some(children) = open.last_mut().and_then(|f| f.children.as_mut()) {
                children.push(Node::file(id, name, path));
            }
        }

        close_folders(&mut open, 1);
        open.pop().ok_or_else(|| CoreError::NotADirectory(root.to_path_buf()))
    }
}

/// Attaches every open folder deeper than `depth` to its parent.
///
/// The root (index 0) always stays open.
fn close_folders(open: &mut Vec<Node>, depth: usize) {
    while open.len() > depth.max(1) {
        if let Some(done) = open.pop() {
            if let Some(children) = open.last_mut().and_then(|p| p.children.as_mut()) {
                children.push(done);
            }
        }
    }
}

// `file_type` does not follow symlinks, so links are treated as files.
fn is_ignored(policy: &IgnorePolicy, entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    let ignored = if entry.file_type().is_dir() {
        policy.ignores_folder(&name)
    } else {
        policy.ignores_file(&name)
    };
    if ignored {
        tracing::debug!("Excluding {:?}", entry.path());
    }
    ignored
}

/// Folders first, then case-insensitive by name.
fn compare_entries(a: &DirEntry, b: &DirEntry) -> Ordering {
    b.file_type()
        .is_dir()
        .cmp(&a.file_type().is_dir())
        .then_with(|| {
            compare_names(&a.file_name().to_string_lossy(), &b.file_name().to_string_lossy())
        })
}

/// Case-insensitive name order with a case-sensitive tie-break, so the order is total.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

fn walk_error(e: walkdir::Error, root: &Path) -> CoreError {
    let path = e.path().unwrap_or(root).to_path_buf();
    let source = e
        .into_io_error()
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "filesystem loop"));
    CoreError::Io(source, path)
}

/// Builds the tree for a single root folder.
pub fn build_tree(
    root: &Path,
    policy: &IgnorePolicy,
    ids: &NodeIdAllocator,
) -> Result<Node, CoreError> {
    TreeBuilder::new(policy, ids).build(root)
}

/// Builds one tree per root from the same allocator, so ids are unique across the forest.
///
/// Roots that fail are returned alongside their error instead of aborting the others.
pub fn build_forest(
    roots: &[PathBuf],
    policy: &IgnorePolicy,
    ids: &NodeIdAllocator,
) -> (Vec<Node>, Vec<(PathBuf, CoreError)>) {
    let builder = TreeBuilder::new(policy, ids);
    let mut forest = Vec::with_capacity(roots.len());
    let mut failures = Vec::new();
    for root in roots {
        match builder.build(root) {
            Ok(node) => forest.push(node),
            Err(e) => failures.push((root.clone(), e)),
        }
    }
    (forest, failures)
}
