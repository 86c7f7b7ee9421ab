//! The directory-tree subsystem: node model, tree building, ignore policy,
//! content aggregation and filesystem watching.

pub mod error;
pub mod file_handler;
pub mod ignore;
pub mod selection;
pub mod tree_builder;
pub mod tree_generator;
pub mod watcher;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identifier of a node in a tree snapshot.
///
/// Ids are drawn from a [`NodeIdAllocator`], so an id handed out by one build
/// never names a node of a later build that shares the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct NodeId(u64);

impl NodeId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }
}

/// Shared, monotonically increasing source of [`NodeId`]s.
///
/// Clones hand out ids from the same counter.
#[derive(Debug, Clone, Default)]
pub struct NodeIdAllocator(Arc<AtomicU64>);

impl NodeIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&self) -> NodeId {
        NodeId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for NodeId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value
            .strip_prefix("node-")
            .and_then(|n| n.parse::<u64>().ok())
            .map(NodeId)
            .ok_or_else(|| format!("invalid node id: {value}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Folder,
    File,
}

/// One filesystem entry in a directory-tree snapshot.
///
/// File nodes never have children; folder nodes always carry a (possibly empty)
/// list, ordered folders first and then files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub file_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Node>>,
}

impl Node {
    pub fn folder(id: NodeId, name: String, file_path: PathBuf, children: Vec<Node>) -> Self {
        Self {
            id,
            name,
            kind: NodeKind::Folder,
            file_path,
            children: Some(children),
        }
    }

    pub fn file(id: NodeId, name: String, file_path: PathBuf) -> Self {
        Self {
            id,
            name,
            kind: NodeKind::File,
            file_path,
            children: None,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }

    pub fn children(&self) -> &[Node] {
        self.children.as_deref().unwrap_or(&[])
    }

    /// Depth-first search for the node carrying `id`.
    pub fn find_by_id(&self, id: NodeId) -> Option<&Node> {
        if self.id == id {
            return Some(self);
        }
        self.children().iter().find_map(|child| child.find_by_id(id))
    }

    /// Depth-first search for the node at `path`.
    pub fn find_by_path(&self, path: &Path) -> Option<&Node> {
        if self.file_path == path {
            return Some(self);
        }
        if !path.starts_with(&self.file_path) {
            return None;
        }
        self.children()
            .iter()
            .find_map(|child| child.find_by_path(path))
    }

    /// All file nodes below (and including) this node, in tree order.
    pub fn file_nodes(&self) -> Vec<&Node> {
        let mut files = Vec::new();
        self.collect_files(&mut files);
        files
    }

    fn collect_files<'a>(&'a self, files: &mut Vec<&'a Node>) {
        match self.kind {
            NodeKind::File => files.push(self),
            NodeKind::Folder => {
                for child in self.children() {
                    child.collect_files(files);
                }
            }
        }
    }
}

/// Looks up a node by id across a forest of root nodes.
pub fn find_node_by_id(forest: &[Node], id: NodeId) -> Option<&Node> {
    forest.iter().find_map(|root| root.find_by_id(id))
}

/// Looks up a node by absolute path across a forest of root nodes.
pub fn find_node_by_path<'a>(forest: &'a [Node], path: &Path) -> Option<&'a Node> {
    forest.iter().find_map(|root| root.find_by_path(path))
}

pub use error::CoreError;
pub use file_handler::FileHandler;
pub use ignore::IgnorePolicy;
pub use selection::{SelectionEntry, SelectionResult};
pub use tree_builder::{build_forest, build_tree, TreeBuilder};
pub use tree_generator::TreeGenerator;
pub use watcher::{ChangeKind, FileChange, FolderWatcher};
