//! Defines the central, mutable state of the application.

use crate::config::{AppConfig, Storage};
use crate::core::{
    find_node_by_id, find_node_by_path, FolderWatcher, Node, NodeId, NodeIdAllocator,
    SelectionResult,
};
use std::path::PathBuf;

/// Holds the complete, mutable state of the application.
///
/// This struct is wrapped in an `Arc<Mutex<...>>` to allow for safe, shared access
/// from different threads (e.g., the main event loop, IPC handlers, and async tasks).
pub struct AppState {
    /// Where every persisted document lives.
    pub storage: Storage,
    /// The application's configuration settings.
    pub config: AppConfig,
    /// The root folders currently shown in the tree.
    pub roots: Vec<PathBuf>,
    /// The workspace the roots were loaded from, if any.
    pub active_workspace: Option<String>,
    /// The most recent tree snapshot, one node per root that could be read.
    pub forest: Vec<Node>,
    /// Source of node ids for every build, so ids are never reused while the app runs.
    pub node_ids: NodeIdAllocator,
    /// Bumped for every tree build; results carrying an older value are dropped.
    pub tree_generation: u64,
    /// `true` while a tree build is in flight.
    pub is_building: bool,
    /// The checked node ids in the order the user checked them.
    pub checked_ids: Vec<NodeId>,
    /// The fetched content of the checked files.
    pub selection: SelectionResult,
    /// Bumped for every selection change, same scheme as `tree_generation`.
    pub selection_generation: u64,
    /// The live filesystem subscription for `roots`.
    pub watcher: Option<FolderWatcher>,
    pub status_message: String,
}

impl AppState {
    /// Creates the state, loading the configuration from `storage`.
    pub fn new(storage: Storage) -> Self {
        let config = AppConfig::load(&storage).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            AppConfig::default()
        });
        Self {
            storage,
            config,
            roots: Vec::new(),
            active_workspace: None,
            forest: Vec::new(),
            node_ids: NodeIdAllocator::new(),
            tree_generation: 0,
            is_building: false,
            checked_ids: Vec::new(),
            selection: SelectionResult::default(),
            selection_generation: 0,
            watcher: None,
            status_message: "Ready.".to_string(),
        }
    }

    /// Drops the current watcher, releasing its subscriptions.
    pub fn release_watcher(&mut self) {
        if self.watcher.take().is_some() {
            tracing::debug!("Watcher released.");
        }
    }

    /// Resets all state related to the loaded folders.
    ///
    /// Both generations are bumped so that any build or fetch still in flight
    /// is discarded when it completes.
    pub fn reset_view_state(&mut self) {
        self.release_watcher();
        self.roots.clear();
        self.active_workspace = None;
        self.forest.clear();
        self.checked_ids.clear();
        self.selection = SelectionResult::default();
        self.is_building = false;
        self.tree_generation += 1;
        self.selection_generation += 1;
        self.status_message = "Ready.".to_string();
    }

    /// Marks a new tree build as started and returns its generation.
    pub fn begin_build(&mut self) -> u64 {
        self.tree_generation += 1;
        self.is_building = true;
        self.status_message = "Building tree...".to_string();
        self.tree_generation
    }

    pub fn next_selection_generation(&mut self) -> u64 {
        self.selection_generation += 1;
        self.selection_generation
    }

    /// Installs a freshly built forest, carrying the checked ids over by path.
    ///
    /// A rebuild gives every node a fresh id, so every checked id is resolved
    /// to a path in the old forest and looked up again in the new one.
    /// Checked nodes that no longer exist are dropped.
    pub fn replace_forest(&mut self, forest: Vec<Node>) {
        let checked_paths: Vec<PathBuf> = self
            .checked_ids
            .iter()
            .filter_map(|id| find_node_by_id(&self.forest, *id))
            .map(|node| node.file_path.clone())
            .collect();
        self.checked_ids = checked_paths
            .iter()
            .filter_map(|path| find_node_by_path(&forest, path))
            .map(|node| node.id)
            .collect();
        self.forest = forest;
    }

    /// Counts the file nodes of the current forest.
    pub fn file_count(&self) -> usize {
        self.forest.iter().map(|tree| tree.file_nodes().len()).sum()
    }
}
