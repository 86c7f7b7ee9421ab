// src/app/commands.rs
//! Contains all the command handlers that are callable from the frontend via IPC.
//!
//! Each function in this module corresponds to a specific `IpcMessage::command`.
//! These handlers are responsible for interacting with the `AppState`, the stores
//! in `config` and the `core` logic, and for sending `UserEvent`s back to the UI.

use super::events::UserEvent;
use super::helpers::{lock_state, report_error, with_state_and_notify};
use super::proxy::EventProxy;
use super::state::AppState;
use super::tasks::{
    apply_selection_change, canonical_roots, open_roots, rebuild_tree, start_watching,
};
use super::view_model::generate_ui_state;
use crate::app::file_dialog::DialogService;
use crate::config::folders;
use crate::config::ignore_store;
use crate::config::workspaces::WorkspaceStore;
use crate::core::{FileHandler, IgnorePolicy, NodeId, TreeGenerator};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct WorkspaceNamePayload {
    workspace_id: String,
    name: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct WorkspaceFolderPayload {
    workspace_id: String,
    folder_path: PathBuf,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct VisibilityPayload {
    workspace_id: String,
    visible: bool,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SaveCheckpointPayload {
    workspace_id: String,
    name: String,
    /// Falls back to the currently checked ids when absent.
    #[serde(default)]
    ids: Option<Vec<NodeId>>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct MarkdownPayload {
    #[serde(default)]
    include_tree: bool,
}

/// The settings form sends comma-separated text; other callers send lists.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum IgnorePolicyPayload {
    Lists(IgnorePolicy),
    #[serde(rename_all = "camelCase")]
    Text {
        ignored_folders: String,
        ignored_files: String,
    },
}

impl From<IgnorePolicyPayload> for IgnorePolicy {
    fn from(payload: IgnorePolicyPayload) -> Self {
        match payload {
            IgnorePolicyPayload::Lists(policy) => policy,
            IgnorePolicyPayload::Text {
                ignored_folders,
                ignored_files,
            } => IgnorePolicy::from_lists(&ignored_folders, &ignored_files),
        }
    }
}

fn parse_payload<T: DeserializeOwned>(command: &str, payload: serde_json::Value) -> Option<T> {
    match serde_json::from_value::<T>(payload.clone()) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(
                "Failed to deserialize payload for '{}': {} ({:?})",
                command,
                e,
                payload
            );
            None
        }
    }
}

// =========================================================================================
// Session and tree
// =========================================================================================

/// Handles the initial request for state from the frontend when it loads.
///
/// Sends everything the UI needs to render, then reopens the last folder if the
/// configuration asks for it and nothing is loaded yet.
pub async fn initialize<P: EventProxy>(proxy: P, state: Arc<Mutex<AppState>>) {
    let restore = {
        let s = lock_state(&state);
        proxy.send_event(UserEvent::StateUpdate(Box::new(generate_ui_state(&s))));
        proxy.send_event(UserEvent::IgnorePolicy(ignore_store::load_ignore_policy(
            &s.storage,
        )));
        proxy.send_event(UserEvent::RecentFolders(folders::recent_folders(&s.storage)));
        proxy.send_event(UserEvent::Workspaces(
            WorkspaceStore::new(&s.storage).list_workspaces(),
        ));
        let last = folders::last_opened_folder(&s.storage);
        proxy.send_event(UserEvent::LastOpenedFolder(last.clone()));

        last.filter(|p| s.config.restore_last_folder && s.roots.is_empty() && p.is_dir())
    };

    if let Some(folder) = restore {
        tracing::info!("Restoring last opened folder {:?}", folder);
        open_roots(vec![folder], None, proxy, state).await;
    }
}

/// Opens a dialog for the user to select a folder, then opens it in the background.
///
/// The dialog runs on the calling thread. Dismissing it is reported as
/// `FolderSelectionCancelled` and leaves the state untouched; in that case no
/// task is spawned.
pub fn select_folder<P: EventProxy, D: DialogService + ?Sized>(
    dialog: &D,
    proxy: P,
    state: Arc<Mutex<AppState>>,
) -> Option<JoinHandle<()>> {
    match dialog.pick_directory() {
        Some(path) => Some(tokio::spawn(open_folder(path, proxy, state))),
        None => {
            tracing::info!("User cancelled folder selection.");
            proxy.send_event(UserEvent::FolderSelectionCancelled);
            None
        }
    }
}

/// Opens a single root folder and records it as the last opened and most recent folder.
pub async fn open_folder<P: EventProxy>(path: PathBuf, proxy: P, state: Arc<Mutex<AppState>>) {
    if !path.is_dir() {
        report_error(
            &proxy,
            "Cannot open folder",
            format!("{} is not a directory", path.display()),
        );
        return;
    }

    {
        let s = lock_state(&state);
        if let Err(e) = folders::save_last_opened_folder(&s.storage, &path) {
            tracing::warn!("Failed to save last opened folder: {:#}", e);
        }
        match folders::add_recent_folder(&s.storage, &path) {
            Ok(recent) => proxy.send_event(UserEvent::RecentFolders(recent)),
            Err(e) => tracing::warn!("Failed to update recent folders: {:#}", e),
        }
    }

    open_roots(vec![path], None, proxy, state).await;
}

/// Loads every folder of a workspace as the roots of the tree.
pub async fn open_workspace<P: EventProxy>(
    workspace_id: String,
    proxy: P,
    state: Arc<Mutex<AppState>>,
) {
    let workspace = {
        let s = lock_state(&state);
        WorkspaceStore::new(&s.storage).get_workspace(&workspace_id)
    };
    match workspace {
        Ok(workspace) => {
            open_roots(workspace.folders, Some(workspace.id), proxy, state).await;
        }
        Err(e) => report_error(&proxy, "Failed to open workspace", format!("{e:#}")),
    }
}

/// Clears the loaded folders and releases the watcher.
pub fn close_folder<P: EventProxy>(proxy: P, state: Arc<Mutex<AppState>>) {
    with_state_and_notify(&state, &proxy, |s| {
        tracing::info!("Closing {:?}", s.roots);
        s.reset_view_state();
    });
}

/// Rebuilds the tree for the current roots, keeping the checked files.
pub async fn rescan<P: EventProxy>(proxy: P, state: Arc<Mutex<AppState>>) {
    if lock_state(&state).roots.is_empty() {
        return;
    }
    rebuild_tree(proxy, state).await;
}

/// Replaces the checked ids with the list sent by the tree view.
pub async fn selection_changed<P: EventProxy>(
    payload: serde_json::Value,
    proxy: P,
    state: Arc<Mutex<AppState>>,
) {
    if let Some(ids) = parse_payload::<Vec<NodeId>>("selectionChanged", payload) {
        apply_selection_change(ids, proxy, state).await;
    }
}

/// Reads a single file. A failed read is logged and answered with `null` content.
pub async fn read_file_content<P: EventProxy>(payload: serde_json::Value, proxy: P) {
    if let Some(path) = parse_payload::<PathBuf>("readFileContent", payload) {
        let content = FileHandler::read_or_log(&path).await;
        proxy.send_event(UserEvent::FileContent { path, content });
    }
}

/// Renders the current selection as markdown, optionally followed by the directory outline.
pub fn build_markdown<P: EventProxy>(
    payload: serde_json::Value,
    proxy: P,
    state: Arc<Mutex<AppState>>,
) {
    let include_tree = parse_payload::<MarkdownPayload>("buildMarkdown", payload)
        .map(|p| p.include_tree)
        .unwrap_or(false);
    let s = lock_state(&state);
    let outline = include_tree.then(|| TreeGenerator::generate_forest(&s.forest));
    proxy.send_event(UserEvent::MarkdownReady(
        s.selection.to_markdown(outline.as_deref()),
    ));
}

// =========================================================================================
// Ignore policy
// =========================================================================================

pub fn get_ignore_policy<P: EventProxy>(proxy: P, state: Arc<Mutex<AppState>>) {
    let policy = ignore_store::load_ignore_policy(&lock_state(&state).storage);
    proxy.send_event(UserEvent::IgnorePolicy(policy));
}

/// Persists a new ignore policy and rebuilds the tree with it.
pub async fn save_ignore_policy<P: EventProxy>(
    payload: serde_json::Value,
    proxy: P,
    state: Arc<Mutex<AppState>>,
) {
    let Some(policy) = parse_payload::<IgnorePolicyPayload>("saveIgnorePolicy", payload)
        .map(IgnorePolicy::from)
    else {
        return;
    };

    let has_roots = {
        let s = lock_state(&state);
        if let Err(e) = ignore_store::save_ignore_policy(&s.storage, &policy) {
            report_error(&proxy, "Failed to save ignore settings", format!("{e:#}"));
            return;
        }
        !s.roots.is_empty()
    };
    proxy.send_event(UserEvent::IgnorePolicy(policy));

    if has_roots {
        rebuild_tree(proxy, state).await;
    }
}

pub async fn reset_ignore_policy<P: EventProxy>(proxy: P, state: Arc<Mutex<AppState>>) {
    let (result, has_roots) = {
        let s = lock_state(&state);
        (
            ignore_store::reset_ignore_policy(&s.storage),
            !s.roots.is_empty(),
        )
    };
    match result {
        Ok(policy) => {
            proxy.send_event(UserEvent::IgnorePolicy(policy));
            if has_roots {
                rebuild_tree(proxy, state).await;
            }
        }
        Err(e) => report_error(&proxy, "Failed to reset ignore settings", format!("{e:#}")),
    }
}

// =========================================================================================
// Folder history
// =========================================================================================

pub fn get_last_opened_folder<P: EventProxy>(proxy: P, state: Arc<Mutex<AppState>>) {
    let folder = folders::last_opened_folder(&lock_state(&state).storage);
    proxy.send_event(UserEvent::LastOpenedFolder(folder));
}

pub fn save_last_opened_folder<P: EventProxy>(
    payload: serde_json::Value,
    proxy: P,
    state: Arc<Mutex<AppState>>,
) {
    let Some(folder) = parse_payload::<PathBuf>("saveLastOpenedFolder", payload) else {
        return;
    };
    let s = lock_state(&state);
    match folders::save_last_opened_folder(&s.storage, &folder) {
        Ok(()) => proxy.send_event(UserEvent::LastOpenedFolder(Some(folder))),
        Err(e) => report_error(&proxy, "Failed to save last opened folder", format!("{e:#}")),
    }
}

pub fn clear_last_opened_folder<P: EventProxy>(proxy: P, state: Arc<Mutex<AppState>>) {
    let s = lock_state(&state);
    match folders::clear_last_opened_folder(&s.storage) {
        Ok(()) => proxy.send_event(UserEvent::LastOpenedFolder(None)),
        Err(e) => report_error(&proxy, "Failed to clear last opened folder", format!("{e:#}")),
    }
}

pub fn get_recent_folders<P: EventProxy>(proxy: P, state: Arc<Mutex<AppState>>) {
    let recent = folders::recent_folders(&lock_state(&state).storage);
    proxy.send_event(UserEvent::RecentFolders(recent));
}

pub fn add_recent_folder<P: EventProxy>(
    payload: serde_json::Value,
    proxy: P,
    state: Arc<Mutex<AppState>>,
) {
    let Some(folder) = parse_payload::<PathBuf>("addRecentFolder", payload) else {
        return;
    };
    let s = lock_state(&state);
    match folders::add_recent_folder(&s.storage, &folder) {
        Ok(recent) => proxy.send_event(UserEvent::RecentFolders(recent)),
        Err(e) => report_error(&proxy, "Failed to update recent folders", format!("{e:#}")),
    }
}

// =========================================================================================
// Workspaces and checkpoints
// =========================================================================================

fn send_workspaces<P: EventProxy>(proxy: &P, state: &AppState) {
    proxy.send_event(UserEvent::Workspaces(
        WorkspaceStore::new(&state.storage).list_workspaces(),
    ));
}

pub fn list_workspaces<P: EventProxy>(proxy: P, state: Arc<Mutex<AppState>>) {
    send_workspaces(&proxy, &lock_state(&state));
}

pub fn create_workspace<P: EventProxy>(
    payload: serde_json::Value,
    proxy: P,
    state: Arc<Mutex<AppState>>,
) {
    #[derive(Deserialize)]
    struct CreatePayload {
        name: String,
    }
    let Some(CreatePayload { name }) = parse_payload("createWorkspace", payload) else {
        return;
    };
    let s = lock_state(&state);
    match WorkspaceStore::new(&s.storage).create_workspace(&name) {
        Ok(_) => send_workspaces(&proxy, &s),
        Err(e) => report_error(&proxy, "Failed to create workspace", format!("{e:#}")),
    }
}

pub fn rename_workspace<P: EventProxy>(
    payload: serde_json::Value,
    proxy: P,
    state: Arc<Mutex<AppState>>,
) {
    let Some(p) = parse_payload::<WorkspaceNamePayload>("renameWorkspace", payload) else {
        return;
    };
    let s = lock_state(&state);
    match WorkspaceStore::new(&s.storage).rename_workspace(&p.workspace_id, &p.name) {
        Ok(_) => send_workspaces(&proxy, &s),
        Err(e) => report_error(&proxy, "Failed to rename workspace", format!("{e:#}")),
    }
}

/// Deletes a workspace; if it is the one currently loaded, the tree is closed too.
pub fn delete_workspace<P: EventProxy>(
    payload: serde_json::Value,
    proxy: P,
    state: Arc<Mutex<AppState>>,
) {
    let Some(workspace_id) = parse_payload::<String>("deleteWorkspace", payload) else {
        return;
    };
    let mut s = lock_state(&state);
    if let Err(e) = WorkspaceStore::new(&s.storage).delete_workspace(&workspace_id) {
        report_error(&proxy, "Failed to delete workspace", format!("{e:#}"));
        return;
    }
    send_workspaces(&proxy, &s);
    if s.active_workspace.as_deref() == Some(workspace_id.as_str()) {
        s.reset_view_state();
        proxy.send_event(UserEvent::StateUpdate(Box::new(generate_ui_state(&s))));
    }
}

pub async fn add_folder_to_workspace<P: EventProxy>(
    payload: serde_json::Value,
    proxy: P,
    state: Arc<Mutex<AppState>>,
) {
    let Some(p) = parse_payload::<WorkspaceFolderPayload>("addFolderToWorkspace", payload) else {
        return;
    };
    let result = {
        let s = lock_state(&state);
        WorkspaceStore::new(&s.storage).add_folder(&p.workspace_id, &p.folder_path)
    };
    workspace_folders_changed(result, proxy, state).await;
}

pub async fn remove_folder_from_workspace<P: EventProxy>(
    payload: serde_json::Value,
    proxy: P,
    state: Arc<Mutex<AppState>>,
) {
    let Some(p) = parse_payload::<WorkspaceFolderPayload>("removeFolderFromWorkspace", payload)
    else {
        return;
    };
    let result = {
        let s = lock_state(&state);
        WorkspaceStore::new(&s.storage).remove_folder(&p.workspace_id, &p.folder_path)
    };
    workspace_folders_changed(result, proxy, state).await;
}

/// Reports the new folder list and, for the loaded workspace, rewatches and rebuilds
/// so that checked files under the remaining roots stay checked.
async fn workspace_folders_changed<P: EventProxy>(
    result: anyhow::Result<crate::config::workspaces::Workspace>,
    proxy: P,
    state: Arc<Mutex<AppState>>,
) {
    let workspace = match result {
        Ok(workspace) => workspace,
        Err(e) => {
            report_error(&proxy, "Failed to update workspace folders", format!("{e:#}"));
            return;
        }
    };
    proxy.send_event(UserEvent::WorkspaceFolders {
        workspace_id: workspace.id.clone(),
        folders: workspace.folders.clone(),
    });

    let roots = canonical_roots(workspace.folders);
    let is_active = {
        let mut s = lock_state(&state);
        send_workspaces(&proxy, &s);
        let is_active = s.active_workspace.as_deref() == Some(workspace.id.as_str());
        if is_active && s.roots != roots {
            s.roots = roots;
            true
        } else {
            false
        }
    };
    if is_active {
        start_watching(proxy.clone(), state.clone());
        rebuild_tree(proxy, state).await;
    }
}

pub fn get_workspace_folders<P: EventProxy>(
    payload: serde_json::Value,
    proxy: P,
    state: Arc<Mutex<AppState>>,
) {
    let Some(workspace_id) = parse_payload::<String>("getWorkspaceFolders", payload) else {
        return;
    };
    let s = lock_state(&state);
    match WorkspaceStore::new(&s.storage).get_folders(&workspace_id) {
        Ok(folders) => proxy.send_event(UserEvent::WorkspaceFolders {
            workspace_id,
            folders,
        }),
        Err(e) => report_error(&proxy, "Failed to read workspace folders", format!("{e:#}")),
    }
}

pub fn set_workspace_visibility<P: EventProxy>(
    payload: serde_json::Value,
    proxy: P,
    state: Arc<Mutex<AppState>>,
) {
    let Some(p) = parse_payload::<VisibilityPayload>("setWorkspaceVisibility", payload) else {
        return;
    };
    let s = lock_state(&state);
    match WorkspaceStore::new(&s.storage).set_visibility(&p.workspace_id, p.visible) {
        Ok(_) => send_workspaces(&proxy, &s),
        Err(e) => report_error(&proxy, "Failed to update workspace", format!("{e:#}")),
    }
}

fn send_checkpoints<P: EventProxy>(proxy: &P, state: &AppState, workspace_id: String) {
    let names = WorkspaceStore::new(&state.storage).list_checkpoints(&workspace_id);
    proxy.send_event(UserEvent::Checkpoints {
        workspace_id,
        names,
    });
}

pub fn save_checkpoint<P: EventProxy>(
    payload: serde_json::Value,
    proxy: P,
    state: Arc<Mutex<AppState>>,
) {
    let Some(p) = parse_payload::<SaveCheckpointPayload>("saveCheckpoint", payload) else {
        return;
    };
    let s = lock_state(&state);
    let ids = p.ids.unwrap_or_else(|| s.checked_ids.clone());
    match WorkspaceStore::new(&s.storage).save_checkpoint(&p.workspace_id, &p.name, &ids) {
        Ok(()) => send_checkpoints(&proxy, &s, p.workspace_id),
        Err(e) => report_error(&proxy, "Failed to save checkpoint", format!("{e:#}")),
    }
}

/// Restores a checkpoint's checked ids and fetches their content.
///
/// Ids are only meaningful for the tree they were saved against; ids that do
/// not resolve in the current tree are ignored by the selection.
pub async fn load_checkpoint<P: EventProxy>(
    payload: serde_json::Value,
    proxy: P,
    state: Arc<Mutex<AppState>>,
) {
    let Some(p) = parse_payload::<WorkspaceNamePayload>("loadCheckpoint", payload) else {
        return;
    };
    let ids = {
        let s = lock_state(&state);
        WorkspaceStore::new(&s.storage).load_checkpoint(&p.workspace_id, &p.name)
    };
    let Some(ids) = ids else {
        report_error(&proxy, "Failed to load checkpoint", format!("'{}' not found", p.name));
        return;
    };
    proxy.send_event(UserEvent::CheckpointLoaded {
        workspace_id: p.workspace_id,
        name: p.name,
        ids: ids.clone(),
    });
    apply_selection_change(ids, proxy, state).await;
}

pub fn list_checkpoints<P: EventProxy>(
    payload: serde_json::Value,
    proxy: P,
    state: Arc<Mutex<AppState>>,
) {
    if let Some(workspace_id) = parse_payload::<String>("listCheckpoints", payload) {
        send_checkpoints(&proxy, &lock_state(&state), workspace_id);
    }
}

pub fn delete_checkpoint<P: EventProxy>(
    payload: serde_json::Value,
    proxy: P,
    state: Arc<Mutex<AppState>>,
) {
    let Some(p) = parse_payload::<WorkspaceNamePayload>("deleteCheckpoint", payload) else {
        return;
    };
    let s = lock_state(&state);
    match WorkspaceStore::new(&s.storage).delete_checkpoint(&p.workspace_id, &p.name) {
        Ok(removed) => {
            if !removed {
                tracing::debug!("Checkpoint '{}' did not exist", p.name);
            }
            send_checkpoints(&proxy, &s, p.workspace_id);
        }
        Err(e) => report_error(&proxy, "Failed to delete checkpoint", format!("{e:#}")),
    }
}

// =========================================================================================
// External links
// =========================================================================================

/// Opens an http(s) link in the system browser. Any other scheme is refused.
pub fn open_external_link<P: EventProxy>(payload: serde_json::Value, proxy: P) {
    let Some(url) = parse_payload::<String>("openExternalLink", payload) else {
        return;
    };
    if !is_web_link(&url) {
        report_error(&proxy, "Refusing to open link", url);
        return;
    }
    if let Err(e) = open::that(&url) {
        report_error(&proxy, "Failed to open link", e);
    }
}

fn is_web_link(url: &str) -> bool {
    let lower = url.trim().to_ascii_lowercase();
    lower.starts_with("https://") || lower.starts_with("http://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::view_model::UiState;
    use crate::config::Storage;
    use serde_json::json;
    use std::fs as std_fs;
    use std::path::Path;
    use tempfile::{tempdir, TempDir};
    use tokio::sync::mpsc;

    // A mock EventProxy for capturing events sent to the UI.
    #[derive(Clone)]
    struct TestEventProxy {
        sender: mpsc::UnboundedSender<UserEvent>,
    }

    impl EventProxy for TestEventProxy {
        fn send_event(&self, event: UserEvent) {
            // The watch loop may outlive the test's receiver.
            let _ = self.sender.send(event);
        }
    }

    // A mock DialogService to simulate user interaction with the folder picker.
    #[derive(Default)]
    struct MockDialogService {
        picked_folder: Mutex<Option<PathBuf>>,
    }

    impl MockDialogService {
        fn set_pick_folder(&self, path: Option<PathBuf>) {
            *self.picked_folder.lock().unwrap() = path;
        }
    }

    impl DialogService for MockDialogService {
        fn pick_directory(&self) -> Option<PathBuf> {
            self.picked_folder.lock().unwrap().clone()
        }
    }

    struct TestHarness {
        state: Arc<Mutex<AppState>>,
        proxy: TestEventProxy,
        event_rx: mpsc::UnboundedReceiver<UserEvent>,
        dialog: Arc<MockDialogService>,
        _temp_dir: TempDir,
        root_path: PathBuf,
    }

    impl TestHarness {
        fn new() -> Self {
            let temp_dir = tempdir().expect("Failed to create temp dir");
            let root_path = temp_dir.path().canonicalize().unwrap().join("project");
            std_fs::create_dir_all(&root_path).unwrap();
            let storage = Storage::new(temp_dir.path().join("store"));
            let (tx, rx) = mpsc::unbounded_channel();

            Self {
                state: Arc::new(Mutex::new(AppState::new(storage))),
                proxy: TestEventProxy { sender: tx },
                event_rx: rx,
                dialog: Arc::new(MockDialogService::default()),
                _temp_dir: temp_dir,
                root_path,
            }
        }

        fn storage(&self) -> Storage {
            self.state.lock().unwrap().storage.clone()
        }

        fn create_file(&self, relative_path: &str, content: &str) -> PathBuf {
            let path = self.root_path.join(relative_path);
            if let Some(parent) = path.parent() {
                std_fs::create_dir_all(parent).unwrap();
            }
            std_fs::write(&path, content).unwrap();
            path
        }

        fn id_of(&self, path: &Path) -> NodeId {
            let state = self.state.lock().unwrap();
            crate::core::find_node_by_path(&state.forest, path)
                .unwrap_or_else(|| panic!("{:?} not in tree", path))
                .id
        }

        fn drain(&mut self) -> Vec<UserEvent> {
            let mut events = Vec::new();
            while let Ok(event) = self.event_rx.try_recv() {
                events.push(event);
            }
            events
        }

        fn last_state_update(&mut self) -> Option<Box<UiState>> {
            self.drain().into_iter().rev().find_map(|e| match e {
                UserEvent::StateUpdate(ui) => Some(ui),
                _ => None,
            })
        }
    }

    // =========================================================================================
    // SECTION: Folder selection and tree
    // =========================================================================================

    #[tokio::test]
    async fn test_select_folder_builds_tree_and_records_history() {
        let mut harness = TestHarness::new();
        harness.create_file("src/a.txt", "a");
        harness.create_file("node_modules/x.js", "x");
        harness.create_file("README.md", "readme");
        harness.dialog.set_pick_folder(Some(harness.root_path.clone()));

        let task = select_folder(
            harness.dialog.as_ref(),
            harness.proxy.clone(),
            harness.state.clone(),
        );
        task.expect("no task spawned").await.unwrap();

        let ui = harness.last_state_update().expect("no state update");
        assert!(!ui.is_building);
        assert_eq!(ui.roots, vec![harness.root_path.clone()]);
        let names: Vec<_> = ui.tree[0].children().iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["src", "README.md"]);
        assert_eq!(ui.file_count, 2);

        let storage = harness.storage();
        assert_eq!(
            folders::last_opened_folder(&storage),
            Some(harness.root_path.clone())
        );
        assert_eq!(folders::recent_folders(&storage), vec![harness.root_path.clone()]);
    }

    #[tokio::test]
    async fn test_select_folder_cancel_is_distinct_from_failure() {
        let mut harness = TestHarness::new();
        harness.dialog.set_pick_folder(None);

        let task = select_folder(
            harness.dialog.as_ref(),
            harness.proxy.clone(),
            harness.state.clone(),
        );

        assert!(task.is_none());
        let events = harness.drain();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], UserEvent::FolderSelectionCancelled));
        assert!(harness.state.lock().unwrap().roots.is_empty());
    }

    #[tokio::test]
    async fn test_open_folder_rejects_files() {
        let mut harness = TestHarness::new();
        let file = harness.create_file("plain.txt", "x");

        open_folder(file, harness.proxy.clone(), harness.state.clone()).await;

        let events = harness.drain();
        assert!(matches!(events.as_slice(), [UserEvent::ShowError(_)]));
        assert!(folders::last_opened_folder(&harness.storage()).is_none());
    }

    #[tokio::test]
    async fn test_close_folder_resets_state() {
        let mut harness = TestHarness::new();
        harness.create_file("a.txt", "a");
        open_folder(
            harness.root_path.clone(),
            harness.proxy.clone(),
            harness.state.clone(),
        )
        .await;

        close_folder(harness.proxy.clone(), harness.state.clone());

        let ui = harness.last_state_update().unwrap();
        assert!(ui.roots.is_empty());
        assert!(ui.tree.is_empty());
        assert!(harness.state.lock().unwrap().watcher.is_none());
    }

    #[tokio::test]
    async fn test_rescan_without_roots_does_nothing() {
        let mut harness = TestHarness::new();

        rescan(harness.proxy.clone(), harness.state.clone()).await;

        assert!(harness.drain().is_empty());
    }

    // =========================================================================================
    // SECTION: Selection
    // =========================================================================================

    #[tokio::test]
    async fn test_selection_follows_check_order() {
        let mut harness = TestHarness::new();
        let a = harness.create_file("a.txt", "A");
        let b = harness.create_file("b.txt", "B");
        let c = harness.create_file("c.txt", "C");
        open_folder(
            harness.root_path.clone(),
            harness.proxy.clone(),
            harness.state.clone(),
        )
        .await;
        let (id_a, id_b, id_c) = (harness.id_of(&a), harness.id_of(&b), harness.id_of(&c));

        selection_changed(
            json!([id_c, id_a, id_b]),
            harness.proxy.clone(),
            harness.state.clone(),
        )
        .await;
        selection_changed(json!([id_c, id_a]), harness.proxy.clone(), harness.state.clone())
            .await;

        let selection = harness.drain().into_iter().rev().find_map(|e| match e {
            UserEvent::SelectionUpdated { entries, markdown } => Some((entries, markdown)),
            _ => None,
        });
        let (entries, markdown) = selection.expect("no selection update");
        let paths: Vec<_> = entries.entries().iter().map(|e| e.file_path.clone()).collect();
        assert_eq!(paths, vec![c.clone(), a.clone()]);
        assert!(markdown.starts_with(&format!("```{}\nC\n```", c.display())));
    }

    #[tokio::test]
    async fn test_selection_ignores_malformed_payload() {
        let mut harness = TestHarness::new();

        selection_changed(json!({"ids": 3}), harness.proxy.clone(), harness.state.clone())
            .await;

        assert!(harness.drain().is_empty());
    }

    #[tokio::test]
    async fn test_read_file_content_reports_missing_file_as_none() {
        let mut harness = TestHarness::new();
        let present = harness.create_file("here.txt", "content");
        let missing = harness.root_path.join("gone.txt");

        read_file_content(json!(present), harness.proxy.clone()).await;
        read_file_content(json!(missing), harness.proxy.clone()).await;

        let events = harness.drain();
        match &events[..] {
            [UserEvent::FileContent { content: first, .. }, UserEvent::FileContent { path, content: second }] =>
            {
                assert_eq!(first.as_deref(), Some("content"));
                assert_eq!(path, &missing);
                assert!(second.is_none());
            }
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_build_markdown_appends_outline_on_request() {
        let mut harness = TestHarness::new();
        let a = harness.create_file("a.txt", "A");
        open_folder(
            harness.root_path.clone(),
            harness.proxy.clone(),
            harness.state.clone(),
        )
        .await;
        selection_changed(
            json!([harness.id_of(&a)]),
            harness.proxy.clone(),
            harness.state.clone(),
        )
        .await;
        harness.drain();

        build_markdown(
            json!({"includeTree": true}),
            harness.proxy.clone(),
            harness.state.clone(),
        );

        match harness.drain().pop() {
            Some(UserEvent::MarkdownReady(markdown)) => {
                assert!(markdown.contains("# DIRECTORY TREE"));
                assert!(markdown.contains("project/"));
                assert!(markdown.contains("└── a.txt"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    // =========================================================================================
    // SECTION: Ignore policy
    // =========================================================================================

    #[tokio::test]
    async fn test_save_ignore_policy_from_text_rebuilds_tree() {
        let mut harness = TestHarness::new();
        harness.create_file("build/out.bin", "x");
        harness.create_file("main.rs", "fn main() {}");
        open_folder(
            harness.root_path.clone(),
            harness.proxy.clone(),
            harness.state.clone(),
        )
        .await;
        harness.drain();

        save_ignore_policy(
            json!({"ignoredFolders": "build, .git", "ignoredFiles": ""}),
            harness.proxy.clone(),
            harness.state.clone(),
        )
        .await;

        let saved = ignore_store::load_ignore_policy(&harness.storage());
        assert_eq!(saved.ignored_folders, vec!["build", ".git"]);
        assert!(saved.ignored_files.is_empty());

        let ui = harness.last_state_update().unwrap();
        let names: Vec<_> = ui.tree[0].children().iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["main.rs"]);
    }

    #[tokio::test]
    async fn test_reset_ignore_policy_restores_defaults() {
        let mut harness = TestHarness::new();
        ignore_store::save_ignore_policy(
            &harness.storage(),
            &IgnorePolicy::from_lists("target", ""),
        )
        .unwrap();

        reset_ignore_policy(harness.proxy.clone(), harness.state.clone()).await;

        match harness.drain().pop() {
            Some(UserEvent::IgnorePolicy(policy)) => assert_eq!(policy, IgnorePolicy::default()),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    // =========================================================================================
    // SECTION: Folder history
    // =========================================================================================

    #[tokio::test]
    async fn test_last_opened_folder_commands() {
        let mut harness = TestHarness::new();

        save_last_opened_folder(json!("/tmp/proj"), harness.proxy.clone(), harness.state.clone());
        get_last_opened_folder(harness.proxy.clone(), harness.state.clone());
        clear_last_opened_folder(harness.proxy.clone(), harness.state.clone());
        get_last_opened_folder(harness.proxy.clone(), harness.state.clone());

        let folders: Vec<_> = harness
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                UserEvent::LastOpenedFolder(f) => Some(f),
                _ => None,
            })
            .collect();
        assert_eq!(
            folders,
            vec![
                Some(PathBuf::from("/tmp/proj")),
                Some(PathBuf::from("/tmp/proj")),
                None,
                None
            ]
        );
    }

    #[tokio::test]
    async fn test_add_recent_folder_moves_to_front() {
        let mut harness = TestHarness::new();
        for p in ["P1", "P2", "P3"] {
            add_recent_folder(json!(p), harness.proxy.clone(), harness.state.clone());
        }
        add_recent_folder(json!("P1"), harness.proxy.clone(), harness.state.clone());

        match harness.drain().pop() {
            Some(UserEvent::RecentFolders(recent)) => {
                let expected: Vec<PathBuf> = ["P1", "P3", "P2"].iter().map(PathBuf::from).collect();
                assert_eq!(recent, expected);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    // =========================================================================================
    // SECTION: Workspaces and checkpoints
    // =========================================================================================

    fn create_test_workspace(harness: &mut TestHarness, name: &str) -> String {
        create_workspace(json!({"name": name}), harness.proxy.clone(), harness.state.clone());
        match harness.drain().pop() {
            Some(UserEvent::Workspaces(list)) => list
                .into_iter()
                .find(|w| w.name == name)
                .expect("workspace missing")
                .id,
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_workspace_folder_add_is_idempotent() {
        let mut harness = TestHarness::new();
        let id = create_test_workspace(&mut harness, "W");
        let payload = json!({"workspaceId": id, "folderPath": harness.root_path});

        add_folder_to_workspace(payload.clone(), harness.proxy.clone(), harness.state.clone())
            .await;
        add_folder_to_workspace(payload, harness.proxy.clone(), harness.state.clone()).await;

        get_workspace_folders(json!(id), harness.proxy.clone(), harness.state.clone());
        match harness.drain().pop() {
            Some(UserEvent::WorkspaceFolders { folders, .. }) => {
                assert_eq!(folders, vec![harness.root_path.clone()])
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_open_workspace_loads_all_folders_and_follows_folder_changes() {
        let mut harness = TestHarness::new();
        let second = harness._temp_dir.path().join("second");
        std_fs::create_dir_all(&second).unwrap();
        std_fs::write(second.join("s.txt"), "s").unwrap();
        let kept = harness.create_file("keep.txt", "k");
        let id = create_test_workspace(&mut harness, "Both");
        for folder in [&harness.root_path, &second] {
            add_folder_to_workspace(
                json!({"workspaceId": id, "folderPath": folder}),
                harness.proxy.clone(),
                harness.state.clone(),
            )
            .await;
        }

        open_workspace(id.clone(), harness.proxy.clone(), harness.state.clone()).await;
        let ui = harness.last_state_update().unwrap();
        assert_eq!(ui.tree.len(), 2);
        assert_eq!(ui.active_workspace.as_deref(), Some(id.as_str()));

        selection_changed(
            json!([harness.id_of(&kept)]),
            harness.proxy.clone(),
            harness.state.clone(),
        )
        .await;

        remove_folder_from_workspace(
            json!({"workspaceId": id, "folderPath": second}),
            harness.proxy.clone(),
            harness.state.clone(),
        )
        .await;

        let ui = harness.last_state_update().unwrap();
        assert_eq!(ui.roots, vec![harness.root_path.clone()]);
        assert_eq!(ui.checked_ids, vec![harness.id_of(&kept)]);
    }

    #[tokio::test]
    async fn test_delete_active_workspace_closes_tree() {
        let mut harness = TestHarness::new();
        harness.create_file("a.txt", "a");
        let id = create_test_workspace(&mut harness, "W");
        add_folder_to_workspace(
            json!({"workspaceId": id, "folderPath": harness.root_path}),
            harness.proxy.clone(),
            harness.state.clone(),
        )
        .await;
        open_workspace(id.clone(), harness.proxy.clone(), harness.state.clone()).await;

        delete_workspace(json!(id), harness.proxy.clone(), harness.state.clone());

        let ui = harness.last_state_update().unwrap();
        assert!(ui.roots.is_empty());
        assert!(ui.active_workspace.is_none());
    }

    #[tokio::test]
    async fn test_checkpoint_round_trip_restores_selection() {
        let mut harness = TestHarness::new();
        let a = harness.create_file("a.txt", "A");
        let b = harness.create_file("b.txt", "B");
        let id = create_test_workspace(&mut harness, "W");
        add_folder_to_workspace(
            json!({"workspaceId": id, "folderPath": harness.root_path}),
            harness.proxy.clone(),
            harness.state.clone(),
        )
        .await;
        open_workspace(id.clone(), harness.proxy.clone(), harness.state.clone()).await;
        let (id_a, id_b) = (harness.id_of(&a), harness.id_of(&b));

        selection_changed(json!([id_b, id_a]), harness.proxy.clone(), harness.state.clone())
            .await;
        save_checkpoint(
            json!({"workspaceId": id, "name": "review"}),
            harness.proxy.clone(),
            harness.state.clone(),
        );
        selection_changed(json!([]), harness.proxy.clone(), harness.state.clone()).await;
        harness.drain();

        load_checkpoint(
            json!({"workspaceId": id, "name": "review"}),
            harness.proxy.clone(),
            harness.state.clone(),
        )
        .await;

        let events = harness.drain();
        assert!(events.iter().any(|e| matches!(
            e,
            UserEvent::CheckpointLoaded { ids, .. } if ids == &vec![id_b, id_a]
        )));
        let restored = harness.state.lock().unwrap().selection.clone();
        let paths: Vec<_> = restored.entries().iter().map(|e| e.file_path.clone()).collect();
        assert_eq!(paths, vec![b, a]);

        list_checkpoints(json!(id), harness.proxy.clone(), harness.state.clone());
        match harness.drain().pop() {
            Some(UserEvent::Checkpoints { names, .. }) => assert_eq!(names, vec!["review"]),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_load_unknown_checkpoint_reports_error() {
        let mut harness = TestHarness::new();
        let id = create_test_workspace(&mut harness, "W");

        load_checkpoint(
            json!({"workspaceId": id, "name": "nope"}),
            harness.proxy.clone(),
            harness.state.clone(),
        )
        .await;

        assert!(matches!(harness.drain().pop(), Some(UserEvent::ShowError(_))));
    }

    // =========================================================================================
    // SECTION: External links
    // =========================================================================================

    #[test]
    fn test_only_web_links_are_allowed() {
        assert!(is_web_link("https://example.com"));
        assert!(is_web_link("HTTP://example.com/path"));
        assert!(!is_web_link("file:///etc/passwd"));
        assert!(!is_web_link("javascript:alert(1)"));
        assert!(!is_web_link("example.com"));
    }

    #[tokio::test]
    async fn test_open_external_link_refuses_other_schemes() {
        let mut harness = TestHarness::new();

        open_external_link(json!("file:///etc/passwd"), harness.proxy.clone());

        assert!(matches!(harness.drain().pop(), Some(UserEvent::ShowError(_))));
    }
}
