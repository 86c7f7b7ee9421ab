//! The WebView application: shared state, IPC command dispatch and the events
//! sent back to the frontend.

pub mod commands;
pub mod events;
pub mod file_dialog;
pub mod helpers;
pub mod proxy;
pub mod state;
pub mod tasks;
pub mod view_model;

use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use wry::WebView;

use events::{IpcMessage, UserEvent};
use file_dialog::DialogService;
use proxy::EventProxy;
use state::AppState;

/// Parses a raw IPC message from the WebView and dispatches it to its command handler.
///
/// Handlers that touch the filesystem at length run as tokio tasks, so this
/// returns as soon as the work is scheduled.
pub fn handle_ipc_message<P: EventProxy, D: DialogService + ?Sized>(
    message: String,
    dialog: Arc<D>,
    proxy: P,
    state: Arc<Mutex<AppState>>,
) {
    let msg: IpcMessage = match serde_json::from_str(&message) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::warn!("Ignoring malformed IPC message ({}): {}", e, message);
            return;
        }
    };
    tracing::debug!("IPC command '{}'", msg.command);
    let payload = msg.payload;

    match msg.command.as_str() {
        "initialize" => {
            tokio::spawn(commands::initialize(proxy, state));
        }
        "selectFolder" => {
            // The opened folder builds in the background; nothing waits on it here.
            let _ = commands::select_folder(dialog.as_ref(), proxy, state);
        }
        "openFolder" => match serde_json::from_value::<PathBuf>(payload) {
            Ok(path) => {
                tokio::spawn(commands::open_folder(path, proxy, state));
            }
            Err(e) => tracing::warn!("Invalid path for 'openFolder': {}", e),
        },
        "openWorkspace" => match serde_json::from_value::<String>(payload) {
            Ok(id) => {
                tokio::spawn(commands::open_workspace(id, proxy, state));
            }
            Err(e) => tracing::warn!("Invalid id for 'openWorkspace': {}", e),
        },
        "closeFolder" => commands::close_folder(proxy, state),
        "rescan" => {
            tokio::spawn(commands::rescan(proxy, state));
        }
        "selectionChanged" => {
            tokio::spawn(commands::selection_changed(payload, proxy, state));
        }
        "readFileContent" => {
            tokio::spawn(commands::read_file_content(payload, proxy));
        }
        "buildMarkdown" => commands::build_markdown(payload, proxy, state),
        "getIgnorePolicy" => commands::get_ignore_policy(proxy, state),
        "saveIgnorePolicy" => {
            tokio::spawn(commands::save_ignore_policy(payload, proxy, state));
        }
        "resetIgnorePolicy" => {
            tokio::spawn(commands::reset_ignore_policy(proxy, state));
        }
        "getLastOpenedFolder" => commands::get_last_opened_folder(proxy, state),
        "saveLastOpenedFolder" => commands::save_last_opened_folder(payload, proxy, state),
        "clearLastOpenedFolder" => commands::clear_last_opened_folder(proxy, state),
        "getRecentFolders" => commands::get_recent_folders(proxy, state),
        "addRecentFolder" => commands::add_recent_folder(payload, proxy, state),
        "listWorkspaces" => commands::list_workspaces(proxy, state),
        "createWorkspace" => commands::create_workspace(payload, proxy, state),
        "renameWorkspace" => commands::rename_workspace(payload, proxy, state),
        "deleteWorkspace" => commands::delete_workspace(payload, proxy, state),
        "addFolderToWorkspace" => {
            tokio::spawn(commands::add_folder_to_workspace(payload, proxy, state));
        }
        "removeFolderFromWorkspace" => {
            tokio::spawn(commands::remove_folder_from_workspace(payload, proxy, state));
        }
        "getWorkspaceFolders" => commands::get_workspace_folders(payload, proxy, state),
        "setWorkspaceVisibility" => commands::set_workspace_visibility(payload, proxy, state),
        "saveCheckpoint" => commands::save_checkpoint(payload, proxy, state),
        "loadCheckpoint" => {
            tokio::spawn(commands::load_checkpoint(payload, proxy, state));
        }
        "listCheckpoints" => commands::list_checkpoints(payload, proxy, state),
        "deleteCheckpoint" => commands::delete_checkpoint(payload, proxy, state),
        "openExternalLink" => commands::open_external_link(payload, proxy),
        other => tracing::warn!("Unknown IPC command: {}", other),
    }
}

/// Forwards a backend event to the frontend by calling the matching `window.*` function.
pub fn handle_user_event(event: UserEvent, webview: &WebView) {
    match script_for(&event) {
        Ok(script) => {
            if let Err(e) = webview.evaluate_script(&script) {
                tracing::error!("Failed to evaluate script: {}", e);
            }
        }
        Err(e) => tracing::error!("Failed to serialize event {:?}: {}", event, e),
    }
}

fn call<T: Serialize + ?Sized>(function: &str, value: &T) -> serde_json::Result<String> {
    Ok(format!("window.{}({})", function, serde_json::to_string(value)?))
}

/// Renders the JavaScript call for an event.
pub fn script_for(event: &UserEvent) -> serde_json::Result<String> {
    use serde_json::json;

    match event {
        UserEvent::StateUpdate(ui_state) => call("render", ui_state),
        UserEvent::SelectionUpdated { entries, markdown } => call(
            "updateSelection",
            &json!({ "entries": entries, "markdown": markdown }),
        ),
        UserEvent::MarkdownReady(markdown) => call("showMarkdown", markdown),
        UserEvent::FileContent { path, content } => call(
            "showFileContent",
            &json!({ "path": path, "content": content }),
        ),
        UserEvent::FolderSelectionCancelled => Ok("window.folderSelectionCancelled()".to_string()),
        UserEvent::FileChanged(change) => call("fileChanged", change),
        UserEvent::IgnorePolicy(policy) => call("updateIgnorePolicy", policy),
        UserEvent::LastOpenedFolder(folder) => call("updateLastOpenedFolder", folder),
        UserEvent::RecentFolders(folders) => call("updateRecentFolders", folders),
        UserEvent::Workspaces(workspaces) => call("updateWorkspaces", workspaces),
        UserEvent::WorkspaceFolders {
            workspace_id,
            folders,
        } => call(
            "updateWorkspaceFolders",
            &json!({ "workspaceId": workspace_id, "folders": folders }),
        ),
        UserEvent::Checkpoints {
            workspace_id,
            names,
        } => call(
            "updateCheckpoints",
            &json!({ "workspaceId": workspace_id, "names": names }),
        ),
        UserEvent::CheckpointLoaded {
            workspace_id,
            name,
            ids,
        } => call(
            "checkpointLoaded",
            &json!({ "workspaceId": workspace_id, "name": name, "ids": ids }),
        ),
        UserEvent::ShowError(msg) => call("showError", msg),
    }
}
