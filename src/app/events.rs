//! Defines the event and message structures for communication between the backend and frontend.

use serde::Deserialize;
use std::path::PathBuf;

use super::view_model::UiState;
use crate::config::workspaces::Workspace;
use crate::core::{FileChange, IgnorePolicy, NodeId, SelectionResult};

/// Events sent from the Rust backend to the WebView (UI thread).
///
/// Each variant corresponds to a specific JavaScript function (`window.*`) that will be called in the frontend.
#[derive(Debug)]
pub enum UserEvent {
    /// A complete state update to re-render the tree view.
    StateUpdate(Box<UiState>),
    /// The aggregated content of the checked files.
    SelectionUpdated {
        entries: SelectionResult,
        markdown: String,
    },
    /// The markdown export of the current selection, built on request.
    MarkdownReady(String),
    /// The content of a single file, or `None` if it could not be read.
    FileContent {
        path: PathBuf,
        content: Option<String>,
    },
    /// The folder picker was dismissed without a choice.
    FolderSelectionCancelled,
    /// A watched file changed on disk.
    FileChanged(FileChange),
    IgnorePolicy(IgnorePolicy),
    LastOpenedFolder(Option<PathBuf>),
    RecentFolders(Vec<PathBuf>),
    Workspaces(Vec<Workspace>),
    WorkspaceFolders {
        workspace_id: String,
        folders: Vec<PathBuf>,
    },
    Checkpoints {
        workspace_id: String,
        names: Vec<String>,
    },
    CheckpointLoaded {
        workspace_id: String,
        name: String,
        ids: Vec<NodeId>,
    },
    /// An error message to be displayed to the user.
    ShowError(String),
}

/// A message received from the WebView via the IPC channel.
#[derive(Deserialize, Debug)]
pub struct IpcMessage {
    /// The name of the command to execute.
    pub command: String,
    /// The payload associated with the command, as a JSON value.
    #[serde(default)]
    pub payload: serde_json::Value,
}
