//! Responsible for transforming the `AppState` into a `UiState` view model.

use serde::Serialize;
use std::path::PathBuf;

use super::state::AppState;
use crate::core::{Node, NodeId};

/// A serializable representation of the application state for the UI.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UiState {
    pub roots: Vec<PathBuf>,
    pub active_workspace: Option<String>,
    pub tree: Vec<Node>,
    pub checked_ids: Vec<NodeId>,
    pub is_building: bool,
    pub status_message: String,
    pub file_count: usize,
    pub selected_count: usize,
}

/// Creates the complete `UiState` from the current `AppState`.
pub fn generate_ui_state(state: &AppState) -> UiState {
    UiState {
        roots: state.roots.clone(),
        active_workspace: state.active_workspace.clone(),
        tree: state.forest.clone(),
        checked_ids: state.checked_ids.clone(),
        is_building: state.is_building,
        status_message: state.status_message.clone(),
        file_count: state.file_count(),
        selected_count: state.selection.len(),
    }
}
