//! Workspaces (named groups of root folders) and their checkpoints.
//!
//! Every operation reads the whole document, mutates it in memory and writes it
//! back atomically. Nothing is cached between calls.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::Storage;
use crate::core::NodeId;

const WORKSPACES_FILE: &str = "workspaces.json";
const CHECKPOINTS_DIR: &str = "checkpoints";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub folders: Vec<PathBuf>,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_visible() -> bool {
    true
}

/// Checkpoint name to the ordered list of checked node ids.
type CheckpointDocument = BTreeMap<String, Vec<NodeId>>;

pub struct WorkspaceStore<'a> {
    storage: &'a Storage,
}

impl<'a> WorkspaceStore<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// All workspaces in creation order.
    pub fn list_workspaces(&self) -> Vec<Workspace> {
        self.storage.read_document_or_default(WORKSPACES_FILE)
    }

    pub fn get_workspace(&self, id: &str) -> Result<Workspace> {
        self.list_workspaces()
            .into_iter()
            .find(|w| w.id == id)
            .ok_or_else(|| anyhow::anyhow!("Workspace not found: {id}"))
    }

    pub fn create_workspace(&self, name: &str) -> Result<Workspace> {
        let name = name.trim();
        if name.is_empty() {
            bail!("Workspace name must not be empty");
        }
        let workspace = Workspace {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            folders: Vec::new(),
            visible: true,
            created_at: Utc::now(),
        };
        let mut workspaces = self.list_workspaces();
        workspaces.push(workspace.clone());
        self.storage.write_document(WORKSPACES_FILE, &workspaces)?;
        tracing::info!("Created workspace '{}' ({})", workspace.name, workspace.id);
        Ok(workspace)
    }

    pub fn rename_workspace(&self, id: &str, name: &str) -> Result<Workspace> {
        let name = name.trim();
        if name.is_empty() {
            bail!("Workspace name must not be empty");
        }
        self.update(id, |w| {
            w.name = name.to_string();
        })
    }

    /// Deletes the workspace and its checkpoints.
    pub fn delete_workspace(&self, id: &str) -> Result<()> {
        let mut workspaces = self.list_workspaces();
        let before = workspaces.len();
        workspaces.retain(|w| w.id != id);
        if workspaces.len() == before {
            bail!("Workspace not found: {id}");
        }
        self.storage.write_document(WORKSPACES_FILE, &workspaces)?;
        self.storage.remove_document(&checkpoint_document(id))?;
        tracing::info!("Deleted workspace {}", id);
        Ok(())
    }

    /// Adds a folder. Adding a folder that is already present leaves the workspace unchanged.
    pub fn add_folder(&self, id: &str, folder: &Path) -> Result<Workspace> {
        let workspace = self.get_workspace(id)?;
        if workspace.folders.iter().any(|f| f == folder) {
            return Ok(workspace);
        }
        self.update(id, |w| w.folders.push(folder.to_path_buf()))
    }

    pub fn remove_folder(&self, id: &str, folder: &Path) -> Result<Workspace> {
        self.update(id, |w| w.folders.retain(|f| f != folder))
    }

    pub fn get_folders(&self, id: &str) -> Result<Vec<PathBuf>> {
        Ok(self.get_workspace(id)?.folders)
    }

    pub fn set_visibility(&self, id: &str, visible: bool) -> Result<Workspace> {
        self.update(id, |w| w.visible = visible)
    }

    /// Stores `checked` under `name`, replacing a checkpoint of the same name.
    pub fn save_checkpoint(&self, workspace_id: &str, name: &str, checked: &[NodeId]) -> Result<()> {
        self.get_workspace(workspace_id)?;
        let name = name.trim();
        if name.is_empty() {
            bail!("Checkpoint name must not be empty");
        }
        let mut checkpoints = self.checkpoints(workspace_id);
        checkpoints.insert(name.to_string(), checked.to_vec());
        self.storage
            .write_document(&checkpoint_document(workspace_id), &checkpoints)?;
        tracing::info!(
            "Saved checkpoint '{}' with {} items in workspace {}",
            name,
            checked.len(),
            workspace_id
        );
        Ok(())
    }

    pub fn load_checkpoint(&self, workspace_id: &str, name: &str) -> Option<Vec<NodeId>> {
        self.checkpoints(workspace_id).remove(name)
    }

    /// Checkpoint names in lexicographic order.
    pub fn list_checkpoints(&self, workspace_id: &str) -> Vec<String> {
        self.checkpoints(workspace_id).into_keys().collect()
    }

    /// Removes a checkpoint. Returns `false` if it did not exist.
    pub fn delete_checkpoint(&self, workspace_id: &str, name: &str) -> Result<bool> {
        let mut checkpoints = self.checkpoints(workspace_id);
        if checkpoints.remove(name).is_none() {
            return Ok(false);
        }
        self.storage
            .write_document(&checkpoint_document(workspace_id), &checkpoints)?;
        Ok(true)
    }

    fn checkpoints(&self, workspace_id: &str) -> CheckpointDocument {
        self.storage
            .read_document_or_default(&checkpoint_document(workspace_id))
    }

    fn update<F>(&self, id: &str, mutate: F) -> Result<Workspace>
    where
        F: FnOnce(&mut Workspace),
    {
        let mut workspaces = self.list_workspaces();
        let Some(workspace) = workspaces.iter_mut().find(|w| w.id == id) else {
            bail!("Workspace not found: {id}");
        };
        mutate(workspace);
        let updated = workspace.clone();
        self.storage.write_document(WORKSPACES_FILE, &workspaces)?;
        Ok(updated)
    }
}

fn checkpoint_document(workspace_id: &str) -> String {
    // Ids are UUIDs we generated; strip anything that could escape the directory anyway.
    let safe: String = workspace_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    format!("{CHECKPOINTS_DIR}/{safe}.json")
}
