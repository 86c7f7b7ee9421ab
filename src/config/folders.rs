//! The last opened folder and the most-recently-used folder list.

use anyhow::Result;
use std::path::{Path, PathBuf};

use super::Storage;

const LAST_FOLDER_FILE: &str = "last_folder.json";
const RECENT_FOLDERS_FILE: &str = "recent_folders.json";
pub const MAX_RECENT_FOLDERS: usize = 5;

/// The folder stored by [`save_last_opened_folder`], exactly as it was saved.
pub fn last_opened_folder(storage: &Storage) -> Option<PathBuf> {
    storage.read_document_or_default::<Option<PathBuf>>(LAST_FOLDER_FILE)
}

/// Stores `folder` verbatim. Paths that are not valid UTF-8 are rejected.
pub fn save_last_opened_folder(storage: &Storage, folder: &Path) -> Result<()> {
    storage.write_document(LAST_FOLDER_FILE, folder)
}

pub fn clear_last_opened_folder(storage: &Storage) -> Result<()> {
    storage.remove_document(LAST_FOLDER_FILE)
}

pub fn recent_folders(storage: &Storage) -> Vec<PathBuf> {
    let mut folders: Vec<PathBuf> = storage.read_document_or_default(RECENT_FOLDERS_FILE);
    folders.truncate(MAX_RECENT_FOLDERS);
    folders
}

/// Moves `folder` to the front of the recent list, dropping the oldest entry past the cap.
pub fn add_recent_folder(storage: &Storage, folder: &Path) -> Result<Vec<PathBuf>> {
    let mut folders = recent_folders(storage);
    folders.retain(|f| f != folder);
    folders.insert(0, folder.to_path_buf());
    folders.truncate(MAX_RECENT_FOLDERS);
    storage.write_document(RECENT_FOLDERS_FILE, &folders)?;
    Ok(folders)
}
