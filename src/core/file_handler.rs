use std::path::Path;

use super::CoreError;

/// Reads file content for the preview pane.
pub struct FileHandler;

impl FileHandler {
    /// Reads a file as UTF-8 text.
    ///
    /// Directories, missing files and non-UTF-8 content are all read failures.
    pub async fn read_file_content(file_path: &Path) -> Result<String, CoreError> {
        tokio::fs::read_to_string(file_path)
            .await
            .map_err(|e| CoreError::Io(e, file_path.to_path_buf()))
    }

    /// Like [`FileHandler::read_file_content`], but logs the failure and returns `None`.
    pub async fn read_or_log(file_path: &Path) -> Option<String> {
        match Self::read_file_content(file_path).await {
            Ok(content) => Some(content),
            Err(e) => {
                tracing::warn!("Skipping unreadable file: {}", e);
                None
            }
        }
    }
}
