//! Persistence for the ignore policy consulted by every tree build.

use anyhow::Result;

use super::Storage;
use crate::core::IgnorePolicy;

const IGNORE_FILE: &str = "ignore.json";

/// Loads the persisted ignore policy.
///
/// A missing, unreadable or unparsable document yields the defaults, which are
/// then written back. A failed write is logged, never escalated.
pub fn load_ignore_policy(storage: &Storage) -> IgnorePolicy {
    match storage.read_document::<IgnorePolicy>(IGNORE_FILE) {
        Ok(Some(policy)) => policy,
        Ok(None) => {
            tracing::info!("No ignore settings found, writing defaults");
            persist_defaults(storage)
        }
        Err(e) => {
            tracing::warn!("{:#}. Using default ignore settings.", e);
            persist_defaults(storage)
        }
    }
}

/// Replaces the persisted policy wholesale.
pub fn save_ignore_policy(storage: &Storage, policy: &IgnorePolicy) -> Result<()> {
    storage.write_document(IGNORE_FILE, policy)?;
    tracing::info!(
        "Saved ignore settings: {} folders, {} files",
        policy.ignored_folders.len(),
        policy.ignored_files.len()
    );
    Ok(())
}

/// Restores and returns the default policy.
pub fn reset_ignore_policy(storage: &Storage) -> Result<IgnorePolicy> {
    let defaults = IgnorePolicy::default();
    save_ignore_policy(storage, &defaults)?;
    Ok(defaults)
}

fn persist_defaults(storage: &Storage) -> IgnorePolicy {
    let defaults = IgnorePolicy::default();
    if let Err(e) = save_ignore_policy(storage, &defaults) {
        tracing::warn!("Failed to persist default ignore settings: {:#}", e);
    }
    defaults
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn missing_policy_writes_defaults() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path());

        assert_eq!(load_ignore_policy(&storage), IgnorePolicy::default());
        let stored: IgnorePolicy = storage.read_document(IGNORE_FILE).unwrap().unwrap();
        assert_eq!(stored, IgnorePolicy::default());
    }

    #[test]
    fn save_replaces_and_load_reads_back() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path());
        let custom = IgnorePolicy::from_lists("target", ".env");

        save_ignore_policy(&storage, &custom).unwrap();
        assert_eq!(load_ignore_policy(&storage), custom);

        assert_eq!(reset_ignore_policy(&storage).unwrap(), IgnorePolicy::default());
        assert_eq!(load_ignore_policy(&storage), IgnorePolicy::default());
    }

    #[test]
    fn corrupt_policy_is_treated_as_absent() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path());
        fs::write(storage.path_for(IGNORE_FILE), "{{{").unwrap();

        assert_eq!(load_ignore_policy(&storage), IgnorePolicy::default());
        let stored: IgnorePolicy = storage.read_document(IGNORE_FILE).unwrap().unwrap();
        assert_eq!(stored, IgnorePolicy::default());
    }

    #[test]
    fn unwritable_storage_still_yields_defaults() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "file, not a directory").unwrap();
        let storage = Storage::new(blocker.join("config"));

        assert_eq!(load_ignore_policy(&storage), IgnorePolicy::default());
    }
}
