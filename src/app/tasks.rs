//! Long-running work: tree builds, selection fetches and the file-change loop.
//!
//! Every task captures a generation before it starts and only writes its result
//! back if the generation (and the roots) are still current when it finishes.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use super::events::UserEvent;
use super::helpers::{lock_state, report_error, with_state_and_notify};
use super::proxy::EventProxy;
use super::state::AppState;
use super::view_model::generate_ui_state;
use crate::config::ignore_store::load_ignore_policy;
use crate::core::selection::selected_file_paths;
use crate::core::watcher::ChangeBatch;
use crate::core::{
    build_forest, find_node_by_path, CoreError, FileChange, FileHandler, FolderWatcher, NodeId,
    SelectionResult,
};

/// How long the watch loop keeps collecting changes after the first one arrives.
pub const BATCH_WINDOW: Duration = Duration::from_millis(200);

/// Resolves each root to its canonical form, keeping roots that cannot be resolved as given.
///
/// Watcher backends report canonical paths, so the stored roots must match them.
pub fn canonical_roots(roots: Vec<PathBuf>) -> Vec<PathBuf> {
    roots
        .into_iter()
        .map(|root| match dunce::canonicalize(&root) {
            Ok(canonical) => canonical,
            Err(e) => {
                tracing::debug!("Keeping root {:?} as given: {}", root, e);
                root
            }
        })
        .collect()
}

/// Replaces the loaded roots, then watches and builds them.
pub async fn open_roots<P: EventProxy>(
    roots: Vec<PathBuf>,
    workspace: Option<String>,
    proxy: P,
    state: Arc<Mutex<AppState>>,
) {
    let roots = canonical_roots(roots);
    tracing::info!("Opening {:?}", roots);
    with_state_and_notify(&state, &proxy, |s| {
        s.reset_view_state();
        s.roots = roots;
        s.active_workspace = workspace;
    });
    start_watching(proxy.clone(), state.clone());
    rebuild_tree(proxy, state).await;
}

/// Builds the forest for the current roots on the blocking pool.
///
/// Roots that cannot be read are reported individually; the others still load.
pub async fn rebuild_tree<P: EventProxy>(proxy: P, state: Arc<Mutex<AppState>>) {
    let (generation, roots, storage, ids) = with_state_and_notify(&state, &proxy, |s| {
        (
            s.begin_build(),
            s.roots.clone(),
            s.storage.clone(),
            s.node_ids.clone(),
        )
    });

    let build_roots = roots.clone();
    let result = tokio::task::spawn_blocking(move || {
        let policy = load_ignore_policy(&storage);
        build_forest(&build_roots, &policy, &ids)
    })
    .await
    .map_err(CoreError::from);

    let (forest, failures) = match result {
        Ok(built) => built,
        Err(e) => {
            report_error(&proxy, "Tree build failed", e);
            with_state_and_notify(&state, &proxy, |s| {
                if s.tree_generation == generation {
                    s.is_building = false;
                    s.status_message = "Tree build failed.".to_string();
                }
            });
            return;
        }
    };

    let mut s = lock_state(&state);
    if s.tree_generation != generation || s.roots != roots {
        tracing::debug!("Discarding stale tree build (generation {})", generation);
        return;
    }

    for (root, e) in &failures {
        report_error(&proxy, &format!("Failed to load {}", root.display()), e);
    }

    s.is_building = false;
    s.replace_forest(forest);

    // Drop selection entries whose files are gone from the new tree.
    let stale: Vec<PathBuf> = s
        .selection
        .entries()
        .iter()
        .filter(|e| find_node_by_path(&s.forest, &e.file_path).is_none())
        .map(|e| e.file_path.clone())
        .collect();
    for path in &stale {
        s.selection.remove(path);
    }

    s.status_message = format!("Loaded {} files.", s.file_count());
    tracing::info!("Tree built: {}", s.status_message);
    proxy.send_event(UserEvent::StateUpdate(Box::new(generate_ui_state(&s))));
    if !stale.is_empty() {
        send_selection(&proxy, &s);
    }
}

/// Replaces the checked ids and fetches the content of the checked files.
///
/// If another selection change lands while this one is reading, this result is dropped.
pub async fn apply_selection_change<P: EventProxy>(
    ids: Vec<NodeId>,
    proxy: P,
    state: Arc<Mutex<AppState>>,
) {
    let (generation, paths) = {
        let mut s = lock_state(&state);
        let paths = selected_file_paths(&s.forest, &ids);
        s.checked_ids = ids;
        (s.next_selection_generation(), paths)
    };

    let selection = SelectionResult::fetch(paths).await;

    let mut s = lock_state(&state);
    if s.selection_generation != generation {
        tracing::debug!("Discarding stale selection (generation {})", generation);
        return;
    }
    s.selection = selection;
    send_selection(&proxy, &s);
    proxy.send_event(UserEvent::StateUpdate(Box::new(generate_ui_state(&s))));
}

fn send_selection<P: EventProxy>(proxy: &P, state: &AppState) {
    proxy.send_event(UserEvent::SelectionUpdated {
        entries: state.selection.clone(),
        markdown: state.selection.to_markdown(None),
    });
}

/// Replaces the watcher with one for the current roots and spawns its change loop.
pub fn start_watching<P: EventProxy>(proxy: P, state: Arc<Mutex<AppState>>) {
    let mut s = lock_state(&state);
    s.release_watcher();
    if s.roots.is_empty() {
        return;
    }

    let roots = s.roots.clone();
    let (tx, rx) = mpsc::unbounded_channel();
    let subscription = FolderWatcher::subscribe(&roots, move |change| {
        // The receiver is gone once the loop has exited for a newer set of roots.
        let _ = tx.send(change);
    });
    match subscription {
        Ok(watcher) => {
            s.watcher = Some(watcher);
            drop(s);
            tokio::spawn(watch_loop(rx, roots, proxy, state));
        }
        Err(e) => report_error(&proxy, "Failed to watch folders", e),
    }
}

async fn watch_loop<P: EventProxy>(
    mut rx: mpsc::UnboundedReceiver<FileChange>,
    roots: Vec<PathBuf>,
    proxy: P,
    state: Arc<Mutex<AppState>>,
) {
    while let Some(first) = rx.recv().await {
        tokio::time::sleep(BATCH_WINDOW).await;
        let mut changes = vec![first];
        while let Ok(change) = rx.try_recv() {
            changes.push(change);
        }
        if !process_changes(&changes, &roots, proxy.clone(), state.clone()).await {
            break;
        }
    }
    tracing::debug!("Watch loop for {:?} finished", roots);
}

/// Applies one batch of changes observed under `roots`.
///
/// Forwards each relevant change to the UI, patches the selection in place and
/// rebuilds the tree if entries were added or removed. Returns `false` once the
/// state has moved on to other roots.
pub async fn process_changes<P: EventProxy>(
    changes: &[FileChange],
    roots: &[PathBuf],
    proxy: P,
    state: Arc<Mutex<AppState>>,
) -> bool {
    let storage = {
        let s = lock_state(&state);
        if s.roots != roots {
            return false;
        }
        s.storage.clone()
    };

    let policy = load_ignore_policy(&storage);
    let batch = ChangeBatch::collect(changes, &policy, roots);
    if batch.is_empty() {
        return true;
    }
    for change in &batch.changes {
        proxy.send_event(UserEvent::FileChanged(change.clone()));
    }

    let to_refresh: Vec<PathBuf> = {
        let s = lock_state(&state);
        batch
            .refreshed
            .iter()
            .filter(|p| s.selection.contains(p))
            .cloned()
            .collect()
    };
    let mut refreshed = Vec::with_capacity(to_refresh.len());
    for path in to_refresh {
        if let Some(content) = FileHandler::read_or_log(&path).await {
            refreshed.push((path, content));
        }
    }

    {
        let mut s = lock_state(&state);
        if s.roots != roots {
            return false;
        }
        let mut changed = false;
        for path in &batch.removed {
            changed |= s.selection.remove(path);
        }
        for (path, content) in refreshed {
            changed |= s.selection.replace_content(&path, content);
        }
        if changed {
            send_selection(&proxy, &s);
        }
    }

    if batch.needs_rebuild {
        rebuild_tree(proxy, state).await;
    }
    true
}
