//! Contains helper functions to reduce boilerplate code in other `app` modules.

use std::sync::{Arc, Mutex, MutexGuard};

use super::events::UserEvent;
use super::proxy::EventProxy;
use super::state::AppState;
use super::view_model::generate_ui_state;

/// Locks the shared state.
pub fn lock_state(state: &Arc<Mutex<AppState>>) -> MutexGuard<'_, AppState> {
    state
        .lock()
        .expect("Mutex was poisoned. This should not happen.")
}

/// A helper function that locks the `AppState`, performs a mutation,
/// and then automatically sends a `StateUpdate` event to the UI.
pub fn with_state_and_notify<F, R, P: EventProxy>(
    state: &Arc<Mutex<AppState>>,
    proxy: &P,
    update_fn: F,
) -> R
where
    F: FnOnce(&mut AppState) -> R,
{
    let mut state_guard = lock_state(state);

    // Execute the specific mutation logic
    let result = update_fn(&mut state_guard);

    // Generate the new UI state and send the event
    let ui_state = generate_ui_state(&state_guard);
    proxy.send_event(UserEvent::StateUpdate(Box::new(ui_state)));
    result
}

/// Logs `error` and forwards it to the UI.
pub fn report_error<P: EventProxy>(proxy: &P, context: &str, error: impl std::fmt::Display) {
    tracing::warn!("{}: {}", context, error);
    proxy.send_event(UserEvent::ShowError(format!("{context}: {error}")));
}
