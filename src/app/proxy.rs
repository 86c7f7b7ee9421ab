//! Defines an abstraction over the event sending mechanism.

use super::events::UserEvent;
use tao::event_loop::EventLoopProxy;

/// A trait that abstracts the sending of user events, so command handlers can
/// be driven by a channel in tests instead of a live event loop.
/// This is "fire-and-forget" and doesn't return a result.
pub trait EventProxy: Send + Sync + Clone + 'static {
    fn send_event(&self, event: UserEvent);
}

/// Implement the trait for the real `tao::event_loop::EventLoopProxy`.
impl EventProxy for EventLoopProxy<UserEvent> {
    fn send_event(&self, event: UserEvent) {
        // A closed event loop only happens during shutdown; log and move on.
        if let Err(e) = self.send_event(event) {
            tracing::warn!("Failed to send event to event loop: {}", e);
        }
    }
}
