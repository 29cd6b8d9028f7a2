//! Session lifecycle notifications.

/// Lifecycle events emitted by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Emitted after a session has started
    Started,
    /// Emitted after a session has been restarted
    Restarted,
}

/// Observer notified of session lifecycle events.
///
/// Notification is fire-and-forget: the session never consumes a
/// return value, and a panicking observer is logged and skipped
/// rather than aborting the lifecycle.
pub trait SessionObserver: Send + Sync {
    /// Called after a session starts or restarts.
    fn on_session_event(&self, event: SessionEvent);
}

impl<F> SessionObserver for F
where
    F: Fn(SessionEvent) + Send + Sync,
{
    fn on_session_event(&self, event: SessionEvent) {
        self(event)
    }
}
