//! Process-wide routing of out-of-band diagnostics.
//!
//! Client libraries deliver errors and messages through callbacks that only
//! know the session handle they concern. Each session registers a
//! [`DiagnosticSink`] under its [`HandleId`]; transports call
//! [`report_error`] and [`report_message`] and the registry forwards the
//! rendered text to the sink, if one is still alive.
//!
//! The most recent error and message are also kept process-wide so that
//! failures which happen before a handle exists (a refused login) can still
//! be described.

use std::collections::HashMap;
use std::sync::Weak;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::handle::HandleId;
use crate::message::{LibraryError, ServerMessage};

/// Receiver for the diagnostics of one session.
pub trait DiagnosticSink: Send + Sync {
    /// Record a rendered library error.
    fn add_error(&self, text: &str);

    /// Record a rendered server message and its number.
    fn add_message(&self, text: &str, number: i32);
}

static SINKS: Lazy<Mutex<HashMap<HandleId, Weak<dyn DiagnosticSink>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

static LAST_ERROR: Lazy<Mutex<String>> = Lazy::new(|| Mutex::new(String::new()));
static LAST_MESSAGE: Lazy<Mutex<String>> = Lazy::new(|| Mutex::new(String::new()));

/// Route diagnostics for `handle` to `sink`, replacing any previous sink.
pub fn register(handle: HandleId, sink: Weak<dyn DiagnosticSink>) {
    tracing::trace!(handle = %handle, "registering diagnostic sink");
    SINKS.lock().insert(handle, sink);
}

/// Stop routing diagnostics for `handle`.
pub fn unregister(handle: HandleId) {
    if SINKS.lock().remove(&handle).is_some() {
        tracing::trace!(handle = %handle, "unregistered diagnostic sink");
    }
}

/// Whether a live sink is registered for `handle`.
#[must_use]
pub fn is_registered(handle: HandleId) -> bool {
    SINKS
        .lock()
        .get(&handle)
        .is_some_and(|sink| sink.strong_count() > 0)
}

fn sink_for(handle: Option<HandleId>) -> Option<std::sync::Arc<dyn DiagnosticSink>> {
    let handle = handle?;
    // Upgrade under the lock, call the sink outside of it.
    let sinks = SINKS.lock();
    sinks.get(&handle).and_then(Weak::upgrade)
}

/// Deliver a library error.
pub fn report_error(handle: Option<HandleId>, error: &LibraryError) {
    let text = error.to_string();
    *LAST_ERROR.lock() = text.clone();
    if let Some(sink) = sink_for(handle) {
        sink.add_error(&text);
    }
}

/// Deliver a server message. Context change messages are dropped.
pub fn report_message(handle: Option<HandleId>, message: &ServerMessage) {
    if message.is_context_change() {
        return;
    }
    let text = message.to_string();
    *LAST_MESSAGE.lock() = text.clone();
    if let Some(sink) = sink_for(handle) {
        sink.add_message(&text, message.number);
    }
}

/// The most recent library error text, from any session.
#[must_use]
pub fn last_error() -> String {
    LAST_ERROR.lock().clone()
}

/// The most recent server message text, from any session.
#[must_use]
pub fn last_message() -> String {
    LAST_MESSAGE.lock().clone()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        errors: Mutex<Vec<String>>,
        messages: Mutex<Vec<(String, i32)>>,
    }

    impl DiagnosticSink for Recorder {
        fn add_error(&self, text: &str) {
            self.errors.lock().push(text.to_owned());
        }

        fn add_message(&self, text: &str, number: i32) {
            self.messages.lock().push((text.to_owned(), number));
        }
    }

    #[test]
    fn test_routes_by_handle() {
        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        let (ha, hb) = (HandleId::next(), HandleId::next());
        let weak_a: Weak<dyn DiagnosticSink> = Arc::downgrade(&a) as Weak<dyn DiagnosticSink>;
        let weak_b: Weak<dyn DiagnosticSink> = Arc::downgrade(&b) as Weak<dyn DiagnosticSink>;
        register(ha, weak_a);
        register(hb, weak_b);

        report_message(Some(ha), &ServerMessage::new(0, 0, "for a"));
        report_error(Some(hb), &LibraryError::new(0, 0, "for b"));

        assert_eq!(a.messages.lock().len(), 1);
        assert!(a.errors.lock().is_empty());
        assert_eq!(b.errors.lock().len(), 1);
        assert!(b.messages.lock().is_empty());
        assert_eq!(last_error(), "DB-LIBRARY error\nfor b\n\n");

        unregister(ha);
        unregister(hb);
        report_message(Some(ha), &ServerMessage::new(0, 0, "dropped"));
        assert_eq!(a.messages.lock().len(), 1);
    }

    #[test]
    fn test_context_changes_are_dropped() {
        let sink = Arc::new(Recorder::default());
        let handle = HandleId::next();
        register(handle, Arc::downgrade(&sink) as Weak<dyn DiagnosticSink>);
        report_message(Some(handle), &ServerMessage::new(5701, 10, "Changed database context to 'pubs'."));
        report_message(Some(handle), &ServerMessage::new(5703, 10, "Changed language setting to us_english."));
        assert!(sink.messages.lock().is_empty());
        unregister(handle);
    }

    #[test]
    fn test_dead_sink_is_ignored() {
        let handle = HandleId::next();
        {
            let sink = Arc::new(Recorder::default());
            register(handle, Arc::downgrade(&sink) as Weak<dyn DiagnosticSink>);
            assert!(is_registered(handle));
        }
        assert!(!is_registered(handle));
        report_message(Some(handle), &ServerMessage::new(1, 1, "nobody listens"));
        unregister(handle);
    }
}
