//! Per-session accumulation of library errors and server messages.

use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;
use tds_transport::DiagnosticSink;

use crate::error::Error;

/// Text that marks a server as a mirror (or a database still restoring).
const MIRROR_PHRASES: [&str; 2] = [
    "It is acting as a mirror database",
    "It is in the middle of a restore",
];

/// Diagnostics collected for one session since the last request started.
///
/// Written both by the session's own task and by the transport's callback
/// registry, so all state sits behind one lock.
#[derive(Default)]
pub struct Diagnostics {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    error: String,
    message: String,
    numbers: HashMap<i32, usize>,
    result_message: Option<String>,
}

impl Diagnostics {
    /// Create an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything collected so far.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.error.clear();
        inner.message.clear();
        inner.numbers.clear();
        inner.result_message = None;
    }

    /// Accumulated library error text, joined by newlines.
    #[must_use]
    pub fn error_text(&self) -> String {
        self.inner.lock().error.clone()
    }

    /// Accumulated server message text, joined by newlines.
    #[must_use]
    pub fn message_text(&self) -> String {
        self.inner.lock().message.clone()
    }

    /// Whether any library error was collected.
    #[must_use]
    pub fn has_error(&self) -> bool {
        !self.inner.lock().error.is_empty()
    }

    /// How many messages with this number were collected.
    #[must_use]
    pub fn message_count(&self, number: i32) -> usize {
        self.inner.lock().numbers.get(&number).copied().unwrap_or(0)
    }

    /// Whether the collected messages say the server is a mirror.
    #[must_use]
    pub fn is_mirror_message(&self) -> bool {
        let inner = self.inner.lock();
        MIRROR_PHRASES.iter().any(|p| inner.message.contains(p))
    }

    /// Start collecting messages for a new result set as well.
    pub(crate) fn begin_result(&self) {
        self.inner.lock().result_message = Some(String::new());
    }

    /// Stop collecting for the current result set and return its text.
    pub(crate) fn finish_result(&self) -> String {
        self.inner.lock().result_message.take().unwrap_or_default()
    }

    /// Build a server error for a failed primitive, attaching both channels.
    pub(crate) fn server_error(&self, context: impl fmt::Display) -> Error {
        let inner = self.inner.lock();
        Error::Server {
            context: context.to_string(),
            error: inner.error.clone(),
            message: inner.message.clone(),
        }
    }

    /// Take both channels for an error that is about to be returned.
    pub(crate) fn detail(&self) -> String {
        let inner = self.inner.lock();
        format!("{}\n{}", inner.error, inner.message)
    }
}

/// The process-wide last error and message, for failures that happened
/// before a session had a handle. The session's own channels stay untouched.
pub(crate) fn last_detail() -> String {
    format!(
        "{}\n{}",
        tds_transport::callbacks::last_error(),
        tds_transport::callbacks::last_message()
    )
}

fn append(buf: &mut String, text: &str) {
    if !buf.is_empty() {
        buf.push('\n');
    }
    buf.push_str(text);
}

impl DiagnosticSink for Diagnostics {
    fn add_error(&self, text: &str) {
        append(&mut self.inner.lock().error, text);
    }

    fn add_message(&self, text: &str, number: i32) {
        let mut inner = self.inner.lock();
        append(&mut inner.message, text);
        if let Some(result_message) = inner.result_message.as_mut() {
            result_message.push_str(text);
        }
        *inner.numbers.entry(number).or_insert(0) += 1;
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Diagnostics")
            .field("error", &inner.error)
            .field("message", &inner.message)
            .field("numbers", &inner.numbers)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_channels_join_with_newlines() {
        let d = Diagnostics::new();
        d.add_error("first");
        d.add_error("second");
        d.add_message("hello", 1);
        d.add_message("world", 2);
        assert_eq!(d.error_text(), "first\nsecond");
        assert_eq!(d.message_text(), "hello\nworld");
        assert!(d.has_error());
        d.clear();
        assert!(!d.has_error());
        assert_eq!(d.message_count(1), 0);
    }

    #[test]
    fn test_result_message_only_collects_while_active() {
        let d = Diagnostics::new();
        d.add_message("before", 1);
        d.begin_result();
        d.add_message("during\n", 1);
        assert_eq!(d.finish_result(), "during\n");
        d.add_message("after", 1);
        assert_eq!(d.finish_result(), "");
        assert_eq!(d.message_count(1), 3);
    }

    #[test]
    fn test_mirror_phrases() {
        let d = Diagnostics::new();
        d.add_message("Msg 954\n\tThe database \"pubs\" cannot be opened. It is acting as a mirror database.\n", 954);
        assert!(d.is_mirror_message());
        d.clear();
        d.add_message("The database is in transition. It is in the middle of a restore.", 927);
        assert!(d.is_mirror_message());
        d.clear();
        d.add_message("Changed language setting", 0);
        assert!(!d.is_mirror_message());
    }

    #[test]
    fn test_concurrent_messages_count_exactly() {
        let d = Arc::new(Diagnostics::new());
        let threads: Vec<_> = (0..8)
            .map(|number| {
                let d = Arc::clone(&d);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        d.add_message("msg", number);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        for number in 0..8 {
            assert_eq!(d.message_count(number), 500);
        }
    }

    #[test]
    fn test_server_error_carries_both_channels() {
        let d = Diagnostics::new();
        d.add_error("lib");
        d.add_message("srv", 0);
        match d.server_error("dbsqlexec failed") {
            Error::Server {
                context,
                error,
                message,
            } => {
                assert_eq!(context, "dbsqlexec failed");
                assert_eq!(error, "lib");
                assert_eq!(message, "srv");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
