//! Diagnostics delivered out of band by the client library.
//!
//! The library reports two kinds of diagnostics: server messages (both
//! informational messages and server-side errors, carried by the server's
//! `INFO`/`ERROR` tokens) and library errors raised by the client library
//! itself. Both render to the text layout `isql` style tools print.

use std::fmt;

/// Message number sent when the current database changes.
pub const MSG_DATABASE_CHANGED: i32 = 5701;
/// Message number sent when the session language changes.
pub const MSG_LANGUAGE_CHANGED: i32 = 5703;

/// A message sent by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerMessage {
    /// Message number; `0` for messages without one.
    pub number: i32,
    /// Message state.
    pub state: i32,
    /// Severity class.
    pub severity: i32,
    /// Message text.
    pub text: String,
    /// Name of the server that sent the message.
    pub server: String,
    /// Procedure that raised the message, if any.
    pub procedure: String,
    /// Line number within the batch or procedure.
    pub line: i32,
}

impl ServerMessage {
    /// Create a numbered message with the given text.
    #[must_use]
    pub fn new(number: i32, severity: i32, text: impl Into<String>) -> Self {
        Self {
            number,
            severity,
            text: text.into(),
            ..Self::default()
        }
    }

    /// Set the originating server name.
    #[must_use]
    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.server = server.into();
        self
    }

    /// Set the originating procedure.
    #[must_use]
    pub fn procedure(mut self, procedure: impl Into<String>) -> Self {
        self.procedure = procedure.into();
        self
    }

    /// Set the line number.
    #[must_use]
    pub fn line(mut self, line: i32) -> Self {
        self.line = line;
        self
    }

    /// Whether the message only reports a session context change and is
    /// not worth recording.
    #[must_use]
    pub fn is_context_change(&self) -> bool {
        matches!(self.number, MSG_DATABASE_CHANGED | MSG_LANGUAGE_CHANGED)
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.number > 0 {
            writeln!(
                f,
                "Msg {}, Level {}, State {}",
                self.number, self.severity, self.state
            )?;
            if !self.server.is_empty() {
                write!(f, "Server '{}', ", self.server)?;
            }
            if !self.procedure.is_empty() {
                write!(f, "Procedure '{}', ", self.procedure)?;
            }
            if self.line > 0 {
                write!(f, "Line {}", self.line)?;
            }
            f.write_str("\n\t")?;
        }
        writeln!(f, "{}", self.text)
    }
}

/// An error raised by the client library.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryError {
    /// Library error number; `0` when the library gave none.
    pub number: i32,
    /// Severity.
    pub severity: i32,
    /// Operating system error number, `0` for none.
    pub os_error: i32,
    /// Operating system error text.
    pub os_text: Option<String>,
    /// Library error text.
    pub text: String,
}

impl LibraryError {
    /// Create a library error.
    #[must_use]
    pub fn new(number: i32, severity: i32, text: impl Into<String>) -> Self {
        Self {
            number,
            severity,
            text: text.into(),
            ..Self::default()
        }
    }

    /// Attach an operating system error.
    #[must_use]
    pub fn os_error(mut self, code: i32, text: impl Into<String>) -> Self {
        self.os_error = code;
        self.os_text = Some(text.into());
        self
    }
}

impl fmt::Display for LibraryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.number != 0 {
            write!(f, "Msg {}, Level {}", self.number, self.severity)?;
        } else {
            f.write_str("DB-LIBRARY error")?;
        }
        if let (true, Some(os_text)) = (self.os_error != 0, &self.os_text) {
            write!(f, "(OS error {}: {})", self.os_error, os_text)?;
        }
        write!(f, "\n{}\n\n", self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_message_layout() {
        let msg = ServerMessage::new(208, 16, "Invalid object name 'nope'.")
            .server("db1")
            .line(3);
        assert_eq!(
            msg.to_string(),
            "Msg 208, Level 16, State 0\nServer 'db1', Line 3\n\tInvalid object name 'nope'.\n"
        );
    }

    #[test]
    fn test_unnumbered_message_is_text_only() {
        let msg = ServerMessage::new(0, 0, "hello");
        assert_eq!(msg.to_string(), "hello\n");
    }

    #[test]
    fn test_context_change() {
        assert!(ServerMessage::new(5701, 0, "Changed database context").is_context_change());
        assert!(ServerMessage::new(5703, 0, "Changed language").is_context_change());
        assert!(!ServerMessage::new(954, 14, "mirror").is_context_change());
    }

    #[test]
    fn test_library_error_layout() {
        let err = LibraryError::new(20009, 9, "Unable to connect")
            .os_error(111, "Connection refused");
        assert_eq!(
            err.to_string(),
            "Msg 20009, Level 9(OS error 111: Connection refused)\nUnable to connect\n\n"
        );
        assert_eq!(
            LibraryError::new(0, 0, "oops").to_string(),
            "DB-LIBRARY error\noops\n\n"
        );
    }
}
