//! The operator console, as seen by the exec.
use std::sync::{Mutex, PoisonError};

/// Somewhere to send read-only messages for the operator.
pub trait Console: Send + Sync {
    fn send_read_only_message(&self, text: &str);
}

/// A console which remembers what it was sent.
#[derive(Debug, Default)]
pub struct RecordingConsole {
    messages: Mutex<Vec<String>>,
}

impl RecordingConsole {
    pub fn new() -> RecordingConsole {
        RecordingConsole::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Console for RecordingConsole {
    fn send_read_only_message(&self, text: &str) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text.to_string());
    }
}
