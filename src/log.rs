//! Human-readable activity log, newest line first.

use std::collections::VecDeque;

/// Bounded list of state-change messages, most recent first.
#[derive(Debug, Clone)]
pub(crate) struct ActivityLog {
    lines: VecDeque<String>,
    capacity: usize,
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, message: String) {
        self.lines.push_front(message);
        self.lines.truncate(self.capacity);
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    /// All lines as one block of text, newest first.
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|line| format!("{line}\r\n"))
            .collect()
    }
}
