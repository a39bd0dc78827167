//! FIFO admission queue of waiting conversations.

use std::collections::VecDeque;

use super::conversation::ConversationId;

/// Ordered queue of conversation IDs awaiting an agent.
///
/// An ID appears at most once. Positions are 1-based.
#[derive(Debug, Default)]
pub struct AdmissionQueue {
    entries: VecDeque<ConversationId>,
}

impl AdmissionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the back. Returns the new position, or `None` if already queued.
    pub fn push_back(&mut self, id: &str) -> Option<usize> {
        if self.contains(id) {
            return None;
        }
        self.entries.push_back(id.to_string());
        Some(self.entries.len())
    }

    /// Put an ID back at the head, keeping its place in line.
    pub fn push_front(&mut self, id: &str) {
        if !self.contains(id) {
            self.entries.push_front(id.to_string());
        }
    }

    pub fn pop_front(&mut self) -> Option<ConversationId> {
        self.entries.pop_front()
    }

    /// Remove an ID wherever it sits. Returns whether it was queued.
    pub fn remove(&mut self, id: &str) -> bool {
        match self.entries.iter().position(|e| e == id) {
            Some(idx) => {
                self.entries.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e == id).map(|idx| idx + 1)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConversationId> {
        self.entries.iter()
    }
}
