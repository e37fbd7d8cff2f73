//! Group chat history: the most recent lines sent to or heard on the group.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::identity::PeerId;

/// Number of chat lines kept per node.
pub const CHAT_HISTORY_SIZE: usize = 50;

/// One line of group chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEntry {
    pub from: PeerId,
    pub text: String,
}

/// Bounded, shared log of chat lines. The oldest line is evicted first.
#[derive(Debug, Clone)]
pub struct ChatHistory {
    entries: Arc<Mutex<VecDeque<ChatEntry>>>,
    capacity: usize,
}

impl Default for ChatHistory {
    fn default() -> Self {
        Self::with_capacity(CHAT_HISTORY_SIZE)
    }
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn push(&self, from: PeerId, text: impl Into<String>) {
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        if self.capacity > 0 {
            entries.push_back(ChatEntry {
                from,
                text: text.into(),
            });
        }
    }

    /// Oldest first.
    pub fn snapshot(&self) -> Vec<ChatEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
