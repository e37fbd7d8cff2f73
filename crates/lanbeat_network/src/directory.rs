//! Peer directory: contacts and last-seen timestamps learned from heartbeats.
//!
//! Both tables are cheap-to-clone handles over shared state, so every task
//! of a node can hold its own copy. Locking is internal; callers never see
//! a guard.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::identity::{Contact, PeerId};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

/// Mapping from peer id to its last announced unicast contact.
///
/// Entries are only ever inserted or overwritten, never removed: a peer
/// that stops heartbeating stays resolvable.
#[derive(Debug, Clone, Default)]
pub struct PeerDirectory {
    contacts: Arc<RwLock<HashMap<PeerId, Contact>>>,
}

impl PeerDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the contact for `id`. Returns the previous contact.
    pub fn put(&self, id: PeerId, contact: Contact) -> Option<Contact> {
        self.contacts.write().insert(id, contact)
    }

    /// Look up the contact for `id`.
    pub fn get(&self, id: PeerId) -> Option<Contact> {
        self.contacts.read().get(&id).cloned()
    }

    pub fn contains(&self, id: PeerId) -> bool {
        self.contacts.read().contains_key(&id)
    }

    /// Point-in-time snapshot of all entries, in no particular order.
    pub fn dump(&self) -> Vec<(PeerId, Contact)> {
        self.contacts
            .read()
            .iter()
            .map(|(id, contact)| (*id, contact.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.contacts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.read().is_empty()
    }
}

/// Mapping from peer id to the local time (ms) its last heartbeat arrived.
#[derive(Debug, Clone, Default)]
pub struct LastSeen {
    stamps: Arc<RwLock<HashMap<PeerId, u64>>>,
}

impl LastSeen {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table already holding the local peer's startup time.
    pub fn seeded(local_id: PeerId, at_ms: u64) -> Self {
        let table = Self::new();
        table.touch(local_id, at_ms);
        table
    }

    /// Record that `id` was heard from at `at_ms`.
    pub fn touch(&self, id: PeerId, at_ms: u64) {
        self.stamps.write().insert(id, at_ms);
    }

    pub fn get(&self, id: PeerId) -> Option<u64> {
        self.stamps.read().get(&id).copied()
    }

    /// Point-in-time copy of every tracked id and timestamp.
    pub fn snapshot(&self) -> Vec<(PeerId, u64)> {
        self.stamps.read().iter().map(|(id, at)| (*id, *at)).collect()
    }

    pub fn len(&self) -> usize {
        self.stamps.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.read().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
