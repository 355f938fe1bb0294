//! Blacklist store
//!
//! Addresses with reason and first-listed date. Entries are never removed and
//! the first write for an address wins.

use chrono::NaiveDate;
use parking_lot::RwLock;
use std::collections::HashSet;

use crate::monitor::types::BlacklistEntry;

#[derive(Debug, Default)]
struct Inner {
    entries: Vec<BlacklistEntry>,
    index: HashSet<String>,
}

/// Thread-safe, insertion-ordered blacklist
#[derive(Debug, Default)]
pub struct BlacklistStore {
    inner: RwLock<Inner>,
}

impl BlacklistStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry unless the address is already listed.
    /// Returns whether a new entry was created.
    pub fn add(&self, address: &str, reason: &str, date: NaiveDate) -> bool {
        let mut inner = self.inner.write();
        if inner.index.contains(address) {
            return false;
        }
        inner.index.insert(address.to_string());
        inner.entries.push(BlacklistEntry {
            address: address.to_string(),
            reason: reason.to_string(),
            date,
        });
        true
    }

    pub fn contains(&self, address: &str) -> bool {
        self.inner.read().index.contains(address)
    }

    pub fn get(&self, address: &str) -> Option<BlacklistEntry> {
        self.inner
            .read()
            .entries
            .iter()
            .find(|entry| entry.address == address)
            .cloned()
    }

    /// Snapshot in insertion order
    pub fn list(&self) -> Vec<BlacklistEntry> {
        self.inner.read().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }
}
