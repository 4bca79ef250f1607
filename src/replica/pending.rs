use crate::logstore::{LogEntry, LogId};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// PendingLog buffers phase-1 proposals on a follower until the matching
/// append-commit arrives. Entries that never commit expire after the TTL;
/// eviction is lazy, on every access, so an expired entry is never observable.
pub struct PendingLog {
    entries: Mutex<HashMap<LogId, PendingEntry>>,
    ttl: Duration,
}

struct PendingEntry {
    entry: LogEntry,
    expires_at: Instant,
}

impl PendingLog {
    pub fn new(ttl: Duration) -> Self {
        PendingLog {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn insert(&self, entry: LogEntry) {
        let mut entries = self.entries.lock().expect("pending log lock poisoned");
        Self::evict_expired(&mut entries);
        entries.insert(
            entry.id,
            PendingEntry {
                entry,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Removes and returns the entry for `id`, if it is present and live.
    pub fn take(&self, id: LogId) -> Option<LogEntry> {
        let mut entries = self.entries.lock().expect("pending log lock poisoned");
        Self::evict_expired(&mut entries);
        entries.remove(&id).map(|pending| pending.entry)
    }

    /// Removes and returns every live entry with an id strictly below `id`,
    /// in ascending id order. Used when an append-commit overtakes the
    /// commit of an earlier proposal on another connection.
    pub fn drain_before(&self, id: LogId) -> Vec<LogEntry> {
        let mut entries = self.entries.lock().expect("pending log lock poisoned");
        Self::evict_expired(&mut entries);
        let mut earlier: Vec<LogEntry> = entries
            .iter()
            .filter(|(pending_id, _)| **pending_id < id)
            .map(|(_, pending)| pending.entry.clone())
            .collect();
        for entry in &earlier {
            entries.remove(&entry.id);
        }
        earlier.sort_by_key(|entry| entry.id);
        earlier
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        let mut entries = self.entries.lock().expect("pending log lock poisoned");
        Self::evict_expired(&mut entries);
        entries.len()
    }

    fn evict_expired(entries: &mut HashMap<LogId, PendingEntry>) {
        let now = Instant::now();
        entries.retain(|_, pending| pending.expires_at > now);
    }
}
