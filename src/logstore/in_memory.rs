use crate::logstore::{AppendOutcome, LogEntry, LogId, LogStore};
use std::collections::BTreeMap;
use std::io;
use std::ops::Bound;

/// In-memory log store. The primary store for tests and for embedders that
/// handle durability themselves; `DiskLogStore` layers persistence on top of
/// the same map.
pub struct InMemoryLogStore {
    entries: BTreeMap<LogId, LogEntry>,
}

impl InMemoryLogStore {
    pub fn new() -> Self {
        InMemoryLogStore {
            entries: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for InMemoryLogStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LogStore for InMemoryLogStore {
    fn append(&mut self, entry: LogEntry) -> io::Result<AppendOutcome> {
        if self.entries.contains_key(&entry.id) {
            return Ok(AppendOutcome::Duplicate);
        }
        if entry.id < self.last_log_id() {
            return Ok(AppendOutcome::Stale);
        }
        self.entries.insert(entry.id, entry);
        Ok(AppendOutcome::Appended)
    }

    fn last_log_id(&self) -> LogId {
        self.entries
            .keys()
            .next_back()
            .copied()
            .unwrap_or(LogId::ZERO)
    }

    fn is_valid_log_id(&self, id: LogId) -> bool {
        id == LogId::ZERO || self.entries.contains_key(&id)
    }

    fn entries_after(&self, id: LogId, max_count: usize) -> Vec<LogEntry> {
        self.entries
            .range((Bound::Excluded(id), Bound::Unbounded))
            .take(max_count)
            .map(|(_, entry)| entry.clone())
            .collect()
    }
}
