use crate::logstore::{LogEntry, Mutation};
use std::collections::HashMap;
use std::sync::RwLock;

/// StateMap is the materialized key-value view of the log: exactly the fold
/// of the committed entries in id order. All writes arrive through
/// `apply`, which callers invoke while holding the write serializer; reads
/// are concurrent.
pub struct StateMap {
    data: RwLock<HashMap<String, String>>,
}

impl StateMap {
    pub fn new() -> Self {
        StateMap {
            data: RwLock::new(HashMap::new()),
        }
    }

    pub fn apply(&self, entry: &LogEntry) {
        let mut data = self.data.write().expect("state map lock poisoned");
        match &entry.mutation {
            Mutation::Set(items) => {
                for (key, value) in items {
                    data.insert(key.clone(), value.clone());
                }
            }
            Mutation::Remove(keys) => {
                for key in keys {
                    data.remove(key);
                }
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let data = self.data.read().expect("state map lock poisoned");
        data.get(key).cloned()
    }

    pub fn snapshot(&self) -> HashMap<String, String> {
        let data = self.data.read().expect("state map lock poisoned");
        data.clone()
    }

    pub fn len(&self) -> usize {
        let data = self.data.read().expect("state map lock poisoned");
        data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for StateMap {
    fn default() -> Self {
        Self::new()
    }
}
