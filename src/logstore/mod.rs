mod disk;
mod in_memory;
mod store;

pub use disk::DiskLogStore;
pub use in_memory::InMemoryLogStore;
pub use store::AppendOutcome;
pub use store::LogStore;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// LogId identifies one committed entry. Ids double as logical timestamps:
/// the leader allocates them strictly increasing, and catch-up uses them as
/// cursors. Zero means "empty log".
#[derive(Serialize, Deserialize, Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct LogId(u64);

impl LogId {
    pub const ZERO: LogId = LogId(0);

    pub fn new(id: u64) -> Self {
        LogId(id)
    }

    pub fn val(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The replicated mutation. Encodes on the wire as a tagged pair:
/// `"act":"set","items":{...}` or `"act":"remove","items":[...]`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "act", content = "items", rename_all = "lowercase")]
pub enum Mutation {
    Set(HashMap<String, String>),
    Remove(Vec<String>),
}

/// One immutable replicated log entry.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LogEntry {
    pub id: LogId,
    #[serde(flatten)]
    pub mutation: Mutation,
}

impl LogEntry {
    pub fn new(id: LogId, mutation: Mutation) -> Self {
        LogEntry { id, mutation }
    }
}
