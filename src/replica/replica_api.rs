use crate::logstore::LogId;
use crate::wire::WireError;
use std::io;

#[derive(Debug, thiserror::Error)]
pub enum ProposeError {
    #[error("this node is not the leader")]
    NotLeader,
    #[error("quorum was not reached before the propose deadline")]
    QuorumNotReached,
    #[error("failed to persist log entry: {0}")]
    Storage(#[from] io::Error),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CatchUpOutcome {
    /// The peer already has everything we have.
    AlreadyCurrent,
    /// The peer confirmed entries up to `up_to`.
    Synced { up_to: LogId },
}

#[derive(Debug, thiserror::Error)]
pub enum CatchUpError {
    /// The peer's last log id is neither zero nor present in our store: it
    /// is on a history we cannot repair.
    #[error("peer '{peer}' is on a divergent history at log id {log_id}")]
    DivergentHistory { peer: String, log_id: LogId },
    #[error("peer address '{0}' is not parseable")]
    BadPeerAddress(String),
    #[error("transport failure during catch-up: {0}")]
    Transport(#[from] WireError),
    #[error("peer reported no progress past log id {0}")]
    NoProgress(LogId),
    #[error("no peer '{0}' in the registry")]
    UnknownPeer(String),
}
