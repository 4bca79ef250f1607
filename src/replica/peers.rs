use crate::logstore::LogId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// Cluster-facing role of a node. Only `Server` peers count toward the
/// durable half of the propose quorum.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Server,
    Client,
}

/// Liveness as observed by the external membership subsystem.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Alive,
    Dead,
}

/// Raft-style role of this node. Transitions are driven externally by the
/// election subsystem; the replicator only reads.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RaftRole {
    Leader,
    Follower,
    Candidate,
}

/// NodeInfo is identity plus replication metadata for one known peer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NodeInfo {
    pub id: String,
    /// Replication address, `host:port`.
    pub ip: String,
    pub role: NodeRole,
    pub status: NodeStatus,
    pub last_log_id: LogId,
    pub last_service_log_id: u64,
    pub name: String,
}

impl NodeInfo {
    /// A placeholder record for an address learned from gossip before any
    /// handshake succeeded. The liveness loop probes it later.
    pub fn skeletal(addr: &str) -> Self {
        NodeInfo {
            id: addr.to_string(),
            ip: addr.to_string(),
            role: NodeRole::Server,
            status: NodeStatus::Dead,
            last_log_id: LogId::ZERO,
            last_service_log_id: 0,
            name: addr.to_string(),
        }
    }
}

/// PeerRegistry tracks the peers of this node, keyed by node id. Written by
/// the external membership subsystem (through the node handle or the gossip
/// handlers); read by the replicator.
pub struct PeerRegistry {
    peers: RwLock<HashMap<String, NodeInfo>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        PeerRegistry {
            peers: RwLock::new(HashMap::new()),
        }
    }

    pub fn update(&self, info: NodeInfo) {
        let mut peers = self.peers.write().expect("peer registry lock poisoned");
        peers.insert(info.id.clone(), info);
    }

    pub fn remove(&self, id: &str) -> Option<NodeInfo> {
        let mut peers = self.peers.write().expect("peer registry lock poisoned");
        peers.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<NodeInfo> {
        let peers = self.peers.read().expect("peer registry lock poisoned");
        peers.get(id).cloned()
    }

    /// True if `addr` is already known either as an id or as a replication
    /// address. Gossip-discovered peers use their address as both.
    pub fn knows_address(&self, addr: &str) -> bool {
        let peers = self.peers.read().expect("peer registry lock poisoned");
        peers.contains_key(addr) || peers.values().any(|p| p.ip == addr)
    }

    pub fn alive_peers(&self) -> Vec<NodeInfo> {
        let peers = self.peers.read().expect("peer registry lock poisoned");
        peers
            .values()
            .filter(|p| p.status == NodeStatus::Alive)
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<NodeInfo> {
        let peers = self.peers.read().expect("peer registry lock poisoned");
        peers.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        let peers = self.peers.read().expect("peer registry lock poisoned");
        peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
