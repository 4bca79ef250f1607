use crate::logstore::{LogId, LogStore, Mutation};
use crate::replica::{
    CatchUpError, CatchUpOutcome, NodeInfo, ProposeError, RaftRole, Replicator, ServiceEntry,
};
use crate::server::ShutdownHandle;
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

/// NodeHandle is the embedder's grip on a running node: local reads, leader
/// writes, and the hooks the external election/membership/heartbeat
/// subsystems drive. Cloneable; the listener stops when `shutdown` is called
/// or every handle is dropped.
#[derive(Clone)]
pub struct NodeHandle {
    core: Arc<Replicator<Box<dyn LogStore + Send>>>,
    listen_addr: SocketAddr,
    shutdown: Arc<Mutex<Option<ShutdownHandle>>>,
}

impl NodeHandle {
    pub(crate) fn new(
        core: Arc<Replicator<Box<dyn LogStore + Send>>>,
        listen_addr: SocketAddr,
        shutdown: ShutdownHandle,
    ) -> Self {
        NodeHandle {
            core,
            listen_addr,
            shutdown: Arc::new(Mutex::new(Some(shutdown))),
        }
    }

    /// Actual bound address of the replication listener.
    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    // ---- local reads ----

    pub fn get(&self, key: &str) -> Option<String> {
        self.core.state().get(key)
    }

    pub fn state_snapshot(&self) -> HashMap<String, String> {
        self.core.state().snapshot()
    }

    pub fn services_snapshot(&self) -> BTreeMap<String, ServiceEntry> {
        self.core.services().snapshot()
    }

    pub fn last_log_id(&self) -> LogId {
        self.core.last_log_id()
    }

    pub fn last_service_log_id(&self) -> u64 {
        self.core.services().last_service_log_id()
    }

    // ---- leader writes for local embedders ----

    /// Proposes a merge of `items`, with this node as the originating
    /// client. Fails unless this node is the leader.
    pub async fn set(&self, items: HashMap<String, String>) -> Result<LogId, ProposeError> {
        self.core.propose(Mutation::Set(items), self.core.id()).await
    }

    /// Proposes deletion of `keys`, with this node as the originating client.
    pub async fn remove(&self, keys: Vec<String>) -> Result<LogId, ProposeError> {
        self.core.propose(Mutation::Remove(keys), self.core.id()).await
    }

    // ---- hooks for the external election/membership/heartbeat subsystems ----

    pub fn raft_role(&self) -> RaftRole {
        self.core.raft_role()
    }

    pub fn set_raft_role(&self, role: RaftRole) {
        self.core.set_raft_role(role);
    }

    pub fn update_peer(&self, info: NodeInfo) {
        self.core.peers().update(info);
    }

    pub fn remove_peer(&self, id: &str) -> Option<NodeInfo> {
        self.core.peers().remove(id)
    }

    pub fn peers(&self) -> Vec<NodeInfo> {
        self.core.peers().all()
    }

    /// Backfills the named peer, as the heartbeat loop does when it sees the
    /// peer lagging. On success the registry's view of the peer advances.
    pub async fn sync_peer(&self, peer_id: &str) -> Result<CatchUpOutcome, CatchUpError> {
        let peer = self
            .core
            .peers()
            .get(peer_id)
            .ok_or_else(|| CatchUpError::UnknownPeer(peer_id.to_string()))?;

        let outcome = self.core.sync_peer(&peer).await?;
        if let CatchUpOutcome::Synced { up_to } = outcome {
            let mut refreshed = peer;
            refreshed.last_log_id = up_to;
            self.core.peers().update(refreshed);
        }
        Ok(outcome)
    }

    /// Stops the replication listener. Connections already accepted finish
    /// their current message loop on their own timeouts.
    pub fn shutdown(&self) {
        let mut handle = self.shutdown.lock().expect("shutdown lock poisoned");
        handle.take();
    }
}
