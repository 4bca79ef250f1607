use crate::logstore::{AppendOutcome, LogEntry, LogId, LogStore, Mutation};
use crate::net::{self, ConnectionPool};
use crate::replica::log_clock::LogIdClock;
use crate::replica::pending::PendingLog;
use crate::replica::peers::{NodeInfo, NodeRole, PeerRegistry, RaftRole};
use crate::replica::quorum::QuorumTally;
use crate::replica::replica_api::{CatchUpError, CatchUpOutcome, ProposeError};
use crate::replica::service::ServiceRegistry;
use crate::replica::state_map::StateMap;
use crate::wire::{self, Envelope, Message, MessageKind, WireError};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tokio::time::Duration;

/// Append-commit delivery effort per peer: the dispatch task retries the
/// whole delivery up to 3 times; each delivery makes up to 3 connection
/// attempts, and up to 3 send attempts on a live connection. After that the
/// peer is abandoned to the catch-up path.
const PHASE2_DISPATCH_ATTEMPTS: u32 = 3;
const PHASE2_CONN_ATTEMPTS: u32 = 3;
const PHASE2_MSG_ATTEMPTS: u32 = 3;

pub struct ReplicatorConfig<L: LogStore> {
    pub logger: slog::Logger,
    pub group: String,
    pub id: String,
    pub name: String,
    pub role: NodeRole,
    /// Advertised replication address, `host:port`.
    pub advertised_addr: String,
    pub store: L,
    pub min_node: u32,
    pub propose_timeout: Duration,
    pub pending_entry_ttl: Duration,
    pub catch_up_batch_size: usize,
    pub dial_timeout: Duration,
    pub read_timeout: Duration,
    pub pool_idle_lifetime: Duration,
}

/// Replicator is the protocol core: it orders client mutations on the
/// leader, disseminates them in two phases, applies committed entries on
/// followers, and backfills lagging peers.
///
/// The log store sits inside a tokio mutex that doubles as the write
/// serializer: every local append, leader or follower, goes through it, and
/// the leader holds it across the whole propose call so proposals are
/// admitted FIFO and never interleave.
pub struct Replicator<L: LogStore> {
    logger: slog::Logger,
    group: String,
    id: String,
    name: String,
    role: NodeRole,
    advertised_addr: RwLock<String>,
    raft_role: RwLock<RaftRole>,
    min_node: u32,
    propose_timeout: Duration,
    catch_up_batch_size: usize,
    read_timeout: Duration,
    store: Mutex<L>,
    last_log_id: AtomicU64,
    clock: LogIdClock,
    pending: PendingLog,
    state: StateMap,
    peers: PeerRegistry,
    services: ServiceRegistry,
    pool: ConnectionPool,
}

/// Peer-address gossip pushed by a follower after it loads its local config.
#[derive(Deserialize)]
struct PeerSeeds {
    #[serde(default)]
    peers: Vec<String>,
}

impl<L: LogStore + 'static> Replicator<L> {
    pub fn new(config: ReplicatorConfig<L>) -> Self {
        let last_log_id = config.store.last_log_id();

        // Reconstruct the state map by replaying the whole log in id order.
        let state = StateMap::new();
        for entry in config.store.entries_after(LogId::ZERO, usize::MAX) {
            state.apply(&entry);
        }

        Replicator {
            logger: config.logger,
            group: config.group,
            id: config.id,
            name: config.name,
            role: config.role,
            advertised_addr: RwLock::new(config.advertised_addr),
            raft_role: RwLock::new(RaftRole::Follower),
            min_node: config.min_node,
            propose_timeout: config.propose_timeout,
            catch_up_batch_size: config.catch_up_batch_size,
            read_timeout: config.read_timeout,
            store: Mutex::new(config.store),
            last_log_id: AtomicU64::new(last_log_id.val()),
            clock: LogIdClock::new(last_log_id),
            pending: PendingLog::new(config.pending_entry_ttl),
            state,
            peers: PeerRegistry::new(),
            services: ServiceRegistry::new(),
            pool: ConnectionPool::new(config.dial_timeout, config.pool_idle_lifetime),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn raft_role(&self) -> RaftRole {
        *self.raft_role.read().expect("raft role lock poisoned")
    }

    pub fn set_raft_role(&self, role: RaftRole) {
        *self.raft_role.write().expect("raft role lock poisoned") = role;
    }

    pub fn advertised_addr(&self) -> String {
        self.advertised_addr
            .read()
            .expect("advertised addr lock poisoned")
            .clone()
    }

    pub fn last_log_id(&self) -> LogId {
        LogId::new(self.last_log_id.load(Ordering::SeqCst))
    }

    pub fn state(&self) -> &StateMap {
        &self.state
    }

    pub fn peers(&self) -> &PeerRegistry {
        &self.peers
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    pub fn pending(&self) -> &PendingLog {
        &self.pending
    }

    /// Envelope metadata describing this node right now.
    pub fn envelope(&self) -> Envelope {
        Envelope {
            group: self.group.clone(),
            id: self.id.clone(),
            ip: self.advertised_addr(),
            name: self.name.clone(),
            role: self.role,
            last_log_id: self.last_log_id(),
            last_service_log_id: self.services.last_service_log_id(),
        }
    }

    // ---- leader write path ----

    /// Orders and replicates one client mutation. `origin_client_id` is the
    /// id of the node the client is attached to; the quorum requires that
    /// node's ack (or the leader itself being that node) plus one
    /// server-role ack.
    pub async fn propose(
        self: &Arc<Self>,
        mutation: Mutation,
        origin_client_id: &str,
    ) -> Result<LogId, ProposeError> {
        if self.raft_role() != RaftRole::Leader {
            return Err(ProposeError::NotLeader);
        }

        // Serializer held for the whole call: FIFO admission, and no other
        // proposal's fan-out can interleave with ours.
        let mut store = self.store.lock().await;

        let entry = LogEntry::new(self.clock.next(), mutation);
        if !self.solicit_uncommitted_acks(&entry, origin_client_id).await {
            return Err(ProposeError::QuorumNotReached);
        }

        // Persist before answering the client; peers learn of the commit
        // asynchronously.
        self.apply_committed(&mut store, &entry)?;
        self.spawn_append_commit(entry.id);
        Ok(entry.id)
    }

    /// Phase 1: offer the entry to every alive peer and gather acks until
    /// the tally decides or the deadline passes.
    async fn solicit_uncommitted_acks(self: &Arc<Self>, entry: &LogEntry, origin: &str) -> bool {
        let alive = self.peers.alive_peers();
        if alive.is_empty() {
            // A single-node group may commit alone only when configured so.
            return self.raft_role() == RaftRole::Leader && self.min_node == 1;
        }

        let body = match serde_json::to_string(entry) {
            Ok(body) => body,
            Err(e) => {
                slog::error!(self.logger, "Failed to encode log entry {}: {}", entry.id, e);
                return false;
            }
        };

        let tally = Arc::new(QuorumTally::new());
        if origin == self.id {
            tally.preset_client_ok();
        }

        // Envelope is snapshotted before the local append, so followers see
        // the last log id this entry builds on.
        let envelope = self.envelope();
        let mut alive_count = 0u32;
        for peer in alive {
            alive_count += 1;
            let addr: SocketAddr = match peer.ip.parse() {
                Ok(addr) => addr,
                Err(_) => {
                    slog::warn!(self.logger, "Unparseable peer address '{}'", peer.ip);
                    tally.record_failure();
                    continue;
                }
            };

            let core = Arc::clone(self);
            let tally = Arc::clone(&tally);
            let request = Message::new(MessageKind::UncommittedLogEntry, body.clone(), envelope.clone());
            let origin = origin.to_string();
            tokio::spawn(async move {
                match net::call(&core.pool, addr, &request, core.read_timeout).await {
                    Ok(reply) if reply.is_response() => {
                        tally.record_ack(reply.info.id == origin, reply.info.role == NodeRole::Server);
                    }
                    Ok(_) => tally.record_failure(),
                    Err(e) => {
                        slog::debug!(core.logger, "Phase-1 offer to {} failed: {}", addr, e);
                        tally.record_failure();
                    }
                }
            });
        }

        tally.wait(alive_count, self.propose_timeout).await
    }

    /// Phase 2, fire-and-forget: tell every alive peer to promote the entry.
    /// Delivery is best-effort; a peer that misses it holds a pending entry
    /// until TTL and is repaired by catch-up.
    fn spawn_append_commit(self: &Arc<Self>, id: LogId) {
        for peer in self.peers.alive_peers() {
            let addr: SocketAddr = match peer.ip.parse() {
                Ok(addr) => addr,
                Err(_) => {
                    slog::warn!(self.logger, "Unparseable peer address '{}'", peer.ip);
                    continue;
                }
            };

            let core = Arc::clone(self);
            tokio::spawn(async move {
                for attempt in 1..=PHASE2_DISPATCH_ATTEMPTS {
                    if core.send_append_entry_to_peer(addr, id).await {
                        return;
                    }
                    if attempt == PHASE2_DISPATCH_ATTEMPTS {
                        slog::warn!(
                            core.logger,
                            "Abandoning append-commit of {} to {} after {} attempts",
                            id,
                            addr,
                            attempt
                        );
                    }
                }
            });
        }
    }

    /// One append-commit delivery. Returns whether the peer acknowledged.
    async fn send_append_entry_to_peer(&self, addr: SocketAddr, id: LogId) -> bool {
        let body = id.val().to_string();
        for _ in 0..PHASE2_CONN_ATTEMPTS {
            let mut conn = match self.pool.checkout(addr).await {
                Ok(conn) => conn,
                Err(_) => continue,
            };

            let mut rejections = 0;
            loop {
                let request = Message::new(MessageKind::AppendLogEntry, body.clone(), self.envelope());
                match wire::exchange(&mut conn.stream, &request, self.read_timeout).await {
                    Ok(reply) if reply.is_response() => {
                        self.pool.checkin(conn);
                        return true;
                    }
                    Ok(_) => {
                        // Explicit rejection; the connection is healthy.
                        rejections += 1;
                        if rejections == PHASE2_MSG_ATTEMPTS {
                            return false;
                        }
                    }
                    Err(_) => break, // dead connection, re-dial
                }
            }
        }
        false
    }

    // ---- follower receive path ----

    /// Phase-1 offer from the leader. Accepted only when this node is fully
    /// caught up to the log the entry builds on; otherwise the leader falls
    /// back to catch-up.
    pub fn handle_uncommitted_entry(&self, msg: &Message) -> MessageKind {
        if self.last_log_id() != msg.info.last_log_id {
            slog::warn!(
                self.logger,
                "Rejecting uncommitted entry: local last {} != sender last {}",
                self.last_log_id(),
                msg.info.last_log_id
            );
            return MessageKind::Failed;
        }
        match msg.decode_body::<LogEntry>() {
            Ok(entry) => {
                self.pending.insert(entry);
                MessageKind::Response
            }
            Err(e) => {
                slog::warn!(self.logger, "Malformed uncommitted entry: {}", e);
                MessageKind::Failed
            }
        }
    }

    /// Phase-2 commit from the leader. Idempotent: an id we no longer hold
    /// is nothing to do. A commit that overtook an earlier proposal's commit
    /// on another connection drags the earlier entries in with it, in id
    /// order.
    pub async fn handle_append_entry(&self, msg: &Message) -> MessageKind {
        match msg.decode_body::<LogId>() {
            Ok(id) => {
                if let Some(entry) = self.pending.take(id) {
                    let mut store = self.store.lock().await;
                    for earlier in self.pending.drain_before(id) {
                        if let Err(e) = self.apply_committed(&mut store, &earlier) {
                            slog::error!(self.logger, "Failed to persist entry {}: {}", earlier.id, e);
                        }
                    }
                    if let Err(e) = self.apply_committed(&mut store, &entry) {
                        slog::error!(self.logger, "Failed to persist entry {}: {}", id, e);
                    }
                }
            }
            Err(e) => {
                slog::warn!(self.logger, "Malformed append-commit body: {}", e);
            }
        }
        MessageKind::Response
    }

    /// "Do you have entries after my last log id?" probe from the heartbeat
    /// loop. Success invites a catch-up batch; a non-empty pending log means
    /// commits are still in flight and backfill would race them.
    pub fn handle_update_check(&self, msg: &Message) -> MessageKind {
        if self.last_log_id() < msg.info.last_log_id && self.pending.is_empty() {
            MessageKind::Response
        } else {
            MessageKind::Failed
        }
    }

    /// One catch-up batch from the leader. Applies every entry beyond our
    /// last log id; re-delivered committed entries are no-ops. The response
    /// envelope reports the new last log id as the leader's next cursor.
    pub async fn handle_incremental_update(&self, msg: &Message) -> MessageKind {
        if self.last_log_id() < msg.info.last_log_id {
            match msg.decode_body::<Vec<LogEntry>>() {
                Ok(batch) => {
                    let mut store = self.store.lock().await;
                    for entry in batch {
                        if entry.id > self.last_log_id() {
                            if let Err(e) = self.apply_committed(&mut store, &entry) {
                                slog::error!(self.logger, "Failed to persist entry {}: {}", entry.id, e);
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    slog::error!(self.logger, "Malformed incremental update: {}", e);
                    return MessageKind::Failed;
                }
            }
        }
        MessageKind::Response
    }

    /// Client mutation arriving over the wire (leader only).
    pub async fn handle_data_mutation(self: &Arc<Self>, msg: &Message) -> MessageKind {
        let mutation = match msg.head {
            MessageKind::DataSet => msg.decode_body::<HashMap<String, String>>().map(Mutation::Set),
            MessageKind::DataRemove => msg.decode_body::<Vec<String>>().map(Mutation::Remove),
            _ => return MessageKind::Failed,
        };
        let mutation = match mutation {
            Ok(mutation) => mutation,
            Err(e) => {
                slog::warn!(self.logger, "Malformed {:?} payload: {}", msg.head, e);
                return MessageKind::Failed;
            }
        };

        match self.propose(mutation, &msg.info.id).await {
            Ok(_) => MessageKind::Response,
            Err(e) => {
                slog::warn!(self.logger, "Rejected {:?} from '{}': {}", msg.head, msg.info.name, e);
                MessageKind::Failed
            }
        }
    }

    // ---- catch-up path (leader -> follower) ----

    /// Backfills a lagging peer in batches. Driven by the external heartbeat
    /// loop whenever it observes `peer.last_log_id` behind ours.
    pub async fn sync_peer(&self, peer: &NodeInfo) -> Result<CatchUpOutcome, CatchUpError> {
        if self.last_log_id() <= peer.last_log_id {
            return Ok(CatchUpOutcome::AlreadyCurrent);
        }

        {
            let store = self.store.lock().await;
            if peer.last_log_id != LogId::ZERO && !store.is_valid_log_id(peer.last_log_id) {
                slog::warn!(
                    self.logger,
                    "Refusing catch-up of '{}': log id {} is not in our history",
                    peer.name,
                    peer.last_log_id
                );
                return Err(CatchUpError::DivergentHistory {
                    peer: peer.name.clone(),
                    log_id: peer.last_log_id,
                });
            }
        }

        let addr: SocketAddr = peer
            .ip
            .parse()
            .map_err(|_| CatchUpError::BadPeerAddress(peer.ip.clone()))?;

        slog::info!(
            self.logger,
            "Starting incremental replication from '{}' to '{}'",
            self.name,
            peer.name
        );

        let mut conn = self.pool.checkout(addr).await.map_err(WireError::from)?;
        let mut cursor = peer.last_log_id;
        loop {
            let batch = {
                let store = self.store.lock().await;
                store.entries_after(cursor, self.catch_up_batch_size)
            };
            let Some((first, last)) = batch.first().zip(batch.last()) else {
                slog::info!(self.logger, "No entries after {}, catch-up done", cursor);
                break;
            };
            slog::info!(
                self.logger,
                "Incremental batch start log id: {}, end log id: {}",
                first.id,
                last.id
            );

            let request = Message::with_payload(MessageKind::DataIncrementalUpdate, &batch, self.envelope())
                .map_err(WireError::from)?;
            let reply = wire::exchange(&mut conn.stream, &request, self.read_timeout).await?;

            let advanced = reply.info.last_log_id;
            if advanced <= cursor {
                return Err(CatchUpError::NoProgress(cursor));
            }
            cursor = advanced;
            if cursor == self.last_log_id() {
                break;
            }
        }
        self.pool.checkin(conn);

        Ok(CatchUpOutcome::Synced { up_to: cursor })
    }

    // ---- membership gossip ----

    /// Leader-pushed peer list. Our own entry only ever updates our
    /// advertised address.
    pub fn handle_peers_update(&self, msg: &Message) {
        let list = match msg.decode_body::<Vec<NodeInfo>>() {
            Ok(list) => list,
            Err(e) => {
                slog::warn!(self.logger, "Malformed peers update: {}", e);
                return;
            }
        };
        for info in list {
            if info.id != self.id {
                self.peers.update(info);
            } else if info.ip != self.advertised_addr() {
                slog::info!(self.logger, "Adopting advertised address '{}'", info.ip);
                *self
                    .advertised_addr
                    .write()
                    .expect("advertised addr lock poisoned") = info.ip;
            }
        }
    }

    /// Follower-pushed seed addresses. Unknown addresses get an async
    /// greeting probe; ones we cannot reach are recorded as skeletal peers
    /// for the liveness loop to revisit.
    pub fn handle_config_from_follower(self: &Arc<Self>, msg: &Message) {
        let seeds = match msg.decode_body::<PeerSeeds>() {
            Ok(seeds) => seeds,
            Err(e) => {
                slog::warn!(self.logger, "Malformed follower config: {}", e);
                return;
            }
        };
        for addr in seeds.peers {
            if addr == self.advertised_addr() || self.peers.knows_address(&addr) {
                continue;
            }
            let core = Arc::clone(self);
            tokio::spawn(async move {
                if !core.greet(&addr).await {
                    core.peers.update(NodeInfo::skeletal(&addr));
                }
            });
        }
    }

    async fn greet(&self, addr: &str) -> bool {
        let sock: SocketAddr = match addr.parse() {
            Ok(sock) => sock,
            Err(_) => return false,
        };
        match self.pool.checkout(sock).await {
            Ok(conn) => {
                self.pool.checkin(conn);
                true
            }
            Err(e) => {
                slog::debug!(self.logger, "Greeting of {} failed: {}", addr, e);
                false
            }
        }
    }

    // ---- service registry path ----

    pub fn handle_service_set(&self, msg: &Message) -> MessageKind {
        match msg.decode_body() {
            Ok(config) => {
                self.services.set(config);
                MessageKind::Response
            }
            Err(e) => {
                slog::warn!(self.logger, "Malformed service set: {}", e);
                MessageKind::Failed
            }
        }
    }

    pub fn handle_service_remove(&self, msg: &Message) -> MessageKind {
        match msg.decode_body::<Vec<String>>() {
            Ok(names) => {
                self.services.remove_by_names(&names);
                MessageKind::Response
            }
            Err(e) => {
                slog::warn!(self.logger, "Malformed service remove: {}", e);
                MessageKind::Failed
            }
        }
    }

    /// Whole-map service replacement from the leader's heartbeat.
    pub fn handle_service_completely_update(&self, msg: &Message) {
        match msg.decode_body::<BTreeMap<String, crate::replica::service::ServiceEntry>>() {
            Ok(map) => self.services.replace_all(map, msg.info.last_service_log_id),
            Err(e) => slog::error!(self.logger, "Malformed service replacement: {}", e),
        }
    }

    // ---- shared ----

    /// Appends a committed entry and folds it into the state map. Stale ids
    /// are dropped with a warning and do not advance the last log id.
    fn apply_committed(&self, store: &mut L, entry: &LogEntry) -> io::Result<()> {
        match store.append(entry.clone())? {
            AppendOutcome::Appended => {
                // A committed entry can no longer be pending; catch-up may
                // deliver an entry whose phase-1 copy is still buffered here.
                self.pending.take(entry.id);
                self.state.apply(entry);
                self.last_log_id.store(entry.id.val(), Ordering::SeqCst);
            }
            AppendOutcome::Duplicate => {}
            AppendOutcome::Stale => {
                slog::warn!(
                    self.logger,
                    "Expired log entry, received: {}, current: {}",
                    entry.id,
                    self.last_log_id()
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logstore::InMemoryLogStore;

    fn test_replicator(id: &str, min_node: u32) -> Arc<Replicator<InMemoryLogStore>> {
        Arc::new(Replicator::new(ReplicatorConfig {
            logger: slog::Logger::root(slog::Discard, slog::o!()),
            group: "test-group".to_string(),
            id: id.to_string(),
            name: id.to_string(),
            role: NodeRole::Server,
            advertised_addr: "127.0.0.1:0".to_string(),
            store: InMemoryLogStore::new(),
            min_node,
            propose_timeout: Duration::from_millis(200),
            pending_entry_ttl: Duration::from_secs(10),
            catch_up_batch_size: 10_000,
            dial_timeout: Duration::from_millis(200),
            read_timeout: Duration::from_millis(500),
            pool_idle_lifetime: Duration::from_secs(30),
        }))
    }

    fn leader_envelope(last_log_id: u64) -> Envelope {
        Envelope {
            group: "test-group".to_string(),
            id: "leader".to_string(),
            ip: "127.0.0.1:0".to_string(),
            name: "leader".to_string(),
            role: NodeRole::Server,
            last_log_id: LogId::new(last_log_id),
            last_service_log_id: 0,
        }
    }

    fn set_entry(id: u64, key: &str, value: &str) -> LogEntry {
        let mut items = HashMap::new();
        items.insert(key.to_string(), value.to_string());
        LogEntry::new(LogId::new(id), Mutation::Set(items))
    }

    fn uncommitted_msg(entry: &LogEntry, sender_last: u64) -> Message {
        Message::with_payload(MessageKind::UncommittedLogEntry, entry, leader_envelope(sender_last)).unwrap()
    }

    fn append_msg(id: u64, sender_last: u64) -> Message {
        Message::new(
            MessageKind::AppendLogEntry,
            id.to_string(),
            leader_envelope(sender_last),
        )
    }

    #[tokio::test]
    async fn uncommitted_entry_is_buffered_only_when_caught_up() {
        let follower = test_replicator("b", 1);
        let entry = set_entry(100, "k", "v");

        // Sender claims last log id 7; we are at 0.
        assert_eq!(
            follower.handle_uncommitted_entry(&uncommitted_msg(&entry, 7)),
            MessageKind::Failed
        );
        assert!(follower.pending().is_empty());

        assert_eq!(
            follower.handle_uncommitted_entry(&uncommitted_msg(&entry, 0)),
            MessageKind::Response
        );
        assert_eq!(follower.pending().len(), 1);
        // Nothing is committed until phase 2.
        assert_eq!(follower.last_log_id(), LogId::ZERO);
    }

    #[tokio::test]
    async fn append_entry_commits_a_buffered_proposal() {
        let follower = test_replicator("b", 1);
        let entry = set_entry(100, "k", "v");
        follower.handle_uncommitted_entry(&uncommitted_msg(&entry, 0));

        assert_eq!(
            follower.handle_append_entry(&append_msg(100, 100)).await,
            MessageKind::Response
        );

        assert_eq!(follower.last_log_id(), LogId::new(100));
        assert_eq!(follower.state().get("k"), Some("v".to_string()));
        assert!(follower.pending().is_empty());
    }

    #[tokio::test]
    async fn append_entry_before_its_proposal_is_a_no_op() {
        let follower = test_replicator("b", 1);

        // Phase 2 overtakes phase 1 on a different connection.
        assert_eq!(
            follower.handle_append_entry(&append_msg(100, 100)).await,
            MessageKind::Response
        );
        assert_eq!(follower.last_log_id(), LogId::ZERO);
        assert!(follower.state().is_empty());
    }

    #[tokio::test]
    async fn append_entry_redelivery_is_idempotent() {
        let follower = test_replicator("b", 1);
        let entry = set_entry(100, "k", "v");
        follower.handle_uncommitted_entry(&uncommitted_msg(&entry, 0));

        follower.handle_append_entry(&append_msg(100, 100)).await;
        follower.handle_append_entry(&append_msg(100, 100)).await;

        assert_eq!(follower.last_log_id(), LogId::new(100));
        assert_eq!(follower.state().snapshot().len(), 1);
    }

    #[tokio::test]
    async fn out_of_order_append_commits_drain_in_id_order() {
        let follower = test_replicator("b", 1);

        // Two proposals buffered; their commits arrive reversed.
        let first = set_entry(100, "k", "old");
        let second = set_entry(101, "k", "new");
        follower.handle_uncommitted_entry(&uncommitted_msg(&first, 0));
        follower.handle_uncommitted_entry(&uncommitted_msg(&second, 0));

        follower.handle_append_entry(&append_msg(101, 101)).await;
        assert_eq!(follower.last_log_id(), LogId::new(101));

        // The overtaken commit is already folded in; its late arrival no-ops.
        follower.handle_append_entry(&append_msg(100, 101)).await;
        assert_eq!(follower.last_log_id(), LogId::new(101));
        assert_eq!(follower.state().get("k"), Some("new".to_string()));
    }

    #[tokio::test]
    async fn update_check_requires_lag_and_empty_pending() {
        let follower = test_replicator("b", 1);
        let probe = |sender_last: u64| {
            Message::empty(MessageKind::DataUpdateCheck, leader_envelope(sender_last))
        };

        // Sender ahead of us, nothing pending: please backfill.
        assert_eq!(follower.handle_update_check(&probe(5)), MessageKind::Response);

        // Sender not ahead.
        assert_eq!(follower.handle_update_check(&probe(0)), MessageKind::Failed);

        // Commits in flight.
        follower.handle_uncommitted_entry(&uncommitted_msg(&set_entry(100, "k", "v"), 0));
        assert_eq!(follower.handle_update_check(&probe(5)), MessageKind::Failed);
    }

    #[tokio::test]
    async fn incremental_update_applies_only_newer_entries() {
        let follower = test_replicator("b", 1);
        follower.handle_uncommitted_entry(&uncommitted_msg(&set_entry(10, "a", "1"), 0));
        follower.handle_append_entry(&append_msg(10, 10)).await;

        let batch = vec![
            set_entry(5, "stale", "x"),
            set_entry(10, "a", "1"),
            set_entry(20, "b", "2"),
            set_entry(30, "c", "3"),
        ];
        let msg = Message::with_payload(MessageKind::DataIncrementalUpdate, &batch, leader_envelope(30)).unwrap();

        assert_eq!(follower.handle_incremental_update(&msg).await, MessageKind::Response);
        assert_eq!(follower.last_log_id(), LogId::new(30));
        assert_eq!(follower.state().get("b"), Some("2".to_string()));
        assert_eq!(follower.state().get("stale"), None);

        // Redelivering a fully-committed batch changes nothing.
        let again = Message::with_payload(MessageKind::DataIncrementalUpdate, &batch, leader_envelope(30)).unwrap();
        assert_eq!(follower.handle_incremental_update(&again).await, MessageKind::Response);
        assert_eq!(follower.last_log_id(), LogId::new(30));
    }

    #[tokio::test]
    async fn propose_requires_leadership() {
        let node = test_replicator("a", 1);
        let result = node.propose(Mutation::Remove(vec!["k".to_string()]), "a").await;
        assert!(matches!(result, Err(ProposeError::NotLeader)));
    }

    #[tokio::test]
    async fn lone_leader_commits_only_with_min_node_one() {
        let node = test_replicator("a", 1);
        node.set_raft_role(RaftRole::Leader);

        let mut items = HashMap::new();
        items.insert("k".to_string(), "v".to_string());
        let id = node.propose(Mutation::Set(items), "a").await.unwrap();

        assert_eq!(node.last_log_id(), id);
        assert_eq!(node.state().get("k"), Some("v".to_string()));
    }

    #[tokio::test]
    async fn lone_leader_with_higher_min_node_fails_without_touching_the_log() {
        let node = test_replicator("a", 2);
        node.set_raft_role(RaftRole::Leader);

        let mut items = HashMap::new();
        items.insert("k".to_string(), "v".to_string());
        let result = node.propose(Mutation::Set(items), "a").await;

        assert!(matches!(result, Err(ProposeError::QuorumNotReached)));
        assert_eq!(node.last_log_id(), LogId::ZERO);
        assert!(node.state().is_empty());
    }

    #[tokio::test]
    async fn peers_update_spares_our_own_entry() {
        let node = test_replicator("a", 1);
        let peers = vec![
            NodeInfo {
                id: "a".to_string(),
                ip: "10.0.0.1:7000".to_string(),
                role: NodeRole::Server,
                status: crate::replica::NodeStatus::Alive,
                last_log_id: LogId::ZERO,
                last_service_log_id: 0,
                name: "a".to_string(),
            },
            NodeInfo {
                id: "b".to_string(),
                ip: "10.0.0.2:7000".to_string(),
                role: NodeRole::Server,
                status: crate::replica::NodeStatus::Alive,
                last_log_id: LogId::ZERO,
                last_service_log_id: 0,
                name: "b".to_string(),
            },
        ];
        let msg = Message::with_payload(MessageKind::PeersUpdate, &peers, leader_envelope(0)).unwrap();

        node.handle_peers_update(&msg);

        // Our own row only updates the advertised address.
        assert!(node.peers().get("a").is_none());
        assert_eq!(node.advertised_addr(), "10.0.0.1:7000");
        assert!(node.peers().get("b").is_some());
    }
}
