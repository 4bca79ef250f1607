mod log_clock;
mod pending;
mod peers;
mod quorum;
mod replica_api;
mod replicator;
mod service;
mod state_map;

pub use pending::PendingLog;
pub use peers::NodeInfo;
pub use peers::NodeRole;
pub use peers::NodeStatus;
pub use peers::PeerRegistry;
pub use peers::RaftRole;
pub use replica_api::CatchUpError;
pub use replica_api::CatchUpOutcome;
pub use replica_api::ProposeError;
pub use replicator::Replicator;
pub use replicator::ReplicatorConfig;
pub use service::ServiceConfig;
pub use service::ServiceEntry;
pub use service::ServiceRegistry;
pub use state_map::StateMap;
