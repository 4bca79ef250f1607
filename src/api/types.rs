use crate::api::NodeOptions;
use crate::replica::NodeRole;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Everything needed to stand up one replication node.
pub struct NodeConfig {
    /// Unique id of this node within the group.
    pub node_id: String,
    /// Human-readable name, used in logs and envelopes.
    pub node_name: String,
    /// Group name; messages from other groups are discarded.
    pub group: String,
    /// Whether this node counts as a durable server for quorum purposes.
    pub role: NodeRole,
    /// Address the replication listener binds. Port 0 binds an ephemeral
    /// port; the bound address becomes the advertised one.
    pub listen_addr: SocketAddr,
    /// Where the durable log lives. `None` keeps the log in memory only.
    pub data_directory: Option<PathBuf>,
    pub logger: slog::Logger,
    pub options: NodeOptions,
}
