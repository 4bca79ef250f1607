use crate::api::client::NodeHandle;
use crate::api::NodeConfig;
use crate::api::NodeOptionsValidated;
use crate::logstore::{DiskLogStore, InMemoryLogStore, LogStore};
use crate::replica::{Replicator, ReplicatorConfig};
use crate::server::{self, ReplServer};
use std::convert::TryFrom;
use std::io;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Debug, thiserror::Error)]
pub enum NodeCreationError {
    #[error("illegal options for configuring node: {0}")]
    IllegalOptions(String),
    #[error("log store initialization failed: {0}")]
    LogInitialization(io::Error),
    #[error("could not bind replication listener: {0}")]
    Bind(io::Error),
}

/// Builds the log store, replays it into the state map, wires the
/// replicator, and spawns the replication listener. The returned handle is
/// the only way to reach the node from the embedding process.
pub async fn try_create_node(config: NodeConfig) -> Result<NodeHandle, NodeCreationError> {
    let root_logger = config.logger;
    let options = NodeOptionsValidated::try_from(config.options)
        .map_err(|e| NodeCreationError::IllegalOptions(e.to_string()))?;

    let store: Box<dyn LogStore + Send> = match &config.data_directory {
        Some(directory) => {
            let store_logger = root_logger.new(slog::o!("Component" => "logstore"));
            Box::new(
                DiskLogStore::open(directory, store_logger)
                    .map_err(NodeCreationError::LogInitialization)?,
            )
        }
        None => Box::new(InMemoryLogStore::new()),
    };

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .map_err(NodeCreationError::Bind)?;
    let listen_addr = listener.local_addr().map_err(NodeCreationError::Bind)?;

    let core = Arc::new(Replicator::new(ReplicatorConfig {
        logger: root_logger.new(slog::o!("Node" => config.node_name.clone())),
        group: config.group,
        id: config.node_id,
        name: config.node_name,
        role: config.role,
        advertised_addr: listen_addr.to_string(),
        store,
        min_node: options.min_node,
        propose_timeout: options.propose_timeout,
        pending_entry_ttl: options.pending_entry_ttl,
        catch_up_batch_size: options.catch_up_batch_size,
        dial_timeout: options.dial_timeout,
        read_timeout: options.read_timeout,
        pool_idle_lifetime: options.pool_idle_lifetime,
    }));

    let (shutdown_handle, shutdown_signal) = server::shutdown_signal();
    let repl_server = ReplServer::new(
        root_logger.new(slog::o!("Component" => "repl-server")),
        Arc::clone(&core),
        options.read_timeout,
    );
    tokio::spawn(repl_server.run(listener, shutdown_signal));

    Ok(NodeHandle::new(core, listen_addr, shutdown_handle))
}
