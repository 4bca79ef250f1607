use clusterkv::{NodeConfig, NodeOptions, NodeRole, RaftRole};
use slog::Drain;
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

#[tokio::main]
async fn main() {
    let logger = terminal_logger();

    let node = clusterkv::try_create_node(local_node_config(logger.clone()))
        .await
        .unwrap_or_else(|e| {
            slog::crit!(logger, "Failed to start node: {}", e);
            std::process::exit(1);
        });

    // With no election subsystem attached, a lone demo node leads itself.
    node.set_raft_role(RaftRole::Leader);

    let mut seed = HashMap::new();
    seed.insert("hello".to_string(), "world".to_string());
    match node.set(seed).await {
        Ok(log_id) => slog::info!(logger, "Seeded demo entry at log id {}", log_id),
        Err(e) => slog::warn!(logger, "Demo write rejected: {}", e),
    }

    slog::info!(
        logger,
        "Replication node listening on {}; ctrl-c to stop",
        node.listen_addr()
    );
    let _ = tokio::signal::ctrl_c().await;
    node.shutdown();
}

fn local_node_config(logger: slog::Logger) -> NodeConfig {
    NodeConfig {
        node_id: "node-1".to_string(),
        node_name: "node-1".to_string(),
        group: "default".to_string(),
        role: NodeRole::Server,
        listen_addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 4168)),
        data_directory: Some(std::env::temp_dir().join("clusterkv-demo")),
        logger,
        options: NodeOptions::default(),
    }
}

fn terminal_logger() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    slog::Logger::root(drain, slog::o!())
}
