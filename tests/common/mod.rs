#![allow(dead_code)]

use clusterkv::{
    Envelope, LogId, Message, MessageKind, NodeConfig, NodeHandle, NodeInfo, NodeOptions, NodeRole,
    NodeStatus,
};
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio::time::{Duration, Instant};

pub const GROUP: &str = "itest";

pub fn test_logger() -> slog::Logger {
    slog::Logger::root(slog::Discard, slog::o!())
}

pub async fn start_node(id: &str) -> NodeHandle {
    start_node_with_options(id, NodeOptions::default()).await
}

pub async fn start_node_with_options(id: &str, options: NodeOptions) -> NodeHandle {
    clusterkv::try_create_node(NodeConfig {
        node_id: id.to_string(),
        node_name: id.to_string(),
        group: GROUP.to_string(),
        role: NodeRole::Server,
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        data_directory: None,
        logger: test_logger(),
        options,
    })
    .await
    .expect("node failed to start")
}

/// Registry row describing `node` as seen by another node.
pub fn info_for(id: &str, node: &NodeHandle, status: NodeStatus) -> NodeInfo {
    NodeInfo {
        id: id.to_string(),
        ip: node.listen_addr().to_string(),
        role: NodeRole::Server,
        status,
        last_log_id: node.last_log_id(),
        last_service_log_id: node.last_service_log_id(),
        name: id.to_string(),
    }
}

/// Envelope of a client request whose home node is `home_id`.
pub fn client_envelope(home_id: &str) -> Envelope {
    envelope_in_group(home_id, GROUP)
}

pub fn envelope_in_group(home_id: &str, group: &str) -> Envelope {
    Envelope {
        group: group.to_string(),
        id: home_id.to_string(),
        ip: "127.0.0.1:0".to_string(),
        name: format!("client-via-{}", home_id),
        role: NodeRole::Client,
        last_log_id: LogId::ZERO,
        last_service_log_id: 0,
    }
}

/// One request/response exchange on a fresh connection.
pub async fn send_request(addr: SocketAddr, msg: &Message) -> Message {
    let mut stream = TcpStream::connect(addr).await.expect("connect failed");
    clusterkv::write_message(&mut stream, msg).await.expect("write failed");
    clusterkv::read_message(&mut stream, Duration::from_secs(5))
        .await
        .expect("no response")
}

pub fn set_message(home_id: &str, pairs: &[(&str, &str)]) -> Message {
    let items: std::collections::HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Message::with_payload(MessageKind::DataSet, &items, client_envelope(home_id)).unwrap()
}

pub fn remove_message(home_id: &str, keys: &[&str]) -> Message {
    let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
    Message::with_payload(MessageKind::DataRemove, &keys, client_envelope(home_id)).unwrap()
}

/// Polls `condition` until it holds or a 5 second deadline passes.
pub async fn wait_for<F>(what: &str, condition: F)
where
    F: Fn() -> bool,
{
    if !try_wait_for(Duration::from_secs(5), condition).await {
        panic!("timed out waiting for {}", what);
    }
}

/// Polls `condition` until it holds or `timeout` passes. Returns whether it
/// held.
pub async fn try_wait_for<F>(timeout: Duration, condition: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() > deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
