use crate::replica::log_clock::now_micros;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// One registered backend of a named service. Stored under the key
/// `"{name}/{index}"`, one entry per backend node.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ServiceEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub node: String,
}

/// Wire form of a SERVICE_SET request: a named service with its backend
/// node addresses.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ServiceConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub nodes: Vec<String>,
}

/// ServiceRegistry is the replicated service map. Unlike the key-value path
/// it has no two-phase protocol: nodes converge last-writer-wins by the
/// logical timestamp `last_service_log_id`, disseminated over the heartbeat
/// channel.
pub struct ServiceRegistry {
    services: RwLock<BTreeMap<String, ServiceEntry>>,
    last_service_log_id: AtomicU64,
}

fn service_key(name: &str, index: usize) -> String {
    format!("{}/{}", name, index)
}

fn key_matches_name(key: &str, name: &str) -> bool {
    match key.rsplit_once('/') {
        Some((prefix, _index)) => prefix == name,
        None => false,
    }
}

impl ServiceRegistry {
    pub fn new() -> Self {
        ServiceRegistry {
            services: RwLock::new(BTreeMap::new()),
            last_service_log_id: AtomicU64::new(0),
        }
    }

    /// Replaces every entry of the named service with the received node
    /// list and stamps the registry.
    pub fn set(&self, config: ServiceConfig) {
        let mut services = self.services.write().expect("service registry lock poisoned");
        services.retain(|key, _| !key_matches_name(key, &config.name));
        for (index, node) in config.nodes.iter().enumerate() {
            services.insert(
                service_key(&config.name, index),
                ServiceEntry {
                    kind: config.kind.clone(),
                    node: node.clone(),
                },
            );
        }
        drop(services);
        self.stamp(now_micros());
    }

    /// Removes every entry of every named service. Stamps only if something
    /// was actually removed. Returns whether anything was removed.
    pub fn remove_by_names(&self, names: &[String]) -> bool {
        let mut services = self.services.write().expect("service registry lock poisoned");
        let before = services.len();
        services.retain(|key, _| !names.iter().any(|name| key_matches_name(key, name)));
        let removed = services.len() != before;
        drop(services);
        if removed {
            self.stamp(now_micros());
        }
        removed
    }

    /// Wholesale replacement from the leader's heartbeat, adopting the
    /// sender's logical timestamp.
    pub fn replace_all(&self, map: BTreeMap<String, ServiceEntry>, sender_log_id: u64) {
        let mut services = self.services.write().expect("service registry lock poisoned");
        *services = map;
        drop(services);
        self.stamp(sender_log_id);
    }

    pub fn snapshot(&self) -> BTreeMap<String, ServiceEntry> {
        let services = self.services.read().expect("service registry lock poisoned");
        services.clone()
    }

    pub fn last_service_log_id(&self) -> u64 {
        self.last_service_log_id.load(Ordering::SeqCst)
    }

    fn stamp(&self, log_id: u64) {
        self.last_service_log_id.store(log_id, Ordering::SeqCst);
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
