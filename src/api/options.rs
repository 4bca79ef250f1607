use std::convert::TryFrom;
use tokio::time::Duration;

/// Tunables of the replication core. Every knob is optional; defaults are
/// the validated values below.
#[derive(Clone, Default)]
pub struct NodeOptions {
    /// Minimum group size for a leader to commit. `1` allows a lone leader
    /// to accept writes.
    pub min_node: Option<u32>,
    /// Wall-clock bound on waiting for phase-1 quorum.
    pub propose_timeout: Option<Duration>,
    /// Lifetime of a buffered phase-1 entry on a follower.
    pub pending_entry_ttl: Option<Duration>,
    /// Max entries per catch-up round trip.
    pub catch_up_batch_size: Option<usize>,
    pub dial_timeout: Option<Duration>,
    pub read_timeout: Option<Duration>,
    pub pool_idle_lifetime: Option<Duration>,
}

pub(crate) struct NodeOptionsValidated {
    pub min_node: u32,
    pub propose_timeout: Duration,
    pub pending_entry_ttl: Duration,
    pub catch_up_batch_size: usize,
    pub dial_timeout: Duration,
    pub read_timeout: Duration,
    pub pool_idle_lifetime: Duration,
}

impl NodeOptionsValidated {
    fn validate(&self) -> Result<(), &'static str> {
        if self.min_node == 0 {
            return Err("min_node must be at least 1");
        }
        if self.catch_up_batch_size == 0 {
            return Err("catch-up batch size must be at least 1");
        }
        if self.propose_timeout >= self.pending_entry_ttl {
            return Err("propose timeout must be shorter than the pending-entry TTL");
        }
        if self.read_timeout < self.propose_timeout {
            return Err("connection read timeout must cover the propose timeout");
        }

        Ok(())
    }
}

impl TryFrom<NodeOptions> for NodeOptionsValidated {
    type Error = &'static str;

    fn try_from(options: NodeOptions) -> Result<Self, Self::Error> {
        let values = NodeOptionsValidated {
            min_node: options.min_node.unwrap_or(1),
            propose_timeout: options.propose_timeout.unwrap_or(Duration::from_secs(3)),
            pending_entry_ttl: options.pending_entry_ttl.unwrap_or(Duration::from_secs(10)),
            catch_up_batch_size: options.catch_up_batch_size.unwrap_or(10_000),
            dial_timeout: options.dial_timeout.unwrap_or(Duration::from_secs(1)),
            read_timeout: options.read_timeout.unwrap_or(Duration::from_secs(10)),
            pool_idle_lifetime: options.pool_idle_lifetime.unwrap_or(Duration::from_secs(30)),
        };

        values.validate()?;
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(NodeOptionsValidated::try_from(NodeOptions::default()).is_ok());
    }

    #[test]
    fn propose_timeout_must_undercut_pending_ttl() {
        let options = NodeOptions {
            propose_timeout: Some(Duration::from_secs(10)),
            pending_entry_ttl: Some(Duration::from_secs(10)),
            ..Default::default()
        };
        assert!(NodeOptionsValidated::try_from(options).is_err());
    }

    #[test]
    fn zero_min_node_is_rejected() {
        let options = NodeOptions {
            min_node: Some(0),
            ..Default::default()
        };
        assert!(NodeOptionsValidated::try_from(options).is_err());
    }
}
