use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::Notify;
use tokio::time::{Duration, Instant};

/// QuorumTally tracks phase-1 acknowledgments across the fan-out tasks of a
/// single proposal. Fan-out tasks record outcomes; the proposer waits until
/// the counters decide the proposal or the deadline passes.
pub struct QuorumTally {
    client_ok: AtomicU32,
    server_ok: AtomicU32,
    done: AtomicU32,
    failed: AtomicU32,
    changed: Notify,
}

impl QuorumTally {
    pub fn new() -> Self {
        QuorumTally {
            client_ok: AtomicU32::new(0),
            server_ok: AtomicU32::new(0),
            done: AtomicU32::new(0),
            failed: AtomicU32::new(0),
            changed: Notify::new(),
        }
    }

    /// When the originating client's home node is the leader itself, its ack
    /// is a given.
    pub fn preset_client_ok(&self) {
        self.client_ok.store(1, Ordering::SeqCst);
    }

    pub fn record_ack(&self, from_origin_node: bool, from_server_role: bool) {
        if from_origin_node {
            self.client_ok.fetch_add(1, Ordering::SeqCst);
        }
        if from_server_role {
            self.server_ok.fetch_add(1, Ordering::SeqCst);
        }
        self.done.fetch_add(1, Ordering::SeqCst);
        self.changed.notify_waiters();
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
        self.changed.notify_waiters();
    }

    /// The quorum rules, in precedence order:
    /// 1. origin's node acked AND some server-role peer acked -> success
    /// 2. every alive peer acked -> success
    /// 3. every alive peer failed -> failure
    /// 4. some failed and every peer has reported -> failure
    /// Undecided otherwise.
    pub fn verdict(&self, alive: u32) -> Option<bool> {
        let client_ok = self.client_ok.load(Ordering::SeqCst);
        let server_ok = self.server_ok.load(Ordering::SeqCst);
        let done = self.done.load(Ordering::SeqCst);
        let failed = self.failed.load(Ordering::SeqCst);

        if client_ok > 0 && server_ok > 0 {
            return Some(true);
        }
        if done == alive {
            return Some(true);
        }
        if failed == alive {
            return Some(false);
        }
        if failed > 0 && failed + done == alive {
            return Some(false);
        }
        None
    }

    /// Waits for a verdict, or for the deadline. At the deadline the result
    /// depends only on the counters sampled then; undecided means failure.
    pub async fn wait(&self, alive: u32, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            // Register before re-checking, so a notification between the
            // check and the await is not lost.
            notified.as_mut().enable();

            if let Some(decided) = self.verdict(alive) {
                return decided;
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.verdict(alive).unwrap_or(false);
            }
        }
    }
}
