use crate::logstore::LogStore;
use crate::replica::Replicator;
use crate::server::ShutdownSignal;
use crate::wire::{self, Message, MessageKind, WireError};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Duration;

/// What a handler decided to do with the connection after one message.
enum Disposition {
    Reply(MessageKind),
    Close,
}

/// ReplServer accepts replication connections and runs one message loop per
/// connection. The server itself is stateless; everything lives in the
/// replicator it dispatches to.
pub struct ReplServer<L: LogStore + 'static> {
    logger: slog::Logger,
    core: Arc<Replicator<L>>,
    read_timeout: Duration,
}

impl<L: LogStore + 'static> ReplServer<L> {
    pub fn new(logger: slog::Logger, core: Arc<Replicator<L>>, read_timeout: Duration) -> Self {
        ReplServer {
            logger,
            core,
            read_timeout,
        }
    }

    pub async fn run(self, listener: TcpListener, shutdown_signal: ShutdownSignal) {
        slog::info!(self.logger, "Listening on '{:?}'", listener.local_addr());

        tokio::pin!(shutdown_signal);
        loop {
            tokio::select! {
                _ = &mut shutdown_signal => {
                    break;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, remote)) => {
                            let conn_logger = self.logger.new(slog::o!(
                                "Remote" => remote.to_string(),
                            ));
                            let core = Arc::clone(&self.core);
                            let read_timeout = self.read_timeout;
                            tokio::spawn(async move {
                                handle_connection(conn_logger, core, stream, read_timeout).await;
                            });
                        }
                        Err(e) => {
                            slog::warn!(self.logger, "Accept failed: {}", e);
                        }
                    }
                }
            }
        }

        slog::info!(self.logger, "Listener has exited");
    }
}

/// One connection's message loop: read a frame, dispatch it, respond, read
/// the next. Ends silently on read timeout, peer close, group mismatch, or a
/// handler that wants the connection gone.
async fn handle_connection<L: LogStore + 'static>(
    logger: slog::Logger,
    core: Arc<Replicator<L>>,
    mut stream: TcpStream,
    read_timeout: Duration,
) {
    loop {
        let msg = match wire::read_message(&mut stream, read_timeout).await {
            Ok(msg) => msg,
            Err(WireError::Closed) | Err(WireError::Timeout) => return,
            Err(e) => {
                slog::debug!(logger, "Dropping connection: {}", e);
                return;
            }
        };

        // Messages from another group are discarded wholesale.
        if msg.info.group != core.group() {
            slog::debug!(logger, "Discarding message from group '{}'", msg.info.group);
            return;
        }

        slog::debug!(logger, "ServerWire - {:?} from '{}'", msg.head, msg.info.name);
        let disposition = dispatch(&core, &msg).await;

        match disposition {
            Disposition::Reply(kind) => {
                let reply = Message::empty(kind, core.envelope());
                if let Err(e) = wire::write_message(&mut stream, &reply).await {
                    slog::debug!(logger, "Dropping connection on write failure: {}", e);
                    return;
                }
            }
            Disposition::Close => return,
        }
    }
}

async fn dispatch<L: LogStore + 'static>(core: &Arc<Replicator<L>>, msg: &Message) -> Disposition {
    match msg.head {
        MessageKind::DataSet | MessageKind::DataRemove => {
            Disposition::Reply(core.handle_data_mutation(msg).await)
        }
        MessageKind::UncommittedLogEntry => Disposition::Reply(core.handle_uncommitted_entry(msg)),
        MessageKind::AppendLogEntry => Disposition::Reply(core.handle_append_entry(msg).await),
        MessageKind::DataUpdateCheck => Disposition::Reply(core.handle_update_check(msg)),
        MessageKind::DataIncrementalUpdate => {
            Disposition::Reply(core.handle_incremental_update(msg).await)
        }
        MessageKind::PeersUpdate => {
            core.handle_peers_update(msg);
            Disposition::Close
        }
        MessageKind::ConfigFromFollower => {
            core.handle_config_from_follower(msg);
            Disposition::Close
        }
        MessageKind::ServiceSet => Disposition::Reply(core.handle_service_set(msg)),
        MessageKind::ServiceRemove => Disposition::Reply(core.handle_service_remove(msg)),
        MessageKind::ServiceCompletelyUpdate => {
            core.handle_service_completely_update(msg);
            Disposition::Close
        }
        // Responses are never requests; a peer sending one is misbehaving.
        MessageKind::Response | MessageKind::Failed => Disposition::Close,
    }
}
