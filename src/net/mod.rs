mod pool;

pub use pool::ConnectionPool;
pub use pool::PooledConn;

use crate::wire::{self, Message, WireError};
use std::net::SocketAddr;
use tokio::time::Duration;

/// One request/response exchange against a peer, using a pooled connection.
/// The connection goes back to the pool only after a clean exchange; any
/// wire error drops it.
pub async fn call(
    pool: &ConnectionPool,
    addr: SocketAddr,
    request: &Message,
    read_timeout: Duration,
) -> Result<Message, WireError> {
    let mut conn = pool.checkout(addr).await?;
    match wire::exchange(&mut conn.stream, request, read_timeout).await {
        Ok(response) => {
            pool.checkin(conn);
            Ok(response)
        }
        Err(e) => Err(e),
    }
}
