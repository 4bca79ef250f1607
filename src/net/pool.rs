use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Instant;
use tokio::net::TcpStream;
use tokio::time::Duration;

/// ConnectionPool caches outbound connections per peer address. Checkout
/// hands back an idle connection when a fresh one is parked, else dials with
/// a bounded timeout. Callers check a connection back in only after a clean
/// exchange; dropping a `PooledConn` closes it.
pub struct ConnectionPool {
    idle: Mutex<HashMap<SocketAddr, Vec<IdleConn>>>,
    dial_timeout: Duration,
    idle_lifetime: Duration,
}

struct IdleConn {
    stream: TcpStream,
    parked_at: Instant,
}

pub struct PooledConn {
    pub stream: TcpStream,
    addr: SocketAddr,
}

impl ConnectionPool {
    pub fn new(dial_timeout: Duration, idle_lifetime: Duration) -> Self {
        ConnectionPool {
            idle: Mutex::new(HashMap::new()),
            dial_timeout,
            idle_lifetime,
        }
    }

    pub async fn checkout(&self, addr: SocketAddr) -> io::Result<PooledConn> {
        if let Some(stream) = self.pop_idle(addr) {
            return Ok(PooledConn { stream, addr });
        }

        let dial = TcpStream::connect(addr);
        match tokio::time::timeout(self.dial_timeout, dial).await {
            Ok(Ok(stream)) => Ok(PooledConn { stream, addr }),
            Ok(Err(e)) => Err(e),
            Err(_elapsed) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("dial of {} timed out", addr),
            )),
        }
    }

    pub fn checkin(&self, conn: PooledConn) {
        let mut idle = self.idle.lock().expect("connection pool lock poisoned");
        idle.entry(conn.addr).or_default().push(IdleConn {
            stream: conn.stream,
            parked_at: Instant::now(),
        });
    }

    /// Pops the most recently parked connection that has not aged out.
    /// Stale connections for the address are dropped on the way.
    fn pop_idle(&self, addr: SocketAddr) -> Option<TcpStream> {
        let mut idle = self.idle.lock().expect("connection pool lock poisoned");
        let conns = idle.get_mut(&addr)?;
        let now = Instant::now();
        conns.retain(|c| now.duration_since(c.parked_at) < self.idle_lifetime);
        let conn = conns.pop();
        if conns.is_empty() {
            idle.remove(&addr);
        }
        conn.map(|c| c.stream)
    }

    pub fn idle_count(&self) -> usize {
        let idle = self.idle.lock().expect("connection pool lock poisoned");
        idle.values().map(Vec::len).sum()
    }
}
