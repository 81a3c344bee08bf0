//! Reference-counted connection pool.
//!
//! One transport channel per `host:port`, shared by refcount. The dial path
//! uses double-checked locking: a pool-wide dial mutex guarantees an address
//! is never dialed twice concurrently, while the map itself stays behind a
//! cheap sync RwLock so count/release never await.
//!
//! Each pooled connection gets a monitor task that opportunistically
//! reclaims it once idle: refcount zero observed outside the lock, then
//! re-checked under the write lock before the single close. tonic channels
//! do not expose transport connectivity, so the idle check alone gates the
//! reclaim.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tonic::transport::{Channel, Endpoint};

use crate::core::error::{VoyagerError, VoyagerResult};

/// A pooled transport plus its shared refcount.
struct PooledConn {
    channel: Channel,
    refcount: AtomicI64,
    closed: AtomicBool,
}

impl PooledConn {
    fn new(channel: Channel) -> Self {
        Self {
            channel,
            refcount: AtomicI64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    fn acquire(&self) -> Channel {
        self.refcount.fetch_add(1, Ordering::AcqRel);
        self.channel.clone()
    }

    /// First caller wins; the entry is closed exactly once.
    fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }
}

/// `address → connection` pool with atomic refcounts.
pub struct ConnectionPool {
    conns: RwLock<HashMap<String, Arc<PooledConn>>>,
    dial_lock: Mutex<()>,
    connect_timeout: Duration,
    monitor_interval: Duration,
}

impl ConnectionPool {
    pub fn new(connect_timeout: Duration, monitor_interval: Duration) -> Self {
        Self {
            conns: RwLock::new(HashMap::new()),
            dial_lock: Mutex::new(()),
            connect_timeout,
            monitor_interval,
        }
    }

    /// Return a channel for `address`, reusing the pooled one when present
    /// or dialing a fresh connection otherwise. Dial failures propagate.
    pub async fn get(self: &Arc<Self>, address: &str) -> VoyagerResult<Channel> {
        {
            let conns = self.conns.read();
            if let Some(conn) = conns.get(address) {
                if !conn.closed.load(Ordering::Acquire) {
                    return Ok(conn.acquire());
                }
            }
        }

        // Serialize dials so a racing get never opens a second transport.
        let _dialing = self.dial_lock.lock().await;
        {
            let conns = self.conns.read();
            if let Some(conn) = conns.get(address) {
                if !conn.closed.load(Ordering::Acquire) {
                    return Ok(conn.acquire());
                }
            }
        }

        let endpoint = Endpoint::from_shared(http_uri(address))
            .map_err(VoyagerError::from)?
            .connect_timeout(self.connect_timeout);
        let channel = endpoint.connect().await.map_err(VoyagerError::from)?;
        tracing::debug!(address, "pooled new connection");

        let conn = Arc::new(PooledConn::new(channel));
        self.conns
            .write()
            .insert(address.to_string(), Arc::clone(&conn));
        self.spawn_monitor(address.to_string(), Arc::clone(&conn));
        Ok(conn.acquire())
    }

    /// Drop one reference for `address`.
    pub fn release(&self, address: &str) {
        let conns = self.conns.read();
        if let Some(conn) = conns.get(address) {
            conn.refcount.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// Current refcount for `address`; zero when absent.
    pub fn connection_count(&self, address: &str) -> i64 {
        self.conns
            .read()
            .get(address)
            .map(|conn| conn.refcount.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    /// Whether `address` currently has a pooled entry.
    pub fn contains(&self, address: &str) -> bool {
        self.conns.read().contains_key(address)
    }

    /// Close every entry and empty the map. Monitors observe the close mark
    /// and exit on their next tick.
    pub fn close(&self) {
        let mut conns = self.conns.write();
        for (_, conn) in conns.drain() {
            conn.mark_closed();
        }
    }

    fn spawn_monitor(self: &Arc<Self>, address: String, conn: Arc<PooledConn>) {
        let pool: Weak<ConnectionPool> = Arc::downgrade(self);
        let interval = self.monitor_interval;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if conn.closed.load(Ordering::Acquire) {
                    return;
                }
                let Some(pool) = pool.upgrade() else {
                    return;
                };
                if conn.refcount.load(Ordering::Acquire) != 0 {
                    continue;
                }

                let mut conns = pool.conns.write();
                let still_pooled = conns
                    .get(&address)
                    .is_some_and(|current| Arc::ptr_eq(current, &conn));
                if !still_pooled {
                    return;
                }
                // Re-check under the lock: a get() may have raced the idle
                // observation above.
                if conn.refcount.load(Ordering::Acquire) == 0 && conn.mark_closed() {
                    conns.remove(&address);
                    tracing::debug!(address = %address, "reclaimed idle connection");
                    return;
                }
            }
        });
    }
}

/// Pool addresses arrive as `host:port`; tonic endpoints need a scheme.
pub(crate) fn http_uri(address: &str) -> String {
    if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{address}")
    }
}
