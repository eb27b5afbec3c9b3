//! Registry of live connections.
//!
//! The manager holds the only long-lived strong reference to each
//! connection; removing a connection from the registry is what lets it be
//! dropped once its last in-flight task finishes.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::server::connection::{Connection, Phase, Services};
use crate::server::transport::Transport;

const EVENT_CAPACITY: usize = 256;

/// Lifecycle notifications for caller-side bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Fired once per started connection.
    Established {
        id: u64,
        peer: SocketAddr,
        secure: bool,
    },
    /// Fired once when a connection leaves the registry.
    Closed { id: u64, peer: SocketAddr },
}

pub(crate) struct ManagerInner {
    connections: Mutex<HashMap<u64, Arc<Connection>>>,
    next_id: AtomicU64,
    services: Services,
    timeout: Duration,
    events: broadcast::Sender<ConnectionEvent>,
}

impl ManagerInner {
    pub(crate) fn stop(&self, conn: &Arc<Connection>) {
        conn.stop();
        let removed = self.connections.lock().remove(&conn.id());
        if removed.is_some() {
            self.closed(conn);
        }
    }

    fn closed(&self, conn: &Connection) {
        debug!(conn_id = conn.id(), peer = %conn.peer_addr(), "Connection deregistered");
        let _ = self.events.send(ConnectionEvent::Closed {
            id: conn.id(),
            peer: conn.peer_addr(),
        });
    }
}

/// Owns every live [`Connection`]. Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl ConnectionManager {
    /// `timeout` is the idle period after which an HTTP connection is closed
    /// and a WebSocket connection is probed.
    pub fn new(services: Services, timeout: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(ManagerInner {
                connections: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                services,
                timeout,
                events,
            }),
        }
    }

    /// Registers a connection for `transport` and starts it.
    pub fn accept(&self, transport: Transport) -> Arc<Connection> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let conn = Arc::new(Connection::new(
            id,
            transport,
            self.inner.timeout,
            self.inner.services.clone(),
            Arc::downgrade(&self.inner),
        ));

        self.inner.connections.lock().insert(id, Arc::clone(&conn));

        info!(conn_id = id, peer = %conn.peer_addr(), secure = conn.is_secure(), "Connection accepted");
        let _ = self.inner.events.send(ConnectionEvent::Established {
            id,
            peer: conn.peer_addr(),
            secure: conn.is_secure(),
        });

        conn.start();
        conn
    }

    /// Stops `conn` and drops the registry's reference to it.
    pub fn stop(&self, conn: &Arc<Connection>) {
        self.inner.stop(conn);
    }

    /// Stops every registered connection and returns them, so the caller can
    /// wait for their teardown.
    pub fn stop_all(&self) -> Vec<Arc<Connection>> {
        let drained: Vec<Arc<Connection>> = self
            .inner
            .connections
            .lock()
            .drain()
            .map(|(_, conn)| conn)
            .collect();

        info!(count = drained.len(), "Stopping all connections");

        for conn in &drained {
            conn.stop();
            self.inner.closed(conn);
        }
        drained
    }

    /// Stops everything and waits up to `grace` for the transports to be
    /// released, so close frames and half-closes reach the peers before the
    /// runtime goes away.
    pub async fn shutdown(&self, grace: Duration) {
        let stopping = self.stop_all();
        let waited = tokio::time::timeout(grace, async {
            for conn in &stopping {
                conn.closed().await;
            }
        })
        .await;

        if waited.is_err() {
            let pending = stopping.iter().filter(|c| c.phase() != Phase::Closed).count();
            warn!(pending, "Shutdown grace period elapsed");
        }
    }

    pub fn get(&self, id: u64) -> Option<Arc<Connection>> {
        self.inner.connections.lock().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.connections.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.connections.lock().is_empty()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connections", &self.len())
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}
