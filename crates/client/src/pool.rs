//! Connection pool keyed by scheme, host and port.
//!
//! The pool hands out [`Transaction`]s rather than connections. A transaction
//! carries a lease that returns its slot when dropped, so the pool always knows
//! how many transactions each connection has in flight.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::PoolConfig;
use crate::connection::{Connection, Transaction};
use crate::transport::{ConnectionKey, Connector};
use crate::Error;

#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    config: PoolConfig,
    connector: Arc<dyn Connector>,
    state: Mutex<PoolState>,
    released: Notify,
    next_id: AtomicU64,
}

#[derive(Default)]
struct PoolState {
    connections: HashMap<ConnectionKey, Vec<Arc<Connection>>>,
    /// Connections being opened, counted against the connection limit.
    opening: HashMap<ConnectionKey, usize>,
}

enum Acquire {
    Reuse(Transaction),
    Open,
    Wait,
}

impl Pool {
    pub fn new(config: PoolConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                config,
                connector,
                state: Mutex::new(PoolState::default()),
                released: Notify::new(),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// A transaction on a connection to `key`.
    ///
    /// Reuses the most recently used connection that is open, under its reuse
    /// limit and has room in its pipeline. Otherwise opens a new connection if
    /// the key is under the connection limit, or waits for a transaction to be
    /// released.
    pub async fn get_connection(&self, key: &ConnectionKey) -> Result<Transaction, Error> {
        loop {
            let released = self.inner.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            match self.inner.acquire(key) {
                Acquire::Reuse(transaction) => return Ok(transaction),
                Acquire::Open => return self.open(key).await,
                Acquire::Wait => {
                    debug!(%key, "connection limit reached, waiting");
                    released.await;
                }
            }
        }
    }

    async fn open(&self, key: &ConnectionKey) -> Result<Transaction, Error> {
        let reservation = Reservation { inner: &self.inner, key };
        let io = self.inner.connector.connect(key).await.inspect_err(|e| warn!(%key, "connect failed: {e}"))?;

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let connection = Arc::new(Connection::new(id, key.clone(), io, &self.inner.config));
        debug!(id, %key, "connection opened");

        let transaction = {
            let mut state = self.inner.lock();
            state.connections.entry(key.clone()).or_default().push(Arc::clone(&connection));
            connection.issue(Some(Lease::new(&self.inner, &connection)))
        };
        // the reservation is replaced by the connection itself
        drop(reservation);
        Ok(transaction)
    }

    /// Removes a connection, closing it.
    pub fn evict(&self, connection: &Arc<Connection>) {
        connection.close();
        self.inner.remove(connection);
        self.inner.released.notify_waiters();
    }

    pub fn connection_count(&self, key: &ConnectionKey) -> usize {
        self.inner.lock().connections.get(key).map_or(0, Vec::len)
    }

    /// Connections across all keys.
    pub fn len(&self) -> usize {
        self.inner.lock().connections.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closes and forgets every connection. Transactions in flight fail.
    pub fn close_all(&self) {
        let connections = std::mem::take(&mut self.inner.lock().connections);
        for connection in connections.values().flatten() {
            connection.close();
        }
        debug!(count = connections.values().map(Vec::len).sum::<usize>(), "pool closed");
        self.inner.released.notify_waiters();
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool").field("config", &self.inner.config).field("connections", &self.len()).finish()
    }
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire(self: &Arc<Self>, key: &ConnectionKey) -> Acquire {
        let mut state = self.lock();
        let now = Instant::now();

        let connections = state.connections.entry(key.clone()).or_default();
        connections.retain(|connection| {
            let idle = connection.outstanding() == 0
                && (connection.is_exhausted() || now.duration_since(connection.last_used()) >= self.config.idle_timeout);
            if idle {
                connection.close();
            }
            !connection.is_closed()
        });

        let candidate = connections
            .iter()
            .filter(|connection| connection.is_available())
            .max_by_key(|connection| connection.last_used())
            .cloned();
        if let Some(connection) = candidate {
            debug!(id = connection.id(), %key, outstanding = connection.outstanding(), "reuse connection");
            return Acquire::Reuse(connection.issue(Some(Lease::new(self, &connection))));
        }

        let open = connections.len();
        let opening = state.opening.entry(key.clone()).or_default();
        if open + *opening < self.config.connection_limit {
            *opening += 1;
            Acquire::Open
        } else {
            Acquire::Wait
        }
    }

    fn release(&self, connection: &Arc<Connection>) {
        connection.release();
        if connection.is_closed() || (connection.is_exhausted() && connection.outstanding() == 0) {
            self.remove(connection);
        }
        self.released.notify_waiters();
    }

    fn remove(&self, connection: &Arc<Connection>) {
        let mut state = self.lock();
        if let Some(connections) = state.connections.get_mut(connection.key()) {
            connections.retain(|c| !Arc::ptr_eq(c, connection));
            if connections.is_empty() {
                state.connections.remove(connection.key());
            }
        }
    }
}

/// Holds a slot under the connection limit while a connection is opened.
/// Released on success, failure and cancellation alike.
struct Reservation<'a> {
    inner: &'a Arc<PoolInner>,
    key: &'a ConnectionKey,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        let mut state = self.inner.lock();
        if let Some(opening) = state.opening.get_mut(self.key) {
            *opening = opening.saturating_sub(1);
            if *opening == 0 {
                state.opening.remove(self.key);
            }
        }
        drop(state);
        self.inner.released.notify_waiters();
    }
}

/// A transaction's claim on its connection's pipeline slot.
pub(crate) struct Lease {
    pool: Weak<PoolInner>,
    connection: Arc<Connection>,
}

impl Lease {
    fn new(inner: &Arc<PoolInner>, connection: &Arc<Connection>) -> Self {
        Self { pool: Arc::downgrade(inner), connection: Arc::clone(connection) }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        match self.pool.upgrade() {
            Some(inner) => inner.release(&self.connection),
            None => self.connection.release(),
        }
    }
}
