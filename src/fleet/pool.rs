//! Live connection pool keyed by host.
//!
//! All membership changes happen under one mutex. Readers take a snapshot
//! of `Arc<Connection>` clones and do their I/O without holding the guard.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::ssh::RemoteHandle;

/// One live remote session.
pub struct Connection {
    pub host_key: String,
    pub handle: Box<dyn RemoteHandle>,
    pub home_dir: String,
}

impl Connection {
    pub fn new(host_key: &str, handle: Box<dyn RemoteHandle>, home_dir: &str) -> Self {
        Connection {
            host_key: host_key.to_string(),
            handle,
            home_dir: home_dir.to_string(),
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("host_key", &self.host_key)
            .field("home_dir", &self.home_dir)
            .finish_non_exhaustive()
    }
}

/// Outcome of asking to start a connect for a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// The caller owns the in-flight slot and must `insert` or `abandon`.
    Granted,
    AlreadyConnected,
    InFlight,
}

#[derive(Default)]
struct PoolState {
    live: BTreeMap<String, Arc<Connection>>,
    pending: BTreeSet<String>,
}

#[derive(Default)]
pub struct ConnectionPool {
    state: Mutex<PoolState>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the right to dial `host`. Only one connect per host may be in
    /// flight, and none once the host is live.
    pub fn reserve(&self, host: &str) -> Reservation {
        let mut state = self.guard();
        if state.live.contains_key(host) {
            return Reservation::AlreadyConnected;
        }
        if !state.pending.insert(host.to_string()) {
            return Reservation::InFlight;
        }
        Reservation::Granted
    }

    /// Release an in-flight slot without inserting (connect failed).
    pub fn abandon(&self, host: &str) {
        self.guard().pending.remove(host);
    }

    /// Insert a freshly opened connection and clear its in-flight slot.
    /// If the key is already live the new connection is handed back so the
    /// caller can close it.
    pub fn insert(&self, conn: Connection) -> Result<(), Connection> {
        let mut state = self.guard();
        state.pending.remove(&conn.host_key);
        if state.live.contains_key(&conn.host_key) {
            return Err(conn);
        }
        state
            .live
            .insert(conn.host_key.clone(), Arc::new(conn));
        Ok(())
    }

    pub fn remove(&self, host: &str) -> Option<Arc<Connection>> {
        self.guard().live.remove(host)
    }

    /// Entries at this instant, ordered by host key.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.guard().live.values().cloned().collect()
    }

    pub fn hosts(&self) -> Vec<String> {
        self.guard().live.keys().cloned().collect()
    }

    pub fn pending(&self) -> Vec<String> {
        self.guard().pending.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.guard().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().live.is_empty()
    }

    /// Remove every live entry.
    pub fn drain(&self) -> Vec<Arc<Connection>> {
        let mut state = self.guard();
        std::mem::take(&mut state.live).into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::{DialTarget, Transport, fake::FakeTransport};

    fn open(host: &str) -> Connection {
        let target = DialTarget::parse("u", "p", host, "", "", 22, 5).unwrap();
        let handle = FakeTransport::new().dial(&target).unwrap();
        Connection::new(host, handle, &format!("/home/{host}"))
    }

    #[test]
    fn reserve_then_insert() {
        let pool = ConnectionPool::new();
        assert_eq!(pool.reserve("a"), Reservation::Granted);
        assert_eq!(pool.reserve("a"), Reservation::InFlight);
        assert_eq!(pool.pending(), vec!["a".to_string()]);

        assert!(pool.insert(open("a")).is_ok());
        assert!(pool.pending().is_empty());
        assert_eq!(pool.reserve("a"), Reservation::AlreadyConnected);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn abandon_frees_the_slot() {
        let pool = ConnectionPool::new();
        assert_eq!(pool.reserve("a"), Reservation::Granted);
        pool.abandon("a");
        assert_eq!(pool.reserve("a"), Reservation::Granted);
        assert!(pool.is_empty());
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let pool = ConnectionPool::new();
        assert!(pool.insert(open("a")).is_ok());
        let rejected = pool.insert(open("a")).unwrap_err();
        assert_eq!(rejected.host_key, "a");
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn snapshot_is_sorted_and_detached() {
        let pool = ConnectionPool::new();
        pool.insert(open("b")).unwrap();
        pool.insert(open("a")).unwrap();
        let snap = pool.snapshot();
        pool.remove("a");
        let keys: Vec<_> = snap.iter().map(|c| c.host_key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(pool.hosts(), vec!["b".to_string()]);
    }

    #[test]
    fn drain_empties_pool() {
        let pool = ConnectionPool::new();
        pool.insert(open("a")).unwrap();
        pool.insert(open("b")).unwrap();
        assert_eq!(pool.drain().len(), 2);
        assert!(pool.is_empty());
        assert!(pool.remove("a").is_none());
    }
}
