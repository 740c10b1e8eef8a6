//! The set of live connections, i.e. everyone eligible to receive broadcasts.
//!
//! Every mutation and enumeration goes through one `parking_lot::Mutex`. The
//! lock is only held for map operations; callers iterate over a
//! [`Registry::snapshot`] and perform network writes with the lock released.

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::connection::{Connection, ConnectionId};

#[derive(Debug, Default)]
pub struct Registry {
    members: Mutex<AHashMap<ConnectionId, Arc<Connection>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unconditionally. Re-adding the same connection keeps one entry.
    pub fn add(&self, conn: Arc<Connection>) {
        let id = conn.id();
        let count = {
            let mut members = self.members.lock();
            members.insert(id, conn);
            members.len()
        };
        debug!(%id, count, "connection registered");
    }

    /// Remove if present. Returns whether this call did the removal; removing
    /// an absent connection is a no-op.
    pub fn remove(&self, id: ConnectionId) -> bool {
        let removed = self.members.lock().remove(&id).is_some();
        if removed {
            debug!(%id, "connection unregistered");
        }
        removed
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.members.lock().contains_key(&id)
    }

    /// Point-in-time copy of the membership, safe to iterate without the lock.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.members.lock().values().cloned().collect()
    }

    /// Empty the registry and hand back everything that was in it. Used on
    /// shutdown so the caller can close each connection outside the lock.
    pub fn drain(&self) -> Vec<Arc<Connection>> {
        self.members.lock().drain().map(|(_, conn)| conn).collect()
    }

    pub fn len(&self) -> usize {
        self.members.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;
    use tokio::io::duplex;

    fn conn(port: u16) -> Arc<Connection> {
        let (local, _remote) = duplex(8);
        Connection::new(format!("127.0.0.1:{port}").parse().unwrap(), local)
    }

    #[test]
    fn add_remove_snapshot() {
        let registry = Registry::new();
        let a = conn(1);
        let b = conn(2);

        registry.add(a.clone());
        registry.add(b.clone());
        registry.add(a.clone());
        assert_eq!(registry.len(), 2);

        assert!(registry.remove(a.id()));
        let ids: Vec<_> = registry.snapshot().iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec![b.id()]);
    }

    #[test]
    fn removal_is_idempotent() {
        let registry = Registry::new();
        let a = conn(1);
        let b = conn(2);
        registry.add(a.clone());
        registry.add(b.clone());

        assert!(registry.remove(a.id()));
        assert!(!registry.remove(a.id()));
        assert!(!registry.contains(a.id()));
        assert!(registry.contains(b.id()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn snapshot_is_detached_from_later_changes() {
        let registry = Registry::new();
        let a = conn(1);
        registry.add(a.clone());

        let snap = registry.snapshot();
        registry.remove(a.id());
        registry.add(conn(2));

        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].id(), a.id());
    }

    #[test]
    fn drain_empties_registry() {
        let registry = Registry::new();
        registry.add(conn(1));
        registry.add(conn(2));

        assert_eq!(registry.drain().len(), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn concurrent_churn_loses_no_updates() {
        let registry = Arc::new(Registry::new());
        let workers = 8;
        let per_worker = 200;

        let handles: Vec<_> = (0..workers)
            .map(|w| {
                let registry = registry.clone();
                thread::spawn(move || {
                    let mut kept = Vec::new();
                    for i in 0..per_worker {
                        let c = conn((w * per_worker + i) as u16);
                        registry.add(c.clone());
                        let _ = registry.snapshot();
                        if i % 2 == 0 {
                            registry.remove(c.id());
                            registry.remove(c.id());
                        } else {
                            kept.push(c.id());
                        }
                    }
                    kept
                })
            })
            .collect();

        let mut expected = HashSet::new();
        for handle in handles {
            expected.extend(handle.join().unwrap());
        }

        let actual: HashSet<_> = registry.snapshot().iter().map(|c| c.id()).collect();
        assert_eq!(actual, expected);
        assert_eq!(registry.len(), workers * per_worker / 2);
    }
}
